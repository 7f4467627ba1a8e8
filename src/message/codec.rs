// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Container encoding used for message payloads.
//!
//! The engine only needs three things from the container format: encode a
//! value, decode a value, and know how many bytes an element will take so
//! chunking can respect the payload limit. Compact JSON gives all three.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ParseError;

/// Encodes a value into container bytes.
///
/// # Errors
///
/// Returns `ParseError::Container` if the value cannot be represented.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, ParseError> {
    serde_json::to_vec(value).map_err(Into::into)
}

/// Decodes container bytes into a value.
///
/// # Errors
///
/// Returns `ParseError::Container` on truncated or structurally invalid input,
/// including missing required fields.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ParseError> {
    serde_json::from_slice(bytes).map_err(Into::into)
}

/// Returns the number of bytes `value` occupies once encoded.
///
/// # Errors
///
/// Returns `ParseError::Container` if the value cannot be represented.
pub fn encoded_len<T: Serialize + ?Sized>(value: &T) -> Result<usize, ParseError> {
    encode(value).map(|bytes| bytes.len())
}
