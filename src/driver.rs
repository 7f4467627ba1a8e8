// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runs an [`Engine`] on the tokio runtime.
//!
//! The engine itself is synchronous. [`EngineDriver`] owns it behind a mutex
//! and keeps a background task that calls [`Engine::tick`] whenever
//! [`Engine::next_wakeup`] comes due. Every call made through
//! [`EngineDriver::with_engine`] wakes the task so that new deadlines are
//! picked up at once.
//!
//! # Examples
//!
//! ```no_run
//! use im_reporting::config::EngineConfig;
//! use im_reporting::path::{ClusterId, EndpointId, PathFilter};
//! use im_reporting::transport::ChannelTransport;
//! use im_reporting::{Engine, EngineDriver};
//!
//! # async fn example() -> im_reporting::Result<()> {
//! let (transport, mut outbound) = ChannelTransport::new();
//! let engine = Engine::builder(EngineConfig::default())
//!     .with_transport(transport)
//!     .build()?;
//! let mut driver = EngineDriver::spawn(engine);
//!
//! driver.with_engine(|engine| {
//!     engine.set_dirty(PathFilter::cluster(EndpointId(1), ClusterId(6)));
//! });
//!
//! while let Some((session, message)) = outbound.recv().await {
//!     // hand the message to the network
//!     # let _ = (session, message);
//! }
//! driver.stop().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::engine::Engine;
use crate::message::Message;
use crate::session::SessionId;

/// Background task driving an [`Engine`].
#[derive(Debug)]
pub struct EngineDriver {
    engine: Arc<Mutex<Engine>>,
    notify: Arc<Notify>,
    stop: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl EngineDriver {
    /// Moves `engine` into a background task.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(engine: Engine) -> Self {
        let engine = Arc::new(Mutex::new(engine));
        let notify = Arc::new(Notify::new());
        let stop = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run(
            Arc::clone(&engine),
            Arc::clone(&notify),
            Arc::clone(&stop),
        ));

        Self {
            engine,
            notify,
            stop,
            task: Some(task),
        }
    }

    /// Runs `f` with exclusive access to the engine, then wakes the task.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut Engine) -> R) -> R {
        let result = f(&mut self.engine.lock());
        self.notify.notify_one();
        result
    }

    /// Hands an inbound message to the engine.
    pub fn on_message_received(&self, session: SessionId, message: Message) {
        self.with_engine(|engine| engine.on_message_received(session, message));
    }

    /// Wakes the task so it re-evaluates its deadlines.
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Returns `true` while the background task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops the task and waits for it to exit. The engine is shut down.
    pub async fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.notify.notify_one();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "Engine driver task failed");
        }
        self.engine.lock().shutdown();
    }
}

impl Drop for EngineDriver {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(engine: Arc<Mutex<Engine>>, notify: Arc<Notify>, stop: Arc<AtomicBool>) {
    tracing::debug!("Engine driver started");
    while !stop.load(Ordering::SeqCst) {
        let wakeup = {
            let mut engine = engine.lock();
            engine.tick();
            engine.next_wakeup()
        };

        match wakeup {
            Some(at) => {
                tokio::select! {
                    () = notify.notified() => {}
                    () = tokio::time::sleep_until(at) => {}
                }
            }
            None => notify.notified().await,
        }
    }
    tracing::debug!("Engine driver stopped");
}
