//! Runtime sessions, one per runtime kind, started lazily.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lamina_ir::RuntimeName;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::session::Session;
use crate::{BridgeConfig, BridgeError};

#[derive(Default)]
struct SessionSlot {
    session: Mutex<Option<Arc<Session>>>,
}

pub(crate) struct SessionPool {
    config: Arc<BridgeConfig>,
    slots: Mutex<FxHashMap<RuntimeName, Arc<SessionSlot>>>,
    starts: AtomicU64,
}

impl SessionPool {
    pub(crate) fn new(config: Arc<BridgeConfig>) -> Self {
        SessionPool {
            config,
            slots: Mutex::default(),
            starts: AtomicU64::new(0),
        }
    }

    /// The live session for `runtime`, starting one if there is none or the
    /// previous one went bad.
    ///
    /// Concurrent callers for the same runtime wait for a single start.
    pub(crate) fn acquire(&self, runtime: &RuntimeName) -> Result<Arc<Session>, BridgeError> {
        let slot = Arc::clone(self.slots.lock().entry(runtime.clone()).or_default());
        let mut current = slot.session.lock();
        if let Some(session) = current.as_ref() {
            if session.is_alive() {
                return Ok(Arc::clone(session));
            }
            tracing::info!(runtime = %session.runtime(), "replacing unhealthy session");
        }
        // The old session is dropped, and shut down, with its last handle.
        *current = None;

        let command = self.config.runtime(runtime).ok_or_else(|| {
            BridgeError::unavailable(runtime, "no command configured for this runtime")
        })?;
        let session = Arc::new(Session::start(
            runtime,
            command,
            self.config.startup_timeout,
        )?);
        self.starts.fetch_add(1, Ordering::Relaxed);
        *current = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Sessions started so far, replacements included.
    pub(crate) fn starts(&self) -> u64 {
        self.starts.load(Ordering::Relaxed)
    }
}
