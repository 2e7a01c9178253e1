//! External runtime adapter: functions hosted by another process.
//!
//! Each runtime kind gets one long-lived session (see [`protocol`] for the
//! wire format). Registering a function happens once per handle; every
//! call after that is a single request/response exchange bounded by the
//! configured call timeout and the caller's cancel token.

pub mod protocol;

mod pool;
mod session;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use lamina_ir::{Contract, FunctionReference, Invocation, Language, RawOutput, RuntimeName};

use self::pool::SessionPool;
use self::protocol::{CallArgs, Request};
use self::session::Session;
use crate::adapter::LanguageAdapter;
use crate::{BridgeConfig, BridgeError, CancelToken};

static NEXT_REGISTRATION: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
pub struct ExternalRuntimeAdapter {
    config: Arc<BridgeConfig>,
    pool: Arc<SessionPool>,
}

impl fmt::Debug for ExternalRuntimeAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalRuntimeAdapter")
            .field("call_timeout", &self.config.call_timeout)
            .field("sessions_started", &self.pool.starts())
            .finish()
    }
}

pub struct ExternalHandle {
    session: Arc<Session>,
    /// Registration key, unique per handle.
    key: String,
    contract: Contract,
}

impl ExternalRuntimeAdapter {
    pub fn new(config: Arc<BridgeConfig>) -> Self {
        ExternalRuntimeAdapter {
            pool: Arc::new(SessionPool::new(Arc::clone(&config))),
            config,
        }
    }

    /// Start the session for `runtime` in the background so the first load
    /// does not pay for it.
    pub fn prewarm(&self, runtime: &RuntimeName) {
        let pool = Arc::clone(&self.pool);
        let runtime = runtime.clone();
        let spawned = thread::Builder::new()
            .name(format!("lamina-prewarm-{runtime}"))
            .spawn(move || {
                if let Err(err) = pool.acquire(&runtime) {
                    tracing::warn!(%runtime, %err, "prewarm failed");
                }
            });
        if let Err(err) = spawned {
            tracing::warn!(%err, "cannot spawn prewarm thread");
        }
    }

    /// Runtime processes started so far, replacements included.
    pub fn sessions_started(&self) -> u64 {
        self.pool.starts()
    }
}

impl LanguageAdapter for ExternalRuntimeAdapter {
    type Handle = ExternalHandle;

    fn load(
        &self,
        reference: &FunctionReference,
        contract: &Contract,
    ) -> Result<ExternalHandle, BridgeError> {
        let Language::External(runtime) = &reference.language else {
            return Err(BridgeError::load(format!(
                "{} is not hosted by an external runtime",
                reference.id
            )));
        };
        let session = self.pool.acquire(runtime)?;
        let key = format!(
            "{}@{}",
            reference.locator,
            NEXT_REGISTRATION.fetch_add(1, Ordering::Relaxed)
        );
        let locator = &reference.locator;
        let reply = session
            .request(
                "register",
                |id| Request::Register {
                    id,
                    function: key.clone(),
                    directory: locator.directory.clone(),
                    file: locator.file_name.clone(),
                    entry: locator.entry().to_string(),
                },
                self.config.call_timeout,
                &CancelToken::none(),
            )?
            .map_err(BridgeError::Load)?;

        let handle = ExternalHandle {
            session,
            key,
            contract: *contract,
        };
        match reply.arity {
            Some(arity) if arity != contract.arity => {
                self.release(&handle);
                Err(BridgeError::signature(format!(
                    "`{}` takes {arity} argument(s), expected {}",
                    locator.entry(),
                    contract.arity
                )))
            }
            _ => {
                tracing::debug!(%runtime, key = %handle.key, "registered external function");
                Ok(handle)
            }
        }
    }

    fn invoke(
        &self,
        handle: &ExternalHandle,
        call: &Invocation<'_>,
        cancel: &CancelToken,
    ) -> Result<RawOutput, BridgeError> {
        let args = CallArgs::from_invocation(call, handle.session.index_base());
        let reply = handle
            .session
            .request(
                "call",
                |id| Request::Call {
                    id,
                    function: handle.key.clone(),
                    args,
                },
                self.config.call_timeout,
                cancel,
            )?
            .map_err(BridgeError::Invocation)?;

        let values = reply
            .values
            .ok_or_else(|| BridgeError::invocation("runtime reply carries no values"))?;
        let raw = RawOutput::new(values, reply.columns.unwrap_or(handle.contract.columns));
        Ok(match reply.scalar {
            Some(scalar) => raw.with_scalar(scalar),
            None => raw,
        })
    }

    /// Best effort: a dead session has nothing left to release.
    fn release(&self, handle: &ExternalHandle) {
        if !handle.session.is_healthy() {
            return;
        }
        let released = handle.session.request(
            "release",
            |id| Request::Release {
                id,
                function: handle.key.clone(),
            },
            self.config.call_timeout,
            &CancelToken::none(),
        );
        match released {
            Ok(Ok(_)) => tracing::trace!(key = %handle.key, "released external function"),
            Ok(Err(message)) => tracing::debug!(key = %handle.key, message, "runtime refused release"),
            Err(err) => tracing::debug!(key = %handle.key, %err, "release failed"),
        }
    }

    fn is_healthy(&self, handle: &ExternalHandle) -> bool {
        handle.session.is_healthy()
    }
}
