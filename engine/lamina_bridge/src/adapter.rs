//! Language adapters.
//!
//! Every backend implements [`LanguageAdapter`]. The set of backends is
//! closed: [`Adapters`] owns one adapter per backend and picks the right one
//! from the reference's language tag, and [`FunctionHandle`] stores the
//! backend-specific handle in an enum, so calls dispatch through a `match`
//! instead of a trait object.
//!
//! [`FunctionHandle`]: crate::FunctionHandle

use std::sync::Arc;

use lamina_ir::{Contract, FunctionReference, Invocation, Language, RawOutput, RuntimeName};

use crate::external::ExternalRuntimeAdapter;
use crate::handle::{FunctionHandle, HandleKind};
use crate::interpreted::InterpretedAdapter;
use crate::native::NativeModuleAdapter;
use crate::{BridgeConfig, BridgeError, CancelToken};

/// Capability set of one language backend.
pub trait LanguageAdapter {
    /// Backend-specific ready-to-call state.
    type Handle;

    /// Load the function named by `reference` and check it against
    /// `contract`.
    ///
    /// Anything acquired before a failure is released before returning.
    fn load(
        &self,
        reference: &FunctionReference,
        contract: &Contract,
    ) -> Result<Self::Handle, BridgeError>;

    /// Call a loaded function. Only backends that block on another process
    /// observe `cancel`.
    fn invoke(
        &self,
        handle: &Self::Handle,
        call: &Invocation<'_>,
        cancel: &CancelToken,
    ) -> Result<RawOutput, BridgeError>;

    /// Give up the resources behind `handle`. Safe to call more than once.
    fn release(&self, handle: &Self::Handle);

    /// Whether `handle` can still be invoked; only sessions with another
    /// process can go bad.
    fn is_healthy(&self, _handle: &Self::Handle) -> bool {
        true
    }
}

/// One adapter per backend, shared by every handle they create.
#[derive(Clone, Debug)]
pub(crate) struct Adapters {
    pub interpreted: InterpretedAdapter,
    pub native: NativeModuleAdapter,
    pub external: ExternalRuntimeAdapter,
}

impl Adapters {
    pub(crate) fn new(config: &Arc<BridgeConfig>) -> Self {
        Adapters {
            interpreted: InterpretedAdapter::new(config.max_call_depth),
            native: NativeModuleAdapter::new(config.output_capacity),
            external: ExternalRuntimeAdapter::new(Arc::clone(config)),
        }
    }

    /// Load `reference` with the adapter selected by its language tag.
    pub(crate) fn load(
        &self,
        reference: &FunctionReference,
        contract: &Contract,
    ) -> Result<FunctionHandle, BridgeError> {
        let kind = match &reference.language {
            Language::Interpreted => HandleKind::Interpreted {
                handle: self.interpreted.load(reference, contract)?,
                adapter: self.interpreted.clone(),
            },
            Language::NativeModule => HandleKind::Native {
                handle: self.native.load(reference, contract)?,
                adapter: self.native.clone(),
            },
            Language::External(_) => HandleKind::External {
                handle: self.external.load(reference, contract)?,
                adapter: self.external.clone(),
            },
        };
        Ok(FunctionHandle::new(reference.clone(), kind))
    }

    pub(crate) fn prewarm(&self, runtime: &RuntimeName) {
        self.external.prewarm(runtime);
    }
}
