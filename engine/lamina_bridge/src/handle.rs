//! Cached, ready-to-call custom functions.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use lamina_ir::{FunctionReference, Invocation, RawOutput};

use crate::adapter::LanguageAdapter;
use crate::external::{ExternalHandle, ExternalRuntimeAdapter};
use crate::interpreted::{InterpretedAdapter, InterpretedHandle};
use crate::native::{NativeHandle, NativeModuleAdapter};
use crate::{BridgeError, CancelToken};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`FunctionHandle`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Backend-specific state paired with the adapter that owns it.
pub(crate) enum HandleKind {
    Interpreted {
        adapter: InterpretedAdapter,
        handle: InterpretedHandle,
    },
    Native {
        adapter: NativeModuleAdapter,
        handle: NativeHandle,
    },
    External {
        adapter: ExternalRuntimeAdapter,
        handle: ExternalHandle,
    },
}

/// A loaded custom function, owned by one registry entry.
///
/// The registry hands out `Arc<FunctionHandle>`s. Once the entry is
/// invalidated the handle is released and every further
/// [`invoke`](Self::invoke) fails, even through clones that outlived the
/// entry.
pub struct FunctionHandle {
    id: HandleId,
    reference: FunctionReference,
    released: AtomicBool,
    kind: HandleKind,
}

impl FunctionHandle {
    pub(crate) fn new(reference: FunctionReference, kind: HandleKind) -> Self {
        FunctionHandle {
            id: HandleId(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)),
            reference,
            released: AtomicBool::new(false),
            kind,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn reference(&self) -> &FunctionReference {
        &self.reference
    }

    /// Name of the backend serving this handle.
    pub fn backend(&self) -> &'static str {
        match self.kind {
            HandleKind::Interpreted { .. } => "interpreted",
            HandleKind::Native { .. } => "native-module",
            HandleKind::External { .. } => "external-runtime",
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Whether the handle can still be invoked.
    pub fn is_healthy(&self) -> bool {
        if self.is_released() {
            return false;
        }
        match &self.kind {
            HandleKind::Interpreted { adapter, handle } => adapter.is_healthy(handle),
            HandleKind::Native { adapter, handle } => adapter.is_healthy(handle),
            HandleKind::External { adapter, handle } => adapter.is_healthy(handle),
        }
    }

    pub fn invoke(&self, call: &Invocation<'_>, cancel: &CancelToken) -> Result<RawOutput, BridgeError> {
        if self.is_released() {
            return Err(BridgeError::invocation(format!(
                "handle {} for {} was released",
                self.id, self.reference.id
            )));
        }
        match &self.kind {
            HandleKind::Interpreted { adapter, handle } => adapter.invoke(handle, call, cancel),
            HandleKind::Native { adapter, handle } => adapter.invoke(handle, call, cancel),
            HandleKind::External { adapter, handle } => adapter.invoke(handle, call, cancel),
        }
    }

    /// Release backend resources. Idempotent.
    ///
    /// Returns `true` for the call that actually released.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        tracing::debug!(handle = %self.id, function = %self.reference.id, "releasing handle");
        match &self.kind {
            HandleKind::Interpreted { adapter, handle } => adapter.release(handle),
            HandleKind::Native { adapter, handle } => adapter.release(handle),
            HandleKind::External { adapter, handle } => adapter.release(handle),
        }
        true
    }
}

impl fmt::Debug for FunctionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionHandle")
            .field("id", &self.id)
            .field("reference", &self.reference)
            .field("backend", &self.backend())
            .field("released", &self.is_released())
            .finish()
    }
}
