//! Native module adapter: custom functions compiled into shared libraries.
//!
//! Modules follow the `lamina_abi` calling convention. Each path is opened
//! once per adapter; handles hold the module through an `Arc`, so it is
//! closed only when the last handle resolved from it is gone. Raw library
//! handles and symbols never leave this module.

#![allow(
    unsafe_code,
    reason = "loading shared libraries and calling their entry points is FFI"
)]

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use lamina_abi::{
    EntryFn, LaminaArgs, LaminaOutput, LaminaSignature, SignatureFn, ABI_VERSION, ANY_PARAMS,
    NO_DOMAIN, STATUS_BUFFER_TOO_SMALL, STATUS_OK,
};
use lamina_ir::{Contract, FunctionReference, Invocation, RawOutput};
use libloading::Library;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::adapter::LanguageAdapter;
use crate::{BridgeError, CancelToken};

/// An opened shared library.
struct LoadedModule {
    path: PathBuf,
    library: Library,
}

impl Drop for LoadedModule {
    fn drop(&mut self) {
        tracing::debug!(path = %self.path.display(), "closing native module");
    }
}

/// Opened modules by path, without keeping them alive.
#[derive(Default)]
struct ModuleArena {
    modules: Mutex<FxHashMap<PathBuf, Weak<LoadedModule>>>,
}

impl ModuleArena {
    fn open(&self, path: &Path) -> Result<Arc<LoadedModule>, BridgeError> {
        let mut modules = self.modules.lock();
        if let Some(module) = modules.get(path).and_then(Weak::upgrade) {
            return Ok(module);
        }
        // SAFETY: running a module's initializers is the documented contract
        // of native custom functions; the path comes from the project.
        let library = unsafe { Library::new(path) }
            .map_err(|err| BridgeError::load(format!("cannot open {}: {err}", path.display())))?;
        tracing::debug!(path = %path.display(), "opened native module");
        let module = Arc::new(LoadedModule {
            path: path.to_path_buf(),
            library,
        });
        modules.retain(|_, weak| weak.strong_count() > 0);
        modules.insert(path.to_path_buf(), Arc::downgrade(&module));
        Ok(module)
    }

    fn open_count(&self) -> usize {
        self.modules
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

#[derive(Clone)]
pub struct NativeModuleAdapter {
    arena: Arc<ModuleArena>,
    output_capacity: usize,
}

impl fmt::Debug for NativeModuleAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModuleAdapter")
            .field("open_modules", &self.arena.open_count())
            .field("output_capacity", &self.output_capacity)
            .finish()
    }
}

pub struct NativeHandle {
    // Keeps `entry` valid.
    module: Arc<LoadedModule>,
    entry: EntryFn,
    symbol: String,
    columns: usize,
    /// Output length of the previous call; sizes the next buffer.
    capacity: AtomicUsize,
}

impl NativeModuleAdapter {
    pub fn new(output_capacity: usize) -> Self {
        NativeModuleAdapter {
            arena: Arc::default(),
            output_capacity: output_capacity.max(1),
        }
    }

    /// Number of modules currently open.
    pub fn open_modules(&self) -> usize {
        self.arena.open_count()
    }
}

impl LanguageAdapter for NativeModuleAdapter {
    type Handle = NativeHandle;

    fn load(
        &self,
        reference: &FunctionReference,
        contract: &Contract,
    ) -> Result<NativeHandle, BridgeError> {
        let path = reference.locator.path();
        if !path.is_file() {
            return Err(BridgeError::load(format!("module {} not found", path.display())));
        }
        let module = self.arena.open(&path)?;
        let symbol = reference.locator.entry().to_string();

        // SAFETY: the exported symbol is declared by the lamina ABI to have
        // the `EntryFn` signature; `module` outlives the copied pointer.
        let entry: EntryFn = unsafe { module.library.get::<EntryFn>(symbol.as_bytes()) }
            .map(|sym| *sym)
            .map_err(|_| {
                BridgeError::load(format!(
                    "symbol `{symbol}` is not exported by {}",
                    path.display()
                ))
            })?;
        check_signature(&module, &symbol, contract)?;

        Ok(NativeHandle {
            module,
            entry,
            symbol,
            columns: contract.columns,
            capacity: AtomicUsize::new(self.output_capacity),
        })
    }

    fn invoke(
        &self,
        handle: &NativeHandle,
        call: &Invocation<'_>,
        _cancel: &CancelToken,
    ) -> Result<RawOutput, BridgeError> {
        let contrast = u32::try_from(call.contrast)
            .map_err(|_| BridgeError::invocation("contrast index out of range"))?;
        let domain = match call.domain {
            Some(domain) => i32::try_from(domain)
                .map_err(|_| BridgeError::invocation("domain index out of range"))?,
            None => NO_DOMAIN,
        };
        let args = LaminaArgs::from_slices(
            call.params,
            call.bulk_in,
            call.bulk_out,
            call.x,
            contrast,
            domain,
        );

        let mut buffer = vec![0.0; handle.capacity.load(Ordering::Relaxed).max(1)];
        let (mut status, mut out) = call_entry(handle.entry, &args, &mut buffer);
        if status == STATUS_BUFFER_TOO_SMALL {
            // One retry with the size the module asked for.
            let required = out.len;
            handle.capacity.store(required, Ordering::Relaxed);
            buffer.resize(required, 0.0);
            (status, out) = call_entry(handle.entry, &args, &mut buffer);
        }
        if status != STATUS_OK {
            return Err(BridgeError::invocation(format!(
                "`{}` returned status {status}",
                handle.symbol
            )));
        }
        if out.len > buffer.len() {
            return Err(BridgeError::invocation(format!(
                "`{}` reported {} values for a buffer of {}",
                handle.symbol,
                out.len,
                buffer.len()
            )));
        }
        let scalar = out.scalar();
        buffer.truncate(out.len);
        tracing::trace!(symbol = %handle.symbol, values = buffer.len(), "native call");

        let raw = RawOutput::new(buffer, handle.columns);
        Ok(match scalar {
            Some(scalar) => raw.with_scalar(scalar),
            None => raw,
        })
    }

    fn release(&self, handle: &NativeHandle) {
        tracing::trace!(
            symbol = %handle.symbol,
            path = %handle.module.path.display(),
            "released native handle"
        );
    }
}

/// Call `entry` with a fresh output descriptor over `buffer`.
fn call_entry(entry: EntryFn, args: &LaminaArgs, buffer: &mut [f64]) -> (i32, LaminaOutput) {
    let mut out = LaminaOutput::new(buffer);
    // SAFETY: `args` points at slices borrowed for the duration of the call
    // and `out` at `buffer`, valid for `capacity` writes.
    let status = unsafe { entry(args, &mut out) };
    (status, out)
}

/// Validate the optional `<entry>_signature` metadata against `contract`.
fn check_signature(
    module: &LoadedModule,
    symbol: &str,
    contract: &Contract,
) -> Result<(), BridgeError> {
    let name = lamina_abi::signature_symbol(symbol);
    // SAFETY: the metadata symbol has the `SignatureFn` signature by ABI.
    let describe = match unsafe { module.library.get::<SignatureFn>(name.as_bytes()) } {
        Ok(sym) => *sym,
        Err(_) => {
            tracing::warn!(
                symbol,
                path = %module.path.display(),
                "no signature metadata; calling with the fixed ABI unchecked"
            );
            return Ok(());
        }
    };

    let mut sig = LaminaSignature::default();
    // SAFETY: `sig` is a valid, writable signature record.
    let status = unsafe { describe(&mut sig) };
    if status != STATUS_OK {
        return Err(BridgeError::signature(format!(
            "`{name}` returned status {status}"
        )));
    }
    if sig.abi_version != ABI_VERSION {
        return Err(BridgeError::signature(format!(
            "`{symbol}` targets ABI version {}, host speaks {ABI_VERSION}",
            sig.abi_version
        )));
    }
    if sig.params != ANY_PARAMS && sig.params != contract.params {
        return Err(BridgeError::signature(format!(
            "`{symbol}` expects {} parameters, project has {}",
            sig.params, contract.params
        )));
    }
    if sig.columns != contract.columns {
        return Err(BridgeError::signature(format!(
            "`{symbol}` produces {} column(s), project needs {}",
            sig.columns, contract.columns
        )));
    }
    Ok(())
}
