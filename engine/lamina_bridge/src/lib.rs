//! Lamina bridge - loads and invokes user-authored custom functions.
//!
//! # Architecture
//!
//! ```text
//! optimizer ──► EvaluationDriver::evaluate(project, params)
//!                   │ per contrast, in schema order
//!                   ▼
//!               FunctionRegistry::resolve(reference) ──► Arc<FunctionHandle>
//!                   │ first use only                         │
//!                   ▼                                        ▼
//!               Adapters::load                     FunctionHandle::invoke
//!                 ├─ InterpretedAdapter   (lamina_script, in process)
//!                 ├─ NativeModuleAdapter  (shared library, lamina_abi)
//!                 └─ ExternalRuntimeAdapter (child process, JSON lines)
//!                   │
//!                   ▼
//!               marshal::decode ──► EvalOutput
//! ```
//!
//! A [`Workspace`] ties one project to one registry so replacing a custom
//! file always invalidates the stale handle first.

mod adapter;
mod cancel;
mod config;
mod driver;
mod error;
pub mod external;
mod handle;
pub mod host;
mod interpreted;
mod marshal;
mod native;
mod registry;
mod workspace;

use std::sync::Once;

pub use adapter::LanguageAdapter;
pub use cancel::{CancelSource, CancelToken};
pub use config::{
    BridgeConfig, RuntimeCommand, DEFAULT_CALL_TIMEOUT, DEFAULT_OUTPUT_CAPACITY,
    DEFAULT_STARTUP_TIMEOUT,
};
pub use driver::EvaluationDriver;
pub use error::{BridgeError, ErrorKind, EvalError};
pub use external::{ExternalHandle, ExternalRuntimeAdapter};
pub use handle::{FunctionHandle, HandleId};
pub use interpreted::{InterpretedAdapter, InterpretedHandle};
pub use native::{NativeHandle, NativeModuleAdapter};
pub use registry::{FunctionRegistry, RegistryStats};
pub use workspace::Workspace;

static TRACING_INIT: Once = Once::new();

/// Install a stderr `tracing` subscriber filtered by `RUST_LOG`.
///
/// Does nothing unless `RUST_LOG` is set; safe to call more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_level(true),
                )
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}
