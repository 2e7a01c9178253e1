//! Lamina IR - data model for custom-function evaluation.
//!
//! Types flowing between the optimizer, the project definition and the
//! evaluation core:
//!
//! ```text
//! Project ──► Contrast* ──► FunctionReference (slot)
//!                               │
//! ParameterVector ──► Invocation ──► RawOutput ──► ContrastOutput ──► EvalOutput
//! ```
//!
//! Nothing here performs I/O; loading and invoking live in `lamina_bridge`.

mod model;
mod output;
mod params;
mod project;
mod reference;

pub use model::{Contract, ModelKind};
pub use output::{ContrastOutput, EvalOutput, Invocation, LayerTable, Profile, RawOutput};
pub use params::ParameterVector;
pub use project::{Contrast, CustomFiles, Project, ProjectError};
pub use reference::{
    FunctionId, FunctionReference, Language, ParseLanguageError, RuntimeName, SourceLocator,
};
