//! Error taxonomy for loading and invoking custom functions.

use std::time::Duration;

use lamina_ir::{FunctionId, RuntimeName};

/// Discriminant of [`BridgeError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Load,
    Signature,
    Invocation,
    RuntimeUnavailable,
    Timeout,
    Cancelled,
}

/// Failure raised by an adapter or the registry.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// Source, module or runtime missing or malformed.
    #[error("load error: {0}")]
    Load(String),
    /// Declared shape does not match the project's contract.
    #[error("signature mismatch: {0}")]
    Signature(String),
    /// The call raised, aborted or returned malformed data.
    #[error("invocation failed: {0}")]
    Invocation(String),
    /// An external runtime session was lost or could not be started.
    #[error("runtime `{runtime}` unavailable: {message}")]
    RuntimeUnavailable { runtime: RuntimeName, message: String },
    /// An external runtime exceeded its deadline.
    #[error("runtime `{runtime}` timed out after {after:?} waiting for {operation}")]
    Timeout {
        runtime: RuntimeName,
        operation: &'static str,
        after: Duration,
    },
    /// The caller abandoned the call.
    #[error("cancelled")]
    Cancelled,
}

impl BridgeError {
    pub fn load(message: impl Into<String>) -> Self {
        BridgeError::Load(message.into())
    }

    pub fn signature(message: impl Into<String>) -> Self {
        BridgeError::Signature(message.into())
    }

    pub fn invocation(message: impl Into<String>) -> Self {
        BridgeError::Invocation(message.into())
    }

    pub fn unavailable(runtime: &RuntimeName, message: impl Into<String>) -> Self {
        BridgeError::RuntimeUnavailable {
            runtime: runtime.clone(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Load(_) => ErrorKind::Load,
            BridgeError::Signature(_) => ErrorKind::Signature,
            BridgeError::Invocation(_) => ErrorKind::Invocation,
            BridgeError::RuntimeUnavailable { .. } => ErrorKind::RuntimeUnavailable,
            BridgeError::Timeout { .. } => ErrorKind::Timeout,
            BridgeError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Failure of one [`evaluate`](crate::EvaluationDriver::evaluate) call.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// A custom function failed to resolve or run.
    #[error("custom function {function}: {source}")]
    Function {
        function: FunctionId,
        /// Contrast being evaluated, if the failure happened inside the loop.
        contrast: Option<usize>,
        source: BridgeError,
    },
    #[error("expected {expected} parameters, got {got}")]
    ParameterCount { expected: usize, got: usize },
    #[error("contrast {contrast} uses custom function {function}, which is not configured")]
    UnknownFunction { function: FunctionId, contrast: usize },
    #[error("evaluation cancelled")]
    Cancelled,
}

impl EvalError {
    pub(crate) fn function(function: FunctionId, contrast: usize, source: BridgeError) -> Self {
        match source {
            BridgeError::Cancelled => EvalError::Cancelled,
            source => EvalError::Function {
                function,
                contrast: Some(contrast),
                source,
            },
        }
    }

    /// Identifier of the offending custom function.
    pub fn function_id(&self) -> Option<FunctionId> {
        match self {
            EvalError::Function { function, .. } | EvalError::UnknownFunction { function, .. } => {
                Some(*function)
            }
            EvalError::ParameterCount { .. } | EvalError::Cancelled => None,
        }
    }

    /// Kind of the underlying bridge failure.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            EvalError::Function { source, .. } => Some(source.kind()),
            EvalError::Cancelled => Some(ErrorKind::Cancelled),
            EvalError::ParameterCount { .. } | EvalError::UnknownFunction { .. } => None,
        }
    }
}
