//! Bridge protocol: newline-delimited JSON over the runtime's stdio.
//!
//! ```text
//! runtime → {"ready":{"runtime":"host","protocol":1}}
//! host    → {"op":"register","id":1,"function":"/m/f.lam","directory":"/m","file":"f.lam","entry":"f"}
//! runtime → {"id":1,"ok":{"arity":4}}
//! host    → {"op":"call","id":2,"function":"/m/f.lam","args":{"params":[..],...}}
//! runtime → {"id":2,"ok":{"values":[..],"columns":3,"scalar":2.0}}
//! runtime → {"id":3,"error":{"message":"..."}}
//! ```

use std::path::PathBuf;

use lamina_ir::Invocation;
use serde::{Deserialize, Serialize};

/// Protocol revision spoken by this crate.
pub const PROTOCOL_VERSION: u32 = 1;

/// Host to runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Load a function and report its arity.
    Register {
        id: u64,
        /// Key the host uses for this function in later requests.
        function: String,
        directory: PathBuf,
        file: String,
        entry: String,
    },
    Call {
        id: u64,
        function: String,
        args: CallArgs,
    },
    Release {
        id: u64,
        function: String,
    },
    /// Exit; no reply.
    Shutdown,
}

impl Request {
    pub fn id(&self) -> Option<u64> {
        match self {
            Request::Register { id, .. } | Request::Call { id, .. } | Request::Release { id, .. } => {
                Some(*id)
            }
            Request::Shutdown => None,
        }
    }
}

/// Call arguments, indices already in the runtime's base.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
    pub params: Vec<f64>,
    #[serde(default)]
    pub bulk_in: Vec<f64>,
    #[serde(default)]
    pub bulk_out: Vec<f64>,
    #[serde(default)]
    pub x: Vec<f64>,
    pub contrast: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<usize>,
}

impl CallArgs {
    pub fn from_invocation(call: &Invocation<'_>, index_base: usize) -> Self {
        CallArgs {
            params: call.params.to_vec(),
            bulk_in: call.bulk_in.to_vec(),
            bulk_out: call.bulk_out.to_vec(),
            x: call.x.to_vec(),
            contrast: call.contrast + index_base,
            domain: call.domain.map(|d| d + index_base),
        }
    }

    /// Borrow as an invocation with indices in the given base.
    pub fn invocation(&self, index_base: usize) -> Invocation<'_> {
        Invocation::new(&self.params)
            .with_bulk(&self.bulk_in, &self.bulk_out)
            .with_x(&self.x)
            .with_contrast(
                self.contrast.saturating_sub(index_base),
                self.domain.map(|d| d.saturating_sub(index_base)),
            )
    }
}

/// Runtime to host. Exactly one of `ready`, `ok` or `error` is set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<Ready>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<Reply>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn ready(runtime: impl Into<String>) -> Self {
        Response {
            ready: Some(Ready {
                runtime: runtime.into(),
                protocol: PROTOCOL_VERSION,
            }),
            ..Response::default()
        }
    }

    pub fn ok(id: u64, reply: Reply) -> Self {
        Response {
            id: Some(id),
            ok: Some(reply),
            ..Response::default()
        }
    }

    pub fn error(id: Option<u64>, message: impl Into<String>) -> Self {
        Response {
            id,
            error: Some(ErrorBody {
                message: message.into(),
            }),
            ..Response::default()
        }
    }

    /// The reply, or the runtime's error message.
    pub fn outcome(self) -> Result<Reply, String> {
        match (self.ok, self.error) {
            (_, Some(error)) => Err(error.message),
            (Some(reply), None) => Ok(reply),
            (None, None) => Err("response carries neither a result nor an error".to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ready {
    pub runtime: String,
    pub protocol: u32,
}

/// Successful result; fields depend on the request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arity: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scalar: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}
