//! The `lamina-host` runtime: serves lamina script functions over the bridge
//! protocol from a separate process.
//!
//! Any runtime that speaks [`protocol`](crate::external::protocol) can back
//! external functions; this one exists so the out-of-process path can be
//! used, and tested, without a third-party environment.

use std::io::{self, BufRead, Write};

use lamina_ir::{FunctionId, FunctionReference, Language, RuntimeName, SourceLocator};
use lamina_script::{FunctionRef, Interpreter, Program};
use rustc_hash::FxHashMap;

use crate::external::protocol::{CallArgs, Reply, Request, Response};
use crate::interpreted::{compile_entry, decode_result, script_args};

struct Hosted {
    program: Program,
    entry: FunctionRef,
    arity: usize,
}

struct Host {
    functions: FxHashMap<String, Hosted>,
    interpreter: Interpreter,
}

/// Serve requests from `input` until `shutdown` or end of input.
///
/// Writes the ready line first. Only I/O failures end the loop early;
/// everything else is answered with an error response.
pub fn serve<R: BufRead, W: Write>(input: R, mut output: W, max_depth: usize) -> io::Result<()> {
    let mut host = Host {
        functions: FxHashMap::default(),
        interpreter: Interpreter::with_max_depth(max_depth),
    };
    send(&mut output, &Response::ready(RuntimeName::HOST))?;
    tracing::info!(pid = std::process::id(), "lamina-host ready");

    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let request = match serde_json::from_str::<Request>(line) {
            Ok(request) => request,
            Err(err) => {
                let id = serde_json::from_str::<serde_json::Value>(line)
                    .ok()
                    .and_then(|value| value.get("id").and_then(serde_json::Value::as_u64));
                send(
                    &mut output,
                    &Response::error(id, format!("malformed request: {err}")),
                )?;
                continue;
            }
        };
        let Some(response) = host.handle(request) else {
            break;
        };
        send(&mut output, &response)?;
    }
    tracing::info!(functions = host.functions.len(), "lamina-host shutting down");
    Ok(())
}

fn send<W: Write>(output: &mut W, response: &Response) -> io::Result<()> {
    serde_json::to_writer(&mut *output, response)?;
    output.write_all(b"\n")?;
    output.flush()
}

impl Host {
    /// Answer one request; `None` on shutdown.
    fn handle(&mut self, request: Request) -> Option<Response> {
        let response = match request {
            Request::Register {
                id,
                function,
                directory,
                file,
                entry,
            } => self.register(id, function, SourceLocator::new(directory, file).with_entry_point(entry)),
            Request::Call { id, function, args } => self.call(id, &function, &args),
            Request::Release { id, function } => {
                if self.functions.remove(&function).is_none() {
                    tracing::debug!(function, "release of unknown function");
                }
                Response::ok(id, Reply::default())
            }
            Request::Shutdown => return None,
        };
        Some(response)
    }

    fn register(&mut self, id: u64, key: String, locator: SourceLocator) -> Response {
        let reference = FunctionReference::new(FunctionId(0), Language::Interpreted, locator);
        match compile_entry(&reference) {
            Ok((program, entry)) => {
                let arity = program.arity(entry);
                tracing::debug!(function = %key, arity, "registered");
                self.functions.insert(
                    key,
                    Hosted {
                        program,
                        entry,
                        arity,
                    },
                );
                Response::ok(
                    id,
                    Reply {
                        arity: Some(arity),
                        ..Reply::default()
                    },
                )
            }
            Err(err) => Response::error(Some(id), err.to_string()),
        }
    }

    fn call(&mut self, id: u64, key: &str, args: &CallArgs) -> Response {
        let Some(hosted) = self.functions.get(key) else {
            return Response::error(Some(id), format!("function `{key}` is not registered"));
        };
        let Some(values) = script_args(&args.invocation(0), hosted.arity) else {
            return Response::error(Some(id), format!("unsupported entry arity {}", hosted.arity));
        };
        let outcome = self
            .interpreter
            .call(&hosted.program, hosted.entry, values)
            .map_err(|err| err.to_string())
            .and_then(|value| decode_result(&value, hosted.arity != 2));
        match outcome {
            Ok(raw) => Response::ok(
                id,
                Reply {
                    values: Some(raw.values),
                    columns: Some(raw.columns),
                    scalar: raw.scalar,
                    ..Reply::default()
                },
            ),
            Err(message) => Response::error(Some(id), message),
        }
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]

    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn exchange(requests: &[&str]) -> Vec<Response> {
        let input = Cursor::new(requests.join("\n"));
        let mut output = Vec::new();
        serve(input, &mut output, 64).unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn register_call_release() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("ramp.lam"),
            "fn ramp(x, p) { let y = []; for v in x { y = push(y, p[0] + p[1] * v); } return y; }",
        )
        .unwrap();
        let register = format!(
            r#"{{"op":"register","id":1,"function":"k","directory":{},"file":"ramp.lam","entry":"ramp"}}"#,
            serde_json::to_string(dir.path()).unwrap()
        );
        let responses = exchange(&[
            &register,
            r#"{"op":"call","id":2,"function":"k","args":{"params":[1.0,2.0],"x":[0.0,1.0,2.0],"contrast":0}}"#,
            r#"{"op":"release","id":3,"function":"k"}"#,
            r#"{"op":"call","id":4,"function":"k","args":{"params":[1.0,2.0],"contrast":0}}"#,
            r#"{"op":"shutdown"}"#,
            r#"{"op":"release","id":5,"function":"k"}"#,
        ]);

        assert_eq!(responses.len(), 5, "nothing is answered after shutdown");
        assert_eq!(responses[0], Response::ready("host"));
        assert_eq!(responses[1].clone().outcome().unwrap().arity, Some(2));
        assert_eq!(
            responses[2].clone().outcome().unwrap().values,
            Some(vec![1.0, 3.0, 5.0])
        );
        assert_eq!(responses[3].id, Some(3));
        assert!(responses[4].clone().outcome().is_err());
    }

    #[test]
    fn errors_are_answered_not_fatal() {
        let responses = exchange(&[
            "not json",
            r#"{"op":"teleport","id":9}"#,
            r#"{"op":"register","id":1,"function":"k","directory":"/nowhere","file":"f.lam","entry":"f"}"#,
        ]);
        assert_eq!(responses.len(), 4);
        assert_eq!(responses[1].id, None);
        assert!(responses[1].error.is_some());
        assert_eq!(responses[2].id, Some(9));
        assert!(responses[3].clone().outcome().unwrap_err().contains("cannot read"));
    }
}
