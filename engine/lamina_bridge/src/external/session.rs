//! One running external runtime process.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, select, Receiver, RecvTimeoutError, Sender};
use lamina_ir::RuntimeName;
use parking_lot::Mutex;

use super::protocol::{Reply, Request, Response, PROTOCOL_VERSION};
use crate::config::RuntimeCommand;
use crate::{BridgeError, CancelToken};

/// How long a runtime gets to exit after `shutdown` before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

/// Write side of the session; held for a whole request/response exchange.
struct Channel {
    stdin: ChildStdin,
    next_id: u64,
}

/// A child process speaking the bridge protocol.
///
/// Requests are strictly sequential. A session that timed out, was
/// cancelled or lost its process is unhealthy for good; the pool starts a
/// fresh one on the next acquire.
pub(crate) struct Session {
    runtime: RuntimeName,
    index_base: usize,
    child: Mutex<Child>,
    channel: Mutex<Channel>,
    responses: Receiver<Response>,
    /// Cleared by a failed request or by the reader thread at end of output.
    healthy: Arc<AtomicBool>,
}

enum Event {
    Response(Option<Response>),
    Cancelled,
    Timeout,
}

impl Session {
    /// Spawn the runtime and wait for its `ready` line.
    pub(crate) fn start(
        runtime: &RuntimeName,
        command: &RuntimeCommand,
        startup_timeout: Duration,
    ) -> Result<Session, BridgeError> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|err| {
                BridgeError::unavailable(
                    runtime,
                    format!("cannot start {}: {err}", command.program.display()),
                )
            })?;
        let pid = child.id();

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            kill(&mut child);
            return Err(BridgeError::unavailable(runtime, "runtime stdio is not piped"));
        };
        let (sender, responses) = channel::unbounded();
        let healthy = Arc::new(AtomicBool::new(true));
        let open = Arc::clone(&healthy);
        let reader = thread::Builder::new()
            .name(format!("lamina-{runtime}-{pid}"))
            .spawn(move || read_responses(stdout, &sender, &open));
        if let Err(err) = reader {
            kill(&mut child);
            return Err(BridgeError::unavailable(
                runtime,
                format!("cannot spawn reader thread: {err}"),
            ));
        }

        match responses.recv_timeout(startup_timeout) {
            Ok(Response {
                ready: Some(ready), ..
            }) if ready.protocol == PROTOCOL_VERSION => {
                tracing::info!(%runtime, pid, kind = %ready.runtime, "runtime session ready");
            }
            Ok(Response {
                ready: Some(ready), ..
            }) => {
                kill(&mut child);
                return Err(BridgeError::unavailable(
                    runtime,
                    format!(
                        "runtime speaks protocol {}, expected {PROTOCOL_VERSION}",
                        ready.protocol
                    ),
                ));
            }
            Ok(_) => {
                kill(&mut child);
                return Err(BridgeError::unavailable(
                    runtime,
                    "first message was not a ready line",
                ));
            }
            Err(RecvTimeoutError::Timeout) => {
                kill(&mut child);
                return Err(BridgeError::Timeout {
                    runtime: runtime.clone(),
                    operation: "handshake",
                    after: startup_timeout,
                });
            }
            Err(RecvTimeoutError::Disconnected) => {
                kill(&mut child);
                return Err(BridgeError::unavailable(
                    runtime,
                    "runtime exited before the handshake",
                ));
            }
        }

        Ok(Session {
            runtime: runtime.clone(),
            index_base: command.index_base,
            child: Mutex::new(child),
            channel: Mutex::new(Channel { stdin, next_id: 0 }),
            responses,
            healthy,
        })
    }

    pub(crate) fn runtime(&self) -> &RuntimeName {
        &self.runtime
    }

    pub(crate) fn index_base(&self) -> usize {
        self.index_base
    }

    /// Whether the session still accepts requests. A flag read only; see
    /// [`is_alive`](Self::is_alive) for the process check.
    pub(crate) fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Like [`is_healthy`](Self::is_healthy), also asking the OS whether the
    /// process is still running.
    pub(crate) fn is_alive(&self) -> bool {
        if !self.is_healthy() {
            return false;
        }
        let exited = !matches!(self.child.lock().try_wait(), Ok(None));
        if exited {
            tracing::warn!(runtime = %self.runtime, "runtime process exited");
            self.healthy.store(false, Ordering::Release);
        }
        !exited
    }

    /// Send one request and wait for its response.
    ///
    /// The outer error is a transport failure (the session is then
    /// unhealthy); the inner one is an error reported by the runtime itself.
    pub(crate) fn request(
        &self,
        operation: &'static str,
        build: impl FnOnce(u64) -> Request,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Result<Reply, String>, BridgeError> {
        let mut channel = self.channel.lock();
        if !self.is_healthy() {
            return Err(BridgeError::unavailable(&self.runtime, "session is closed"));
        }
        if cancel.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }
        channel.next_id += 1;
        let id = channel.next_id;
        let mut line = serde_json::to_string(&build(id))
            .map_err(|err| BridgeError::invocation(format!("cannot encode request: {err}")))?;
        line.push('\n');
        if let Err(err) = channel
            .stdin
            .write_all(line.as_bytes())
            .and_then(|()| channel.stdin.flush())
        {
            self.fail();
            return Err(BridgeError::unavailable(
                &self.runtime,
                format!("cannot write request: {err}"),
            ));
        }
        tracing::trace!(runtime = %self.runtime, id, operation, "sent request");

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = select! {
                recv(self.responses) -> msg => Event::Response(msg.ok()),
                recv(cancel.receiver()) -> _ => Event::Cancelled,
                default(remaining) => Event::Timeout,
            };
            match event {
                Event::Response(Some(response)) if response.id.map_or(true, |r| r == id) => {
                    return Ok(response.outcome());
                }
                Event::Response(Some(response)) => {
                    tracing::debug!(runtime = %self.runtime, stale = ?response.id, id, "skipping stale response");
                }
                Event::Response(None) => {
                    self.fail();
                    return Err(BridgeError::unavailable(
                        &self.runtime,
                        format!("runtime exited during {operation}"),
                    ));
                }
                Event::Cancelled => {
                    tracing::info!(runtime = %self.runtime, id, operation, "request cancelled");
                    self.fail();
                    return Err(BridgeError::Cancelled);
                }
                Event::Timeout => {
                    tracing::warn!(runtime = %self.runtime, id, operation, ?timeout, "request timed out");
                    self.fail();
                    return Err(BridgeError::Timeout {
                        runtime: self.runtime.clone(),
                        operation,
                        after: timeout,
                    });
                }
            }
        }
    }

    /// Mark unhealthy and kill the process; an abandoned request leaves the
    /// runtime in an unknown state.
    fn fail(&self) {
        self.healthy.store(false, Ordering::Release);
        kill(&mut self.child.lock());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let child = self.child.get_mut();
        if self.healthy.load(Ordering::Acquire) {
            let channel = self.channel.get_mut();
            let shutdown = serde_json::to_string(&Request::Shutdown).unwrap_or_default();
            let _ = writeln!(channel.stdin, "{shutdown}").and_then(|()| channel.stdin.flush());
            let deadline = Instant::now() + SHUTDOWN_GRACE;
            while matches!(child.try_wait(), Ok(None)) && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
        }
        kill(child);
        tracing::debug!(runtime = %self.runtime, "runtime session closed");
    }
}

fn kill(child: &mut Child) {
    if matches!(child.try_wait(), Ok(None)) {
        let _ = child.kill();
    }
    let _ = child.wait();
}

/// Forward parsed response lines until the runtime closes stdout.
fn read_responses(stdout: ChildStdout, sender: &Sender<Response>, open: &AtomicBool) {
    for line in BufReader::new(stdout).lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Response>(line) {
            Ok(response) => {
                if sender.send(response).is_err() {
                    break;
                }
            }
            Err(err) => tracing::warn!(%err, line, "ignoring malformed runtime output"),
        }
    }
    open.store(false, Ordering::Release);
    tracing::debug!("runtime closed its output");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// A runtime that completes the handshake and exits.
    fn one_shot() -> Session {
        let ready = serde_json::to_string(&Response::ready("sh")).unwrap_or_default();
        let command =
            RuntimeCommand::new("sh").with_args(["-c".to_string(), format!("echo '{ready}'")]);
        Session::start(&RuntimeName::new("sh"), &command, Duration::from_secs(10))
            .unwrap_or_else(|e| panic!("start: {e}"))
    }

    #[test]
    fn end_of_output_marks_the_session_unhealthy() {
        let session = one_shot();
        let deadline = Instant::now() + Duration::from_secs(10);
        while session.is_healthy() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!session.is_healthy());
        assert!(!session.is_alive());
        let result = session.request(
            "call",
            |_| Request::Shutdown,
            Duration::from_secs(1),
            &CancelToken::none(),
        );
        assert!(matches!(result, Err(BridgeError::RuntimeUnavailable { .. })));
    }
}
