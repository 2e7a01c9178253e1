//! Cooperative cancellation.
//!
//! A [`CancelSource`] hands out [`CancelToken`]s. Cancelling sets a flag that
//! the driver polls between invocations and disconnects a channel that
//! external-runtime waits select on, so a blocked wait wakes up immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

/// State shared by a source and its tokens.
///
/// The sender is dropped only by `cancel()`; receivers then observe a
/// disconnect. Tokens hold the state too, so dropping the source alone never
/// looks like a cancellation.
#[derive(Debug)]
struct Signal {
    flag: AtomicBool,
    sender: Mutex<Option<Sender<()>>>,
}

impl Signal {
    fn new() -> (Arc<Signal>, Receiver<()>) {
        let (sender, receiver) = channel::bounded(0);
        let signal = Signal {
            flag: AtomicBool::new(false),
            sender: Mutex::new(Some(sender)),
        };
        (Arc::new(signal), receiver)
    }

    fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Owner side of a cancellation signal.
#[derive(Debug)]
pub struct CancelSource {
    signal: Arc<Signal>,
    receiver: Receiver<()>,
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSource {
    pub fn new() -> Self {
        let (signal, receiver) = Signal::new();
        CancelSource { signal, receiver }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            signal: Arc::clone(&self.signal),
            receiver: self.receiver.clone(),
        }
    }

    /// Signal every token. Idempotent.
    pub fn cancel(&self) {
        self.signal.flag.store(true, Ordering::Release);
        self.signal.sender.lock().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_set()
    }
}

/// Observer side of a cancellation signal.
#[derive(Clone, Debug)]
pub struct CancelToken {
    signal: Arc<Signal>,
    receiver: Receiver<()>,
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn none() -> Self {
        let (signal, receiver) = Signal::new();
        CancelToken { signal, receiver }
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_set()
    }

    /// Becomes ready (disconnected) once cancelled.
    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.receiver
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::RecvTimeoutError;
    use std::time::Duration;

    #[test]
    fn cancel_reaches_every_token() {
        let source = CancelSource::new();
        let a = source.token();
        let b = a.clone();
        assert!(!a.is_cancelled());

        source.cancel();
        source.cancel();
        assert!(a.is_cancelled() && b.is_cancelled());
        assert!(source.is_cancelled());
        assert_eq!(
            b.receiver().recv_timeout(Duration::from_millis(50)),
            Err(RecvTimeoutError::Disconnected)
        );
    }

    #[test]
    fn cancel_wakes_a_blocked_wait() {
        let source = CancelSource::new();
        let token = source.token();
        let waiter = std::thread::spawn(move || {
            crossbeam::select! {
                recv(token.receiver()) -> _ => true,
                default(Duration::from_secs(5)) => false,
            }
        });
        std::thread::sleep(Duration::from_millis(20));
        source.cancel();
        assert!(waiter.join().unwrap_or(false));
    }

    #[test]
    fn dropping_the_source_is_not_a_cancel() {
        let token = CancelSource::new().token();
        assert!(!token.is_cancelled());
        assert_eq!(
            token.receiver().recv_timeout(Duration::from_millis(20)),
            Err(RecvTimeoutError::Timeout)
        );
    }

    #[test]
    fn none_never_fires() {
        let token = CancelToken::none();
        assert!(!token.is_cancelled());
        assert_eq!(
            token.receiver().recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Timeout)
        );
    }
}
