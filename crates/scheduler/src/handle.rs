use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;

use crate::error::TaskError;
use crate::task::CancelSignal;

/// The caller's side of a submitted task.
///
/// Awaiting the handle yields the task's value or the error it was rejected
/// with. Dropping it does not cancel the task; call [`cancel`](Self::cancel).
pub struct Handle<T> {
    rx: oneshot::Receiver<Result<T, TaskError>>,
    cancel: CancelSignal,
    name: Option<String>,
}

impl<T> Handle<T> {
    pub(crate) fn new(
        rx: oneshot::Receiver<Result<T, TaskError>>,
        cancel: CancelSignal,
        name: Option<String>,
    ) -> Self {
        Self { rx, cancel, name }
    }

    /// A handle that is already settled with `err`.
    pub(crate) fn rejected(err: TaskError, name: Option<String>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self::new(rx, CancelSignal::new(), name)
    }

    /// Request cancellation. Takes effect the next time the scheduler is
    /// about to resume the task; a step already running is not interrupted.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    /// The task's own cancellation signal.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl<T> Future for Handle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // The task was dropped without settling: its scheduler is gone.
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(TaskError::Shutdown)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("name", &self.name)
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;

    use super::*;

    #[test]
    fn settles_with_sent_value() {
        let (tx, rx) = oneshot::channel();
        let mut handle = Handle::new(rx, CancelSignal::new(), Some("h".into()));
        assert!((&mut handle).now_or_never().is_none());

        tx.send(Ok(3)).unwrap();
        assert!(matches!(handle.now_or_never(), Some(Ok(3))));
    }

    #[test]
    fn dropped_sender_is_shutdown() {
        let (tx, rx) = oneshot::channel::<Result<(), TaskError>>();
        let handle = Handle::new(rx, CancelSignal::new(), None);
        drop(tx);
        assert!(matches!(handle.now_or_never(), Some(Err(TaskError::Shutdown))));
    }

    #[test]
    fn cancel_flags_shared_signal() {
        let handle = Handle::<()>::rejected(TaskError::Shutdown, None);
        let signal = handle.cancel_signal();
        handle.cancel();
        assert!(signal.is_canceled());
        assert!(handle.is_canceled());
    }
}
