//! Type-erased stepping of a [`Computation`] bound to its settle channel.

use std::panic::{self, AssertUnwindSafe};
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::Future;

use crate::error::TaskError;
use crate::step::{Computation, Step, Suspension};

/// What happened when a task was advanced.
#[derive(Debug)]
pub(crate) enum Progress {
    /// Finished. The value has been sent to the handle.
    Done,
    /// Paused synchronously; requeue.
    Paused,
    /// Waiting on a suspension; poll it with [`Runnable::poll_resume`].
    Suspended,
    /// Failed; the caller settles the handle with the error.
    Failed(TaskError),
}

pub(crate) trait Runnable {
    fn advance(&mut self) -> Progress;

    /// Poll the pending suspension. `Ok` means the resumed value is stored
    /// as the next step's input.
    fn poll_resume(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), TaskError>>;

    fn reject(&mut self, err: TaskError);
}

pub(crate) type Settle<T> = oneshot::Sender<Result<T, TaskError>>;

pub(crate) struct Driver<C: Computation> {
    computation: C,
    input: Option<C::Resume>,
    suspension: Option<Suspension<C::Resume>>,
    settle: Option<Settle<C::Output>>,
}

impl<C: Computation> Driver<C> {
    pub(crate) fn new(computation: C, settle: Settle<C::Output>) -> Self {
        Self {
            computation,
            input: None,
            suspension: None,
            settle: Some(settle),
        }
    }

    fn settle(&mut self, result: Result<C::Output, TaskError>) {
        // A dropped handle just discards the result.
        if let Some(tx) = self.settle.take() {
            let _ = tx.send(result);
        }
    }
}

impl<C: Computation> Runnable for Driver<C> {
    fn advance(&mut self) -> Progress {
        let input = self.input.take();
        let computation = &mut self.computation;
        match panic::catch_unwind(AssertUnwindSafe(|| computation.step(input))) {
            Ok(Ok(Step::Done(value))) => {
                self.settle(Ok(value));
                Progress::Done
            }
            Ok(Ok(Step::Pending(value))) => {
                self.input = Some(value);
                Progress::Paused
            }
            Ok(Ok(Step::Suspended(suspension))) => {
                self.suspension = Some(suspension);
                Progress::Suspended
            }
            Ok(Err(err)) => Progress::Failed(TaskError::failed(err)),
            Err(payload) => Progress::Failed(TaskError::from_panic(payload)),
        }
    }

    fn poll_resume(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), TaskError>> {
        let Some(suspension) = self.suspension.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let polled = panic::catch_unwind(AssertUnwindSafe(|| suspension.as_mut().poll(cx)));
        let result = match polled {
            Ok(Poll::Pending) => return Poll::Pending,
            Ok(Poll::Ready(Ok(value))) => {
                self.input = Some(value);
                Ok(())
            }
            Ok(Poll::Ready(Err(err))) => Err(TaskError::failed(err)),
            Err(payload) => Err(TaskError::from_panic(payload)),
        };
        self.suspension = None;
        Poll::Ready(result)
    }

    fn reject(&mut self, err: TaskError) {
        self.settle(Err(err));
    }
}
