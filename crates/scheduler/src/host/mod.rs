//! The environment a [`Scheduler`](crate::Scheduler) runs in.
//!
//! A host supplies the monotonic clock the frame budget is measured
//! against, the frame-request primitive, and an executor for the
//! continuations of suspended tasks.

mod manual;
mod tokio_host;

use std::time::Duration;

use futures::future::LocalBoxFuture;

pub use manual::ManualHost;
pub use tokio_host::TokioHost;

pub trait Host {
    /// Monotonic time since an arbitrary origin.
    fn now(&self) -> Duration;

    /// Ask for [`Scheduler::run_frame`](crate::Scheduler::run_frame) to be
    /// called on the next frame. The scheduler never has more than one
    /// request outstanding.
    fn request_frame(&self);

    /// Run a continuation on the host's single-threaded executor.
    fn spawn_local(&self, fut: LocalBoxFuture<'static, ()>);

    /// Called when the scheduler runs out of work outside a frame, e.g. the
    /// last suspended task was rejected or the scheduler shut down.
    fn idle(&self) {}
}
