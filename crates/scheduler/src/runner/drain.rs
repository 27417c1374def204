use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{ready, Context, Poll};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::driver::Progress;
use crate::error::TaskError;
use crate::task::{Observer, Task, TaskSnapshot};

use super::core::Shared;
use super::Scheduler;

/// What one drain pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrameReport {
    /// Tasks popped off the queue.
    pub tasks_run: usize,
    pub resolved: usize,
    pub rejected: usize,
    pub canceled: usize,
    /// Tasks that paused and went back on the queue.
    pub paused: usize,
    /// Tasks that parked on an asynchronous value.
    pub suspended: usize,
    /// The loop stopped with work still queued.
    pub budget_exhausted: bool,
    pub elapsed: Duration,
}

impl Scheduler {
    /// Drain the queue for one host frame.
    ///
    /// Pops tasks in priority order while the queue is non-empty and less
    /// than the frame budget has elapsed. Each popped task is aged, then
    /// dropped if canceled or advanced by one step. A new frame is requested
    /// at the end if work remains. Nested calls (from inside a task or
    /// callback) return an empty report.
    pub fn run_frame(&self) -> FrameReport {
        let mut report = FrameReport::default();
        {
            let mut state = self.shared.state.borrow_mut();
            if state.draining {
                debug!("Frame already in progress, ignoring nested run_frame");
                return report;
            }
            state.draining = true;
            state.frame_pending = true;
        }

        let guard = FrameGuard {
            shared: &self.shared,
        };
        let host = Rc::clone(&self.shared.host);
        let budget = self.shared.config.frame_budget();
        let frame_start = host.now();

        loop {
            let next = {
                let mut state = self.shared.state.borrow_mut();
                if state.shut_down || state.heap.is_empty() {
                    None
                } else if host.now().saturating_sub(frame_start) >= budget {
                    report.budget_exhausted = true;
                    None
                } else {
                    state.heap.pop()
                }
            };
            let Some(mut task) = next else {
                break;
            };

            task.begin_run();
            report.tasks_run += 1;

            if task.is_canceled() {
                report.canceled += 1;
                self.reject(task, TaskError::Canceled);
                continue;
            }

            let progress = task.advance();
            trace!(
                task = %task.id(),
                name = task.label(),
                runs = task.info.runs,
                priority = task.info.dynamic_priority,
                ?progress,
                "Task advanced"
            );
            self.settle_progress(task, progress, &mut report);
        }

        report.elapsed = host.now().saturating_sub(frame_start);
        drop(guard);
        {
            let mut state = self.shared.state.borrow_mut();
            state
                .metrics
                .record_frame(report.elapsed, report.budget_exhausted, host.now());
        }
        debug!(
            tasks_run = report.tasks_run,
            resolved = report.resolved,
            rejected = report.rejected,
            canceled = report.canceled,
            paused = report.paused,
            suspended = report.suspended,
            budget_exhausted = report.budget_exhausted,
            elapsed = ?report.elapsed,
            "Frame complete"
        );

        self.ensure_frame();
        report
    }

    fn settle_progress(&self, task: Task, progress: Progress, report: &mut FrameReport) {
        if !matches!(progress, Progress::Failed(_)) {
            self.shared.state.borrow_mut().metrics.steps += 1;
        }
        match progress {
            Progress::Done => {
                report.resolved += 1;
                self.resolve(task);
            }
            Progress::Paused => {
                if self.requeue(task) {
                    report.paused += 1;
                } else {
                    report.rejected += 1;
                }
            }
            Progress::Suspended => {
                report.suspended += 1;
                self.park(task);
            }
            Progress::Failed(err) => {
                report.rejected += 1;
                self.reject(task, err);
            }
        }
    }

    fn resolve(&self, mut task: Task) {
        task.resolve();
        {
            let mut state = self.shared.state.borrow_mut();
            state.metrics.tasks_resolved += 1;
            state
                .metrics
                .record_settled(task.label(), task.info.duration.unwrap_or_default());
        }
        trace!(task = %task.id(), name = task.label(), runs = task.info.runs, "Task resolved");

        notify(task.on_resolved(), &task.info, "on_resolved");
    }

    /// Put a task back on the queue under a fresh id. Returns `false` if the
    /// scheduler shut down in the meantime and the task was rejected instead.
    fn requeue(&self, mut task: Task) -> bool {
        if self.shared.state.borrow().shut_down {
            self.reject(task, TaskError::Shutdown);
            return false;
        }
        let scheduled = {
            let mut state = self.shared.state.borrow_mut();
            let id = state.ids.next_id();
            task.requeue(id);
            let scheduled = task.on_schedule().map(|cb| (cb, task.info.clone()));
            state.heap.push(task);
            scheduled
        };

        if let Some((on_schedule, snapshot)) = scheduled {
            notify(Some(on_schedule), &snapshot, "on_schedule");
        }
        self.ensure_frame();
        true
    }

    /// Hand a suspended task to the host until its awaited value is ready.
    fn park(&self, mut task: Task) {
        task.suspend();
        {
            let mut state = self.shared.state.borrow_mut();
            state.suspended += 1;
            state.metrics.suspensions += 1;
        }
        trace!(task = %task.id(), name = task.label(), "Task suspended");

        let continuation = Continuation {
            task: Some(task),
            scheduler: Rc::downgrade(&self.shared),
        };
        self.shared.host.spawn_local(Box::pin(continuation));
    }

    /// Called by a continuation once the awaited value settled.
    fn resume(&self, task: Task, outcome: Result<(), TaskError>) {
        let shut_down = {
            let mut state = self.shared.state.borrow_mut();
            state.suspended = state.suspended.saturating_sub(1);
            state.shut_down
        };

        match outcome {
            Ok(()) if shut_down => self.reject(task, TaskError::Shutdown),
            Ok(()) => {
                trace!(task = %task.id(), name = task.label(), "Task resumed");
                self.requeue(task);
            }
            Err(err) => self.reject(task, err),
        }

        if self.is_idle() {
            self.shared.host.idle();
        }
    }

    pub(super) fn reject(&self, mut task: Task, err: TaskError) {
        match &err {
            TaskError::Canceled | TaskError::Shutdown => {
                debug!(task = %task.id(), name = task.label(), reason = %err, "Task dropped")
            }
            _ => warn!(task = %task.id(), name = task.label(), error = %err, "Task rejected"),
        }

        let canceled = err.is_canceled();
        task.reject(err);
        {
            let mut state = self.shared.state.borrow_mut();
            if canceled {
                state.metrics.tasks_canceled += 1;
            } else {
                state.metrics.tasks_rejected += 1;
            }
            state
                .metrics
                .record_settled(task.label(), task.info.duration.unwrap_or_default());
        }

        notify(task.on_rejected(), &task.info, "on_rejected");
    }
}

/// Run an observer callback. A panicking observer is logged and otherwise
/// ignored; the task has already settled by the time observers run.
fn notify(observer: Option<Observer>, snapshot: &TaskSnapshot, event: &'static str) {
    let Some(observer) = observer else {
        return;
    };
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| observer(snapshot))) {
        let err = TaskError::from_panic(payload);
        warn!(
            task = %snapshot.id,
            name = snapshot.label(),
            event,
            error = %err,
            "Observer panicked"
        );
    }
}

/// Clears the in-frame flags when a drain pass ends, including by unwinding.
struct FrameGuard<'a> {
    shared: &'a Shared,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.state.try_borrow_mut() {
            state.draining = false;
            state.frame_pending = false;
        }
    }
}

/// Owns a suspended task until its awaited value resolves, then feeds it
/// back to the scheduler. Runs on the host executor, outside any frame.
struct Continuation {
    task: Option<Task>,
    scheduler: Weak<Shared>,
}

impl Future for Continuation {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let outcome = match this.task.as_mut() {
            Some(task) => ready!(task.poll_resume(cx)),
            None => return Poll::Ready(()),
        };
        if let Some(task) = this.task.take() {
            this.hand_back(task, outcome);
        }
        Poll::Ready(())
    }
}

impl Continuation {
    fn hand_back(&self, mut task: Task, outcome: Result<(), TaskError>) {
        match self.scheduler.upgrade() {
            Some(shared) => Scheduler { shared }.resume(task, outcome),
            None => task.reject(TaskError::Shutdown),
        }
    }
}

impl Drop for Continuation {
    fn drop(&mut self) {
        // The executor discarded us before the value arrived.
        if let Some(task) = self.task.take() {
            self.hand_back(task, Err(TaskError::Shutdown));
        }
    }
}
