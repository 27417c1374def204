use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::driver::{Progress, Runnable};
use crate::error::TaskError;

/// Insertion sequence of a queued task. Breaks ties between equal
/// priorities in FIFO order; a task gets a fresh id every time it is requeued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TaskId(u64);

impl TaskId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out [`TaskId`]s starting at 1. After `u64::MAX` it wraps back to 1,
/// so 0 is never issued.
#[derive(Debug)]
pub(crate) struct SequenceCounter {
    next: u64,
}

impl SequenceCounter {
    pub(crate) fn new() -> Self {
        Self::starting_at(1)
    }

    pub(crate) fn starting_at(next: u64) -> Self {
        Self { next: next.max(1) }
    }

    pub(crate) fn next_id(&mut self) -> TaskId {
        let id = self.next;
        self.next = if id == u64::MAX { 1 } else { id + 1 };
        TaskId(id)
    }
}

/// One aging step: drop by one, replenish by the static weight once negative.
pub(crate) fn age(dynamic: i64, weight: i64) -> i64 {
    let aged = dynamic.saturating_sub(1);
    if aged < 0 { aged.saturating_add(weight) } else { aged }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running,
    Suspended,
    Resolved,
    Rejected,
    Canceled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Resolved | TaskState::Rejected | TaskState::Canceled)
    }
}

/// Owned copy of a task record, handed to observer callbacks.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: Option<String>,
    /// Caller-declared weight, used to replenish `dynamic_priority`.
    pub static_priority: i64,
    /// Current standing in the queue. Higher runs first.
    pub dynamic_priority: i64,
    /// Times the task has been taken off the queue.
    pub runs: u64,
    /// Computation steps completed.
    pub steps: u64,
    pub state: TaskState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    pub error: Option<String>,
}

impl TaskSnapshot {
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous")
    }
}

/// Cooperative cancellation flag. Clones share the flag, so one signal can
/// cancel any number of tasks.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    canceled: Rc<Cell<bool>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.set(true);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.get()
    }
}

pub type Observer = Rc<dyn Fn(&TaskSnapshot)>;

/// Submission options for [`Scheduler::submit`](crate::Scheduler::submit).
#[derive(Default)]
pub struct SubmitOptions {
    /// `None` starts the task at dynamic priority 0 with weight 1.
    pub priority: Option<i64>,
    pub name: Option<String>,
    pub cancel_signal: Option<CancelSignal>,
    /// Fired every time the task is put back on the queue.
    pub on_schedule: Option<Observer>,
    pub on_resolved: Option<Observer>,
    pub on_rejected: Option<Observer>,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn cancel_signal(mut self, signal: CancelSignal) -> Self {
        self.cancel_signal = Some(signal);
        self
    }

    pub fn on_schedule(mut self, f: impl Fn(&TaskSnapshot) + 'static) -> Self {
        self.on_schedule = Some(Rc::new(f));
        self
    }

    pub fn on_resolved(mut self, f: impl Fn(&TaskSnapshot) + 'static) -> Self {
        self.on_resolved = Some(Rc::new(f));
        self
    }

    pub fn on_rejected(mut self, f: impl Fn(&TaskSnapshot) + 'static) -> Self {
        self.on_rejected = Some(Rc::new(f));
        self
    }
}

impl fmt::Debug for SubmitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitOptions")
            .field("priority", &self.priority)
            .field("name", &self.name)
            .field("cancel_signal", &self.cancel_signal)
            .finish_non_exhaustive()
    }
}

/// A submitted unit of work. Lives in exactly one place: the queue, the
/// drain loop, or a pending continuation.
pub(crate) struct Task {
    pub(crate) info: TaskSnapshot,
    cancel: CancelSignal,
    linked_cancel: Option<CancelSignal>,
    on_schedule: Option<Observer>,
    on_resolved: Option<Observer>,
    on_rejected: Option<Observer>,
    runnable: Box<dyn Runnable>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        runnable: Box<dyn Runnable>,
        options: SubmitOptions,
        cancel: CancelSignal,
    ) -> Self {
        let static_priority = options.priority.map_or(1, |p| p.max(1));
        let dynamic_priority = options.priority.unwrap_or(0);
        Self {
            info: TaskSnapshot {
                id,
                name: options.name,
                static_priority,
                dynamic_priority,
                runs: 0,
                steps: 0,
                state: TaskState::Queued,
                started_at: Utc::now(),
                ended_at: None,
                duration: None,
                error: None,
            },
            cancel,
            linked_cancel: options.cancel_signal,
            on_schedule: options.on_schedule,
            on_resolved: options.on_resolved,
            on_rejected: options.on_rejected,
            runnable,
        }
    }

    /// Queue order: higher dynamic priority first, then lower id.
    pub(crate) fn runs_before(a: &Task, b: &Task) -> bool {
        a.info.dynamic_priority > b.info.dynamic_priority
            || (a.info.dynamic_priority == b.info.dynamic_priority && a.info.id < b.info.id)
    }

    pub(crate) fn id(&self) -> TaskId {
        self.info.id
    }

    pub(crate) fn label(&self) -> &str {
        self.info.label()
    }

    /// Taken off the queue: age the priority and count the run.
    pub(crate) fn begin_run(&mut self) {
        self.info.dynamic_priority = age(self.info.dynamic_priority, self.info.static_priority);
        self.info.runs += 1;
        self.info.state = TaskState::Running;
    }

    pub(crate) fn is_canceled(&self) -> bool {
        self.cancel.is_canceled() || self.linked_cancel.as_ref().is_some_and(|s| s.is_canceled())
    }

    pub(crate) fn advance(&mut self) -> Progress {
        let progress = self.runnable.advance();
        if !matches!(progress, Progress::Failed(_)) {
            self.info.steps += 1;
        }
        progress
    }

    pub(crate) fn poll_resume(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), TaskError>> {
        self.runnable.poll_resume(cx)
    }

    pub(crate) fn requeue(&mut self, id: TaskId) {
        self.info.id = id;
        self.info.state = TaskState::Queued;
    }

    pub(crate) fn suspend(&mut self) {
        self.info.state = TaskState::Suspended;
    }

    /// Record a successful settlement. The value was already delivered by the runnable.
    pub(crate) fn resolve(&mut self) {
        self.finish(TaskState::Resolved);
    }

    /// Settle the handle with `err` and record it.
    pub(crate) fn reject(&mut self, err: TaskError) {
        let state = if err.is_canceled() { TaskState::Canceled } else { TaskState::Rejected };
        self.info.error = Some(err.to_string());
        self.runnable.reject(err);
        self.finish(state);
    }

    fn finish(&mut self, state: TaskState) {
        let ended = Utc::now();
        self.info.state = state;
        self.info.ended_at = Some(ended);
        self.info.duration = Some(
            ended
                .signed_duration_since(self.info.started_at)
                .to_std()
                .unwrap_or_default(),
        );
    }

    pub(crate) fn on_schedule(&self) -> Option<Observer> {
        self.on_schedule.clone()
    }

    pub(crate) fn on_resolved(&self) -> Option<Observer> {
        self.on_resolved.clone()
    }

    pub(crate) fn on_rejected(&self) -> Option<Observer> {
        self.on_rejected.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_starts_at_one() {
        let mut ids = SequenceCounter::new();
        assert_eq!(ids.next_id().get(), 1);
        assert_eq!(ids.next_id().get(), 2);
    }

    #[test]
    fn sequence_wraps_to_one_never_zero() {
        let mut ids = SequenceCounter::starting_at(u64::MAX - 1);
        assert_eq!(ids.next_id().get(), u64::MAX - 1);
        assert_eq!(ids.next_id().get(), u64::MAX);
        assert_eq!(ids.next_id().get(), 1);

        let mut zero = SequenceCounter::starting_at(0);
        assert_eq!(zero.next_id().get(), 1);
    }

    #[test]
    fn aging_decrements_then_replenishes() {
        assert_eq!(age(5, 5), 4);
        assert_eq!(age(1, 3), 0);
        assert_eq!(age(0, 3), 2);
        assert_eq!(age(0, 1), 0);
    }

    #[test]
    fn aging_saturates_at_extremes() {
        assert_eq!(age(i64::MIN, 1), i64::MIN + 1);
        assert_eq!(age(i64::MAX, 1), i64::MAX - 1);
    }

    #[test]
    fn aging_cycles_through_weight() {
        // A task that keeps running walks down from its weight and wraps.
        let mut p = 3;
        let seen: Vec<i64> = (0..7)
            .map(|_| {
                p = age(p, 3);
                p
            })
            .collect();
        assert_eq!(seen, vec![2, 1, 0, 2, 1, 0, 2]);
    }

    #[test]
    fn cancel_signal_is_shared_by_clones() {
        let signal = CancelSignal::new();
        let other = signal.clone();
        assert!(!other.is_canceled());
        signal.cancel();
        assert!(other.is_canceled());
    }

    #[test]
    fn terminal_states() {
        assert!(TaskState::Resolved.is_terminal());
        assert!(TaskState::Canceled.is_terminal());
        assert!(!TaskState::Suspended.is_terminal());
        assert!(!TaskState::Queued.is_terminal());
    }
}
