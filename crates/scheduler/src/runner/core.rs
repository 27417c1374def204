use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use framesched_core::{PriorityHeap, SchedulerConfig};
use futures::channel::oneshot;
use tracing::{info, trace, warn};

use crate::driver::Driver;
use crate::error::TaskError;
use crate::handle::Handle;
use crate::host::Host;
use crate::metrics::SchedulerMetrics;
use crate::step::{call, Computation};
use crate::task::{CancelSignal, SequenceCounter, SubmitOptions, Task};

pub(super) type TaskHeap = PriorityHeap<Task, fn(&Task, &Task) -> bool>;

/// Mutable scheduler state. Only touched from submission and the drain loop.
pub(super) struct State {
    pub(super) heap: TaskHeap,
    pub(super) ids: SequenceCounter,
    /// A frame has been requested from the host or is running.
    pub(super) frame_pending: bool,
    pub(super) draining: bool,
    /// Tasks parked on an asynchronous continuation.
    pub(super) suspended: usize,
    pub(super) shut_down: bool,
    pub(super) metrics: SchedulerMetrics,
}

pub(super) struct Shared {
    pub(super) config: SchedulerConfig,
    pub(super) host: Rc<dyn Host>,
    pub(super) state: RefCell<State>,
}

/// Cooperative, single-threaded task scheduler.
///
/// Submitted work is kept in a priority queue and advanced in frames: each
/// [`run_frame`](Self::run_frame) pops tasks in priority order until the
/// queue is empty or the frame budget is spent. Every run ages the task's
/// priority so lower-weight work still gets turns.
///
/// Clones share the same queue.
#[derive(Clone)]
pub struct Scheduler {
    pub(super) shared: Rc<Shared>,
}

impl Scheduler {
    /// Create a scheduler that measures time and requests frames through `host`.
    pub fn new(config: SchedulerConfig, host: Rc<dyn Host>) -> Self {
        Self::with_sequence(config, host, SequenceCounter::new())
    }

    pub(crate) fn with_sequence(
        config: SchedulerConfig,
        host: Rc<dyn Host>,
        ids: SequenceCounter,
    ) -> Self {
        let heap: TaskHeap = PriorityHeap::empty(Task::runs_before as fn(&Task, &Task) -> bool);
        Self {
            shared: Rc::new(Shared {
                config,
                host,
                state: RefCell::new(State {
                    heap,
                    ids,
                    frame_pending: false,
                    draining: false,
                    suspended: 0,
                    shut_down: false,
                    metrics: SchedulerMetrics::default(),
                }),
            }),
        }
    }

    /// Queue a computation. A frame is requested if none is pending.
    pub fn submit<C: Computation>(&self, computation: C, options: SubmitOptions) -> Handle<C::Output> {
        let mut state = self.shared.state.borrow_mut();
        if state.shut_down {
            warn!(
                name = options.name.as_deref().unwrap_or("anonymous"),
                "Rejecting submission after shutdown"
            );
            return Handle::rejected(TaskError::Shutdown, options.name);
        }

        let (tx, rx) = oneshot::channel();
        let cancel = CancelSignal::new();
        let handle = Handle::new(rx, cancel.clone(), options.name.clone());

        let id = state.ids.next_id();
        let task = Task::new(id, Box::new(Driver::new(computation, tx)), options, cancel);
        trace!(
            task = %id,
            name = task.label(),
            priority = task.info.dynamic_priority,
            "Task submitted"
        );
        state.metrics.tasks_submitted += 1;
        state.heap.push(task);
        drop(state);

        self.ensure_frame();
        handle
    }

    /// Queue a plain callback; it runs to completion the first time it is popped.
    pub fn submit_fn<T, F>(&self, f: F, options: SubmitOptions) -> Handle<T>
    where
        F: FnOnce() -> anyhow::Result<T> + 'static,
        T: 'static,
    {
        self.submit(call(f), options)
    }

    /// Reject every queued task with [`TaskError::Shutdown`] and refuse new
    /// submissions. Suspended tasks are rejected when their continuation completes.
    pub fn shutdown(&self) {
        let queued = {
            let mut state = self.shared.state.borrow_mut();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            state.heap.drain()
        };

        info!(queued = queued.len(), "Scheduler shutdown requested");
        for task in queued {
            self.reject(task, TaskError::Shutdown);
        }
        self.shared.host.idle();
    }

    /// Request a frame if work is queued and no frame is pending.
    pub(super) fn ensure_frame(&self) {
        let request = {
            let mut state = self.shared.state.borrow_mut();
            if state.frame_pending || state.shut_down || state.heap.is_empty() {
                false
            } else {
                state.frame_pending = true;
                true
            }
        };
        if request {
            trace!("Requesting frame");
            self.shared.host.request_frame();
        }
    }

    /// Tasks waiting in the queue.
    pub fn len(&self) -> usize {
        self.shared.state.borrow().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tasks parked on an asynchronous continuation.
    pub fn suspended(&self) -> usize {
        self.shared.state.borrow().suspended
    }

    /// Nothing queued and nothing suspended.
    pub fn is_idle(&self) -> bool {
        let state = self.shared.state.borrow();
        state.heap.is_empty() && state.suspended == 0
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.state.borrow().shut_down
    }

    pub fn frame_pending(&self) -> bool {
        self.shared.state.borrow().frame_pending
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.shared.state.borrow().metrics.clone()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("Scheduler")
            .field("queued", &state.heap.len())
            .field("suspended", &state.suspended)
            .field("frame_pending", &state.frame_pending)
            .field("shut_down", &state.shut_down)
            .finish()
    }
}
