use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use futures::executor::{LocalPool, LocalSpawner};
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use tracing::error;

use super::Host;
use crate::runner::Scheduler;

/// Deterministic host for tests and simulations.
///
/// Time only moves when [`advance`](Self::advance) is called, frames run
/// only when the caller runs them, and continuations run on a local pool
/// when [`run_until_stalled`](Self::run_until_stalled) is called.
pub struct ManualHost {
    clock: Cell<Duration>,
    frame_requested: Cell<bool>,
    frame_requests: Cell<usize>,
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
}

impl ManualHost {
    pub fn new() -> Rc<Self> {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Rc::new(Self {
            clock: Cell::new(Duration::ZERO),
            frame_requested: Cell::new(false),
            frame_requests: Cell::new(0),
            pool: RefCell::new(pool),
            spawner,
        })
    }

    pub fn advance(&self, by: Duration) {
        self.clock.set(self.clock.get() + by);
    }

    /// Total frame requests received.
    pub fn frame_requests(&self) -> usize {
        self.frame_requests.get()
    }

    /// Whether a frame was requested since the last call; clears the request.
    pub fn take_frame_request(&self) -> bool {
        self.frame_requested.replace(false)
    }

    /// Run spawned continuations until none can make progress.
    ///
    /// Must not be called from inside a task step.
    pub fn run_until_stalled(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }

    /// Alternate continuations and requested frames until nothing is
    /// requested or `max_frames` frames have run. Returns frames run.
    pub fn run_until_idle(&self, scheduler: &Scheduler, max_frames: usize) -> usize {
        let mut frames = 0;
        loop {
            self.run_until_stalled();
            if frames >= max_frames || !self.take_frame_request() {
                return frames;
            }
            scheduler.run_frame();
            frames += 1;
        }
    }
}

impl Host for ManualHost {
    fn now(&self) -> Duration {
        self.clock.get()
    }

    fn request_frame(&self) {
        self.frame_requested.set(true);
        self.frame_requests.set(self.frame_requests.get() + 1);
    }

    fn spawn_local(&self, fut: LocalBoxFuture<'static, ()>) {
        if let Err(e) = self.spawner.spawn_local(fut) {
            error!(error = %e, "failed to spawn continuation");
        }
    }
}
