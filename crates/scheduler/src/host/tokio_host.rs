use std::rc::Rc;
use std::time::Duration;

use futures::future::LocalBoxFuture;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::Host;
use crate::runner::Scheduler;

/// Host backed by a tokio `LocalSet`.
///
/// Continuations go through `tokio::task::spawn_local`, so both the
/// scheduler and [`drive`](Self::drive) must run inside a `LocalSet`.
pub struct TokioHost {
    origin: Instant,
    frame: Notify,
}

impl TokioHost {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            origin: Instant::now(),
            frame: Notify::new(),
        })
    }

    /// Run frames on the configured frame interval until the scheduler is
    /// idle (nothing queued or suspended), shut down, or the configured frame
    /// limit is reached. Returns the number of frames run.
    pub async fn drive(&self, scheduler: &Scheduler) -> u64 {
        let config = scheduler.config();
        let mut ticker = tokio::time::interval(config.frame_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let limit = config.frame_limit();

        let mut frames = 0u64;
        loop {
            if scheduler.is_shut_down() || scheduler.is_idle() {
                break;
            }
            if limit.is_some_and(|max| frames >= max) {
                debug!(frames, "frame limit reached");
                break;
            }
            if scheduler.is_empty() {
                // Only suspended work is left. Its continuation either requests
                // a frame or reports the scheduler idle.
                self.frame.notified().await;
                continue;
            }
            ticker.tick().await;
            scheduler.run_frame();
            frames += 1;
        }

        info!(frames, "Frame driver stopped");
        frames
    }
}

impl Host for TokioHost {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn request_frame(&self) {
        self.frame.notify_one();
    }

    fn spawn_local(&self, fut: LocalBoxFuture<'static, ()>) {
        tokio::task::spawn_local(fut);
    }

    fn idle(&self) {
        self.frame.notify_one();
    }
}
