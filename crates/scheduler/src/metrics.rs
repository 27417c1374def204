use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

/// Frame counters and settlement statistics for one scheduler.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Drain passes run.
    pub frames: u64,
    /// Frames that stopped with work still queued because the budget ran out.
    pub budget_exhausted_frames: u64,
    pub tasks_submitted: u64,
    pub tasks_resolved: u64,
    pub tasks_rejected: u64,
    pub tasks_canceled: u64,
    /// Computation steps advanced across all tasks.
    pub steps: u64,
    /// Times a task parked on an asynchronous value.
    pub suspensions: u64,
    pub last_frame_duration: Duration,
    /// Settled tasks by name.
    pub tasks_settled: HashMap<String, u64>,
    /// Average submission-to-settlement time by task name.
    pub avg_task_duration: HashMap<String, Duration>,
    pub frame_rate: FrameRate,
}

impl SchedulerMetrics {
    /// Count a settled task under `task_name` and fold `duration` into that
    /// name's running mean.
    pub fn record_settled(&mut self, task_name: &str, duration: Duration) {
        let settled = self.tasks_settled.entry(task_name.to_string()).or_default();
        *settled += 1;
        let n = u32::try_from(*settled).unwrap_or(u32::MAX);

        let mean = self
            .avg_task_duration
            .entry(task_name.to_string())
            .or_insert(duration);
        if n > 1 {
            *mean = if duration >= *mean {
                *mean + (duration - *mean) / n
            } else {
                *mean - (*mean - duration) / n
            };
        }
    }

    /// Record the end of a frame at host time `now`.
    pub fn record_frame(&mut self, elapsed: Duration, budget_exhausted: bool, now: Duration) {
        self.frames += 1;
        self.last_frame_duration = elapsed;
        if budget_exhausted {
            self.budget_exhausted_frames += 1;
        }
        self.frame_rate.tick(now);
    }
}

/// Smoothed frames-per-second over windows of at least one second.
///
/// Each closed window blends in as `rate / 3 + observed * 2 / 3`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameRate {
    pub frames_per_second: f64,
    #[serde(skip)]
    window_start: Option<Duration>,
    #[serde(skip)]
    window_frames: u64,
}

impl FrameRate {
    const WINDOW: Duration = Duration::from_secs(1);

    pub fn tick(&mut self, now: Duration) {
        let start = *self.window_start.get_or_insert(now);
        self.window_frames += 1;

        let delta = now.saturating_sub(start);
        if delta >= Self::WINDOW {
            let observed = self.window_frames as f64 / delta.as_secs_f64();
            self.frames_per_second = self.frames_per_second / 3.0 + observed / 3.0 * 2.0;
            self.window_frames = 0;
            self.window_start = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_single_settlement() {
        let mut m = SchedulerMetrics::default();
        m.record_settled("fib", Duration::from_millis(100));

        assert_eq!(m.tasks_settled["fib"], 1);
        assert_eq!(m.avg_task_duration["fib"], Duration::from_millis(100));
    }

    #[test]
    fn running_mean_tracks_rising_and_falling_durations() {
        let mut m = SchedulerMetrics::default();
        for ms in [100, 200, 300] {
            m.record_settled("task", Duration::from_millis(ms));
        }
        assert_eq!(m.tasks_settled["task"], 3);
        assert_eq!(m.avg_task_duration["task"], Duration::from_millis(200));

        m.record_settled("other", Duration::from_millis(300));
        m.record_settled("other", Duration::from_millis(100));
        assert_eq!(m.avg_task_duration["other"], Duration::from_millis(200));
        assert_eq!(m.tasks_settled.len(), 2);
    }

    #[test]
    fn record_frame_counts_exhaustion() {
        let mut m = SchedulerMetrics::default();
        m.record_frame(Duration::from_millis(3), false, Duration::ZERO);
        m.record_frame(Duration::from_millis(14), true, Duration::from_millis(16));

        assert_eq!(m.frames, 2);
        assert_eq!(m.budget_exhausted_frames, 1);
        assert_eq!(m.last_frame_duration, Duration::from_millis(14));
    }

    #[test]
    fn frame_rate_converges_toward_steady_rate() {
        let mut rate = FrameRate::default();
        let frame = Duration::from_micros(16_667);
        let mut now = Duration::ZERO;
        for _ in 0..600 {
            rate.tick(now);
            now += frame;
        }
        // 60 frames per second once a few windows have blended in.
        assert!(
            (55.0..=65.0).contains(&rate.frames_per_second),
            "got {}",
            rate.frames_per_second
        );
    }

    #[test]
    fn frame_rate_waits_for_full_window() {
        let mut rate = FrameRate::default();
        rate.tick(Duration::ZERO);
        rate.tick(Duration::from_millis(500));
        assert_eq!(rate.frames_per_second, 0.0);
    }
}
