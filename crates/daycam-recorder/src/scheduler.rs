//! Daily scheduling loop.
//!
//! Polls the clock, starts a recording run whenever the current time falls
//! inside the window, and otherwise waits one poll interval. Any number of
//! days can pass under one scheduler.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use daycam_models::RecordingWindow;

use crate::clock::Clock;
use crate::cycle::{RecordingRun, RunSummary};
use crate::error::RecorderError;

/// What a single scheduler tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// Outside the window, nothing started
    Idle,
    /// A run completed
    Ran(RunSummary),
    /// A run could not start or was cut short by a device failure
    Aborted(RecorderError),
}

impl TickOutcome {
    /// Whether the scheduler should wait a poll interval before the next tick.
    pub fn should_wait(&self) -> bool {
        match self {
            TickOutcome::Idle | TickOutcome::Aborted(_) => true,
            TickOutcome::Ran(summary) => summary.is_empty(),
        }
    }
}

pub struct DailyScheduler<R: RecordingRun> {
    runner: R,
    window: RecordingWindow,
    poll_interval: Duration,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<bool>,
}

impl<R: RecordingRun> DailyScheduler<R> {
    pub fn new(
        runner: R,
        window: RecordingWindow,
        poll_interval: Duration,
        clock: Arc<dyn Clock>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            runner,
            window,
            poll_interval,
            clock,
            shutdown,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Evaluate the window once and run if it is open.
    pub async fn tick(&mut self) -> TickOutcome {
        let now = self.clock.now();
        if !self.window.contains(now) {
            info!(
                now = %now.format("%Y-%m-%d %H:%M:%S"),
                window = %self.window,
                "Outside recording window, waiting"
            );
            return TickOutcome::Idle;
        }

        match self.runner.run(&self.window).await {
            Ok(summary) => TickOutcome::Ran(summary),
            Err(e) => {
                error!(stage = e.stage(), "Recording run failed: {}", e);
                TickOutcome::Aborted(e)
            }
        }
    }

    /// One tick followed by the poll wait when nothing was recorded.
    pub async fn poll_once(&mut self) -> TickOutcome {
        let outcome = self.tick().await;
        if outcome.should_wait() {
            self.wait(self.poll_interval).await;
        }
        outcome
    }

    /// Tick until shutdown is requested.
    pub async fn run_forever(mut self) {
        info!(
            window = %self.window,
            poll_secs = self.poll_interval.as_secs(),
            "Scheduler started"
        );
        while !self.shutdown_requested() {
            self.poll_once().await;
        }
        info!("Scheduler stopped");
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep, returning early on shutdown.
    async fn wait(&mut self, duration: Duration) {
        if self.shutdown_requested() {
            return;
        }
        let clock = self.clock.clone();
        tokio::select! {
            _ = clock.sleep(duration) => {}
            changed = self.shutdown.changed() => {
                // Sender gone: nobody can request shutdown, finish the sleep
                if changed.is_err() {
                    clock.sleep(duration).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::RecorderResult;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};
    use daycam_media::MediaError;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[derive(Default)]
    struct CountingRun {
        runs: usize,
        fail: bool,
    }

    #[async_trait]
    impl RecordingRun for CountingRun {
        async fn run(&mut self, _window: &RecordingWindow) -> RecorderResult<RunSummary> {
            self.runs += 1;
            if self.fail {
                return Err(RecorderError::ModelLoad(MediaError::model_load(
                    "yolov3.weights",
                    "missing",
                )));
            }
            Ok(RunSummary::default())
        }
    }

    fn scheduler(
        run: CountingRun,
        now: NaiveDateTime,
    ) -> (
        DailyScheduler<CountingRun>,
        Arc<ManualClock>,
        watch::Sender<bool>,
    ) {
        let clock = Arc::new(ManualClock::new(now));
        let (tx, rx) = watch::channel(false);
        let scheduler = DailyScheduler::new(
            run,
            RecordingWindow::default(),
            Duration::from_secs(60),
            clock.clone(),
            rx,
        );
        (scheduler, clock, tx)
    }

    #[tokio::test]
    async fn test_idle_outside_window() {
        let (mut scheduler, clock, _tx) = scheduler(CountingRun::default(), at(4, 0));

        let outcome = scheduler.poll_once().await;

        assert!(matches!(outcome, TickOutcome::Idle));
        assert_eq!(scheduler.runner().runs, 0);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(60)]);
        assert_eq!(clock.now(), at(4, 1));
    }

    #[tokio::test]
    async fn test_evening_is_outside_window() {
        let (mut scheduler, _clock, _tx) = scheduler(CountingRun::default(), at(17, 41));
        assert!(matches!(scheduler.tick().await, TickOutcome::Idle));
        assert_eq!(scheduler.runner().runs, 0);
    }

    #[tokio::test]
    async fn test_runs_inside_window() {
        let (mut scheduler, _clock, _tx) = scheduler(CountingRun::default(), at(5, 20));
        assert!(matches!(scheduler.tick().await, TickOutcome::Ran(_)));
        assert_eq!(scheduler.runner().runs, 1);
    }

    #[tokio::test]
    async fn test_failed_run_waits_before_retry() {
        let run = CountingRun {
            fail: true,
            ..Default::default()
        };
        let (mut scheduler, clock, _tx) = scheduler(run, at(12, 0));

        let outcome = scheduler.poll_once().await;

        match outcome {
            TickOutcome::Aborted(e) => assert_eq!(e.stage(), "model_load"),
            other => panic!("expected abort, got {other:?}"),
        }
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(60)]);
    }

    #[tokio::test]
    async fn test_waits_through_the_night_until_window_opens() {
        let (mut scheduler, _clock, _tx) = scheduler(CountingRun::default(), at(5, 10));

        let mut idle_ticks = 0;
        while scheduler.runner().runs == 0 {
            if let TickOutcome::Idle = scheduler.poll_once().await {
                idle_ticks += 1;
            }
        }

        // 05:10 through 05:19 are idle, 05:20 runs
        assert_eq!(idle_ticks, 10);
    }

    #[tokio::test]
    async fn test_run_forever_exits_on_shutdown() {
        let (scheduler, clock, tx) = scheduler(CountingRun::default(), at(3, 0));
        tx.send(true).unwrap();

        scheduler.run_forever().await;

        assert!(clock.sleeps().is_empty());
    }
}
