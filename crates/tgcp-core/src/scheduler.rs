//! Repeating scans ("watch" mode).

use std::{sync::Arc, time::Duration};

use chrono::Local;
use humantime::format_duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{config::Config, monitor::Monitor};

pub struct Scheduler {
    monitor: Arc<Monitor>,
    lookback_hours: u32,
    interval: Duration,
    retry_delay: Duration,
    max_runs: usize,
}

impl Scheduler {
    pub fn new(monitor: Arc<Monitor>, cfg: &Config) -> Self {
        Self {
            monitor,
            lookback_hours: cfg.lookback_hours,
            interval: cfg.check_interval,
            retry_delay: cfg.retry_delay,
            max_runs: 0,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_lookback_hours(mut self, hours: u32) -> Self {
        self.lookback_hours = hours;
        self
    }

    /// Stop after `n` scans; 0 means run until cancelled.
    pub fn with_max_runs(mut self, n: usize) -> Self {
        self.max_runs = n;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Scan, sleep, repeat until `cancel` fires. Returns the number of scans run.
    ///
    /// A scan in progress is allowed to finish; cancellation is observed between scans.
    pub async fn run(&self, cancel: CancellationToken) -> usize {
        info!(
            "🕐 Starting chat monitoring: {} every {}",
            self.monitor.config().source_chat,
            format_duration(self.interval)
        );
        info!("⏹️  Press Ctrl+C to stop");

        let mut runs = 0usize;
        while !cancel.is_cancelled() {
            info!(
                "🕐 [{}] Running scheduled check...",
                Local::now().format("%Y-%m-%d %H:%M:%S")
            );

            let failed = match self.monitor.scan(self.lookback_hours).await {
                Ok(_) => false,
                Err(e) => {
                    error!("❌ Error in scheduler: {e}");
                    true
                }
            };

            runs += 1;
            if self.max_runs > 0 && runs >= self.max_runs {
                info!("reached {runs} scheduled runs, stopping");
                return runs;
            }

            let delay = if failed {
                warn!("💤 Sleeping for {} before retrying...", format_duration(self.retry_delay));
                self.retry_delay
            } else {
                info!("💤 Sleeping for {}...", format_duration(self.interval));
                self.interval
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        info!("🛑 Scheduler stopped by user");
        runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{message, FakeTelegram};
    use std::collections::HashMap;

    fn monitor(base: &std::path::Path, tg: Arc<FakeTelegram>) -> (Arc<Monitor>, Config) {
        let mut env = HashMap::new();
        env.insert("KEYWORDS", "lego".to_string());
        env.insert("SOURCE_CHAT", "market".to_string());
        env.insert("FORWARD_TO_USERNAME", "me".to_string());
        let cfg = Config::from_lookup(base, |k| env.get(k).cloned()).unwrap();
        let monitor = Monitor::new(Arc::new(cfg.clone()), tg.clone(), tg.clone(), tg);
        (Arc::new(monitor), cfg)
    }

    #[tokio::test]
    async fn max_runs_bounds_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let tg = Arc::new(FakeTelegram::with_market(vec![message(1, 1, "lego")]));
        let (monitor, cfg) = monitor(dir.path(), tg.clone());

        let runs = Scheduler::new(monitor, &cfg)
            .with_interval(Duration::from_millis(5))
            .with_max_runs(3)
            .run(CancellationToken::new())
            .await;

        assert_eq!(runs, 3);
        assert_eq!(tg.connects(), 3);
        // Forwarded once, skipped afterwards.
        assert_eq!(tg.forwarded_ids(), vec![1]);
    }

    #[tokio::test]
    async fn cancellation_stops_sleeping_loop() {
        let dir = tempfile::tempdir().unwrap();
        let tg = Arc::new(FakeTelegram::with_market(vec![]));
        let (monitor, cfg) = monitor(dir.path(), tg.clone());
        let cancel = CancellationToken::new();

        let scheduler = Scheduler::new(monitor, &cfg).with_interval(Duration::from_secs(3600));
        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(cancel).await })
        };

        while tg.disconnects() == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        cancel.cancel();

        let runs = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        assert_eq!(runs, 1);
    }

    #[tokio::test]
    async fn failed_scan_uses_retry_delay() {
        let dir = tempfile::tempdir().unwrap();
        let mut fake = FakeTelegram::with_market(vec![]);
        fake.fail_connect = true;
        let tg = Arc::new(fake);
        let (monitor, cfg) = monitor(dir.path(), tg.clone());

        let started = tokio::time::Instant::now();
        let runs = Scheduler::new(monitor, &cfg)
            .with_interval(Duration::from_secs(3600))
            .with_retry_delay(Duration::from_millis(5))
            .with_max_runs(2)
            .run(CancellationToken::new())
            .await;

        assert_eq!(runs, 2);
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn pre_cancelled_token_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let tg = Arc::new(FakeTelegram::with_market(vec![]));
        let (monitor, cfg) = monitor(dir.path(), tg.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(Scheduler::new(monitor, &cfg).run(cancel).await, 0);
        assert_eq!(tg.connects(), 0);
    }
}
