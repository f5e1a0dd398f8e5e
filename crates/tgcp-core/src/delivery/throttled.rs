use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatInfo, ChatMessage, Recipient},
    ports::DeliveryPort,
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* delivery calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between calls to the same recipient.
    pub per_recipient_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40),
            per_recipient_min_interval: Duration::from_millis(1050),
        }
    }
}

impl ThrottleConfig {
    pub fn per_recipient(interval: Duration) -> Self {
        Self {
            per_recipient_min_interval: interval,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// DeliveryPort decorator that rate-limits outbound calls.
///
/// A burst of matches (header + forward each) would otherwise trip Telegram flood
/// limits; resolving targets is not throttled.
pub struct ThrottledDelivery {
    inner: Arc<dyn DeliveryPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_recipient: Mutex<HashMap<String, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledDelivery {
    pub fn new(inner: Arc<dyn DeliveryPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_recipient: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for(&self, handle: &str) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_recipient.lock().await;
        map.entry(handle.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_recipient_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle(&self, to: &Recipient) {
        let global_wait = { self.global.lock().await.reserve() };
        let recipient_wait = {
            let lim = self.limiter_for(&to.handle).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(recipient_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait]
impl DeliveryPort for ThrottledDelivery {
    async fn resolve_target(&self, handle: &str) -> Result<Option<Recipient>> {
        self.inner.resolve_target(handle).await
    }

    async fn send_text(&self, to: &Recipient, text: &str) -> Result<()> {
        self.throttle(to).await;
        self.inner.send_text(to, text).await
    }

    async fn forward(
        &self,
        to: &Recipient,
        source: &ChatInfo,
        message: &ChatMessage,
    ) -> Result<()> {
        self.throttle(to).await;
        self.inner.forward(to, source, message).await
    }
}
