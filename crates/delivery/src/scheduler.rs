//! Retry scheduler: periodic re-broadcast and expiry of pending deliveries.
//!
//! On every tick each entry is judged on its age since creation:
//! - older than the expiry ceiling → removed, no further broadcast
//! - older than `attempts * interval` → `attempts += 1` and re-broadcast
//! - otherwise left alone
//!
//! Because the retry-due rule measures from creation rather than from the last
//! attempt, a due entry is re-broadcast once per tick until it is acknowledged
//! or expires.
//!
//! A panic while retrying one entry is caught and logged; the rest of the tick
//! still runs and the entry stays pending for the next one.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tokio::time::Instant;

use linkcast_common::config::DeliveryConfig;
use linkcast_common::types::DeliveryId;

use crate::pending::{PendingDelivery, PendingTable};
use crate::registry::ConnectionRegistry;
use crate::service::broadcast_delivery;

/// What a tick does with one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Expire,
    Retry,
    Wait,
}

/// Outcome of a single tick, for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub retried: Vec<DeliveryId>,
    pub expired: Vec<DeliveryId>,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryScheduler {
    interval: Duration,
    expiry: Duration,
}

impl RetryScheduler {
    pub fn new(interval: Duration, expiry: Duration) -> Self {
        Self { interval, expiry }
    }

    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self::new(config.retry_interval(), config.expiry())
    }

    /// Tick period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn decide(&self, delivery: &PendingDelivery, now: Instant) -> RetryDecision {
        let age = delivery.age(now);
        if age > self.expiry {
            return RetryDecision::Expire;
        }

        let due_after = self
            .interval
            .checked_mul(delivery.attempts)
            .unwrap_or(Duration::MAX);
        if age > due_after {
            RetryDecision::Retry
        } else {
            RetryDecision::Wait
        }
    }

    pub fn is_expired(&self, delivery: &PendingDelivery, now: Instant) -> bool {
        delivery.age(now) > self.expiry
    }

    /// Remove expired entries without retrying anything.
    pub fn expire(&self, table: &mut PendingTable, now: Instant) -> Vec<DeliveryId> {
        let expired = table.remove_where(|delivery| self.is_expired(delivery, now));
        for delivery_id in &expired {
            tracing::info!(delivery_id = %delivery_id, "Removing expired delivery");
        }
        expired
    }

    /// Run one scheduler pass over the whole table.
    pub fn tick(
        &self,
        table: &mut PendingTable,
        registry: &ConnectionRegistry,
        now: Instant,
    ) -> TickReport {
        self.tick_with(table, now, |delivery| {
            broadcast_delivery(registry, delivery);
        })
    }

    /// Like [`tick`](Self::tick), handing each due entry to `retry` instead of
    /// broadcasting it.
    pub fn tick_with(
        &self,
        table: &mut PendingTable,
        now: Instant,
        mut retry: impl FnMut(&PendingDelivery),
    ) -> TickReport {
        let expired = self.expire(table, now);

        let mut retried = Vec::new();
        for delivery in table.iter_mut() {
            if self.decide(delivery, now) != RetryDecision::Retry {
                continue;
            }

            delivery.attempts += 1;
            tracing::info!(
                delivery_id = %delivery.delivery_id,
                attempt = delivery.attempts,
                "Retrying delivery"
            );
            let entry = &*delivery;
            match panic::catch_unwind(AssertUnwindSafe(|| retry(entry))) {
                Ok(()) => retried.push(entry.delivery_id.clone()),
                Err(payload) => tracing::error!(
                    delivery_id = %entry.delivery_id,
                    panic = panic_message(payload.as_ref()),
                    "Retry failed, continuing tick"
                ),
            }
        }

        if !expired.is_empty() || !retried.is_empty() {
            tracing::debug!(
                retried = retried.len(),
                expired = expired.len(),
                pending = table.len(),
                "Retry tick complete"
            );
        }

        TickReport { retried, expired }
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

impl Default for RetryScheduler {
    fn default() -> Self {
        Self::from_config(&DeliveryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    use crate::registry::ConnectionId;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn delivery(id: &str, created_at: Instant) -> PendingDelivery {
        PendingDelivery::new(
            id.into(),
            format!("http://x/{id}"),
            "https://example.com".to_string(),
            created_at,
        )
    }

    #[test]
    fn test_decide_follows_age_since_creation() {
        let scheduler = RetryScheduler::default();
        let t0 = Instant::now();
        let mut entry = delivery("a", t0);

        assert_eq!(scheduler.decide(&entry, t0), RetryDecision::Wait);
        assert_eq!(scheduler.decide(&entry, t0 + secs(1)), RetryDecision::Retry);

        entry.attempts = 1;
        assert_eq!(scheduler.decide(&entry, t0 + secs(5)), RetryDecision::Wait);
        assert_eq!(
            scheduler.decide(&entry, t0 + Duration::from_millis(5_001)),
            RetryDecision::Retry
        );

        entry.attempts = 6;
        assert_eq!(scheduler.decide(&entry, t0 + secs(30)), RetryDecision::Wait);
        assert_eq!(
            scheduler.decide(&entry, t0 + Duration::from_millis(30_001)),
            RetryDecision::Expire
        );
    }

    #[test]
    fn test_expiry_ignores_attempts() {
        let scheduler = RetryScheduler::default();
        let t0 = Instant::now();
        let entry = delivery("a", t0);
        assert_eq!(scheduler.decide(&entry, t0 + secs(31)), RetryDecision::Expire);
    }

    #[test]
    fn test_tick_on_empty_table() {
        let scheduler = RetryScheduler::default();
        let mut table = PendingTable::new();
        let registry = ConnectionRegistry::new();

        let report = scheduler.tick(&mut table, &registry, Instant::now());
        assert_eq!(report, TickReport::default());
    }

    #[test]
    fn test_tick_retries_and_broadcasts_due_entries() {
        let scheduler = RetryScheduler::default();
        let t0 = Instant::now();
        let mut table = PendingTable::new();
        table.insert(delivery("due", t0));
        table.insert(delivery("fresh", t0 + secs(5)));

        let mut registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(8);
        registry.register(ConnectionId::new(), tx);

        let report = scheduler.tick(&mut table, &registry, t0 + secs(5));

        assert_eq!(report.retried, vec![DeliveryId::from("due")]);
        assert!(report.expired.is_empty());
        assert_eq!(table.get(&"due".into()).unwrap().attempts, 1);
        assert_eq!(table.get(&"fresh".into()).unwrap().attempts, 0);

        let frame: Arc<str> = rx.try_recv().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "SHORT_URL_READY");
        assert_eq!(value["deliveryId"], "due");
        assert_eq!(value["shortenedURL"], "http://x/due");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_tick_expires_without_broadcasting() {
        let scheduler = RetryScheduler::default();
        let t0 = Instant::now();
        let mut table = PendingTable::new();
        table.insert(delivery("old", t0));

        let mut registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(8);
        registry.register(ConnectionId::new(), tx);

        let report = scheduler.tick(&mut table, &registry, t0 + secs(31));

        assert_eq!(report.expired, vec![DeliveryId::from("old")]);
        assert!(report.retried.is_empty());
        assert!(table.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_attempts_accumulate_once_per_tick() {
        let scheduler = RetryScheduler::default();
        let t0 = Instant::now();
        let mut table = PendingTable::new();
        table.insert(delivery("a", t0 + Duration::from_millis(300)));
        let registry = ConnectionRegistry::new();

        for tick in 1..=5 {
            scheduler.tick(&mut table, &registry, t0 + secs(5 * tick));
        }
        assert_eq!(table.get(&"a".into()).unwrap().attempts, 5);

        scheduler.tick(&mut table, &registry, t0 + secs(30));
        assert_eq!(table.get(&"a".into()).unwrap().attempts, 6);

        let report = scheduler.tick(&mut table, &registry, t0 + secs(35));
        assert_eq!(report.expired, vec![DeliveryId::from("a")]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_failed_retry_does_not_stop_tick_or_next_tick() {
        let scheduler = RetryScheduler::default();
        let t0 = Instant::now();
        let mut table = PendingTable::new();
        table.insert(delivery("broken", t0));
        table.insert(delivery("healthy", t0));

        let mut sent = Vec::new();
        let report = scheduler.tick_with(&mut table, t0 + secs(5), |entry| {
            if entry.delivery_id.as_str() == "broken" {
                panic!("frame rejected");
            }
            sent.push(entry.delivery_id.clone());
        });

        assert_eq!(report.retried, vec![DeliveryId::from("healthy")]);
        assert_eq!(sent, vec![DeliveryId::from("healthy")]);
        assert_eq!(table.get(&"broken".into()).unwrap().attempts, 1);
        assert_eq!(table.len(), 2);

        let mut sent = Vec::new();
        let report = scheduler.tick_with(&mut table, t0 + secs(10), |entry| {
            sent.push(entry.delivery_id.clone());
        });
        assert_eq!(report.retried.len(), 2);
        assert!(sent.contains(&DeliveryId::from("broken")));
        assert_eq!(table.get(&"broken".into()).unwrap().attempts, 2);
    }

    #[test]
    fn test_panic_message_reads_common_payloads() {
        let payload = panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static");

        let payload = panic::catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 7");
    }
}
