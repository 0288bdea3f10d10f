//! Pending delivery table: notifications not yet acknowledged by any client.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use linkcast_common::types::DeliveryId;

/// One short-URL-ready notification awaiting acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelivery {
    pub delivery_id: DeliveryId,
    pub short_url: String,
    pub original_url: String,
    /// Retry broadcasts performed so far; the initial broadcast is not counted.
    pub attempts: u32,
    /// Fixed at creation. Both retry-due and expiry are measured from here.
    pub created_at: Instant,
    /// Reserved for per-client targeting.
    pub client_id: Option<String>,
}

impl PendingDelivery {
    pub fn new(
        delivery_id: DeliveryId,
        short_url: String,
        original_url: String,
        created_at: Instant,
    ) -> Self {
        Self {
            delivery_id,
            short_url,
            original_url,
            attempts: 0,
            created_at,
            client_id: None,
        }
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }
}

/// Deliveries keyed by id.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<DeliveryId, PendingDelivery>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert a delivery. Returns `false` and leaves the table untouched if the id is taken.
    pub fn insert(&mut self, delivery: PendingDelivery) -> bool {
        if self.entries.contains_key(&delivery.delivery_id) {
            return false;
        }
        self.entries.insert(delivery.delivery_id.clone(), delivery);
        true
    }

    pub fn contains(&self, id: &DeliveryId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &DeliveryId) -> Option<&PendingDelivery> {
        self.entries.get(id)
    }

    pub fn remove(&mut self, id: &DeliveryId) -> Option<PendingDelivery> {
        self.entries.remove(id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PendingDelivery> {
        self.entries.values_mut()
    }

    /// Remove every entry for which `expired` returns true, returning the removed ids.
    pub fn remove_where(
        &mut self,
        mut expired: impl FnMut(&PendingDelivery) -> bool,
    ) -> Vec<DeliveryId> {
        let mut removed = Vec::new();
        self.entries.retain(|id, delivery| {
            if expired(delivery) {
                removed.push(id.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
