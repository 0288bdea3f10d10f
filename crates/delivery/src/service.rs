//! Delivery service: creates pending deliveries and performs the first broadcast.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;

use linkcast_common::types::{DeliveryId, OutboundFrame};

use crate::error::EngineError;
use crate::pending::{PendingDelivery, PendingTable};
use crate::registry::ConnectionRegistry;

/// Validated input for a new delivery.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub short_url: String,
    pub original_url: String,
}

impl DeliveryRequest {
    pub fn new(
        short_url: impl Into<String>,
        original_url: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let short_url = short_url.into();
        let original_url = original_url.into();

        if short_url.trim().is_empty() {
            return Err(EngineError::InvalidInput("short URL is empty".to_string()));
        }
        if original_url.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "original URL is empty".to_string(),
            ));
        }

        Ok(Self {
            short_url,
            original_url,
        })
    }
}

/// Insert a new pending delivery and broadcast it once.
///
/// The initial broadcast does not count as an attempt.
pub fn deliver(
    table: &mut PendingTable,
    registry: &ConnectionRegistry,
    request: DeliveryRequest,
    now: Instant,
) -> DeliveryId {
    let delivery = loop {
        let candidate = PendingDelivery::new(
            DeliveryId::generate(),
            request.short_url.clone(),
            request.original_url.clone(),
            now,
        );
        if !table.contains(&candidate.delivery_id) {
            break candidate;
        }
    };
    let delivery_id = delivery.delivery_id.clone();

    tracing::info!(
        delivery_id = %delivery_id,
        short_url = %delivery.short_url,
        original_url = %delivery.original_url,
        "Delivery created"
    );

    table.insert(delivery);
    if let Some(delivery) = table.get(&delivery_id) {
        broadcast_delivery(registry, delivery);
    }

    delivery_id
}

/// Broadcast the `SHORT_URL_READY` frame for a delivery.
///
/// Returns whether any connection accepted it. A frame that fails to serialize
/// is logged and counted as not delivered.
pub(crate) fn broadcast_delivery(
    registry: &ConnectionRegistry,
    delivery: &PendingDelivery,
) -> bool {
    let frame = OutboundFrame::short_url_ready(
        delivery.delivery_id.clone(),
        delivery.short_url.clone(),
        Utc::now(),
    );

    let payload = match frame.to_json() {
        Ok(json) => Arc::<str>::from(json),
        Err(e) => {
            tracing::error!(
                delivery_id = %delivery.delivery_id,
                error = %e,
                "Failed to serialize delivery frame"
            );
            return false;
        }
    };

    let delivered = registry.broadcast(&payload);
    if !delivered {
        tracing::info!(
            delivery_id = %delivery.delivery_id,
            "No push clients connected, delivery will be retried"
        );
    }
    delivered
}
