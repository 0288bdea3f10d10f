//! Acknowledgment handling for inbound push-channel frames.

use linkcast_common::types::{DeliveryId, InboundFrame};

use crate::engine::DeliveryHandle;
use crate::error::EngineError;
use crate::pending::PendingTable;

/// What became of one inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// An acknowledgment; `removed` is false when the id was unknown, expired or already acked.
    Acknowledged { delivery_id: DeliveryId, removed: bool },
    ClientReady,
    Ignored,
}

/// Remove the entry matching `delivery_id`, if any.
pub fn acknowledge(table: &mut PendingTable, delivery_id: &DeliveryId) -> bool {
    match table.remove(delivery_id) {
        Some(delivery) => {
            tracing::info!(
                delivery_id = %delivery_id,
                attempts = delivery.attempts,
                "Received acknowledgement for delivery"
            );
            true
        }
        None => {
            tracing::debug!(
                delivery_id = %delivery_id,
                "Acknowledgement for unknown delivery ignored"
            );
            false
        }
    }
}

/// Route a text frame received from a client.
///
/// Malformed or unrecognized frames are logged and ignored; the connection stays open.
pub async fn handle_text_frame(
    handle: &DeliveryHandle,
    text: &str,
) -> Result<InboundOutcome, EngineError> {
    let frame = match InboundFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unrecognized push-channel frame");
            return Ok(InboundOutcome::Ignored);
        }
    };

    match frame {
        InboundFrame::Acknowledge { delivery_id } if delivery_id.as_str().is_empty() => {
            tracing::debug!("Ignoring acknowledgement without a delivery id");
            Ok(InboundOutcome::Ignored)
        }
        InboundFrame::Acknowledge { delivery_id } => {
            let removed = handle.acknowledge(delivery_id.clone()).await?;
            Ok(InboundOutcome::Acknowledged {
                delivery_id,
                removed,
            })
        }
        InboundFrame::ClientReady => {
            tracing::debug!("Client is ready to receive messages");
            Ok(InboundOutcome::ClientReady)
        }
    }
}
