use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque correlation token for one short-URL-ready notification.
///
/// Generated server-side, echoed back by clients in `ACKNOWLEDGE` frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(String);

impl DeliveryId {
    /// Fresh random id (UUID v4, hex without dashes).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DeliveryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for DeliveryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Frames pushed from the server to every open connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundFrame {
    ShortUrlReady {
        #[serde(rename = "deliveryId")]
        delivery_id: DeliveryId,
        #[serde(rename = "shortenedURL")]
        shortened_url: String,
        /// ISO-8601 with millisecond precision and a `Z` suffix
        timestamp: String,
    },
}

impl OutboundFrame {
    pub fn short_url_ready(
        delivery_id: DeliveryId,
        shortened_url: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        OutboundFrame::ShortUrlReady {
            delivery_id,
            shortened_url: shortened_url.into(),
            timestamp: iso_timestamp(at),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Frames sent by clients over the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundFrame {
    Acknowledge {
        #[serde(rename = "deliveryId")]
        delivery_id: DeliveryId,
    },
    ClientReady,
}

impl InboundFrame {
    /// Parse a text frame. Unknown `type` values fail like malformed JSON does.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Render a timestamp the way browsers do (`2024-05-01T12:00:00.000Z`).
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = DeliveryId::generate();
        let b = DeliveryId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_short_url_ready_wire_shape() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let frame = OutboundFrame::short_url_ready("abc".into(), "http://x/abc12", at);
        let value: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "type": "SHORT_URL_READY",
                "deliveryId": "abc",
                "shortenedURL": "http://x/abc12",
                "timestamp": "2024-05-01T12:00:00.000Z",
            })
        );
    }

    #[test]
    fn test_parse_acknowledge() {
        let frame = InboundFrame::parse(r#"{"type":"ACKNOWLEDGE","deliveryId":"d1"}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Acknowledge {
                delivery_id: "d1".into()
            }
        );
    }

    #[test]
    fn test_parse_client_ready_ignores_extra_fields() {
        let frame = InboundFrame::parse(r#"{"type":"CLIENT_READY","agent":"web"}"#).unwrap();
        assert_eq!(frame, InboundFrame::ClientReady);
    }

    #[test]
    fn test_parse_rejects_unknown_and_malformed() {
        assert!(InboundFrame::parse(r#"{"type":"PING"}"#).is_err());
        assert!(InboundFrame::parse(r#"{"type":"ACKNOWLEDGE"}"#).is_err());
        assert!(InboundFrame::parse(r#"{"deliveryId":"d1"}"#).is_err());
        assert!(InboundFrame::parse("not json").is_err());
    }
}
