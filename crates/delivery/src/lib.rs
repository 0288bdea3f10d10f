//! Reliable broadcast delivery of short-URL-ready notifications.
//!
//! A delivery is broadcast to every open push connection as soon as it is
//! created, then re-broadcast on each scheduler tick until a client
//! acknowledges it or it expires.

pub mod ack;
pub mod engine;
pub mod error;
pub mod pending;
pub mod registry;
pub mod scheduler;
pub mod service;

pub use engine::{DeliveryEngine, DeliveryHandle, EngineStats};
pub use error::EngineError;
pub use pending::PendingDelivery;
pub use registry::{ConnectionId, Frame, FrameReceiver};
