//! Linkcast HTTP + WebSocket server.
//!
//! Endpoints:
//! - POST /url — Shorten a URL; the short URL is pushed over the WebSocket
//! - GET  /urls — List stored mappings
//! - GET  /{code} — Redirect to the original URL
//! - GET  /health — Liveness and delivery engine counters
//! - GET  /ws (or /) — WebSocket push channel

pub mod routes;
pub mod state;
