//! Shared application state for the Axum server.

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::http::header::HOST;

use linkcast_common::config::AppConfig;
use linkcast_delivery::DeliveryHandle;
use linkcast_shortener::UrlStore;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub delivery: DeliveryHandle,
    pub store: Arc<UrlStore>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(delivery: DeliveryHandle, store: Arc<UrlStore>, config: AppConfig) -> Self {
        Self {
            delivery,
            store,
            config,
        }
    }

    /// `scheme://host` prefix for short URLs served to this request.
    pub fn base_url(&self, headers: &HeaderMap) -> String {
        if let Some(base) = &self.config.public_base_url {
            return base.clone();
        }

        match headers.get(HOST).and_then(|host| host.to_str().ok()) {
            Some(host) => format!("http://{host}"),
            None => format!("http://{}:{}", self.config.host, self.config.port),
        }
    }

    pub fn short_url(&self, headers: &HeaderMap, code: &str) -> String {
        format!("{}/{}", self.base_url(headers), code)
    }
}
