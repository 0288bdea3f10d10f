pub mod health;
pub mod urls;
pub mod ws;

use axum::Router;

use crate::state::AppState;

/// Build the complete router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(ws::router())
        .merge(urls::router())
        .with_state(state)
}
