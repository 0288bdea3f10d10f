//! URL shortening routes.
//!
//! Creating a short URL does not return the code. It is pushed to connected
//! WebSocket clients by the delivery engine instead.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use linkcast_common::error::AppError;
use linkcast_shortener::normalize_url;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/url", post(create_short_url))
        .route("/urls", get(list_urls))
        .route("/{code}", get(redirect))
}

/// Request body for `POST /url`.
#[derive(Debug, Deserialize)]
pub struct ShortUrlRequest {
    pub url: Option<String>,
}

/// One entry of the `GET /urls` listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlSummary {
    pub short_code: String,
    pub original_url: String,
    #[serde(rename = "shortenedURL")]
    pub shortened_url: String,
}

/// POST /url — Shorten a URL and push the result to connected clients.
///
/// `201` with an empty body for a new mapping, `200` when the URL was already known.
async fn create_short_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ShortUrlRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let raw = request.url.unwrap_or_default();

    let url = normalize_url(&raw)?;
    let shortened = state.store.shorten(&url)?;
    let short_url = state.short_url(&headers, &shortened.code);

    state.delivery.deliver(short_url, shortened.url).await?;

    if shortened.created {
        Ok(StatusCode::CREATED.into_response())
    } else {
        Ok((
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "URL already exists. Short URL will be delivered via WebSocket.",
            })),
        )
            .into_response())
    }
}

/// GET /urls — List every stored mapping.
async fn list_urls(State(state): State<AppState>, headers: HeaderMap) -> Json<serde_json::Value> {
    let urls: Vec<UrlSummary> = state
        .store
        .list()
        .into_iter()
        .map(|(code, original_url)| UrlSummary {
            shortened_url: state.short_url(&headers, &code),
            short_code: code,
            original_url,
        })
        .collect();

    Json(json!({
        "success": true,
        "count": urls.len(),
        "urls": urls,
    }))
}

/// GET /:code — Redirect to the original URL.
async fn redirect(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    let url = state
        .store
        .resolve(&code)
        .ok_or_else(|| AppError::NotFound("URL not found".to_string()))?;

    let location = HeaderValue::try_from(url)
        .map_err(|e| AppError::Internal(format!("Stored URL is not a valid header: {}", e)))?;

    Ok((StatusCode::FOUND, [(LOCATION, location)]).into_response())
}
