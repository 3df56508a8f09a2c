//! Raw listening-history passthrough

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::error;
use tw_common::api::RECENT_PATH;

use crate::services::TrackFetchError;
use crate::{ApiError, ApiResult, AppState};

/// GET /recent
///
/// The upstream document as-is. Missing credentials are a 500; an upstream
/// error status is relayed.
pub async fn get_recent(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let history = state.tracks.enricher().history();

    match history.recent_tracks_raw().await {
        Ok(raw) => Ok(Json(raw)),
        Err(TrackFetchError::UpstreamStatus(code)) => {
            error!(status = code, "Last.fm API error");
            Err(ApiError::UpstreamStatus(
                StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_GATEWAY),
            ))
        }
        Err(e) => {
            error!(error = %e, "Error fetching from Last.fm");
            Err(ApiError::Upstream(e))
        }
    }
}

/// Build passthrough routes
pub fn recent_routes() -> Router<AppState> {
    Router::new().route(RECENT_PATH, get(get_recent))
}
