//! Enriched track endpoints
//!
//! Both routes read through the coalescing cache; a single index is just
//! the one-element range.

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tracing::warn;
use tw_common::api::{IndexQuery, RangeQuery, TRACKS_CACHE_CONTROL, TRACKS_PATH, TRACK_PATH};

use crate::{ApiError, ApiResult, AppState};

/// GET /tracks?start=S&end=E
///
/// Ordered array of enriched tracks, possibly shorter than requested or
/// empty when the history runs out. Upstream failure is a 502 so clients
/// can tell it apart from the end of the history.
pub async fn get_tracks(
    State(state): State<AppState>,
    Query(range): Query<RangeQuery>,
) -> ApiResult<Response> {
    range.validate()?;

    let batch = state.tracks.tracks(range).await.map_err(|e| {
        warn!(start = range.start, end = range.end, error = %e, "Range fetch failed");
        ApiError::from(e)
    })?;

    Ok((
        [(header::CACHE_CONTROL, TRACKS_CACHE_CONTROL)],
        Json(batch.as_slice()),
    )
        .into_response())
}

/// GET /track?index=N
///
/// One enriched track, or 404 when the index is past the history. An
/// unreachable upstream is reported the same way.
pub async fn get_track(
    State(state): State<AppState>,
    Query(query): Query<IndexQuery>,
) -> ApiResult<Response> {
    let batch = match state.tracks.tracks(RangeQuery::single(query.index)).await {
        Ok(batch) => batch,
        Err(e) => {
            warn!(index = query.index, error = %e, "Track fetch failed, reporting absence");
            return Err(ApiError::NotFound("No more tracks".to_string()));
        }
    };

    match batch.first() {
        Some(track) => Ok(Json(track).into_response()),
        None => Err(ApiError::NotFound("No more tracks".to_string())),
    }
}

/// Build track routes
pub fn track_routes() -> Router<AppState> {
    Router::new()
        .route(TRACKS_PATH, get(get_tracks))
        .route(TRACK_PATH, get(get_track))
}
