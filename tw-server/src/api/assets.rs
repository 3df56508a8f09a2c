//! Bundled static assets
//!
//! Embeds the placeholder album art at compile time

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tw_common::api::PLACEHOLDER_ART_PATH;

use crate::AppState;

const PLACEHOLDER_ART: &[u8] = include_bytes!("../../assets/default.webp");

/// GET /default.webp
///
/// Art for plays the history service has no image for
pub async fn serve_placeholder_art() -> Response {
    (
        StatusCode::OK,
        [
            ("content-type", "image/webp"),
            ("cache-control", "public, max-age=86400"),
        ],
        PLACEHOLDER_ART,
    )
        .into_response()
}

/// Build static asset routes
pub fn asset_routes() -> Router<AppState> {
    Router::new().route(PLACEHOLDER_ART_PATH, get(serve_placeholder_art))
}
