//! tw-server library - track enrichment service
//!
//! Serves enriched recent plays (art, palette, optional inline thumbnail)
//! over HTTP, shielding the listening-history service behind a
//! request-coalescing cache.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tw_common::config::TomlConfig;

pub mod api;
pub mod cache;
pub mod error;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use crate::cache::TrackSourceCache;
use crate::services::{
    ArtClient, EnrichSettings, HistoryClient, HttpArtClient, LastFmClient, TrackEnricher,
};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Coalescing cache in front of the enricher; one per process
    pub tracks: Arc<TrackSourceCache>,
}

impl AppState {
    /// Create application state around explicit upstream clients
    pub fn new(
        history: Arc<dyn HistoryClient>,
        art: Arc<dyn ArtClient>,
        settings: EnrichSettings,
        cache_ttl: Duration,
    ) -> Self {
        let enricher = Arc::new(TrackEnricher::new(history, art, settings));
        Self {
            tracks: Arc::new(TrackSourceCache::new(enricher, cache_ttl)),
        }
    }

    /// Create application state with the production Last.fm and art clients
    pub fn from_config(config: &TomlConfig) -> anyhow::Result<Self> {
        let history = LastFmClient::new(&config.lastfm)?;
        let art = HttpArtClient::new()?;

        Ok(Self::new(
            Arc::new(history),
            Arc::new(art),
            EnrichSettings::from_config(config),
            Duration::from_millis(config.cache.ttl_ms),
        ))
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::track_routes())
        .merge(api::recent_routes())
        .merge(api::health_routes())
        .merge(api::asset_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
