//! Upstream clients and the enrichment pipeline

pub mod art_client;
pub mod color_extractor;
pub mod lastfm_client;
pub mod track_enricher;

pub use art_client::{ArtClient, ArtError, FetchedArt, HttpArtClient};
pub use color_extractor::{extract_palette, palette_from_image_bytes};
pub use lastfm_client::{HistoryClient, LastFmClient, RawScrobble, TrackFetchError};
pub use track_enricher::{EnrichSettings, TrackEnricher};
