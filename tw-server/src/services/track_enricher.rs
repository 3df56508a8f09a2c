//! Track enrichment
//!
//! Turns plays from the history page into `EnrichedTrack`s: resolves the art
//! URL, extracts the palette and inlines small art so the client can render
//! without a second round trip.

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use futures::future::join_all;
use tracing::{debug, warn};
use tw_common::api::PLACEHOLDER_ART_PATH;
use tw_common::config::TomlConfig;
use tw_common::{ColorPalette, EnrichedTrack};

use super::art_client::{ArtClient, FetchedArt};
use super::color_extractor::palette_from_image_bytes;
use super::lastfm_client::{HistoryClient, RawScrobble, TrackFetchError};

/// Enrichment policy knobs
#[derive(Debug, Clone)]
pub struct EnrichSettings {
    /// Declared art sizes at or above this stay URL references
    pub inline_max_bytes: u64,
    pub placeholder_art_url: String,
}

impl EnrichSettings {
    pub fn from_config(config: &TomlConfig) -> Self {
        let placeholder_art_url = config.enrich.placeholder_art_url.clone().unwrap_or_else(|| {
            format!(
                "{}{}",
                config.server.public_base_url.trim_end_matches('/'),
                PLACEHOLDER_ART_PATH
            )
        });

        Self {
            inline_max_bytes: config.enrich.inline_max_bytes,
            placeholder_art_url,
        }
    }
}

pub struct TrackEnricher {
    history: Arc<dyn HistoryClient>,
    art: Arc<dyn ArtClient>,
    settings: EnrichSettings,
}

impl TrackEnricher {
    pub fn new(
        history: Arc<dyn HistoryClient>,
        art: Arc<dyn ArtClient>,
        settings: EnrichSettings,
    ) -> Self {
        Self {
            history,
            art,
            settings,
        }
    }

    pub fn history(&self) -> &Arc<dyn HistoryClient> {
        &self.history
    }

    /// Enrich indices `start..end` from a single history page fetch
    ///
    /// Indices past the end of the page are simply absent, so the result may
    /// be shorter than requested (or empty). Only the page fetch can fail.
    pub async fn enrich_range(
        &self,
        start: usize,
        end: usize,
    ) -> Result<Vec<EnrichedTrack>, TrackFetchError> {
        if start >= end {
            return Ok(Vec::new());
        }

        let page = self.history.recent_tracks().await?;
        let available = end.min(page.len());
        debug!(start, end, page_len = page.len(), "Enriching history range");

        if start >= available {
            return Ok(Vec::new());
        }

        Ok(join_all(page[start..available].iter().map(|scrobble| self.enrich_scrobble(scrobble))).await)
    }

    /// Enrich one index of an already fetched page; `None` past the end
    pub async fn enrich_from_page(
        &self,
        page: &[RawScrobble],
        index: usize,
    ) -> Option<EnrichedTrack> {
        let scrobble = page.get(index)?;
        Some(self.enrich_scrobble(scrobble).await)
    }

    pub async fn enrich_scrobble(&self, scrobble: &RawScrobble) -> EnrichedTrack {
        // The bundled placeholder is never fetched; it has the default palette
        let Some(art_url) = scrobble.art_url() else {
            return self.build_track(
                scrobble,
                self.settings.placeholder_art_url.clone(),
                None,
                ColorPalette::DEFAULT,
            );
        };
        let album_art_url = art_url.to_string();

        let (colors, inline_image) = match self.art.fetch(&album_art_url).await {
            Ok(art) => {
                let inline = async { inline_data_uri(&art, self.settings.inline_max_bytes) };
                tokio::join!(extract_colors(Arc::clone(&art.bytes)), inline)
            }
            Err(e) => {
                warn!(url = %album_art_url, error = %e, "Album art unavailable, using default palette");
                (ColorPalette::DEFAULT, None)
            }
        };

        self.build_track(scrobble, album_art_url, inline_image, colors)
    }

    fn build_track(
        &self,
        scrobble: &RawScrobble,
        album_art_url: String,
        inline_image: Option<String>,
        colors: ColorPalette,
    ) -> EnrichedTrack {
        EnrichedTrack {
            name: scrobble.name.clone(),
            artist: scrobble.artist_name().to_string(),
            url: scrobble.url.clone(),
            album_art_url,
            inline_image,
            colors,
            timestamp: scrobble.timestamp(),
            is_now_playing: scrobble.is_now_playing(),
        }
    }
}

/// Palette extraction on the blocking pool; never fails
async fn extract_colors(bytes: Arc<Vec<u8>>) -> ColorPalette {
    match tokio::task::spawn_blocking(move || palette_from_image_bytes(&bytes)).await {
        Ok(Some(palette)) => palette,
        Ok(None) => ColorPalette::DEFAULT,
        Err(e) => {
            warn!(error = %e, "Color extraction task failed");
            ColorPalette::DEFAULT
        }
    }
}

/// `data:` URI for art whose declared size is under `max_bytes`
///
/// Art without a declared length is never inlined: the size cannot be
/// bounded up front. The body itself must also be under the limit, since
/// a server may understate `Content-Length`.
pub fn inline_data_uri(art: &FetchedArt, max_bytes: u64) -> Option<String> {
    if art.bytes.len() as u64 >= max_bytes {
        debug!(
            len = art.bytes.len(),
            max_bytes, "Art body too large to inline, keeping URL reference"
        );
        return None;
    }

    match art.declared_length {
        None | Some(0) => {
            debug!("Art has no declared length, keeping URL reference");
            return None;
        }
        Some(len) if len >= max_bytes => {
            debug!(len, max_bytes, "Art too large to inline, keeping URL reference");
            return None;
        }
        Some(_) => {}
    }

    let content_type = art.content_type.as_deref().unwrap_or("image/jpeg");
    Some(format!(
        "data:{};base64,{}",
        content_type,
        general_purpose::STANDARD.encode(art.bytes.as_slice())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::art_client::ArtError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tw_common::Rgb;

    const PLACEHOLDER: &str = "http://localhost:5780/default.webp";

    struct FakeHistory {
        tracks: Vec<serde_json::Value>,
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl HistoryClient for FakeHistory {
        async fn recent_tracks_raw(&self) -> Result<serde_json::Value, TrackFetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TrackFetchError::UpstreamStatus(503));
            }
            Ok(json!({ "recenttracks": { "track": self.tracks } }))
        }
    }

    struct FakeArt {
        responses: HashMap<String, FetchedArt>,
    }

    #[async_trait]
    impl ArtClient for FakeArt {
        async fn fetch(&self, url: &str) -> Result<FetchedArt, ArtError> {
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| ArtError::Status(404))
        }
    }

    fn solid_png(rgb: [u8; 3]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(64, 64, image::Rgba([rgb[0], rgb[1], rgb[2], 255]));
        let mut encoded = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)
            .unwrap();
        encoded
    }

    fn art(bytes: Vec<u8>, declared_length: Option<u64>) -> FetchedArt {
        FetchedArt {
            declared_length,
            content_type: Some("image/png".to_string()),
            bytes: Arc::new(bytes),
        }
    }

    fn scrobble(name: &str, art_url: &str) -> serde_json::Value {
        json!({
            "name": name,
            "artist": { "#text": "Stereolab" },
            "url": format!("https://www.last.fm/music/Stereolab/_/{name}"),
            "image": [{ "size": "extralarge", "#text": art_url }],
            "date": { "uts": "1700000000" }
        })
    }

    fn enricher(
        tracks: Vec<serde_json::Value>,
        responses: HashMap<String, FetchedArt>,
        inline_max_bytes: u64,
    ) -> (TrackEnricher, Arc<FakeHistory>) {
        let history = Arc::new(FakeHistory {
            tracks,
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let enricher = TrackEnricher::new(
            history.clone(),
            Arc::new(FakeArt { responses }),
            EnrichSettings {
                inline_max_bytes,
                placeholder_art_url: PLACEHOLDER.to_string(),
            },
        );
        (enricher, history)
    }

    #[tokio::test]
    async fn test_small_art_is_inlined_with_extracted_colors() {
        let png = solid_png([120, 60, 30]);
        let len = png.len() as u64;
        let (enricher, _) = enricher(
            vec![scrobble("Cybele's Reverie", "https://img/a.png")],
            HashMap::from([("https://img/a.png".to_string(), art(png, Some(len)))]),
            1024 * 1024,
        );

        let tracks = enricher.enrich_range(0, 1).await.unwrap();
        let track = &tracks[0];

        assert_eq!(track.name, "Cybele's Reverie");
        assert_eq!(track.artist, "Stereolab");
        assert_eq!(track.timestamp, Some(1_700_000_000));
        assert_eq!(track.album_art_url, "https://img/a.png");
        assert!(track.inline_image.as_deref().unwrap().starts_with("data:image/png;base64,"));
        assert_eq!(track.colors.primary(), Rgb::new(132, 66, 33));
    }

    #[tokio::test]
    async fn test_oversized_art_keeps_url_reference() {
        let png = solid_png([120, 60, 30]);
        let (enricher, _) = enricher(
            vec![scrobble("Metronomic Underground", "https://img/big.png")],
            HashMap::from([(
                "https://img/big.png".to_string(),
                art(png, Some(5 * 1024 * 1024)),
            )]),
            2 * 1024 * 1024,
        );

        let tracks = enricher.enrich_range(0, 1).await.unwrap();
        assert!(tracks[0].inline_image.is_none());
        assert_eq!(tracks[0].album_art_url, "https://img/big.png");
        // Colors are still extracted from the downloaded art
        assert!(!tracks[0].colors.is_default());
    }

    #[tokio::test]
    async fn test_art_failure_degrades_to_defaults() {
        let (enricher, _) = enricher(
            vec![scrobble("French Disko", "https://img/missing.png")],
            HashMap::new(),
            1024,
        );

        let tracks = enricher.enrich_range(0, 1).await.unwrap();
        assert_eq!(tracks[0].colors, ColorPalette::DEFAULT);
        assert!(tracks[0].inline_image.is_none());
        assert_eq!(tracks[0].album_art_url, "https://img/missing.png");
    }

    #[tokio::test]
    async fn test_missing_art_uses_placeholder() {
        let mut bare = scrobble("Ping Pong", "");
        bare["image"] = json!([]);
        let (enricher, _) = enricher(vec![bare], HashMap::new(), 1024);

        let tracks = enricher.enrich_range(0, 1).await.unwrap();
        assert_eq!(tracks[0].album_art_url, PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_placeholder_art_is_not_fetched() {
        let mut bare = scrobble("Ping Pong", "");
        bare["image"] = json!([]);
        // Serving the placeholder would give it colors; it must keep the defaults
        let png = solid_png([200, 30, 30]);
        let len = png.len() as u64;
        let (enricher, _) = enricher(
            vec![bare],
            HashMap::from([(PLACEHOLDER.to_string(), art(png, Some(len)))]),
            1024 * 1024,
        );

        let tracks = enricher.enrich_range(0, 1).await.unwrap();
        assert_eq!(tracks[0].album_art_url, PLACEHOLDER);
        assert_eq!(tracks[0].colors, ColorPalette::DEFAULT);
        assert!(tracks[0].inline_image.is_none());
    }

    #[tokio::test]
    async fn test_range_truncated_at_page_end_with_one_fetch() {
        let tracks = (0..3)
            .map(|i| scrobble(&format!("track-{i}"), "https://img/none.png"))
            .collect();
        let (enricher, history) = enricher(tracks, HashMap::new(), 1024);

        let enriched = enricher.enrich_range(1, 10).await.unwrap();
        let names: Vec<_> = enriched.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["track-1", "track-2"]);
        assert_eq!(history.calls.load(Ordering::SeqCst), 1);

        assert!(enricher.enrich_range(3, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_range_skips_upstream() {
        let (enricher, history) = enricher(Vec::new(), HashMap::new(), 1024);
        assert!(enricher.enrich_range(4, 4).await.unwrap().is_empty());
        assert_eq!(history.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_index_beyond_page_is_absent() {
        let (enricher, history) = enricher(
            vec![scrobble("Lo Boob Oscillator", "https://img/none.png")],
            HashMap::new(),
            1024,
        );
        let page = history.recent_tracks().await.unwrap();

        assert!(enricher.enrich_from_page(&page, 0).await.is_some());
        assert!(enricher.enrich_from_page(&page, 1).await.is_none());
    }

    #[tokio::test]
    async fn test_upstream_failure_is_reported() {
        let history = Arc::new(FakeHistory {
            tracks: Vec::new(),
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let enricher = TrackEnricher::new(
            history,
            Arc::new(FakeArt { responses: HashMap::new() }),
            EnrichSettings {
                inline_max_bytes: 1024,
                placeholder_art_url: PLACEHOLDER.to_string(),
            },
        );

        assert_eq!(
            enricher.enrich_range(0, 5).await.unwrap_err(),
            TrackFetchError::UpstreamStatus(503)
        );
    }

    #[test]
    fn test_inline_requires_declared_length() {
        assert!(inline_data_uri(&art(vec![1, 2, 3], None), 1024).is_none());
        assert!(inline_data_uri(&art(vec![1, 2, 3], Some(0)), 1024).is_none());
        assert!(inline_data_uri(&art(vec![1, 2, 3], Some(1024)), 1024).is_none());
        assert_eq!(
            inline_data_uri(&art(vec![1, 2, 3], Some(3)), 1024).as_deref(),
            Some("data:image/png;base64,AQID")
        );
    }

    #[test]
    fn test_inline_rejects_understated_content_length() {
        // Declares 3 bytes but delivers 2000
        assert!(inline_data_uri(&art(vec![7; 2000], Some(3)), 1024).is_none());
        assert!(inline_data_uri(&art(vec![7; 1024], Some(3)), 1024).is_none());
        assert!(inline_data_uri(&art(vec![7; 1023], Some(3)), 1024).is_some());
    }

    #[test]
    fn test_placeholder_derived_from_public_base_url() {
        let mut config = TomlConfig::default();
        config.server.public_base_url = "https://example.dev/".to_string();
        let settings = EnrichSettings::from_config(&config);
        assert_eq!(settings.placeholder_art_url, "https://example.dev/default.webp");
        assert_eq!(settings.inline_max_bytes, 2 * 1024 * 1024);
    }
}
