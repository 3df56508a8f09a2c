//! Listening-history client (Last.fm `user.getrecenttracks`)
//!
//! One read endpoint returning a fixed-size page of recent plays. The
//! enricher indexes into that page; nothing here is cached.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tw_common::config::LastFmConfig;

const USER_AGENT: &str = concat!("trackwall/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Hash Last.fm uses for its blank star image when an album has no art
const BLANK_ART_HASH: &str = "2a96cbd8b46e442fc41c2b86b821562f";

/// Failure to obtain a history page
///
/// Cloneable so one failed fetch can be handed to every coalesced waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackFetchError {
    #[error("Last.fm credentials not configured")]
    NotConfigured,

    #[error("Listening history unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Listening history returned status {0}")]
    UpstreamStatus(u16),

    #[error("Malformed listening history: {0}")]
    MalformedResponse(String),
}

/// Text node as Last.fm encodes it (`{"#text": "..."}`)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TextField {
    #[serde(rename = "#text", default)]
    pub text: String,
}

/// One size variant of the album art
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ArtVariant {
    #[serde(default)]
    pub size: String,
    #[serde(rename = "#text", default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlayDate {
    pub uts: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TrackAttr {
    #[serde(default)]
    pub nowplaying: Option<String>,
}

/// One play event as returned by the history service
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawScrobble {
    pub name: String,
    #[serde(default)]
    pub artist: TextField,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub image: Vec<ArtVariant>,
    #[serde(default)]
    pub date: Option<PlayDate>,
    #[serde(rename = "@attr", default)]
    pub attr: Option<TrackAttr>,
}

impl RawScrobble {
    pub fn artist_name(&self) -> &str {
        &self.artist.text
    }

    pub fn is_now_playing(&self) -> bool {
        self.attr
            .as_ref()
            .and_then(|attr| attr.nowplaying.as_deref())
            .is_some_and(|flag| flag == "true")
    }

    /// Unix seconds of the play; `None` while it is still playing
    pub fn timestamp(&self) -> Option<i64> {
        self.date.as_ref().and_then(|date| date.uts.parse().ok())
    }

    /// Largest art variant, skipping blanks and the service's placeholder
    pub fn art_url(&self) -> Option<&str> {
        let usable = |variant: &&ArtVariant| {
            !variant.url.trim().is_empty() && !variant.url.contains(BLANK_ART_HASH)
        };

        self.image
            .iter()
            .filter(usable)
            .find(|variant| variant.size == "extralarge")
            .or_else(|| self.image.get(3).filter(usable))
            .map(|variant| variant.url.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct RecentTracksResponse {
    recenttracks: RecentTracks,
}

#[derive(Debug, Deserialize)]
struct RecentTracks {
    #[serde(default, deserialize_with = "one_or_many")]
    track: Vec<RawScrobble>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

/// Last.fm collapses a one-element list into a bare object
fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(items) => items,
        OneOrMany::One(item) => vec![item],
    })
}

/// Parse a raw history response into plays, most recent first
pub fn parse_recent_tracks(raw: serde_json::Value) -> Result<Vec<RawScrobble>, TrackFetchError> {
    serde_json::from_value::<RecentTracksResponse>(raw)
        .map(|response| response.recenttracks.track)
        .map_err(|e| TrackFetchError::MalformedResponse(e.to_string()))
}

/// Source of the listening-history page
#[async_trait]
pub trait HistoryClient: Send + Sync {
    /// The upstream JSON document, untouched
    async fn recent_tracks_raw(&self) -> Result<serde_json::Value, TrackFetchError>;

    /// The current page of plays, most recent first
    async fn recent_tracks(&self) -> Result<Vec<RawScrobble>, TrackFetchError> {
        parse_recent_tracks(self.recent_tracks_raw().await?)
    }
}

/// reqwest-backed Last.fm client
pub struct LastFmClient {
    http_client: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
    page_size: usize,
}

impl LastFmClient {
    pub fn new(config: &LastFmConfig) -> Result<Self, TrackFetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TrackFetchError::UpstreamUnavailable(e.to_string()))?;

        let credentials = config.credentials();
        if credentials.is_none() {
            tracing::warn!("Last.fm username or API key missing; history requests will fail");
        }

        Ok(Self {
            http_client,
            base_url: config.base_url.clone(),
            credentials,
            page_size: config.page_size.max(1),
        })
    }
}

#[async_trait]
impl HistoryClient for LastFmClient {
    async fn recent_tracks_raw(&self) -> Result<serde_json::Value, TrackFetchError> {
        let (username, api_key) = self
            .credentials
            .as_ref()
            .ok_or(TrackFetchError::NotConfigured)?;

        let query = [
            ("method", "user.getrecenttracks".to_string()),
            ("user", username.clone()),
            ("api_key", api_key.clone()),
            ("format", "json".to_string()),
            ("limit", self.page_size.to_string()),
        ];

        tracing::debug!(user = %username, limit = self.page_size, "Querying Last.fm recent tracks");

        let response = self
            .http_client
            .get(&self.base_url)
            .query(&query)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| TrackFetchError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %body, "Last.fm API error");
            return Err(TrackFetchError::UpstreamStatus(status.as_u16()));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TrackFetchError::MalformedResponse(e.to_string()))?;

        if raw.pointer("/recenttracks/track").is_none() {
            return Err(TrackFetchError::MalformedResponse(
                "missing recenttracks.track".to_string(),
            ));
        }

        Ok(raw)
    }
}
