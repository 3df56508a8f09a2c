//! Track source: where the carousel gets enriched tracks from

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use tw_common::api::{RangeQuery, TRACKS_PATH};
use tw_common::EnrichedTrack;

use crate::error::{CarouselError, Result};

const USER_AGENT: &str = concat!("tw-carousel/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a range request
///
/// Not-found is a distinguished absence rather than an error: it ends the
/// background fetching.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Tracks(Vec<EnrichedTrack>),
    NotFound,
}

impl FetchOutcome {
    /// True when no more history lies beyond `range`
    pub fn exhausts(&self, range: RangeQuery) -> bool {
        match self {
            FetchOutcome::NotFound => true,
            FetchOutcome::Tracks(tracks) => tracks.len() < range.len(),
        }
    }
}

#[async_trait]
pub trait TrackSource: Send + Sync {
    async fn fetch_range(&self, range: RangeQuery) -> Result<FetchOutcome>;
}

/// Track source backed by the tw-server range endpoint
pub struct HttpTrackSource {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpTrackSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TrackSource for HttpTrackSource {
    async fn fetch_range(&self, range: RangeQuery) -> Result<FetchOutcome> {
        let url = format!("{}{}", self.base_url, TRACKS_PATH);
        debug!(start = range.start, end = range.end, "Requesting track range");

        let response = self.http_client.get(&url).query(&range).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(FetchOutcome::NotFound);
        }
        if !status.is_success() {
            return Err(CarouselError::Status(status.as_u16()));
        }

        let tracks: Vec<EnrichedTrack> = response.json().await?;
        if tracks.is_empty() {
            return Ok(FetchOutcome::NotFound);
        }
        Ok(FetchOutcome::Tracks(tracks))
    }
}
