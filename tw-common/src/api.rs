//! HTTP boundary between the server and the carousel client

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Range endpoint: `GET /tracks?start=S&end=E`
pub const TRACKS_PATH: &str = "/tracks";
/// Single-index endpoint: `GET /track?index=N`
pub const TRACK_PATH: &str = "/track";
/// Raw upstream passthrough
pub const RECENT_PATH: &str = "/recent";
pub const HEALTH_PATH: &str = "/health";
/// Bundled art for plays without any
pub const PLACEHOLDER_ART_PATH: &str = "/default.webp";

/// Largest span a single range request may cover
pub const MAX_RANGE_SPAN: usize = 50;

/// Short public caching with stale-while-revalidate for range responses
pub const TRACKS_CACHE_CONTROL: &str = "public, s-maxage=1, stale-while-revalidate=59";

/// Half-open index range `[start, end)`
///
/// Also the key of the server's coalescing cache: two requests share a
/// fetch only when both bounds match exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeQuery {
    pub start: usize,
    pub end: usize,
}

impl RangeQuery {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn single(index: usize) -> Self {
        Self::new(index, index.saturating_add(1))
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject inverted or oversized ranges
    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(Error::InvalidInput(format!(
                "start {} is after end {}",
                self.start, self.end
            )));
        }
        if self.len() > MAX_RANGE_SPAN {
            return Err(Error::InvalidInput(format!(
                "range spans {} tracks, maximum is {}",
                self.len(),
                MAX_RANGE_SPAN
            )));
        }
        Ok(())
    }
}

/// Query for the single-index endpoint
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct IndexQuery {
    #[serde(default)]
    pub index: usize,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_covers_one_index() {
        let range = RangeQuery::single(7);
        assert_eq!(range, RangeQuery::new(7, 8));
        assert_eq!(range.len(), 1);
    }

    #[test]
    fn test_empty_range_is_valid() {
        let range = RangeQuery::new(3, 3);
        assert!(range.is_empty());
        assert!(range.validate().is_ok());
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(RangeQuery::new(5, 2).validate().is_err());
    }

    #[test]
    fn test_oversized_range_rejected() {
        assert!(RangeQuery::new(0, MAX_RANGE_SPAN).validate().is_ok());
        assert!(RangeQuery::new(0, MAX_RANGE_SPAN + 1).validate().is_err());
    }
}
