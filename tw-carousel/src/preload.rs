//! Album art preloading
//!
//! The window holds the current track and the next few after it. Anything
//! outside the window is evicted (and its load cancelled) as the cursor
//! moves, so the set never grows past `ahead + 1` entries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{CarouselError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub type ImageBytes = Arc<Vec<u8>>;

#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<Vec<u8>>;
}

/// reqwest-backed image loader
pub struct HttpImageLoader {
    http_client: reqwest::Client,
}

impl HttpImageLoader {
    pub fn new() -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CarouselError::Status(status.as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Bytes of a base64 `data:` URI
pub fn decode_data_uri(uri: &str) -> Option<Vec<u8>> {
    let rest = uri.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    if !meta.ends_with(";base64") {
        return None;
    }
    general_purpose::STANDARD.decode(payload).ok()
}

#[derive(Debug)]
enum Slot {
    Loading(CancellationToken),
    Loaded(ImageBytes),
}

/// Bounded, URL-keyed set of preloaded art
#[derive(Debug)]
pub struct PreloadWindow {
    ahead: usize,
    slots: HashMap<String, Slot>,
}

impl PreloadWindow {
    pub fn new(ahead: usize) -> Self {
        Self {
            ahead,
            slots: HashMap::new(),
        }
    }

    /// Indices covered for `cursor` in a list of `len`, wrapping
    pub fn indices(&self, cursor: usize, len: usize) -> Vec<usize> {
        if len == 0 {
            return Vec::new();
        }
        (0..=self.ahead.min(len - 1))
            .map(|offset| (cursor + offset) % len)
            .collect()
    }

    /// Keep only `urls`, cancelling loads that fall out; returns the URLs
    /// that still need loading
    pub fn retain_window<'a>(&mut self, urls: &[&'a str]) -> Vec<&'a str> {
        self.slots.retain(|url, slot| {
            let keep = urls.contains(&url.as_str());
            if !keep {
                trace!(url = %url, "Evicting preload");
                if let Slot::Loading(token) = slot {
                    token.cancel();
                }
            }
            keep
        });

        let mut missing: Vec<&'a str> = Vec::new();
        for url in urls {
            if !self.slots.contains_key(*url) && !missing.contains(url) {
                missing.push(url);
            }
        }
        missing
    }

    pub fn mark_loading(&mut self, url: &str, token: CancellationToken) {
        self.slots.insert(url.to_string(), Slot::Loading(token));
    }

    /// Store loaded bytes if `url` is still wanted
    pub fn complete(&mut self, url: &str, bytes: Vec<u8>) -> bool {
        match self.slots.get_mut(url) {
            Some(slot) if matches!(slot, Slot::Loading(_)) => {
                *slot = Slot::Loaded(Arc::new(bytes));
                true
            }
            _ => false,
        }
    }

    /// Forget a failed load so the next window refresh retries it
    pub fn fail(&mut self, url: &str) {
        if matches!(self.slots.get(url), Some(Slot::Loading(_))) {
            self.slots.remove(url);
        }
    }

    pub fn get(&self, url: &str) -> Option<ImageBytes> {
        match self.slots.get(url) {
            Some(Slot::Loaded(bytes)) => Some(Arc::clone(bytes)),
            _ => None,
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.slots.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop everything, cancelling pending loads
    pub fn clear(&mut self) {
        self.retain_window(&[]);
    }
}
