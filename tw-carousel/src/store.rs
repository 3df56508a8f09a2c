//! Track carousel store
//!
//! Holds the fetched tracks and the cursor, keeps fetching ahead of the
//! cursor, preloads art, and animates the palette between tracks.
//!
//! The store is single-owner. Background work runs on spawned tasks that
//! report back through an mpsc channel; the owner applies their results with
//! [`CarouselStore::apply_pending`] or [`CarouselStore::next_event`]. Dropping
//! the store cancels every task it started.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tw_common::api::RangeQuery;
use tw_common::config::CarouselConfig;
use tw_common::{ColorPalette, EnrichedTrack};

use crate::fetch::{
    spawn_chunk_fetch, spawn_head_fetch, spawn_image_load, spawn_sweep, CarouselEvent, EventSender,
};
use crate::gesture::{Direction, DragTracker};
use crate::marker::{FetchMarker, MarkerStore};
use crate::preload::{decode_data_uri, ImageBytes, ImageLoader, PreloadWindow};
use crate::refresh::RefreshSchedule;
use crate::source::{FetchOutcome, TrackSource};
use crate::transition::{Clock, ColorTransition, SystemClock};

const EVENT_CAPACITY: usize = 64;

/// Carousel tuning
#[derive(Debug, Clone, PartialEq)]
pub struct CarouselSettings {
    pub chunk_size: usize,
    pub prefetch_threshold: usize,
    pub preload_ahead: usize,
    pub transition: Duration,
    pub swipe_threshold_px: f32,
    /// `None` disables the periodic refresh
    pub refresh_interval: Option<Duration>,
    pub marker_validity: Duration,
}

impl CarouselSettings {
    pub fn from_config(config: &CarouselConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            prefetch_threshold: config.prefetch_threshold,
            preload_ahead: config.preload_ahead,
            transition: Duration::from_millis(config.transition_ms),
            swipe_threshold_px: config.swipe_threshold_px,
            refresh_interval: (config.refresh_interval_secs > 0)
                .then(|| Duration::from_secs(config.refresh_interval_secs)),
            marker_validity: Duration::from_secs(config.marker_validity_secs),
        }
    }
}

impl Default for CarouselSettings {
    fn default() -> Self {
        Self::from_config(&CarouselConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Ready,
}

/// What applying one background event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Tracks appended to the list
    Appended(usize),
    ReachedEnd,
    /// List replaced by a newer head
    Replaced,
    Unchanged,
    /// Result belonged to an older list or a window it left
    Discarded,
    FetchFailed,
    SweepFinished,
    RefreshStarted,
    ImageReady,
}

pub struct CarouselStore {
    source: Arc<dyn TrackSource>,
    images: Arc<dyn ImageLoader>,
    markers: Arc<dyn MarkerStore>,
    clock: Arc<dyn Clock>,
    settings: CarouselSettings,

    phase: Phase,
    tracks: Vec<EnrichedTrack>,
    /// Decoded inline art, index-aligned with `tracks`
    inline_art: Vec<Option<ImageBytes>>,
    cursor: usize,
    reached_end: bool,
    is_fetching: bool,
    refreshing: bool,
    generation: u64,

    root: CancellationToken,
    fetch_token: Option<CancellationToken>,
    refresh: Option<RefreshSchedule>,
    events_tx: EventSender,
    events_rx: mpsc::Receiver<CarouselEvent>,

    preload: PreloadWindow,
    transition: Option<ColorTransition>,
    drag: DragTracker,
}

impl CarouselStore {
    pub fn new(
        source: Arc<dyn TrackSource>,
        images: Arc<dyn ImageLoader>,
        markers: Arc<dyn MarkerStore>,
        settings: CarouselSettings,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);

        Self {
            source,
            images,
            markers,
            clock: Arc::new(SystemClock),
            preload: PreloadWindow::new(settings.preload_ahead),
            drag: DragTracker::new(settings.swipe_threshold_px),
            settings,
            phase: Phase::Idle,
            tracks: Vec::new(),
            inline_art: Vec::new(),
            cursor: 0,
            reached_end: false,
            is_fetching: false,
            refreshing: false,
            generation: 0,
            root: CancellationToken::new(),
            fetch_token: None,
            refresh: None,
            events_tx,
            events_rx,
            transition: None,
        }
    }

    /// Replace the clock driving palette transitions
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tracks(&self) -> &[EnrichedTrack] {
        &self.tracks
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> Option<&EnrichedTrack> {
        self.tracks.get(self.cursor)
    }

    pub fn reached_end(&self) -> bool {
        self.reached_end
    }

    pub fn is_fetching(&self) -> bool {
        self.is_fetching
    }

    /// Bumped whenever the list is replaced
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn settings(&self) -> &CarouselSettings {
        &self.settings
    }

    /// Number of art entries currently preloading or preloaded
    pub fn preloaded_len(&self) -> usize {
        self.preload.len()
    }

    pub fn refresh_scheduled(&self) -> bool {
        self.refresh.as_ref().is_some_and(RefreshSchedule::is_running)
    }

    /// Fetch the first chunk and start background work
    ///
    /// Failures leave the store `Ready` with whatever it has; the periodic
    /// refresh fills an empty list later.
    pub async fn load(&mut self) {
        if self.phase != Phase::Idle {
            return;
        }
        self.phase = Phase::Loading;

        let range = RangeQuery::new(0, self.settings.chunk_size);
        match self.source.fetch_range(range).await {
            Ok(outcome) => {
                let exhausted = outcome.exhausts(range);
                if let FetchOutcome::Tracks(batch) = outcome {
                    self.replace_tracks(batch);
                }
                if exhausted {
                    self.mark_reached_end();
                }
            }
            Err(e) => {
                warn!(error = %e, "Initial track fetch failed");
            }
        }

        self.phase = Phase::Ready;
        info!(tracks = self.tracks.len(), reached_end = self.reached_end, "Carousel loaded");

        if !self.tracks.is_empty() {
            self.start_transition();
        }

        if !self.reached_end && !self.tracks.is_empty() {
            if self.marker_is_fresh() {
                debug!("Recent full fetch on record, skipping background sweep");
            } else {
                self.start_sweep();
            }
        }

        self.refresh_preload();
        self.maybe_fetch_ahead();

        if let Some(period) = self.settings.refresh_interval {
            self.refresh = Some(RefreshSchedule::start(
                period,
                &self.root,
                self.events_tx.clone(),
                CarouselEvent::RefreshTick,
            ));
        }
    }

    /// Move the cursor one step, wrapping at both ends
    pub fn advance(&mut self, direction: Direction) {
        let len = self.tracks.len();
        if len == 0 {
            return;
        }

        self.cursor = match direction {
            Direction::Next => (self.cursor + 1) % len,
            Direction::Previous => (self.cursor + len - 1) % len,
        };
        debug!(cursor = self.cursor, len, ?direction, "Advanced");

        self.start_transition();
        self.refresh_preload();
        self.maybe_fetch_ahead();
    }

    pub fn drag_start(&mut self, x: f32) {
        self.drag.start(x);
    }

    /// Finish a drag, advancing if it went far enough
    pub fn drag_end(&mut self, x: f32) -> Option<Direction> {
        let direction = self.drag.end(x)?;
        self.advance(direction);
        Some(direction)
    }

    /// Palette to paint right now
    pub fn palette(&self) -> ColorPalette {
        match &self.transition {
            Some(transition) => transition.palette_at(self.clock.now()),
            None => self
                .current()
                .map(|track| track.colors)
                .unwrap_or(ColorPalette::DEFAULT),
        }
    }

    /// Cross-fade progress of the current track in `[0, 1]`
    pub fn crossfade(&self) -> f64 {
        self.transition
            .as_ref()
            .map_or(1.0, |transition| transition.progress(self.clock.now()))
    }

    pub fn is_animating(&self) -> bool {
        self.transition
            .as_ref()
            .is_some_and(|transition| !transition.is_finished(self.clock.now()))
    }

    /// Art bytes for `index`: inline, preloaded, or not (yet) available
    pub fn image_for(&self, index: usize) -> Option<ImageBytes> {
        let track = self.tracks.get(index)?;
        if let Some(Some(bytes)) = self.inline_art.get(index) {
            return Some(Arc::clone(bytes));
        }
        self.preload.get(&track.album_art_url)
    }

    /// Apply every queued background result without waiting
    pub fn apply_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Wait for the next background result and apply it
    pub async fn next_event(&mut self) -> Option<Applied> {
        let event = self.events_rx.recv().await?;
        Some(self.apply(event))
    }

    fn apply(&mut self, event: CarouselEvent) -> Applied {
        match event {
            CarouselEvent::Chunk {
                generation,
                range,
                outcome,
                sweep,
            } => self.apply_chunk(generation, range, outcome, sweep),
            CarouselEvent::SweepFinished {
                generation,
                completed,
            } => self.apply_sweep_finished(generation, completed),
            CarouselEvent::RefreshTick => self.start_refresh(),
            CarouselEvent::Head { outcome } => self.apply_head(outcome),
            CarouselEvent::Image { url, bytes } => match bytes {
                Ok(bytes) => {
                    if self.preload.complete(&url, bytes) {
                        Applied::ImageReady
                    } else {
                        Applied::Discarded
                    }
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "Art preload failed");
                    self.preload.fail(&url);
                    Applied::FetchFailed
                }
            },
        }
    }

    fn apply_chunk(
        &mut self,
        generation: u64,
        range: RangeQuery,
        outcome: Result<FetchOutcome, String>,
        sweep: bool,
    ) -> Applied {
        if generation != self.generation {
            debug!(generation, current = self.generation, "Discarding chunk from replaced list");
            return Applied::Discarded;
        }
        if !sweep {
            self.is_fetching = false;
            self.fetch_token = None;
        }

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                // Retried by the next advance
                warn!(start = range.start, end = range.end, error = %e, "Track fetch failed");
                return Applied::FetchFailed;
            }
        };

        let exhausted = outcome.exhausts(range);
        let mut applied = Applied::Unchanged;
        if let FetchOutcome::Tracks(batch) = outcome {
            if range.start != self.tracks.len() {
                debug!(start = range.start, len = self.tracks.len(), "Discarding non-contiguous chunk");
                return Applied::Discarded;
            }
            applied = Applied::Appended(batch.len());
            self.append_tracks(batch);
        }

        if exhausted {
            self.mark_reached_end();
            if applied == Applied::Unchanged {
                applied = Applied::ReachedEnd;
            }
        }

        self.refresh_preload();
        if !sweep {
            self.maybe_fetch_ahead();
        }
        applied
    }

    fn apply_sweep_finished(&mut self, generation: u64, completed: bool) -> Applied {
        if generation != self.generation {
            return Applied::Discarded;
        }
        self.is_fetching = false;
        self.fetch_token = None;

        if completed {
            info!(tracks = self.tracks.len(), "Background sweep reached end of history");
            if let Err(e) = self.markers.save(&FetchMarker::at(Utc::now())) {
                warn!(error = %e, "Failed to record full fetch");
            }
        }
        Applied::SweepFinished
    }

    fn start_refresh(&mut self) -> Applied {
        if self.refreshing || self.phase != Phase::Ready {
            return Applied::Unchanged;
        }
        self.refreshing = true;
        spawn_head_fetch(
            Arc::clone(&self.source),
            self.settings.chunk_size,
            self.root.child_token(),
            self.events_tx.clone(),
        );
        Applied::RefreshStarted
    }

    fn apply_head(&mut self, outcome: Result<FetchOutcome, String>) -> Applied {
        self.refreshing = false;

        let batch = match outcome {
            Ok(FetchOutcome::Tracks(batch)) if !batch.is_empty() => batch,
            // An empty head never wipes what is on screen
            Ok(_) => return Applied::Unchanged,
            Err(e) => {
                warn!(error = %e, "Refresh fetch failed");
                return Applied::FetchFailed;
            }
        };

        let changed = match (self.tracks.first(), batch.first()) {
            (Some(current), Some(latest)) => !current.is_same_play(latest),
            (None, Some(_)) => true,
            _ => false,
        };
        if !changed {
            return Applied::Unchanged;
        }

        info!(latest = %batch[0].name, "New play at head of history, replacing tracks");
        let exhausted = batch.len() < self.settings.chunk_size;

        self.generation += 1;
        if let Some(token) = self.fetch_token.take() {
            token.cancel();
        }
        self.is_fetching = false;
        self.replace_tracks(batch);
        self.cursor = 0;

        self.start_transition();
        self.refresh_preload();
        if exhausted {
            self.mark_reached_end();
        } else if self.reached_end {
            // Fetch-ahead is off once the end was seen; refill the tail
            debug!(from = self.tracks.len(), "Re-fetching history behind new head");
            self.start_sweep();
        } else {
            self.maybe_fetch_ahead();
        }
        Applied::Replaced
    }

    fn replace_tracks(&mut self, batch: Vec<EnrichedTrack>) {
        self.tracks.clear();
        self.inline_art.clear();
        self.append_tracks(batch);
    }

    fn append_tracks(&mut self, batch: Vec<EnrichedTrack>) {
        self.inline_art.extend(batch.iter().map(|track| {
            track
                .inline_image
                .as_deref()
                .and_then(decode_data_uri)
                .map(Arc::new)
        }));
        self.tracks.extend(batch);
    }

    fn mark_reached_end(&mut self) {
        if !self.reached_end {
            info!(tracks = self.tracks.len(), "Reached end of listening history");
            self.reached_end = true;
        }
    }

    fn marker_is_fresh(&self) -> bool {
        match self.markers.load() {
            Ok(Some(marker)) => marker.is_fresh(Utc::now(), self.settings.marker_validity),
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable fetch marker");
                false
            }
        }
    }

    fn new_fetch_token(&mut self) -> CancellationToken {
        let token = self.root.child_token();
        self.fetch_token = Some(token.clone());
        token
    }

    fn start_sweep(&mut self) {
        self.is_fetching = true;
        let token = self.new_fetch_token();
        spawn_sweep(
            Arc::clone(&self.source),
            self.tracks.len(),
            self.settings.chunk_size,
            self.generation,
            token,
            self.events_tx.clone(),
        );
    }

    fn maybe_fetch_ahead(&mut self) {
        if self.phase != Phase::Ready || self.reached_end || self.is_fetching || self.tracks.is_empty() {
            return;
        }

        let remaining = self.tracks.len() - 1 - self.cursor;
        if remaining > self.settings.prefetch_threshold {
            return;
        }

        let start = self.tracks.len();
        let range = RangeQuery::new(start, start + self.settings.chunk_size);
        debug!(remaining, start = range.start, end = range.end, "Fetching ahead");

        self.is_fetching = true;
        let token = self.new_fetch_token();
        spawn_chunk_fetch(
            Arc::clone(&self.source),
            range,
            self.generation,
            token,
            self.events_tx.clone(),
        );
    }

    /// Last navigation wins: the new blend starts from whatever is on screen
    fn start_transition(&mut self) {
        let Some(target) = self.current().map(|track| track.colors) else {
            return;
        };
        let now = self.clock.now();
        let from = self
            .transition
            .as_ref()
            .map_or(ColorPalette::DEFAULT, |transition| transition.palette_at(now));
        self.transition = Some(ColorTransition::new(from, target, now, self.settings.transition));
    }

    fn refresh_preload(&mut self) {
        let indices = self.preload.indices(self.cursor, self.tracks.len());
        let urls: Vec<&str> = indices
            .iter()
            .filter_map(|&i| self.tracks.get(i))
            .filter(|track| track.inline_image.is_none() && !track.album_art_url.is_empty())
            .map(|track| track.album_art_url.as_str())
            .collect();

        let missing: Vec<String> = self
            .preload
            .retain_window(&urls)
            .into_iter()
            .map(String::from)
            .collect();

        for url in missing {
            let token = self.root.child_token();
            self.preload.mark_loading(&url, token.clone());
            spawn_image_load(Arc::clone(&self.images), url, token, self.events_tx.clone());
        }
    }
}

impl Drop for CarouselStore {
    fn drop(&mut self) {
        debug!("Carousel store dropped, cancelling background work");
        self.root.cancel();
    }
}
