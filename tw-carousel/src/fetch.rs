//! Background tasks feeding the carousel store
//!
//! Every task holds a child of the store's cancellation token and reports
//! through the store's event channel. Results carry the list generation they
//! were started under; the store drops anything from an older generation.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tw_common::api::RangeQuery;

use crate::preload::ImageLoader;
use crate::source::{FetchOutcome, TrackSource};

/// Message from a background task to the store
#[derive(Debug, Clone)]
pub enum CarouselEvent {
    /// One chunk fetched ahead of the cursor, or by the sweep
    Chunk {
        generation: u64,
        range: RangeQuery,
        outcome: Result<FetchOutcome, String>,
        sweep: bool,
    },
    /// The sweep stopped; `completed` when it reached the end of history
    SweepFinished { generation: u64, completed: bool },
    /// Time to re-check the head of the history
    RefreshTick,
    /// Fresh first chunk for the refresh comparison
    Head { outcome: Result<FetchOutcome, String> },
    /// Preloaded art arrived (or failed)
    Image { url: String, bytes: Result<Vec<u8>, String> },
}

pub type EventSender = mpsc::Sender<CarouselEvent>;

async fn send(tx: &EventSender, event: CarouselEvent) {
    if tx.send(event).await.is_err() {
        debug!("Carousel store gone, dropping background result");
    }
}

/// Fetch one chunk ahead of the cursor
pub fn spawn_chunk_fetch(
    source: Arc<dyn TrackSource>,
    range: RangeQuery,
    generation: u64,
    token: CancellationToken,
    tx: EventSender,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {
                debug!(start = range.start, end = range.end, "Chunk fetch cancelled");
            }
            outcome = source.fetch_range(range) => {
                let outcome = outcome.map_err(|e| e.to_string());
                send(&tx, CarouselEvent::Chunk { generation, range, outcome, sweep: false }).await;
            }
        }
    });
}

/// Fetch successive chunks from `from` until the history runs out
///
/// Stops at the first failure without retrying.
pub fn spawn_sweep(
    source: Arc<dyn TrackSource>,
    from: usize,
    chunk_size: usize,
    generation: u64,
    token: CancellationToken,
    tx: EventSender,
) {
    tokio::spawn(async move {
        let mut start = from;
        let completed = loop {
            let range = RangeQuery::new(start, start + chunk_size);
            let outcome = tokio::select! {
                _ = token.cancelled() => {
                    debug!(start, "Background sweep cancelled");
                    return;
                }
                outcome = source.fetch_range(range) => outcome,
            };

            let (exhausted, failed) = match &outcome {
                Ok(outcome) => (outcome.exhausts(range), false),
                Err(e) => {
                    warn!(start, error = %e, "Background sweep stopped on fetch failure");
                    (false, true)
                }
            };

            send(
                &tx,
                CarouselEvent::Chunk {
                    generation,
                    range,
                    outcome: outcome.map_err(|e| e.to_string()),
                    sweep: true,
                },
            )
            .await;

            if failed {
                break false;
            }
            if exhausted {
                break true;
            }
            start = range.end;
        };

        if !token.is_cancelled() {
            send(&tx, CarouselEvent::SweepFinished { generation, completed }).await;
        }
    });
}

/// Re-fetch the first chunk for a refresh
pub fn spawn_head_fetch(
    source: Arc<dyn TrackSource>,
    chunk_size: usize,
    token: CancellationToken,
    tx: EventSender,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            outcome = source.fetch_range(RangeQuery::new(0, chunk_size)) => {
                let outcome = outcome.map_err(|e| e.to_string());
                send(&tx, CarouselEvent::Head { outcome }).await;
            }
        }
    });
}

pub fn spawn_image_load(
    loader: Arc<dyn ImageLoader>,
    url: String,
    token: CancellationToken,
    tx: EventSender,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            bytes = loader.load(&url) => {
                let bytes = bytes.map_err(|e| e.to_string());
                send(&tx, CarouselEvent::Image { url, bytes }).await;
            }
        }
    });
}
