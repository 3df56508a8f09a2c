//! tw-carousel library - progressive track carousel
//!
//! Client side of trackwall: pages enriched tracks in from tw-server as the
//! cursor approaches the end of what it has, preloads art, and cross-fades
//! palettes between tracks.

pub mod error;
pub mod fetch;
pub mod gesture;
pub mod marker;
pub mod preload;
pub mod refresh;
pub mod source;
pub mod store;
pub mod transition;

pub use error::{CarouselError, Result};
pub use gesture::{Direction, DragTracker};
pub use marker::{FetchMarker, JsonMarkerStore, MarkerStore, MemoryMarkerStore};
pub use preload::{HttpImageLoader, ImageLoader, PreloadWindow};
pub use source::{FetchOutcome, HttpTrackSource, TrackSource};
pub use store::{Applied, CarouselSettings, CarouselStore, Phase};
pub use transition::{Clock, ColorTransition, FrameDriver, IntervalFrames, ManualClock, SystemClock};
