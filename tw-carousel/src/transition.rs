//! Palette cross-fade
//!
//! A `ColorTransition` is a pure function of time: the store samples it with
//! whatever `Clock` it was given, so tests can step time by hand. Rendering
//! loops pace themselves with a `FrameDriver`.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tw_common::ColorPalette;

/// Roughly 60 frames per second
pub const FRAME_PERIOD: Duration = Duration::from_millis(16);

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.origin + offset
    }
}

/// Linear per-channel blend from one palette to another
#[derive(Debug, Clone, PartialEq)]
pub struct ColorTransition {
    from: ColorPalette,
    to: ColorPalette,
    started_at: Instant,
    duration: Duration,
}

impl ColorTransition {
    pub fn new(from: ColorPalette, to: ColorPalette, started_at: Instant, duration: Duration) -> Self {
        Self {
            from,
            to,
            started_at,
            duration,
        }
    }

    pub fn target(&self) -> &ColorPalette {
        &self.to
    }

    /// Fraction complete in `[0, 1]`; a zero duration is complete at once
    pub fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started_at);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    pub fn palette_at(&self, now: Instant) -> ColorPalette {
        self.from.lerp(&self.to, self.progress(now))
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        self.progress(now) >= 1.0
    }
}

/// Paces a render loop
#[async_trait]
pub trait FrameDriver: Send {
    async fn next_frame(&mut self);
}

/// Frame driver on a tokio interval; late frames are skipped, not bunched
pub struct IntervalFrames {
    timer: Interval,
}

impl IntervalFrames {
    pub fn new(period: Duration) -> Self {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { timer }
    }
}

impl Default for IntervalFrames {
    fn default() -> Self {
        Self::new(FRAME_PERIOD)
    }
}

#[async_trait]
impl FrameDriver for IntervalFrames {
    async fn next_frame(&mut self) {
        self.timer.tick().await;
    }
}
