//! Horizontal swipe recognition

/// Navigation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// Tracks one drag from press to release
#[derive(Debug, Clone)]
pub struct DragTracker {
    threshold_px: f32,
    start_x: Option<f32>,
}

impl DragTracker {
    pub fn new(threshold_px: f32) -> Self {
        Self {
            threshold_px,
            start_x: None,
        }
    }

    pub fn start(&mut self, x: f32) {
        self.start_x = Some(x);
    }

    pub fn is_dragging(&self) -> bool {
        self.start_x.is_some()
    }

    /// Finish the drag; leftward past the threshold is `Next`
    ///
    /// A release without a press is ignored.
    pub fn end(&mut self, x: f32) -> Option<Direction> {
        let start = self.start_x.take()?;
        let dx = x - start;

        if dx < -self.threshold_px {
            Some(Direction::Next)
        } else if dx > self.threshold_px {
            Some(Direction::Previous)
        } else {
            None
        }
    }
}
