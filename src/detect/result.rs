/// Axis-aligned box in pixel coordinates. `x2`/`y2` are exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        span(self.x1, self.x2)
    }

    pub fn height(&self) -> i32 {
        span(self.y1, self.y2)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Vertical center, rounded down.
    pub fn center_y(&self) -> i32 {
        (i64::from(self.y1) + i64::from(self.y2)).div_euclid(2) as i32
    }

    /// Translate by an offset (crop-local to frame coordinates). Saturates.
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(
            self.x1.saturating_add(dx),
            self.y1.saturating_add(dy),
            self.x2.saturating_add(dx),
            self.y2.saturating_add(dy),
        )
    }

    /// Grow by `margin` pixels on every side. Saturates.
    pub fn expand(&self, margin: i32) -> Self {
        Self::new(
            self.x1.saturating_sub(margin),
            self.y1.saturating_sub(margin),
            self.x2.saturating_add(margin),
            self.y2.saturating_add(margin),
        )
    }

    /// Clip to `[0, width) x [0, height)`. Inverted boxes collapse to empty.
    pub fn clip_to(&self, width: u32, height: u32) -> Self {
        let w = i32::try_from(width).unwrap_or(i32::MAX);
        let h = i32::try_from(height).unwrap_or(i32::MAX);
        let x1 = self.x1.clamp(0, w);
        let y1 = self.y1.clamp(0, h);
        Self::new(x1, y1, self.x2.clamp(x1, w), self.y2.clamp(y1, h))
    }
}

fn span(start: i32, end: i32) -> i32 {
    (i64::from(end) - i64::from(start)).clamp(0, i64::from(i32::MAX)) as i32
}

/// One labelled box produced by a detector backend.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}
