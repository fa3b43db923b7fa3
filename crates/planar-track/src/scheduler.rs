//! Round-robin selection of the surface that receives detections.

/// Bounded cursor over `[0, ratio)`.
///
/// Positions below the surface count select that surface; positions at or
/// beyond it are idle frames.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DetectionScheduler {
    cursor: usize,
    ratio: usize,
}

impl DetectionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn ratio(&self) -> usize {
        self.ratio
    }

    /// Surface selected for the current frame.
    pub fn target(&self, surface_count: usize) -> Option<usize> {
        (self.cursor < surface_count).then_some(self.cursor)
    }

    /// Move to the next frame, wrapping at the ratio bound.
    pub fn advance(&mut self) {
        self.cursor += 1;
        if self.cursor >= self.ratio {
            self.cursor = 0;
        }
    }

    /// Reset the bound after the surface count changed.
    pub fn reset_bound(&mut self, surface_count: usize) {
        self.ratio = surface_count;
        self.wrap();
    }

    /// Set the ratio, clamped so every surface keeps a slot. Returns the
    /// ratio actually applied.
    pub fn set_ratio(&mut self, ratio: usize, surface_count: usize) -> usize {
        self.ratio = ratio.max(surface_count);
        self.wrap();
        self.ratio
    }

    fn wrap(&mut self) {
        if self.cursor >= self.ratio {
            self.cursor = 0;
        }
    }
}
