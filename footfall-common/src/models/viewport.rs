// File: footfall-common/src/models/viewport.rs

use serde::{Deserialize, Serialize};

/// One sample of the host window's dimensions, in CSS pixels.
///
/// The detector heuristic compares the outer (chrome included) and inner
/// (content area) sizes; a docked inspection pane shows up as a large delta
/// on one axis.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Default)]
pub struct ViewportSample {
    pub inner_width: u32,
    pub inner_height: u32,
    pub outer_width: u32,
    pub outer_height: u32,
}

impl ViewportSample {
    pub fn new(inner_width: u32, inner_height: u32, outer_width: u32, outer_height: u32) -> Self {
        Self { inner_width, inner_height, outer_width, outer_height }
    }

    /// Horizontal chrome: outer minus inner width, zero if inner is wider.
    pub fn width_delta(&self) -> u32 {
        self.outer_width.saturating_sub(self.inner_width)
    }

    /// Vertical chrome: outer minus inner height, zero if inner is taller.
    pub fn height_delta(&self) -> u32 {
        self.outer_height.saturating_sub(self.inner_height)
    }

    /// True when either axis delta exceeds `threshold_px`.
    pub fn exceeds_threshold(&self, threshold_px: u32) -> bool {
        self.width_delta() > threshold_px || self.height_delta() > threshold_px
    }
}
