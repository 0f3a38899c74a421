// File: footfall-common/src/traits/host_traits.rs

use crate::models::viewport::ViewportSample;

/// Source of the host window's current dimensions.
///
/// Sampling must be cheap and non-blocking; the detector calls it on every
/// poll tick. Hosts typically keep the latest resize event in shared state
/// and hand out a snapshot here.
#[cfg_attr(test, mockall::automock)]
pub trait ViewportSource: Send + Sync {
    fn sample(&self) -> ViewportSample;
}
