//! Frame bandwidth budget for the page-in path
//!
//! Uploading paged-out resources competes with rendering for frame time. The
//! frame driver caps the fraction of each frame the page-in path may spend;
//! a resource loader converts that cap into a byte allowance before deciding
//! how much to transfer in the current frame.
//!
//! # Target Frame Times
//! - 120 FPS (ProMotion): 8.33ms per frame
//! - 60 FPS (standard): 16.67ms per frame

use std::time::Duration;

/// Default frame time for 60 FPS displays (16.67ms)
pub const FRAME_BUDGET_60FPS: Duration = Duration::from_micros(16_667);

/// Frame time for 120 FPS displays (8.33ms)
pub const FRAME_BUDGET_120FPS: Duration = Duration::from_micros(8_333);

/// Fraction of a frame the page-in path may consume by default
pub const DEFAULT_BANDWIDTH_UTILIZATION: f32 = 0.25;

/// Page-in bandwidth cap for one frame
///
/// # Example
///
/// ```
/// use gpu_residency::bandwidth::{FrameBandwidth, FRAME_BUDGET_60FPS};
///
/// let mut bandwidth = FrameBandwidth::new(FRAME_BUDGET_60FPS);
/// bandwidth.set_utilization(0.5);
///
/// // A loader that uploads 1 GB/s may move about 8 MB this frame.
/// let bytes = bandwidth.bytes_per_frame(1_000_000_000);
/// assert!(bytes > 8_000_000 && bytes < 8_400_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameBandwidth {
    /// Total time of one frame
    frame_time: Duration,

    /// Fraction of `frame_time` available to page-ins (0.0 to 1.0)
    utilization: f32,
}

impl FrameBandwidth {
    /// Create a bandwidth cap with the default utilization
    pub fn new(frame_time: Duration) -> Self {
        Self {
            frame_time,
            utilization: DEFAULT_BANDWIDTH_UTILIZATION,
        }
    }

    /// Create a bandwidth cap for 60 FPS displays
    pub fn for_60fps() -> Self {
        Self::new(FRAME_BUDGET_60FPS)
    }

    /// Create a bandwidth cap for 120 FPS displays
    pub fn for_120fps() -> Self {
        Self::new(FRAME_BUDGET_120FPS)
    }

    /// Set the utilization fraction, builder style
    pub fn with_utilization(mut self, utilization: f32) -> Self {
        self.set_utilization(utilization);
        self
    }

    /// Set the utilization fraction, clamped to 0.0..=1.0
    pub fn set_utilization(&mut self, utilization: f32) {
        self.utilization = if utilization.is_nan() {
            0.0
        } else {
            utilization.clamp(0.0, 1.0)
        };
    }

    pub fn utilization(&self) -> f32 {
        self.utilization
    }

    pub fn frame_time(&self) -> Duration {
        self.frame_time
    }

    /// Time the page-in path may use in one frame
    pub fn page_in_time(&self) -> Duration {
        let nanos = self.frame_time.as_nanos() as f64 * f64::from(self.utilization);
        Duration::from_nanos(nanos.round() as u64)
    }

    /// Bytes a loader with the given throughput may transfer per frame
    pub fn bytes_per_frame(&self, throughput_bytes_per_second: u64) -> u64 {
        let bytes = self.page_in_time().as_nanos() * u128::from(throughput_bytes_per_second)
            / 1_000_000_000;
        bytes.min(u128::from(u64::MAX)) as u64
    }

    /// Bytes still allowed this frame after `used` bytes were paged in
    pub fn remaining(&self, throughput_bytes_per_second: u64, used: u64) -> u64 {
        self.bytes_per_frame(throughput_bytes_per_second)
            .saturating_sub(used)
    }
}

impl Default for FrameBandwidth {
    fn default() -> Self {
        Self::for_60fps()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_60fps_quarter_frame() {
        let bandwidth = FrameBandwidth::default();
        assert_eq!(bandwidth.frame_time(), FRAME_BUDGET_60FPS);
        assert_eq!(bandwidth.utilization(), DEFAULT_BANDWIDTH_UTILIZATION);
    }

    #[test]
    fn test_utilization_is_clamped() {
        let mut bandwidth = FrameBandwidth::for_120fps();
        bandwidth.set_utilization(1.5);
        assert_eq!(bandwidth.utilization(), 1.0);
        bandwidth.set_utilization(-0.25);
        assert_eq!(bandwidth.utilization(), 0.0);
        bandwidth.set_utilization(f32::NAN);
        assert_eq!(bandwidth.utilization(), 0.0);
    }

    #[test]
    fn test_page_in_time() {
        let bandwidth = FrameBandwidth::new(Duration::from_millis(20)).with_utilization(0.5);
        assert_eq!(bandwidth.page_in_time(), Duration::from_millis(10));
    }

    #[test]
    fn test_bytes_per_frame() {
        let bandwidth = FrameBandwidth::new(Duration::from_millis(10)).with_utilization(1.0);
        assert_eq!(bandwidth.bytes_per_frame(1_000_000), 10_000);

        let idle = bandwidth.with_utilization(0.0);
        assert_eq!(idle.bytes_per_frame(1_000_000), 0);
    }

    #[test]
    fn test_remaining_saturates() {
        let bandwidth = FrameBandwidth::new(Duration::from_millis(10)).with_utilization(1.0);
        assert_eq!(bandwidth.remaining(1_000_000, 4_000), 6_000);
        assert_eq!(bandwidth.remaining(1_000_000, 40_000), 0);
    }
}
