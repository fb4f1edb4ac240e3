/// The video side of a session, reduced to what alignment needs.
///
/// A presentation layer that decodes pixels implements this for its capture
/// handle. The session owns the source exclusively and drops the old one
/// before opening its replacement.
pub trait FrameSource {
    fn frame_count(&self) -> usize;

    /// Frames per second, if the container reports one.
    fn fps(&self) -> Option<f64>;

    /// Free the underlying capture. Called once before the source is dropped.
    fn release(&mut self) {}
}

/// A source with a known frame count and constant rate and no pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedRateSource {
    pub frame_count: usize,
    pub fps: f64,
}

impl FixedRateSource {
    pub fn new(frame_count: usize, fps: f64) -> Self {
        FixedRateSource { frame_count, fps }
    }
}

impl FrameSource for FixedRateSource {
    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn fps(&self) -> Option<f64> {
        (self.fps > 0.0).then_some(self.fps)
    }
}

/// Seconds from the start of the video for `frame` at `fps`.
///
/// A non-positive rate falls back to one frame per second.
pub fn frame_seconds(frame: usize, fps: f64) -> f64 {
    if fps > 0.0 {
        frame as f64 / fps
    } else {
        frame as f64
    }
}
