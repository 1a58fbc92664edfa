use anyhow::Result;
use image::RgbImage;

/// Alpha matte: grayscale values where 0.0 = background, 1.0 = foreground
/// Dimensions match the input frame dimensions
pub type Matte = Vec<f32>;

/// A frame paired with the matte the model produced for it.
///
/// The compositor only ever sees these, so the preview and a still capture
/// always draw the frame the mask was computed from.
#[derive(Clone, Debug)]
pub struct SegmentationResult {
    pub frame: RgbImage,
    pub mask: Matte,
}

impl SegmentationResult {
    pub fn dimensions(&self) -> (u32, u32) {
        self.frame.dimensions()
    }
}

/// Quality/performance tier, fixed when the model is created
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelTier {
    /// Square input, best for portrait framing
    General,
    /// 16:9 input, cheaper and matched to typical webcam framing
    Landscape,
}

impl ModelTier {
    /// Tier matching the camera's framing: landscape for wide captures,
    /// the square general tier otherwise
    pub fn for_capture(width: u32, height: u32) -> Self {
        if width > height {
            ModelTier::Landscape
        } else {
            ModelTier::General
        }
    }

    /// Model input dimensions (width, height) for this tier
    pub fn input_size(self) -> (u32, u32) {
        match self {
            ModelTier::General => (512, 512),
            ModelTier::Landscape => (512, 288),
        }
    }
}

/// Trait for segmentation models
/// Allows swapping between different backends (RVM, passthrough, ...)
pub trait SegmentationModel {
    /// Process a frame and return it together with its alpha matte
    ///
    /// The matte has values 0.0-1.0, flattened in row-major order, at the
    /// frame's own resolution.
    fn segment(&mut self, frame: RgbImage) -> Result<SegmentationResult>;

    /// Reset internal state (for models with temporal/recurrent components)
    ///
    /// Call this when:
    /// - Switching cameras
    /// - Starting a new session
    fn reset_state(&mut self) {
        // Default implementation: no-op for stateless models
    }

    /// Get the model's preferred input dimensions
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_tier_keeps_hidden_states_integral() {
        // RVM hidden states go down to 1/32 of the input
        for tier in [ModelTier::General, ModelTier::Landscape] {
            let (w, h) = tier.input_size();
            assert_eq!(w % 32, 0);
            assert_eq!(h % 32, 0);
        }
    }

    #[test]
    fn tier_follows_capture_framing() {
        assert_eq!(ModelTier::for_capture(1280, 720), ModelTier::Landscape);
        assert_eq!(ModelTier::for_capture(720, 1280), ModelTier::General);
        assert_eq!(ModelTier::for_capture(640, 640), ModelTier::General);
    }
}
