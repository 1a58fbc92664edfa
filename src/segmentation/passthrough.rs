use super::types::{SegmentationModel, SegmentationResult};
use anyhow::Result;
use image::RgbImage;

/// Stand-in used when no model file is configured
///
/// Every pixel is reported as foreground, so the background effect has
/// nothing to cut out but captures still work.
pub struct Passthrough {
    width: u32,
    height: u32,
}

impl Passthrough {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl SegmentationModel for Passthrough {
    fn segment(&mut self, frame: RgbImage) -> Result<SegmentationResult> {
        let (width, height) = frame.dimensions();
        let mask = vec![1.0; width as usize * height as usize];
        Ok(SegmentationResult { frame, mask })
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
