mod loopback;

pub use loopback::V4L2Output;

use anyhow::Result;
use image::{RgbImage, RgbaImage};

/// Trait for preview destinations
pub trait OutputSink {
    /// Write a composed frame to the output
    fn write_frame(&mut self, frame: &RgbaImage) -> Result<()>;

    /// Get the expected output resolution
    fn resolution(&self) -> (u32, u32);
}

/// Drop alpha by compositing over black, for sinks that cannot show it
pub fn flatten(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y);
        let a = p[3] as u16;
        let scale = |c: u8| ((c as u16 * a + 127) / 255) as u8;
        image::Rgb([scale(p[0]), scale(p[1]), scale(p[2])])
    })
}
