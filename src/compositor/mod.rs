//! Frame compositing shared by the live preview and still capture.

pub mod filter;

pub use filter::Filter;

use image::{imageops, DynamicImage, RgbImage, Rgba, RgbaImage};

use crate::error::BoothError;
use crate::segmentation::SegmentationResult;

/// Gaussian sigma, in pixels, of the blurred-feed background
pub const BACKGROUND_BLUR_SIGMA: f32 = 8.0;

/// The blurred feed is computed at 1/N resolution and scaled back up
const BLUR_DOWNSCALE: u32 = 4;

/// What gets drawn beneath the cutout subject
#[derive(Clone, Copy, Debug)]
pub enum BackgroundLayer<'a> {
    /// Leave the background transparent
    None,
    /// Stretched to the frame's exact dimensions
    Image(&'a RgbaImage),
    /// The raw frame, blurred offscreen
    BlurredFeed,
}

/// Compose one output image from a segmentation result
///
/// 1. draw the frame
/// 2. if the effect is active, cut it out with the mask (destination-in)
///    and draw the background beneath it (destination-over)
/// 3. apply the filter to the whole result
///
/// The output always has the frame's dimensions.
pub fn compose(
    result: &SegmentationResult,
    effect_active: bool,
    background: BackgroundLayer<'_>,
    filter: &Filter,
) -> Result<RgbaImage, BoothError> {
    let _span = tracing::debug_span!("compose", effect_active).entered();

    let (width, height) = result.dimensions();
    let mut canvas = DynamicImage::ImageRgb8(result.frame.clone()).into_rgba8();
    if width == 0 || height == 0 {
        return Ok(canvas);
    }

    if effect_active {
        cutout(&mut canvas, &result.mask)?;

        match background {
            BackgroundLayer::None => {}
            BackgroundLayer::Image(image) => {
                if image.dimensions() == (width, height) {
                    draw_beneath(&mut canvas, image);
                } else {
                    let fitted =
                        imageops::resize(image, width, height, imageops::FilterType::Triangle);
                    draw_beneath(&mut canvas, &fitted);
                }
            }
            BackgroundLayer::BlurredFeed => {
                // Blurred on its own surface so the subject on `canvas` stays sharp
                let blurred = blurred_feed(&result.frame);
                draw_beneath(&mut canvas, &blurred);
            }
        }
    }

    filter.apply(&mut canvas);
    Ok(canvas)
}

/// Gaussian-blurred copy of `frame` at the frame's own size
///
/// The blur runs on a downscaled copy with the sigma scaled to match.
fn blurred_feed(frame: &RgbImage) -> RgbaImage {
    let (width, height) = frame.dimensions();
    let small_width = (width / BLUR_DOWNSCALE).max(1);
    let small_height = (height / BLUR_DOWNSCALE).max(1);
    let scale = width as f32 / small_width as f32;

    let small = imageops::resize(frame, small_width, small_height, imageops::FilterType::Triangle);
    let blurred = imageops::blur(&small, BACKGROUND_BLUR_SIGMA / scale);
    let full = imageops::resize(&blurred, width, height, imageops::FilterType::Triangle);
    DynamicImage::ImageRgb8(full).into_rgba8()
}

/// Destination-in: scale each pixel's alpha by the mask confidence
fn cutout(canvas: &mut RgbaImage, mask: &[f32]) -> Result<(), BoothError> {
    let (width, height) = canvas.dimensions();
    let expected = width as usize * height as usize;
    if mask.len() != expected {
        return Err(BoothError::MaskMismatch {
            width,
            height,
            expected,
            actual: mask.len(),
        });
    }

    for (pixel, confidence) in canvas.pixels_mut().zip(mask) {
        let alpha = pixel[3] as f32 * confidence.clamp(0.0, 1.0);
        pixel[3] = alpha.round() as u8;
    }
    Ok(())
}

/// Destination-over: fill in behind `canvas` with `layer`
///
/// Both images must share dimensions. Opaque canvas pixels are left
/// bit-for-bit unchanged.
fn draw_beneath(canvas: &mut RgbaImage, layer: &RgbaImage) {
    for (dst, src) in canvas.pixels_mut().zip(layer.pixels()) {
        *dst = over(*dst, *src);
    }
}

/// Porter-Duff `dst over src` on straight alpha
fn over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    match dst[3] {
        255 => return dst,
        0 => return src,
        _ => {}
    }

    let da = dst[3] as f32 / 255.0;
    let sa = src[3] as f32 / 255.0;
    let out_a = da + sa * (1.0 - da);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let value = (dst[c] as f32 * da + src[c] as f32 * sa * (1.0 - da)) / out_a;
        out[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    /// Left half foreground, right half background
    fn split_result(width: u32, height: u32) -> SegmentationResult {
        let frame = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 20) as u8, (y * 30) as u8, 200])
        });
        let mask = (0..height)
            .flat_map(|_| (0..width).map(move |x| if x < width / 2 { 1.0 } else { 0.0 }))
            .collect();
        SegmentationResult { frame, mask }
    }

    fn opaque(frame: &RgbImage) -> RgbaImage {
        DynamicImage::ImageRgb8(frame.clone()).into_rgba8()
    }

    #[test]
    fn inactive_effect_returns_raw_frame_for_every_background() {
        let result = split_result(8, 6);
        let backdrop = RgbaImage::from_pixel(8, 6, Rgba([1, 2, 3, 255]));
        for background in [
            BackgroundLayer::None,
            BackgroundLayer::Image(&backdrop),
            BackgroundLayer::BlurredFeed,
        ] {
            let out = compose(&result, false, background, &Filter::none()).unwrap();
            assert_eq!(out, opaque(&result.frame));
        }
    }

    #[test]
    fn inactive_effect_applies_filter_exactly() {
        let result = split_result(8, 6);
        let filter: Filter = "invert(1)".parse().unwrap();

        let mut expected = opaque(&result.frame);
        filter.apply(&mut expected);

        let out = compose(&result, false, BackgroundLayer::BlurredFeed, &filter).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn zero_confidence_is_fully_transparent_without_background() {
        let result = split_result(8, 6);
        let out = compose(&result, true, BackgroundLayer::None, &Filter::none()).unwrap();

        for (x, y, pixel) in out.enumerate_pixels() {
            if x < 4 {
                assert_eq!(pixel[3], 255);
                let src = result.frame.get_pixel(x, y);
                assert_eq!(&pixel.0[..3], &src.0[..]);
            } else {
                assert_eq!(pixel[3], 0, "pixel ({x}, {y}) should be transparent");
            }
        }
    }

    #[test]
    fn partial_confidence_scales_alpha() {
        let frame = RgbImage::from_pixel(2, 1, image::Rgb([100, 100, 100]));
        let result = SegmentationResult {
            frame,
            mask: vec![0.5, 0.25],
        };
        let out = compose(&result, true, BackgroundLayer::None, &Filter::none()).unwrap();
        assert_eq!(out.get_pixel(0, 0)[3], 128);
        assert_eq!(out.get_pixel(1, 0)[3], 64);
    }

    #[test]
    fn static_background_fills_every_transparent_pixel() {
        let result = split_result(8, 6);
        let backdrop = RgbaImage::from_pixel(8, 6, Rgba([9, 8, 7, 255]));
        let out = compose(
            &result,
            true,
            BackgroundLayer::Image(&backdrop),
            &Filter::none(),
        )
        .unwrap();

        for (x, y, pixel) in out.enumerate_pixels() {
            assert_eq!(pixel[3], 255);
            if x < 4 {
                assert_eq!(&pixel.0[..3], &result.frame.get_pixel(x, y).0[..]);
            } else {
                assert_eq!(pixel.0, [9, 8, 7, 255]);
            }
        }
    }

    #[test]
    fn static_background_is_stretched_to_frame() {
        let result = split_result(8, 6);
        let backdrop = RgbaImage::from_pixel(3, 2, Rgba([50, 60, 70, 255]));
        let out = compose(
            &result,
            true,
            BackgroundLayer::Image(&backdrop),
            &Filter::none(),
        )
        .unwrap();

        assert_eq!(out.dimensions(), (8, 6));
        assert_eq!(out.get_pixel(7, 5).0, [50, 60, 70, 255]);
        assert!(out.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn blurred_feed_keeps_foreground_sharp() {
        // High-frequency checkerboard so blurring is visible
        let frame = RgbImage::from_fn(32, 16, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        });
        let mask = (0..16)
            .flat_map(|_| (0..32).map(|x| if x < 16 { 1.0 } else { 0.0 }))
            .collect();
        let result = SegmentationResult { frame, mask };

        let out = compose(&result, true, BackgroundLayer::BlurredFeed, &Filter::none()).unwrap();

        let mut background_blurred = false;
        for (x, y, pixel) in out.enumerate_pixels() {
            let src = result.frame.get_pixel(x, y);
            assert_eq!(pixel[3], 255);
            if x < 16 {
                assert_eq!(&pixel.0[..3], &src.0[..], "foreground changed at ({x}, {y})");
            } else if pixel[0] != src[0] {
                background_blurred = true;
            }
        }
        assert!(background_blurred);
    }

    #[test]
    fn blurred_feed_matches_frame_dimensions() {
        for (width, height) in [(1280, 720), (33, 17), (3, 2), (1, 1)] {
            let frame = RgbImage::from_fn(width, height, |x, y| {
                image::Rgb([(x % 251) as u8, (y % 251) as u8, 40])
            });
            assert_eq!(blurred_feed(&frame).dimensions(), (width, height));
            assert!(blurred_feed(&frame).pixels().all(|p| p[3] == 255));
        }
    }

    #[test]
    fn blurred_feed_keeps_flat_colour() {
        let frame = RgbImage::from_pixel(64, 48, image::Rgb([90, 120, 200]));
        for pixel in blurred_feed(&frame).pixels() {
            for (c, expected) in [90u8, 120, 200].into_iter().enumerate() {
                assert!(pixel[c].abs_diff(expected) <= 1);
            }
        }
    }

    #[test]
    fn empty_frame_composes_to_empty_image() {
        let result = SegmentationResult {
            frame: RgbImage::new(0, 0),
            mask: Vec::new(),
        };
        let backdrop = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]));
        for background in [
            BackgroundLayer::None,
            BackgroundLayer::Image(&backdrop),
            BackgroundLayer::BlurredFeed,
        ] {
            let out = compose(&result, true, background, &"sepia(1)".parse().unwrap()).unwrap();
            assert_eq!(out.dimensions(), (0, 0));
        }
    }

    #[test]
    fn filter_applies_to_background_layer_too() {
        let result = split_result(4, 2);
        let backdrop = RgbaImage::from_pixel(4, 2, Rgba([0, 0, 0, 255]));
        let filter: Filter = "invert(1)".parse().unwrap();

        let out = compose(&result, true, BackgroundLayer::Image(&backdrop), &filter).unwrap();
        assert_eq!(out.get_pixel(3, 1).0, [255, 255, 255, 255]);
    }

    #[test]
    fn mismatched_mask_is_rejected() {
        let result = SegmentationResult {
            frame: RgbImage::new(4, 4),
            mask: vec![1.0; 3],
        };
        let err = compose(&result, true, BackgroundLayer::None, &Filter::none()).unwrap_err();
        assert!(matches!(err, BoothError::MaskMismatch { expected: 16, .. }));

        // The mask is not consulted with the effect off
        assert!(compose(&result, false, BackgroundLayer::None, &Filter::none()).is_ok());
    }

    #[test]
    fn over_blends_half_transparent_subject() {
        let out = over(Rgba([200, 0, 0, 128]), Rgba([0, 0, 200, 255]));
        assert_eq!(out[3], 255);
        assert!(out[0] > 90 && out[0] < 110);
        assert!(out[2] > 90 && out[2] < 110);
    }
}
