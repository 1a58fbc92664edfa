//! Whole-image colour filters in CSS `filter` syntax.
//!
//! Colour functions work on straight (non-premultiplied) RGB in 0..1 using
//! the shorthand matrices from Filter Effects Level 1. Only `opacity`
//! touches alpha, and `blur` is the one spatial function.

use std::fmt;
use std::str::FromStr;

use image::{imageops, RgbaImage};

use crate::error::BoothError;

type Matrix = [[f32; 3]; 3];

/// A single filter function
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FilterOp {
    Grayscale(f32),
    Sepia(f32),
    Invert(f32),
    Saturate(f32),
    Brightness(f32),
    Contrast(f32),
    /// Rotation in degrees
    HueRotate(f32),
    Opacity(f32),
    /// Gaussian standard deviation in pixels
    Blur(f32),
}

/// Ordered chain of filter functions; empty means `none`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    ops: Vec<FilterOp>,
}

impl Filter {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_none(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[FilterOp] {
        &self.ops
    }

    /// Apply the chain in place. An empty chain does not touch the buffer.
    ///
    /// Consecutive colour functions run in one pass without intermediate
    /// rounding; a `blur` splits the chain.
    pub fn apply(&self, image: &mut RgbaImage) {
        if self.is_none() {
            return;
        }

        let _span = tracing::debug_span!("filter", ops = self.ops.len()).entered();

        for run in self
            .ops
            .split_inclusive(|op| matches!(op, FilterOp::Blur(_)))
        {
            match run.split_last() {
                Some((FilterOp::Blur(sigma), colour)) => {
                    apply_per_pixel(colour, image);
                    if *sigma > 0.0 && image.width() > 0 && image.height() > 0 {
                        *image = imageops::blur(&*image, *sigma);
                    }
                }
                _ => apply_per_pixel(run, image),
            }
        }
    }
}

fn apply_per_pixel(ops: &[FilterOp], image: &mut RgbaImage) {
    if ops.is_empty() {
        return;
    }
    for pixel in image.pixels_mut() {
        let mut rgba = pixel.0.map(|c| c as f32 / 255.0);
        for op in ops {
            rgba = op.apply(rgba);
        }
        for (channel, value) in rgba.iter().enumerate() {
            pixel[channel] = (value * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    }
}

impl FilterOp {
    fn apply(self, [r, g, b, alpha]: [f32; 4]) -> [f32; 4] {
        let rgb = match self {
            FilterOp::Grayscale(a) => multiply(grayscale_matrix(a.min(1.0)), [r, g, b]),
            FilterOp::Sepia(a) => multiply(sepia_matrix(a.min(1.0)), [r, g, b]),
            FilterOp::Saturate(s) => multiply(saturate_matrix(s), [r, g, b]),
            FilterOp::HueRotate(deg) => multiply(hue_rotate_matrix(deg), [r, g, b]),
            FilterOp::Invert(a) => {
                let a = a.min(1.0);
                [r, g, b].map(|c| c * (1.0 - 2.0 * a) + a)
            }
            FilterOp::Brightness(k) => [r, g, b].map(|c| c * k),
            FilterOp::Contrast(k) => [r, g, b].map(|c| (c - 0.5) * k + 0.5),
            FilterOp::Opacity(k) => return [r, g, b, alpha * k.min(1.0)],
            FilterOp::Blur(_) => return [r, g, b, alpha],
        };
        let [r, g, b] = rgb.map(|c| c.clamp(0.0, 1.0));
        [r, g, b, alpha]
    }

    fn name(self) -> &'static str {
        match self {
            FilterOp::Grayscale(_) => "grayscale",
            FilterOp::Sepia(_) => "sepia",
            FilterOp::Invert(_) => "invert",
            FilterOp::Saturate(_) => "saturate",
            FilterOp::Brightness(_) => "brightness",
            FilterOp::Contrast(_) => "contrast",
            FilterOp::HueRotate(_) => "hue-rotate",
            FilterOp::Opacity(_) => "opacity",
            FilterOp::Blur(_) => "blur",
        }
    }
}

fn multiply(m: Matrix, v: [f32; 3]) -> [f32; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

fn grayscale_matrix(a: f32) -> Matrix {
    let k = 1.0 - a;
    [
        [0.2126 + 0.7874 * k, 0.7152 - 0.7152 * k, 0.0722 - 0.0722 * k],
        [0.2126 - 0.2126 * k, 0.7152 + 0.2848 * k, 0.0722 - 0.0722 * k],
        [0.2126 - 0.2126 * k, 0.7152 - 0.7152 * k, 0.0722 + 0.9278 * k],
    ]
}

fn sepia_matrix(a: f32) -> Matrix {
    let k = 1.0 - a;
    [
        [0.393 + 0.607 * k, 0.769 - 0.769 * k, 0.189 - 0.189 * k],
        [0.349 - 0.349 * k, 0.686 + 0.314 * k, 0.168 - 0.168 * k],
        [0.272 - 0.272 * k, 0.534 - 0.534 * k, 0.131 + 0.869 * k],
    ]
}

fn saturate_matrix(s: f32) -> Matrix {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

fn hue_rotate_matrix(deg: f32) -> Matrix {
    let (sin, cos) = deg.to_radians().sin_cos();
    [
        [
            0.213 + cos * 0.787 - sin * 0.213,
            0.715 - cos * 0.715 - sin * 0.715,
            0.072 - cos * 0.072 + sin * 0.928,
        ],
        [
            0.213 - cos * 0.213 + sin * 0.143,
            0.715 + cos * 0.285 + sin * 0.140,
            0.072 - cos * 0.072 - sin * 0.283,
        ],
        [
            0.213 - cos * 0.213 - sin * 0.787,
            0.715 - cos * 0.715 + sin * 0.715,
            0.072 + cos * 0.928 + sin * 0.072,
        ],
    ]
}

/// `50%` or `0.5`; empty means `default`
fn parse_amount(raw: &str, default: f32) -> Option<f32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(default);
    }
    let value = match raw.strip_suffix('%') {
        Some(percent) => percent.trim().parse::<f32>().ok()? / 100.0,
        None => raw.parse::<f32>().ok()?,
    };
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// `90deg`, `1.5rad`, `0.25turn`, a bare `0` or nothing
fn parse_angle(raw: &str) -> Option<f32> {
    let raw = raw.trim();
    let degrees = if raw.is_empty() {
        0.0
    } else if let Some(v) = raw.strip_suffix("deg") {
        v.parse::<f32>().ok()?
    } else if let Some(v) = raw.strip_suffix("turn") {
        v.parse::<f32>().ok()? * 360.0
    } else if let Some(v) = raw.strip_suffix("rad") {
        v.parse::<f32>().ok()?.to_degrees()
    } else if raw.parse::<f32>().ok()? == 0.0 {
        0.0
    } else {
        return None;
    };
    degrees.is_finite().then_some(degrees)
}

/// `4px`, a bare `0` or nothing
fn parse_length(raw: &str) -> Option<f32> {
    let raw = raw.trim();
    let px = if raw.is_empty() {
        0.0
    } else if let Some(v) = raw.strip_suffix("px") {
        v.trim().parse::<f32>().ok()?
    } else if raw.parse::<f32>().ok()? == 0.0 {
        0.0
    } else {
        return None;
    };
    (px.is_finite() && px >= 0.0).then_some(px)
}

impl FromStr for Filter {
    type Err = BoothError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BoothError::InvalidFilter(s.trim().to_string());
        // Every amount-taking function defaults to 1
        let amount = |arg: &str| parse_amount(arg, 1.0).ok_or_else(invalid);

        let mut rest = s.trim();
        if rest.is_empty() || rest.eq_ignore_ascii_case("none") {
            return Ok(Self::none());
        }

        let mut ops = Vec::new();
        while !rest.is_empty() {
            let open = rest.find('(').ok_or_else(invalid)?;
            let close = rest.find(')').ok_or_else(invalid)?;
            if close < open {
                return Err(invalid());
            }

            let name = rest[..open].trim().to_ascii_lowercase();
            let arg = &rest[open + 1..close];

            let op = match name.as_str() {
                "grayscale" => FilterOp::Grayscale(amount(arg)?),
                "sepia" => FilterOp::Sepia(amount(arg)?),
                "invert" => FilterOp::Invert(amount(arg)?),
                "saturate" => FilterOp::Saturate(amount(arg)?),
                "brightness" => FilterOp::Brightness(amount(arg)?),
                "contrast" => FilterOp::Contrast(amount(arg)?),
                "opacity" => FilterOp::Opacity(amount(arg)?),
                "hue-rotate" => FilterOp::HueRotate(parse_angle(arg).ok_or_else(invalid)?),
                "blur" => FilterOp::Blur(parse_length(arg).ok_or_else(invalid)?),
                _ => return Err(invalid()),
            };
            ops.push(op);

            rest = rest[close + 1..].trim_start();
        }

        Ok(Self { ops })
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ops.is_empty() {
            return f.write_str("none");
        }
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match op {
                FilterOp::HueRotate(deg) => write!(f, "{}({}deg)", op.name(), deg)?,
                FilterOp::Blur(px) => write!(f, "{}({}px)", op.name(), px)?,
                FilterOp::Grayscale(v)
                | FilterOp::Sepia(v)
                | FilterOp::Invert(v)
                | FilterOp::Saturate(v)
                | FilterOp::Brightness(v)
                | FilterOp::Contrast(v)
                | FilterOp::Opacity(v) => write!(f, "{}({})", op.name(), v)?,
            }
        }
        Ok(())
    }
}
