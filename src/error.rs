use thiserror::Error;

/// Domain failures the event loop reacts to individually.
///
/// Plumbing errors (device I/O, model loading) stay `anyhow::Error` with context.
#[derive(Debug, Error)]
pub enum BoothError {
    /// Camera denied or unavailable. Startup halts on this one.
    #[error("failed to access camera: {0}")]
    CameraAccess(String),

    /// Capture requested before the model produced its first result
    #[error("no segmentation data to process")]
    NoSegmentation,

    #[error("mask has {actual} values, expected {expected} for a {width}x{height} frame")]
    MaskMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("invalid filter `{0}`")]
    InvalidFilter(String),

    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    #[error("failed to encode photo")]
    Encode(#[from] image::ImageError),
}
