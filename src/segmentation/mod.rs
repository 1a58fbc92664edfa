mod passthrough;
mod preprocess;
mod rvm;
pub mod types;

pub use passthrough::Passthrough;
pub use preprocess::Preprocessor;
pub use rvm::RobustVideoMatting;
pub use types::{Matte, ModelTier, SegmentationModel, SegmentationResult};

use anyhow::Result;
use std::path::Path;

/// Create the segmentation backend
///
/// With a model path this loads RVM at the given tier; without one it falls
/// back to a passthrough model sized to the capture.
pub fn create_model(
    model_path: Option<&Path>,
    tier: ModelTier,
    capture_size: (u32, u32),
) -> Result<Box<dyn SegmentationModel>> {
    match model_path {
        Some(path) => Ok(Box::new(RobustVideoMatting::new(path, tier)?)),
        None => Ok(Box::new(Passthrough::new(capture_size.0, capture_size.1))),
    }
}
