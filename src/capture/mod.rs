mod webcam;

pub use webcam::WebcamCapture;

use anyhow::Result;
use image::RgbImage;
use nokhwa::utils::ApiBackend;

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Capture a single frame
    fn capture_frame(&mut self) -> Result<RgbImage>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);

    /// Index of the device currently streaming
    fn device_index(&self) -> u32;

    /// Release the current device and start streaming from another one
    fn switch_device(&mut self, index: u32) -> Result<()>;
}

/// A video input the user can pick
#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: u32,
    pub label: String,
}

/// Enumerate video inputs
///
/// Failure is logged and yields an empty list; the default camera is still
/// tried afterwards.
pub fn list_devices() -> Vec<CameraDevice> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .enumerate()
            .map(|(position, info)| {
                let index = info.index().as_index().unwrap_or(position as u32);
                let name = info.human_name();
                let label = if name.trim().is_empty() {
                    format!("Camera {}", position + 1)
                } else {
                    name
                };
                CameraDevice { index, label }
            })
            .collect(),
        Err(err) => {
            tracing::warn!("Failed to enumerate cameras: {}", err);
            Vec::new()
        }
    }
}
