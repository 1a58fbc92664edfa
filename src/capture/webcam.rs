use super::CaptureSource;
use crate::error::BoothError;
use anyhow::{Context, Result};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;

/// Exclusive owner of the open camera stream
pub struct WebcamCapture {
    camera: Camera,
    device_index: u32,
    width: u32,
    height: u32,
    fps: u32,
}

impl WebcamCapture {
    /// Open `device_index` as close to the requested mode as it supports
    ///
    /// Fails with [`BoothError::CameraAccess`] when the device is missing or
    /// access is denied.
    pub fn new(device_index: u32, width: u32, height: u32, fps: u32) -> Result<Self> {
        let camera = open_camera(device_index, width, height, fps)?;
        Ok(Self {
            camera,
            device_index,
            width,
            height,
            fps,
        })
    }

    /// Stop the stream so the device lock is released
    fn release(&mut self) {
        tracing::info!("Releasing webcam {}", self.device_index);
        if let Err(err) = self.camera.stop_stream() {
            tracing::warn!("Failed to stop webcam {} stream: {}", self.device_index, err);
        }
    }
}

fn open_camera(device_index: u32, width: u32, height: u32, fps: u32) -> Result<Camera> {
    tracing::info!(
        "Initializing webcam {} at {}x{}@{}",
        device_index,
        width,
        height,
        fps
    );

    let index = CameraIndex::Index(device_index);
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
        CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, fps),
    ));

    let mut camera = Camera::new(index, requested)
        .map_err(|err| BoothError::CameraAccess(err.to_string()))
        .context("Failed to open camera")?;

    camera
        .open_stream()
        .map_err(|err| BoothError::CameraAccess(err.to_string()))
        .context("Failed to open camera stream")?;

    let resolution = camera.resolution();
    tracing::info!(
        "Webcam {} streaming at {}x{}",
        device_index,
        resolution.width(),
        resolution.height()
    );

    Ok(camera)
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        let frame = self
            .camera
            .frame()
            .context("Failed to capture frame")?;

        let decoded = frame
            .decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        Ok(decoded)
    }

    fn resolution(&self) -> (u32, u32) {
        let resolution = self.camera.resolution();
        (resolution.width(), resolution.height())
    }

    fn device_index(&self) -> u32 {
        self.device_index
    }

    /// The old stream is stopped before the new device is opened. If the new
    /// device cannot be opened the previous one is reopened.
    fn switch_device(&mut self, index: u32) -> Result<()> {
        if index == self.device_index {
            return Ok(());
        }

        self.release();

        match open_camera(index, self.width, self.height, self.fps) {
            Ok(camera) => {
                self.camera = camera;
                self.device_index = index;
                Ok(())
            }
            Err(err) => {
                tracing::error!("Failed to switch to webcam {}: {:#}", index, err);
                self.camera.open_stream().with_context(|| {
                    format!("Failed to reopen webcam {}", self.device_index)
                })?;
                Err(err)
            }
        }
    }
}
