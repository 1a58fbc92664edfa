//! Application state for the photo booth.
//!
//! Everything the event loop mutates lives in [`Booth`]: the effect flag,
//! the background gallery, the active filter, the most recent inference
//! result, the countdown and the captured photos.

pub mod backgrounds;
pub mod countdown;
pub mod gallery;

pub use backgrounds::{BackgroundGallery, BackgroundSelection};
pub use countdown::{Countdown, CountdownConfig, CountdownEvent, CountdownSignal};
pub use gallery::{Photo, PhotoGallery};

use std::path::Path;
use std::time::{Instant, SystemTime};

use image::RgbaImage;

use crate::compositor::{self, Filter};
use crate::error::BoothError;
use crate::segmentation::SegmentationResult;

/// Things the event loop reports to the user
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoothEvent {
    Countdown(String),
    PhotoTaken(String),
    CaptureRefused,
    CaptureCancelled,
    Ready,
}

pub struct Booth {
    effect_active: bool,
    backgrounds: BackgroundGallery,
    filter: Filter,
    last_result: Option<SegmentationResult>,
    countdown: Countdown,
    photos: PhotoGallery,
}

impl Booth {
    pub fn new(backgrounds: BackgroundGallery, countdown: CountdownConfig) -> Self {
        Self {
            effect_active: false,
            backgrounds,
            filter: Filter::none(),
            last_result: None,
            countdown: Countdown::new(countdown),
            photos: PhotoGallery::default(),
        }
    }

    pub fn effect_active(&self) -> bool {
        self.effect_active
    }

    pub fn backgrounds(&self) -> &BackgroundGallery {
        &self.backgrounds
    }

    pub fn selection(&self) -> BackgroundSelection {
        self.backgrounds.selection()
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn photos(&self) -> &PhotoGallery {
        &self.photos
    }

    pub fn last_result(&self) -> Option<&SegmentationResult> {
        self.last_result.as_ref()
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    /// Flip the background effect. Turning it off drops the selection.
    pub fn toggle_effect(&mut self) -> bool {
        self.effect_active = !self.effect_active;
        if !self.effect_active {
            self.backgrounds.clear_selection();
        }
        tracing::info!(
            "Background effect {}",
            if self.effect_active { "on" } else { "off" }
        );
        self.effect_active
    }

    /// Background options are only offered while the effect is on
    pub fn select_background(&mut self, id: u32) -> bool {
        if !self.effect_active {
            tracing::debug!("Ignoring background {}: effect is off", id);
            return false;
        }
        let selected = self.backgrounds.select(id);
        if !selected {
            tracing::debug!("Ignoring unknown background {}", id);
        }
        selected
    }

    /// Add a user image as a background; non-images are silently ignored
    pub fn upload_background(&mut self, path: &Path) -> Option<u32> {
        let id = self.backgrounds.upload(path)?;
        if self.effect_active {
            self.backgrounds.select(id);
        }
        Some(id)
    }

    pub fn set_filter(&mut self, filter: Filter) {
        tracing::info!("Filter set to {}", filter);
        self.filter = filter;
    }

    pub fn record_result(&mut self, result: SegmentationResult) {
        self.last_result = Some(result);
    }

    /// Compose the latest result for the preview, if there is one yet
    pub fn render_preview(&self) -> Option<Result<RgbaImage, BoothError>> {
        self.last_result.as_ref().map(|result| self.compose(result))
    }

    fn compose(&self, result: &SegmentationResult) -> Result<RgbaImage, BoothError> {
        compositor::compose(
            result,
            self.effect_active,
            self.backgrounds.layer(),
            &self.filter,
        )
    }

    /// Compose the latest result as a still and add it to the gallery
    pub fn capture_photo(&mut self, taken_at: SystemTime) -> Result<&Photo, BoothError> {
        let result = self
            .last_result
            .as_ref()
            .ok_or(BoothError::NoSegmentation)?;
        let image = self.compose(result)?;
        let photo = Photo::encode(&image, taken_at)?;
        Ok(self.photos.add(photo))
    }

    /// Start the countdown; ignored unless idle
    pub fn trigger_capture(&mut self, now: Instant) -> Option<BoothEvent> {
        if !self.countdown.is_trigger_enabled() {
            tracing::debug!("Capture already in progress");
            return None;
        }
        self.countdown
            .apply(CountdownEvent::Trigger(now))
            .map(|signal| self.on_signal(signal, now))
    }

    pub fn cancel_capture(&mut self) -> Option<BoothEvent> {
        let now = Instant::now();
        self.countdown
            .apply(CountdownEvent::Cancel)
            .map(|signal| self.on_signal(signal, now))
    }

    /// Advance the countdown, capturing when it gets there
    pub fn poll(&mut self, now: Instant) -> Option<BoothEvent> {
        self.countdown
            .apply(CountdownEvent::Tick(now))
            .map(|signal| self.on_signal(signal, now))
    }

    fn on_signal(&mut self, signal: CountdownSignal, now: Instant) -> BoothEvent {
        match signal {
            CountdownSignal::Show(n) => {
                BoothEvent::Countdown(self.countdown.label().unwrap_or_else(|| n.to_string()))
            }
            CountdownSignal::Capture => {
                let event = match self.capture_photo(SystemTime::now()) {
                    Ok(photo) => BoothEvent::PhotoTaken(photo.file_name.clone()),
                    Err(err) => {
                        tracing::error!("Capture failed: {}", err);
                        BoothEvent::CaptureRefused
                    }
                };
                self.countdown.apply(CountdownEvent::Captured(now));
                event
            }
            CountdownSignal::Cancelled => BoothEvent::CaptureCancelled,
            CountdownSignal::Ready => BoothEvent::Ready,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba};
    use std::time::Duration;

    fn booth() -> Booth {
        Booth::new(BackgroundGallery::default(), CountdownConfig::default())
    }

    fn scratch_png(name: &str, pixel: [u8; 4], width: u32, height: u32) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("snapverse_test_booth");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        RgbaImage::from_pixel(width, height, Rgba(pixel))
            .save(&path)
            .unwrap();
        path
    }

    /// Subject in the top half, background in the bottom half
    fn half_result() -> SegmentationResult {
        let frame = RgbImage::from_fn(6, 4, |x, y| Rgb([x as u8 * 10, y as u8 * 10, 99]));
        let mask = (0..4)
            .flat_map(|y| (0..6).map(move |_| if y < 2 { 1.0 } else { 0.0 }))
            .collect();
        SegmentationResult { frame, mask }
    }

    fn run_countdown(booth: &mut Booth) -> Vec<BoothEvent> {
        let t0 = Instant::now();
        let mut events: Vec<_> = booth.trigger_capture(t0).into_iter().collect();
        for step in 1..=3 {
            events.extend(booth.poll(t0 + Duration::from_secs(step)));
        }
        events
    }

    #[test]
    fn toggling_effect_off_clears_selection() {
        let mut booth = booth();
        booth.toggle_effect();
        let blur = booth.backgrounds().blur_id().unwrap();
        assert!(booth.select_background(blur));
        assert_eq!(booth.selection(), BackgroundSelection::BlurredLiveFeed);

        assert!(!booth.toggle_effect());
        assert_eq!(booth.selection(), BackgroundSelection::None);
        assert!(booth
            .backgrounds()
            .options()
            .iter()
            .all(|o| !booth.backgrounds().is_selected(o.id)));
    }

    #[test]
    fn backgrounds_cannot_be_selected_while_effect_is_off() {
        let mut booth = booth();
        let blur = booth.backgrounds().blur_id().unwrap();
        assert!(!booth.select_background(blur));
        assert_eq!(booth.selection(), BackgroundSelection::None);
    }

    #[test]
    fn capture_with_static_background() {
        let mut booth = booth();
        booth.toggle_effect();
        let path = scratch_png("backdrop_a.png", [1, 2, 3, 255], 6, 4);
        let id = booth.upload_background(&path).unwrap();
        assert_eq!(booth.selection(), BackgroundSelection::StaticImage(id));

        let result = half_result();
        booth.record_result(result.clone());
        let photo = booth.capture_photo(SystemTime::now()).unwrap().clone();

        let image = image::load_from_memory(&photo.png).unwrap().into_rgba8();
        assert_eq!(image.dimensions(), result.dimensions());
        for (x, y, pixel) in image.enumerate_pixels() {
            if y < 2 {
                let src = result.frame.get_pixel(x, y);
                assert_eq!(pixel.0, [src[0], src[1], src[2], 255]);
            } else {
                assert_eq!(pixel.0, [1, 2, 3, 255]);
            }
        }
        assert_eq!(booth.photos().len(), 1);
    }

    #[test]
    fn capture_before_first_result_is_refused() {
        let mut booth = booth();
        assert!(matches!(
            booth.capture_photo(SystemTime::now()),
            Err(BoothError::NoSegmentation)
        ));
        assert!(booth.photos().is_empty());
        assert!(booth.render_preview().is_none());
    }

    #[test]
    fn countdown_refuses_capture_without_result_and_recovers() {
        let mut booth = booth();
        let events = run_countdown(&mut booth);
        assert_eq!(
            events,
            [
                BoothEvent::Countdown("3".into()),
                BoothEvent::Countdown("2".into()),
                BoothEvent::Countdown("1".into()),
                BoothEvent::CaptureRefused,
            ]
        );
        assert!(booth.photos().is_empty());
        assert!(!booth.countdown().is_trigger_enabled());

        let later = Instant::now() + Duration::from_secs(10);
        assert_eq!(booth.poll(later), Some(BoothEvent::Ready));
        assert!(booth.countdown().is_trigger_enabled());
    }

    #[test]
    fn countdown_takes_photo_when_result_exists() {
        let mut booth = booth();
        booth.record_result(half_result());
        let events = run_countdown(&mut booth);
        match events.last() {
            Some(BoothEvent::PhotoTaken(name)) => assert!(name.starts_with("snapverse-photo-")),
            other => panic!("expected a photo, got {:?}", other),
        }
        assert_eq!(booth.photos().len(), 1);
    }

    #[test]
    fn cancel_stops_countdown() {
        let mut booth = booth();
        booth.record_result(half_result());
        booth.trigger_capture(Instant::now());
        assert_eq!(booth.cancel_capture(), Some(BoothEvent::CaptureCancelled));
        assert!(booth.countdown().is_trigger_enabled());
        assert!(booth.photos().is_empty());
    }

    #[test]
    fn non_image_upload_adds_nothing() {
        let mut booth = booth();
        booth.toggle_effect();
        let dir = std::env::temp_dir().join("snapverse_test_booth");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("song.mp3");
        std::fs::write(&path, b"ID3").unwrap();

        assert_eq!(booth.upload_background(&path), None);
        assert_eq!(booth.backgrounds().options().len(), 1);
        assert_eq!(booth.selection(), BackgroundSelection::None);
    }

    #[test]
    fn preview_and_capture_agree() {
        let mut booth = booth();
        booth.toggle_effect();
        booth.select_background(booth.backgrounds().blur_id().unwrap());
        booth.set_filter("sepia(1)".parse().unwrap());
        booth.record_result(half_result());

        let preview = booth.render_preview().unwrap().unwrap();
        let photo = booth.capture_photo(SystemTime::now()).unwrap();
        let still = image::load_from_memory(&photo.png).unwrap().into_rgba8();
        assert_eq!(preview, still);
    }
}
