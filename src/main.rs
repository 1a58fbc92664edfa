mod booth;
mod capture;
mod compositor;
mod controls;
mod error;
mod output;
mod segmentation;

use anyhow::{Context, Result};
use booth::{BackgroundGallery, Booth, BoothEvent, CountdownConfig};
use capture::{CaptureSource, WebcamCapture};
use clap::Parser;
use compositor::Filter;
use controls::Command;
use crossbeam_channel::Receiver;
use error::BoothError;
use image::{DynamicImage, RgbImage};
use output::{OutputSink, V4L2Output};
use segmentation::{ModelTier, Preprocessor, SegmentationModel};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index (defaults to the first camera found)
    #[arg(short, long)]
    input_device: Option<u32>,

    /// Output v4l2loopback device path for the live preview
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Run without a live preview device
    #[arg(long)]
    no_preview: bool,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Path to segmentation model (ONNX file)
    /// If not provided, every pixel is treated as foreground
    #[arg(long)]
    model: Option<PathBuf>,

    /// Show matte visualization (grayscale silhouette) instead of the composite
    #[arg(long)]
    show_matte: bool,

    /// Directory of background images offered as presets
    #[arg(long)]
    backgrounds: Option<PathBuf>,

    /// Directory captured photos are written to
    #[arg(long, default_value = "photos")]
    photo_dir: PathBuf,

    /// Initial filter, in CSS filter syntax
    #[arg(long, default_value = "none")]
    filter: String,
}

/// Settings the pipeline loop needs after startup
struct PipelineSettings {
    fps: u32,
    show_matte: bool,
    photo_dir: PathBuf,
}

enum Flow {
    Continue,
    Quit,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("Snapverse starting");
    tracing::info!("Capture: {}x{}", args.capture_width, args.capture_height);
    tracing::info!("Target FPS: {}", args.fps);

    let filter: Filter = args.filter.parse()?;

    let devices = capture::list_devices();
    for device in &devices {
        tracing::info!("Camera {}: {}", device.index, device.label);
    }
    let device_index = args
        .input_device
        .or_else(|| devices.first().map(|d| d.index))
        .unwrap_or(0);

    let mut capture = match WebcamCapture::new(
        device_index,
        args.capture_width,
        args.capture_height,
        args.fps,
    ) {
        Ok(capture) => capture,
        Err(err) => {
            if let Some(BoothError::CameraAccess(_)) = err.downcast_ref::<BoothError>() {
                tracing::error!("Failed to access the camera. Please allow camera access.");
            }
            return Err(err.context("Failed to initialize webcam capture"));
        }
    };

    let mut output = if args.no_preview {
        tracing::info!("Live preview disabled");
        None
    } else {
        let sink = V4L2Output::new(&args.output_device, args.output_width, args.output_height)
            .context("Failed to initialize v4l2loopback output")?;
        let (width, height) = sink.resolution();
        tracing::info!("Output: {}x{}", width, height);
        Some(sink)
    };

    if let Some(model_path) = &args.model {
        tracing::info!("Loading segmentation model from {}", model_path.display());
    } else {
        tracing::info!("No segmentation model given, background effect will keep the whole frame");
    }
    // Fixed for the session; a later camera switch keeps it
    let (capture_width, capture_height) = capture.resolution();
    let tier = ModelTier::for_capture(capture_width, capture_height);
    let model = segmentation::create_model(args.model.as_deref(), tier, capture.resolution())
        .context("Failed to load segmentation model")?;
    let (model_width, model_height) = model.input_size();
    tracing::info!("Segmentation input: {}x{}", model_width, model_height);

    let backgrounds = match &args.backgrounds {
        Some(dir) => BackgroundGallery::load_presets(dir)?,
        None => BackgroundGallery::default(),
    };

    let mut booth = Booth::new(backgrounds, CountdownConfig::default());
    booth.set_filter(filter);

    let commands = controls::spawn_stdin_reader().context("Failed to start control input")?;
    tracing::info!("Type `help` for commands");

    let settings = PipelineSettings {
        fps: args.fps,
        show_matte: args.show_matte,
        photo_dir: args.photo_dir,
    };

    run_pipeline(
        &mut capture,
        output.as_mut(),
        model,
        &mut booth,
        &commands,
        &settings,
    )
}

fn run_pipeline<C, O>(
    capture: &mut C,
    mut output: Option<&mut O>,
    mut model: Box<dyn SegmentationModel>,
    booth: &mut Booth,
    commands: &Receiver<Command>,
    settings: &PipelineSettings,
) -> Result<()>
where
    C: CaptureSource,
    O: OutputSink,
{
    let frame_duration = Duration::from_secs_f32(1.0 / settings.fps.max(1) as f32);
    let mut frame_count = 0u64;
    let mut total_capture_time = Duration::ZERO;
    let mut total_segment_time = Duration::ZERO;
    let mut total_compose_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;

    tracing::info!("Starting main pipeline loop");
    tracing::info!("Press Ctrl+C or type `quit` to stop");

    loop {
        let loop_start = Instant::now();

        for command in commands.try_iter() {
            if let Flow::Quit = handle_command(command, booth, capture, model.as_mut(), settings)
            {
                tracing::info!("Took {} photo(s), bye", booth.photos().len());
                return Ok(());
            }
        }

        // Capture frame
        let capture_start = Instant::now();
        let frame = capture
            .capture_frame()
            .context("Failed to capture frame")?;
        total_capture_time += capture_start.elapsed();

        // Segmentation; the loop runs at the model's pace
        let segment_start = Instant::now();
        segment_frame(frame, model.as_mut(), booth)?;
        total_segment_time += segment_start.elapsed();

        // Composite the preview from the latest result
        let compose_start = Instant::now();
        let preview = if settings.show_matte {
            booth.last_result().map(|result| {
                let (width, height) = result.dimensions();
                Ok(DynamicImage::ImageRgb8(Preprocessor::matte_to_rgb(
                    &result.mask,
                    width,
                    height,
                ))
                .into_rgba8())
            })
        } else {
            booth.render_preview()
        };
        total_compose_time += compose_start.elapsed();

        // Output frame
        let output_start = Instant::now();
        if let (Some(sink), Some(preview)) = (output.as_deref_mut(), preview) {
            sink.write_frame(&preview?)
                .context("Failed to write frame")?;
        }
        total_output_time += output_start.elapsed();

        if let Some(event) = booth.poll(Instant::now()) {
            report_event(event, booth, &settings.photo_dir);
        }

        frame_count += 1;

        // Log stats every 30 frames
        if frame_count % 30 == 0 {
            let per_frame = |total: Duration| total.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_capture_ms = per_frame(total_capture_time);
            let avg_segment_ms = per_frame(total_segment_time);
            let avg_compose_ms = per_frame(total_compose_time);
            let avg_output_ms = per_frame(total_output_time);
            let total_ms = avg_capture_ms + avg_segment_ms + avg_compose_ms + avg_output_ms;

            tracing::debug!(
                "Frame {}: capture={:.1}ms, segment={:.1}ms, compose={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}",
                frame_count,
                avg_capture_ms,
                avg_segment_ms,
                avg_compose_ms,
                avg_output_ms,
                total_ms,
                1000.0 / total_ms
            );
        }

        // Frame rate limiting
        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    }
}

/// Run inference on a frame and hand the result to the booth
///
/// Frames without pixels (a camera still starting up) are dropped and the
/// previous result stays current. Returns whether a result was recorded.
fn segment_frame(
    frame: RgbImage,
    model: &mut dyn SegmentationModel,
    booth: &mut Booth,
) -> Result<bool> {
    if frame.width() == 0 || frame.height() == 0 {
        tracing::debug!("Skipping empty frame");
        return Ok(false);
    }
    let result = model.segment(frame).context("Failed to segment frame")?;
    booth.record_result(result);
    Ok(true)
}

fn handle_command<C: CaptureSource>(
    command: Command,
    booth: &mut Booth,
    camera: &mut C,
    model: &mut dyn SegmentationModel,
    settings: &PipelineSettings,
) -> Flow {
    match command {
        Command::ToggleEffect => {
            booth.toggle_effect();
        }
        Command::ListBackgrounds => {
            if !booth.effect_active() {
                tracing::info!("Background effect is off; type `effect` to choose one");
            }
            for option in booth.backgrounds().options() {
                tracing::info!(
                    "{} {:>3}  {}{}",
                    if booth.backgrounds().is_selected(option.id) { "*" } else { " " },
                    option.id,
                    option.label,
                    if option.uploaded { " (uploaded)" } else { "" }
                );
            }
        }
        Command::SelectBackground(id) => {
            if booth.select_background(id) {
                tracing::info!("Background: {:?}", booth.selection());
            }
        }
        Command::SelectBlur => {
            if let Some(id) = booth.backgrounds().blur_id() {
                booth.select_background(id);
            }
        }
        Command::Upload(path) => {
            if let Some(id) = booth.upload_background(&path) {
                tracing::info!("Background {} added", id);
            }
        }
        Command::SetFilter(filter) => booth.set_filter(filter),
        Command::Snap => {
            if let Some(event) = booth.trigger_capture(Instant::now()) {
                report_event(event, booth, &settings.photo_dir);
            }
        }
        Command::Cancel => {
            if let Some(event) = booth.cancel_capture() {
                report_event(event, booth, &settings.photo_dir);
            }
        }
        Command::ListCameras => {
            for device in capture::list_devices() {
                tracing::info!("Camera {}: {}", device.index, device.label);
            }
        }
        Command::SwitchCamera(index) => match camera.switch_device(index) {
            Ok(()) => {
                model.reset_state();
                tracing::info!("Switched to camera {}", index);
            }
            Err(err) => tracing::warn!("Camera switch failed: {:#}", err),
        },
        Command::ListPhotos => {
            for photo in booth.photos().photos() {
                tracing::info!("{} ({}x{})", photo.file_name, photo.width, photo.height);
            }
        }
        Command::Status => {
            tracing::info!(
                "camera={} effect={} background={:?} filter={} countdown={:?} photos={}",
                camera.device_index(),
                booth.effect_active(),
                booth.selection(),
                booth.filter(),
                booth.countdown().state(),
                booth.photos().len()
            );
        }
        Command::Help => tracing::info!("\n{}", controls::HELP),
        Command::Quit => return Flow::Quit,
    }
    Flow::Continue
}

fn report_event(event: BoothEvent, booth: &Booth, photo_dir: &Path) {
    match event {
        BoothEvent::Countdown(label) => tracing::info!("{}", label),
        BoothEvent::PhotoTaken(name) => {
            let saved = booth
                .photos()
                .photos()
                .iter()
                .find(|photo| photo.file_name == name)
                .map(|photo| photo.save_in(photo_dir));
            match saved {
                Some(Ok(path)) => tracing::info!("📸 Saved {}", path.display()),
                Some(Err(err)) => tracing::error!("{:#}", err),
                None => tracing::warn!("Photo {} is no longer in the gallery", name),
            }
        }
        // Already logged by the booth
        BoothEvent::CaptureRefused => {}
        BoothEvent::CaptureCancelled => tracing::info!("Countdown cancelled"),
        BoothEvent::Ready => tracing::debug!("Ready for the next photo"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booth::BackgroundSelection;
    use crate::segmentation::SegmentationResult;
    use anyhow::bail;
    use image::{Rgba, RgbaImage};

    struct FakeCamera {
        index: u32,
        available: Vec<u32>,
    }

    impl CaptureSource for FakeCamera {
        fn capture_frame(&mut self) -> Result<RgbImage> {
            Ok(RgbImage::new(4, 2))
        }

        fn resolution(&self) -> (u32, u32) {
            (4, 2)
        }

        fn device_index(&self) -> u32 {
            self.index
        }

        fn switch_device(&mut self, index: u32) -> Result<()> {
            if !self.available.contains(&index) {
                bail!("no camera {}", index);
            }
            self.index = index;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeModel {
        segmented: usize,
        resets: usize,
    }

    impl SegmentationModel for FakeModel {
        fn segment(&mut self, frame: RgbImage) -> Result<SegmentationResult> {
            self.segmented += 1;
            let (width, height) = frame.dimensions();
            let mask = vec![1.0; width as usize * height as usize];
            Ok(SegmentationResult { frame, mask })
        }

        fn reset_state(&mut self) {
            self.resets += 1;
        }

        fn input_size(&self) -> (u32, u32) {
            (4, 2)
        }
    }

    struct Harness {
        booth: Booth,
        camera: FakeCamera,
        model: FakeModel,
        settings: PipelineSettings,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                booth: Booth::new(BackgroundGallery::default(), CountdownConfig::default()),
                camera: FakeCamera {
                    index: 0,
                    available: vec![0, 1],
                },
                model: FakeModel::default(),
                settings: PipelineSettings {
                    fps: 30,
                    show_matte: false,
                    photo_dir: std::env::temp_dir().join("snapverse_test_main"),
                },
            }
        }

        fn run(&mut self, command: Command) -> Flow {
            handle_command(
                command,
                &mut self.booth,
                &mut self.camera,
                &mut self.model,
                &self.settings,
            )
        }
    }

    #[test]
    fn camera_switch_resets_model_state() {
        let mut h = Harness::new();
        assert!(matches!(h.run(Command::SwitchCamera(1)), Flow::Continue));
        assert_eq!(h.camera.device_index(), 1);
        assert_eq!(h.model.resets, 1);
    }

    #[test]
    fn failed_camera_switch_keeps_model_state() {
        let mut h = Harness::new();
        h.run(Command::SwitchCamera(7));
        assert_eq!(h.camera.device_index(), 0);
        assert_eq!(h.model.resets, 0);
    }

    #[test]
    fn select_blur_needs_the_effect() {
        let mut h = Harness::new();
        h.run(Command::SelectBlur);
        assert_eq!(h.booth.selection(), BackgroundSelection::None);

        h.run(Command::ToggleEffect);
        h.run(Command::SelectBlur);
        assert_eq!(h.booth.selection(), BackgroundSelection::BlurredLiveFeed);

        h.run(Command::ToggleEffect);
        assert_eq!(h.booth.selection(), BackgroundSelection::None);
    }

    #[test]
    fn upload_selects_image_and_ignores_other_files() {
        let dir = std::env::temp_dir().join("snapverse_test_main");
        std::fs::create_dir_all(&dir).unwrap();
        let image_path = dir.join("beach.png");
        RgbaImage::from_pixel(2, 2, Rgba([0, 90, 200, 255]))
            .save(&image_path)
            .unwrap();
        let text_path = dir.join("notes.txt");
        std::fs::write(&text_path, "not an image").unwrap();

        let mut h = Harness::new();
        h.run(Command::ToggleEffect);
        h.run(Command::Upload(text_path));
        assert_eq!(h.booth.backgrounds().options().len(), 1);
        assert_eq!(h.booth.selection(), BackgroundSelection::None);

        h.run(Command::Upload(image_path));
        assert_eq!(h.booth.backgrounds().options().len(), 2);
        assert!(matches!(
            h.booth.selection(),
            BackgroundSelection::StaticImage(_)
        ));
    }

    #[test]
    fn snap_and_cancel_drive_the_countdown() {
        let mut h = Harness::new();
        h.run(Command::Snap);
        assert!(!h.booth.countdown().is_trigger_enabled());

        h.run(Command::Cancel);
        assert!(h.booth.countdown().is_trigger_enabled());
        assert!(h.booth.photos().is_empty());
    }

    #[test]
    fn filter_command_reaches_the_booth() {
        let mut h = Harness::new();
        h.run(Command::SetFilter("sepia(1)".parse().unwrap()));
        assert_eq!(h.booth.filter().to_string(), "sepia(1)");
    }

    #[test]
    fn quit_stops_the_loop() {
        let mut h = Harness::new();
        assert!(matches!(h.run(Command::Status), Flow::Continue));
        assert!(matches!(h.run(Command::Quit), Flow::Quit));
    }

    #[test]
    fn empty_frames_skip_inference() {
        let mut h = Harness::new();
        assert!(!segment_frame(RgbImage::new(0, 0), &mut h.model, &mut h.booth).unwrap());
        assert!(!segment_frame(RgbImage::new(4, 0), &mut h.model, &mut h.booth).unwrap());
        assert_eq!(h.model.segmented, 0);
        assert!(h.booth.last_result().is_none());

        let frame = h.camera.capture_frame().unwrap();
        assert!(segment_frame(frame, &mut h.model, &mut h.booth).unwrap());
        assert_eq!(h.model.segmented, 1);
        assert_eq!(h.booth.last_result().unwrap().dimensions(), (4, 2));
    }
}
