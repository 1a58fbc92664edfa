use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use image::{ImageFormat, ImageReader, RgbaImage};

use crate::compositor::BackgroundLayer;

#[derive(Debug)]
pub enum BackgroundKind {
    Image(RgbaImage),
    BlurredFeed,
}

#[derive(Debug)]
pub struct BackgroundOption {
    pub id: u32,
    pub label: String,
    pub kind: BackgroundKind,
    pub uploaded: bool,
}

/// The current background choice, as the booth reports it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackgroundSelection {
    None,
    StaticImage(u32),
    BlurredLiveFeed,
}

/// Background options plus the single selection indicator
#[derive(Debug)]
pub struct BackgroundGallery {
    options: Vec<BackgroundOption>,
    selected: Option<u32>,
    next_id: u32,
}

impl Default for BackgroundGallery {
    fn default() -> Self {
        let mut gallery = Self {
            options: Vec::new(),
            selected: None,
            next_id: 0,
        };
        gallery.push("blur", BackgroundKind::BlurredFeed, false);
        gallery
    }
}

impl BackgroundGallery {
    /// Built-in blur option plus every decodable image in `dir`
    pub fn load_presets(dir: &Path) -> Result<Self> {
        let mut gallery = Self::default();

        let mut paths: Vec<_> = fs::read_dir(dir)
            .with_context(|| format!("Failed to read backgrounds from {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        paths.sort();

        for path in paths {
            match decode_image_file(&path) {
                Some(image) => {
                    let label = file_label(&path);
                    tracing::info!(
                        "Loaded background preset {} ({}x{})",
                        label,
                        image.width(),
                        image.height()
                    );
                    gallery.push(&label, BackgroundKind::Image(image), false);
                }
                None => tracing::debug!("Skipping {}: not an image", path.display()),
            }
        }

        Ok(gallery)
    }

    pub fn options(&self) -> &[BackgroundOption] {
        &self.options
    }

    pub fn get(&self, id: u32) -> Option<&BackgroundOption> {
        self.options.iter().find(|o| o.id == id)
    }

    pub fn blur_id(&self) -> Option<u32> {
        self.options
            .iter()
            .find(|o| matches!(o.kind, BackgroundKind::BlurredFeed))
            .map(|o| o.id)
    }

    pub fn is_selected(&self, id: u32) -> bool {
        self.selected == Some(id)
    }

    /// Mark exactly one option as selected. Unknown ids change nothing.
    pub fn select(&mut self, id: u32) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        self.selected = Some(id);
        true
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selection(&self) -> BackgroundSelection {
        match self.selected.and_then(|id| self.get(id)) {
            None => BackgroundSelection::None,
            Some(option) => match option.kind {
                BackgroundKind::Image(_) => BackgroundSelection::StaticImage(option.id),
                BackgroundKind::BlurredFeed => BackgroundSelection::BlurredLiveFeed,
            },
        }
    }

    /// The layer to hand to the compositor for the current selection
    pub fn layer(&self) -> BackgroundLayer<'_> {
        match self.selected.and_then(|id| self.get(id)) {
            None => BackgroundLayer::None,
            Some(option) => match &option.kind {
                BackgroundKind::Image(image) => BackgroundLayer::Image(image),
                BackgroundKind::BlurredFeed => BackgroundLayer::BlurredFeed,
            },
        }
    }

    /// Decode a user-supplied file into a new option at the front
    ///
    /// Anything that is not an image is dropped without complaint. A new
    /// upload replaces the previous one.
    pub fn upload(&mut self, path: &Path) -> Option<u32> {
        let Some(image) = decode_image_file(path) else {
            tracing::debug!("Ignoring upload {}: not an image", path.display());
            return None;
        };

        if let Some(old) = self.options.iter().position(|o| o.uploaded) {
            let removed = self.options.remove(old);
            if self.selected == Some(removed.id) {
                self.selected = None;
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        self.options.insert(
            0,
            BackgroundOption {
                id,
                label: file_label(path),
                kind: BackgroundKind::Image(image),
                uploaded: true,
            },
        );
        tracing::info!("Added uploaded background {}", file_label(path));
        Some(id)
    }

    fn push(&mut self, label: &str, kind: BackgroundKind, uploaded: bool) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.options.push(BackgroundOption {
            id,
            label: label.to_string(),
            kind,
            uploaded,
        });
        id
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Decode `path` if its extension names an image format, else `None`
fn decode_image_file(path: &Path) -> Option<RgbaImage> {
    let format = ImageFormat::from_path(path).ok()?;
    let reader = ImageReader::open(path).ok()?;
    match reader.with_guessed_format().ok()?.decode() {
        Ok(image) => Some(image.into_rgba8()),
        Err(err) => {
            tracing::debug!("Failed to decode {} as {:?}: {}", path.display(), format, err);
            None
        }
    }
}
