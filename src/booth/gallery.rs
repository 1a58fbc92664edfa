use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use image::{ImageFormat, RgbaImage};

use crate::error::BoothError;

/// Prefix of every exported photo's file name
pub const PHOTO_PREFIX: &str = "snapverse-photo";

/// A captured still, already encoded as PNG
#[derive(Clone, Debug)]
pub struct Photo {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

impl Photo {
    pub fn encode(image: &RgbaImage, taken_at: SystemTime) -> Result<Self, BoothError> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        Ok(Self {
            file_name: photo_file_name(taken_at),
            width: image.width(),
            height: image.height(),
            png,
        })
    }

    /// Write the PNG into `dir`, creating it if needed
    pub fn save_in(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create photo directory {}", dir.display()))?;
        let path = dir.join(&self.file_name);
        fs::write(&path, &self.png)
            .with_context(|| format!("Failed to write photo to {}", path.display()))?;
        Ok(path)
    }
}

/// `snapverse-photo-<unix millis>.png`
pub fn photo_file_name(taken_at: SystemTime) -> String {
    let millis = taken_at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{}-{}.png", PHOTO_PREFIX, millis)
}

/// Captured photos, newest first
#[derive(Debug, Default)]
pub struct PhotoGallery {
    photos: Vec<Photo>,
}

impl PhotoGallery {
    pub fn add(&mut self, photo: Photo) -> &Photo {
        self.photos.insert(0, photo);
        &self.photos[0]
    }

    pub fn photos(&self) -> &[Photo] {
        &self.photos
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }
}
