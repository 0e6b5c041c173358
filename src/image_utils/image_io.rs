use image::{self, ImageResult, RgbaImage};
use itertools::Itertools;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// File extensions picked up when a directory is scanned for images.
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

pub fn read_image_as_rgba8(filepath: &Path) -> ImageResult<RgbaImage> {
    Ok(image::open(filepath)?.into_rgba8())
}

pub fn is_supported_image(filepath: &Path) -> bool {
    filepath
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// Expands files and directories into a sorted, de-duplicated list of image files.
///
/// Files given explicitly are kept whatever their extension; directories are walked
/// recursively and only supported images are taken from them. Unreadable entries are skipped
/// with a warning.
pub fn collect_image_paths(inputs: &[PathBuf]) -> Vec<PathBuf> {
    inputs
        .iter()
        .flat_map(|input| {
            if input.is_dir() {
                WalkDir::new(input)
                    .into_iter()
                    .filter_map(|entry| match entry {
                        Ok(entry) => Some(entry),
                        Err(e) => {
                            warn!(error = %e, "skipping unreadable directory entry");
                            None
                        }
                    })
                    .filter(|entry| entry.file_type().is_file())
                    .map(|entry| entry.into_path())
                    .filter(|path| is_supported_image(path))
                    .collect::<Vec<PathBuf>>()
            } else {
                vec![input.clone()]
            }
        })
        .sorted()
        .dedup()
        .collect()
}
