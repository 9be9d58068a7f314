use std::fs;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_IMAGE_DELAY_MS, DEFAULT_IMAGE_SIZE};
use crate::mediawiki::IconSource;
use crate::model::BannerDataset;
use crate::profile::GameProfile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOptions {
    /// Re-download icons that already exist on disk.
    pub force: bool,
    pub size: u32,
    /// Pause after every successful download.
    pub delay: Duration,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            force: false,
            size: DEFAULT_IMAGE_SIZE,
            delay: Duration::from_millis(DEFAULT_IMAGE_DELAY_MS),
        }
    }
}

/// Serializes the dataset as YAML and writes it to `path`. Refuses to write
/// output shorter than `min_size` bytes, which usually means an upstream
/// fetch came back empty.
pub fn write_data(dataset: &BannerDataset, path: &Path, min_size: usize) -> Result<usize> {
    let rendered = serde_yaml::to_string(dataset).context("failed to serialize banner data")?;
    if rendered.len() < min_size {
        bail!(
            "Banner data was under {min_size} bytes (was {}) -- aborting!",
            rendered.len()
        );
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, &rendered).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), bytes = rendered.len(), "wrote banner data");
    Ok(rendered.len())
}

/// Downloads one icon per dataset record into the profile's character or
/// weapon directory under `dir`. Returns how many files were written.
/// Records whose name leaves no filename characters are skipped.
pub fn write_images<I: IconSource + ?Sized>(
    dataset: &BannerDataset,
    dir: &Path,
    profile: &GameProfile,
    icons: &mut I,
    options: &ImageOptions,
) -> Result<usize> {
    let mut downloaded = 0;

    for (kind, records) in dataset.buckets() {
        let is_character = kind.is_character();
        let bucket_dir = dir.join(profile.image_dir(is_character));
        fs::create_dir_all(&bucket_dir)
            .with_context(|| format!("failed to create {}", bucket_dir.display()))?;

        for record in records {
            let stem = image_filename(&record.name);
            if stem.is_empty() {
                warn!("Skipping icon for {:?}: no usable filename characters", record.name);
                continue;
            }
            let path = bucket_dir.join(format!("{stem}.png"));
            if path.exists() && !options.force {
                debug!(path = %path.display(), "icon exists, skipping");
                continue;
            }

            let file_name = profile.icon_file(&record.name, is_character);
            let written = icons
                .fetch_file(&file_name, options.size)
                .and_then(|bytes| {
                    fs::write(&path, bytes)
                        .with_context(|| format!("failed to write {}", path.display()))
                });
            match written {
                Ok(()) => {
                    downloaded += 1;
                    info!(bucket = kind.as_str(), "downloaded {file_name}");
                    if !options.delay.is_zero() {
                        sleep(options.delay);
                    }
                }
                Err(error) => {
                    warn!("Failed to download {file_name} for {}: {error:#}", record.name);
                }
            }
        }
    }

    Ok(downloaded)
}

/// File stem for an entity icon: whitespace becomes `-`, anything outside
/// `[A-Za-z0-9-]` is dropped, and runs of `-` collapse.
pub fn image_filename(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    for ch in name.chars() {
        let mapped = if ch.is_whitespace() { '-' } else { ch };
        if !(mapped.is_ascii_alphanumeric() || mapped == '-') {
            continue;
        }
        if mapped == '-' && result.ends_with('-') {
            continue;
        }
        result.push(mapped);
    }
    result
}
