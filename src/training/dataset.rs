//! Directory-per-class image dataset.
//!
//! Class directories sorted by name give the class indices. Within each class
//! the sorted file list is split so the leading fraction becomes validation.

use std::path::{Path, PathBuf};

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use rand::Rng;
use tracing::{info, warn};

use crate::config::AugmentationConfig;
use crate::domain::LabelMap;
use crate::error::{FakelensError, Result};
use crate::ml::augment;
use crate::ml::cnn::images_to_tensor;
use crate::ml::preprocess::{decode_rgb, PreprocessedTensor};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];

#[derive(Debug, Clone, PartialEq)]
pub struct ImageItem {
    pub path: PathBuf,
    /// 0 or 1
    pub label: u8,
}

#[derive(Debug, Clone)]
pub struct DatasetSplit {
    pub class_names: [String; 2],
    pub train: Vec<ImageItem>,
    pub valid: Vec<ImageItem>,
}

impl DatasetSplit {
    /// Scan `root` and split each class into training and validation items.
    pub fn from_directory(root: &Path, validation_split: f64) -> Result<Self> {
        if !root.is_dir() {
            return Err(FakelensError::Dataset(format!(
                "dataset directory {} does not exist",
                root.display()
            )));
        }

        let mut class_dirs: Vec<PathBuf> = std::fs::read_dir(root)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        class_dirs.sort();

        if class_dirs.len() != 2 {
            return Err(FakelensError::Dataset(format!(
                "expected exactly 2 class directories in {}, found {}",
                root.display(),
                class_dirs.len()
            )));
        }

        let mut class_names: [String; 2] = Default::default();
        let mut train = Vec::new();
        let mut valid = Vec::new();

        for (label, dir) in class_dirs.iter().enumerate() {
            class_names[label] = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let files = list_images(dir)?;
            if files.len() < 2 {
                return Err(FakelensError::Dataset(format!(
                    "class {:?} needs at least 2 images, found {}",
                    class_names[label],
                    files.len()
                )));
            }

            let n_valid = validation_count(files.len(), validation_split);
            for (i, path) in files.into_iter().enumerate() {
                let item = ImageItem {
                    path,
                    label: label as u8,
                };
                if i < n_valid {
                    valid.push(item);
                } else {
                    train.push(item);
                }
            }
        }

        info!(
            "Found {} training and {} validation images in classes {:?}",
            train.len(),
            valid.len(),
            class_names
        );
        Ok(Self {
            class_names,
            train,
            valid,
        })
    }

    pub fn label_map(&self) -> LabelMap {
        LabelMap::new(self.class_names[0].clone(), self.class_names[1].clone())
    }
}

/// Validation share of a class, keeping at least one image on each side.
fn validation_count(total: usize, split: f64) -> usize {
    let n = (total as f64 * split).ceil() as usize;
    n.clamp(1, total.saturating_sub(1))
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_image_extension(p))
        .collect();
    files.sort();
    Ok(files)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

/// Decoded (and possibly augmented) sample ready for batching.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub pixels: PreprocessedTensor,
    pub label: u8,
}

/// Read, resize and optionally augment one item. Unreadable files are skipped.
pub fn load_item<R: Rng + ?Sized>(
    item: &ImageItem,
    size: usize,
    augmentation: Option<&AugmentationConfig>,
    rng: &mut R,
) -> Option<LoadedImage> {
    let loaded = std::fs::read(&item.path)
        .map_err(FakelensError::from)
        .and_then(|bytes| decode_rgb(&bytes, size))
        .and_then(|rgb| {
            let rgb = match augmentation {
                Some(config) => augment::augment(&rgb, config, rng),
                None => rgb,
            };
            PreprocessedTensor::from_rgb(&rgb)
        });

    match loaded {
        Ok(pixels) => Some(LoadedImage {
            pixels,
            label: item.label,
        }),
        Err(e) => {
            warn!("Skipping {}: {}", item.path.display(), e);
            None
        }
    }
}

#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// `[batch, size, size, 3]`
    pub images: Tensor<B, 4>,
    /// `[batch, 1]` with values 0.0 or 1.0
    pub targets: Tensor<B, 2>,
}

#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<LoadedImage, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<LoadedImage>) -> ImageBatch<B> {
        let n = items.len();
        let size = items.first().map(|i| i.pixels.size()).unwrap_or(0);

        let targets: Vec<f32> = items.iter().map(|i| i.label as f32).collect();
        let pixels: Vec<f32> = items
            .into_iter()
            .flat_map(|i| i.pixels.into_vec())
            .collect();

        ImageBatch {
            images: images_to_tensor::<B>(&pixels, n, size, &self.device),
            targets: Tensor::<B, 1>::from_floats(targets.as_slice(), &self.device).reshape([n, 1]),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_dataset {
    use crate::ml::preprocess::test_images::rgb_png;
    use std::path::{Path, PathBuf};

    /// Two classes of solid-colour PNGs under a fresh temp directory.
    pub fn write(per_class: usize) -> PathBuf {
        let root =
            std::env::temp_dir().join(format!("fakelens-dataset-{}", uuid::Uuid::new_v4()));
        write_class(&root.join("fake"), per_class, [200, 20, 20]);
        write_class(&root.join("real"), per_class, [20, 20, 200]);
        root
    }

    fn write_class(dir: &Path, n: usize, color: [u8; 3]) {
        std::fs::create_dir_all(dir).unwrap();
        for i in 0..n {
            let shade = [color[0], color[1].saturating_add(i as u8 * 10), color[2]];
            std::fs::write(dir.join(format!("img_{i:02}.png")), rgb_png(40, 30, shade)).unwrap();
        }
    }
}
