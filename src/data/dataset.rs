//! Paired low/high-resolution dataset built from an image folder
//!
//! Every image in the directory contributes one training pair: a random
//! high-resolution crop and the same crop bilinearly downscaled by the
//! upscale factor. Both sides are stored as `[-1, 1]` float tensors in
//! NCHW layout.

use std::path::Path;

use anyhow::{bail, Context, Result};
use image::imageops::{self, FilterType};
use rand::Rng;
use tch::Tensor;
use tracing::{info, warn};

use super::preprocessing::rgb_to_tensor;

/// Paired low/high-resolution image tensors.
pub struct PairedImageDataset {
    /// High-resolution crops, shape (num_images, 3, crop, crop)
    pub hr: Tensor,
    /// Low-resolution counterparts, shape (num_images, 3, crop / upscale, crop / upscale)
    pub lr: Tensor,
    /// Effective crop size after rounding down to a multiple of the upscale factor
    pub crop_size: u32,
    /// Downscale factor between the pair
    pub upscale_factor: u32,
}

impl PairedImageDataset {
    /// Build a dataset from every decodable image in `dir`.
    ///
    /// `crop_size` is rounded down to a multiple of `upscale_factor` so the
    /// low-resolution side has integral dimensions. Images smaller than the
    /// crop and files that fail to decode are skipped with a warning.
    pub fn from_folder<P: AsRef<Path>>(dir: P, crop_size: u32, upscale_factor: u32) -> Result<Self> {
        let dir = dir.as_ref();
        if upscale_factor == 0 {
            bail!("Upscale factor must be > 0");
        }
        let crop = crop_size - (crop_size % upscale_factor);
        if crop == 0 {
            bail!(
                "Crop size ({}) too small for upscale factor ({})",
                crop_size,
                upscale_factor
            );
        }

        let mut rng = rand::thread_rng();
        let mut hr_images = Vec::new();
        let mut lr_images = Vec::new();

        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read dataset directory {}", dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            let img = match image::open(&path) {
                Ok(img) => img.to_rgb8(),
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            let (width, height) = img.dimensions();
            if width < crop || height < crop {
                warn!(
                    "Skipping {}: {}x{} smaller than crop {}",
                    path.display(),
                    width,
                    height,
                    crop
                );
                continue;
            }

            let x = rng.gen_range(0..=width - crop);
            let y = rng.gen_range(0..=height - crop);
            let hr_crop = imageops::crop_imm(&img, x, y, crop, crop).to_image();
            let lr_crop = imageops::resize(
                &hr_crop,
                crop / upscale_factor,
                crop / upscale_factor,
                FilterType::Triangle,
            );

            hr_images.push(rgb_to_tensor(&hr_crop));
            lr_images.push(rgb_to_tensor(&lr_crop));
        }

        if hr_images.is_empty() {
            bail!("No usable images found in {}", dir.display());
        }

        let hr = Tensor::stack(&hr_images, 0);
        let lr = Tensor::stack(&lr_images, 0);

        info!(
            "Loaded {} image pairs from {} (hr {}x{}, lr {}x{})",
            hr_images.len(),
            dir.display(),
            crop,
            crop,
            crop / upscale_factor,
            crop / upscale_factor
        );

        Ok(Self {
            hr,
            lr,
            crop_size: crop,
            upscale_factor,
        })
    }

    /// Number of image pairs.
    pub fn len(&self) -> usize {
        self.hr.size()[0] as usize
    }

    /// Check if the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn write_test_image(dir: &Path, name: &str, width: u32, height: u32) {
        let mut img = RgbImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = image::Rgb([(x % 256) as u8, (y % 256) as u8, 128]);
        }
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_from_folder_shapes() {
        let dir = tempfile::tempdir().unwrap();
        write_test_image(dir.path(), "a.png", 32, 32);
        write_test_image(dir.path(), "b.png", 48, 40);

        let dataset = PairedImageDataset::from_folder(dir.path(), 16, 4).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.hr.size(), vec![2, 3, 16, 16]);
        assert_eq!(dataset.lr.size(), vec![2, 3, 4, 4]);
    }

    #[test]
    fn test_crop_rounded_to_upscale_multiple() {
        let dir = tempfile::tempdir().unwrap();
        write_test_image(dir.path(), "a.png", 64, 64);

        let dataset = PairedImageDataset::from_folder(dir.path(), 18, 4).unwrap();

        assert_eq!(dataset.crop_size, 16);
        assert_eq!(dataset.hr.size(), vec![1, 3, 16, 16]);
        assert_eq!(dataset.lr.size(), vec![1, 3, 4, 4]);
    }

    #[test]
    fn test_values_in_unit_range() {
        let dir = tempfile::tempdir().unwrap();
        write_test_image(dir.path(), "a.png", 32, 32);

        let dataset = PairedImageDataset::from_folder(dir.path(), 16, 4).unwrap();

        let min: f64 = dataset.hr.min().double_value(&[]);
        let max: f64 = dataset.hr.max().double_value(&[]);
        assert!(min >= -1.0 && max <= 1.0);
    }

    #[test]
    fn test_skips_undecodable_and_small_files() {
        let dir = tempfile::tempdir().unwrap();
        write_test_image(dir.path(), "good.png", 32, 32);
        write_test_image(dir.path(), "small.png", 8, 8);
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let dataset = PairedImageDataset::from_folder(dir.path(), 16, 4).unwrap();
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn test_empty_folder_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PairedImageDataset::from_folder(dir.path(), 16, 4).is_err());
    }

    #[test]
    fn test_zero_upscale_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PairedImageDataset::from_folder(dir.path(), 16, 0).is_err());
    }
}
