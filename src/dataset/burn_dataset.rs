//! Burn Dataset and Batcher for chest X-rays
//!
//! Items are decoded on demand. The batcher stacks them into a
//! `[batch, 3, H, W]` tensor and applies ImageNet normalisation, which is what
//! the ResNet50 backbone expects.

use std::path::{Path, PathBuf};

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::imageops::FilterType;
use image::ImageReader;
use serde::{Deserialize, Serialize};

use super::loader::ImageFolder;
use super::{IMAGENET_MEAN, IMAGENET_STD};
use crate::utils::error::{Result, TrainError};

/// A single X-ray ready for Burn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct XrayItem {
    /// Image data as flattened CHW float array [3 * H * W], in [0, 1]
    pub image: Vec<f32>,
    /// Class label
    pub label: usize,
    /// Image path (for debugging/logging)
    pub path: String,
}

impl XrayItem {
    /// Load, resize and convert an image.
    ///
    /// Grayscale scans are replicated over the three channels.
    pub fn from_path(path: &Path, label: usize, image_size: usize) -> Result<Self> {
        let img = ImageReader::open(path)
            .map_err(|e| TrainError::Image(format!("{}: {}", path.display(), e)))?
            .decode()
            .map_err(|e| TrainError::Image(format!("{}: {}", path.display(), e)))?
            .resize_exact(image_size as u32, image_size as u32, FilterType::Triangle)
            .to_rgb8();

        let plane = image_size * image_size;
        let mut image = vec![0.0f32; 3 * plane];
        for (x, y, pixel) in img.enumerate_pixels() {
            let offset = y as usize * image_size + x as usize;
            for c in 0..3 {
                image[c * plane + offset] = pixel[c] as f32 / 255.0;
            }
        }

        Ok(Self {
            image,
            label,
            path: path.to_string_lossy().to_string(),
        })
    }

    /// Create from pre-loaded image data
    pub fn from_data(image: Vec<f32>, label: usize, path: String) -> Self {
        Self { image, label, path }
    }
}

/// Lazily decoded X-ray split
#[derive(Debug, Clone)]
pub struct XrayDataset {
    /// (image_path, label) pairs
    samples: Vec<(PathBuf, usize)>,
    image_size: usize,
}

impl XrayDataset {
    pub fn new(samples: Vec<(PathBuf, usize)>, image_size: usize) -> Self {
        Self {
            samples,
            image_size,
        }
    }

    pub fn from_folder(folder: &ImageFolder, image_size: usize) -> Self {
        let samples = folder
            .samples
            .iter()
            .map(|s| (s.path.clone(), s.label))
            .collect();
        Self::new(samples, image_size)
    }

    /// Decode the sample at `index`, reporting why it failed
    pub fn load(&self, index: usize) -> Result<XrayItem> {
        let (path, label) = self.samples.get(index).ok_or_else(|| {
            TrainError::Dataset(format!(
                "Index {} out of range for {} samples",
                index,
                self.samples.len()
            ))
        })?;
        XrayItem::from_path(path, *label, self.image_size)
    }
}

impl Dataset<XrayItem> for XrayDataset {
    fn get(&self, index: usize) -> Option<XrayItem> {
        match self.load(index) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("Skipping sample {}: {}", index, e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of X-rays
#[derive(Clone, Debug)]
pub struct XrayBatch<B: Backend> {
    /// Normalised images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher for X-ray batches
#[derive(Clone, Debug)]
pub struct XrayBatcher {
    image_size: usize,
}

impl XrayBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, XrayItem, XrayBatch<B>> for XrayBatcher {
    fn batch(&self, items: Vec<XrayItem>, device: &B::Device) -> XrayBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, size, size]),
            device,
        );

        // (x - mean) / std per channel
        let mean = Tensor::<B, 4>::from_floats(TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]), device);
        let std = Tensor::<B, 4>::from_floats(TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]), device);
        let images = (images - mean) / std;

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        XrayBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use image::{GrayImage, Luma};

    type TestBackend = NdArray;

    #[test]
    fn test_from_path_grayscale_to_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        GrayImage::from_pixel(8, 8, Luma([255u8])).save(&path).unwrap();

        let item = XrayItem::from_path(&path, 2, 4).unwrap();

        assert_eq!(item.label, 2);
        assert_eq!(item.image.len(), 3 * 4 * 4);
        assert!(item.image.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_load_reports_bad_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();

        let dataset = XrayDataset::new(vec![(path, 0)], 4);
        assert!(matches!(dataset.load(0), Err(TrainError::Image(_))));
        assert!(dataset.get(0).is_none());
        assert!(matches!(dataset.load(1), Err(TrainError::Dataset(_))));
    }

    #[test]
    fn test_batcher_shapes_and_normalisation() {
        let device = Default::default();
        let items = vec![
            XrayItem::from_data(vec![0.485; 3 * 2 * 2], 0, "a".to_string()),
            XrayItem::from_data(vec![0.0; 3 * 2 * 2], 1, "b".to_string()),
        ];

        let batch: XrayBatch<TestBackend> = XrayBatcher::new(2).batch(items, &device);

        assert_eq!(batch.images.dims(), [2, 3, 2, 2]);
        assert_eq!(batch.targets.dims(), [2]);

        let values = batch.images.into_data().to_vec::<f32>().unwrap();
        // first pixel of the red channel equals the mean, so it normalises to 0
        assert!(values[0].abs() < 1e-5);
        let targets = batch.targets.into_data().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![0, 1]);
    }
}
