//! COVIDx dataset handling
//!
//! The dataset root holds one directory per split, each with one
//! subdirectory per class:
//!
//! ```text
//! data/
//! ├── train/
//! │   ├── covid-19/
//! │   ├── normal/
//! │   └── pneumonia/
//! └── validation/
//!     └── ...
//! ```
//!
//! Labels are the sorted class directory names, indexed from 0.

pub mod burn_dataset;
pub mod loader;

pub use burn_dataset::{XrayBatch, XrayBatcher, XrayDataset, XrayItem};
pub use loader::{DatasetStats, ImageFolder, ImageSample};

/// Class whose precision and recall are tracked
pub const POSITIVE_CLASS: &str = "covid-19";

/// Training split directory under the dataset root
pub const TRAIN_DIR: &str = "train";

/// Validation split directory under the dataset root
pub const VALIDATION_DIR: &str = "validation";

/// File extensions picked up by the directory scan
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// ImageNet channel means used for input normalisation
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet channel standard deviations used for input normalisation
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Whether a path has one of the supported image extensions
pub fn is_image_file(path: &std::path::Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map_or(false, |ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/b/scan.png")));
        assert!(is_image_file(Path::new("scan.JPEG")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("no_extension")));
    }
}
