//! Directory-per-class image folder scan

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::is_image_file;
use crate::utils::error::{Result, TrainError};

/// A single image sample with its label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
    /// Class directory name (e.g. "covid-19")
    pub class_name: String,
}

/// One dataset split scanned from disk
///
/// Images are not decoded here; [`super::XrayDataset`] loads them lazily.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    /// Split directory
    pub root: PathBuf,
    /// Samples grouped by class, file-name order within a class
    pub samples: Vec<ImageSample>,
    /// Class names, sorted; the position is the label
    pub class_names: Vec<String>,
}

impl ImageFolder {
    /// Scan `root`, which must contain one subdirectory per class
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        info!("Loading images from: {:?}", root);

        if !root.is_dir() {
            return Err(TrainError::Dataset(format!(
                "Dataset directory does not exist: {}",
                root.display()
            )));
        }

        let mut class_names: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                let name = entry.file_name().into_string().map_err(|name| {
                    TrainError::Dataset(format!(
                        "Class directory name is not valid UTF-8: {:?}",
                        name
                    ))
                })?;
                class_names.push(name);
            }
        }
        class_names.sort();

        if class_names.is_empty() {
            return Err(TrainError::Dataset(format!(
                "No class directories found in {}",
                root.display()
            )));
        }

        let mut samples = Vec::new();
        for (label, class_name) in class_names.iter().enumerate() {
            let before = samples.len();
            for entry in WalkDir::new(root.join(class_name))
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
            {
                let entry = entry.map_err(|e| {
                    TrainError::Dataset(format!("Failed to scan class '{}': {}", class_name, e))
                })?;
                if !entry.file_type().is_file() || !is_image_file(entry.path()) {
                    continue;
                }
                samples.push(ImageSample {
                    path: entry.path().to_path_buf(),
                    label,
                    class_name: class_name.clone(),
                });
            }
            debug!(
                "Class '{}' (label {}): {} images",
                class_name,
                label,
                samples.len() - before
            );
        }

        info!(
            "Found {} images belonging to {} classes",
            samples.len(),
            class_names.len()
        );

        Ok(Self {
            root,
            samples,
            class_names,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Label of a class name
    pub fn class_index(&self, name: &str) -> Option<usize> {
        self.class_names.iter().position(|c| c == name)
    }

    /// Label of a class that must be present
    pub fn require_class(&self, name: &str) -> Result<usize> {
        self.class_index(name)
            .ok_or_else(|| TrainError::MissingClass(name.to_string()))
    }

    /// Label of every sample, in sample order
    pub fn classes(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// Number of samples per label
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }

    /// Fail unless `other` has exactly the same classes in the same order
    pub fn ensure_same_classes(&self, other: &ImageFolder) -> Result<()> {
        if self.class_names != other.class_names {
            return Err(TrainError::Dataset(format!(
                "Class mismatch between {} {:?} and {} {:?}",
                self.root.display(),
                self.class_names,
                other.root.display(),
                other.class_names
            )));
        }
        Ok(())
    }

    pub fn stats(&self) -> DatasetStats {
        DatasetStats {
            total_samples: self.len(),
            class_names: self.class_names.clone(),
            class_counts: self.class_counts(),
        }
    }
}

/// Per-class sample counts of a split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub class_names: Vec<String>,
    pub class_counts: Vec<usize>,
}

impl DatasetStats {
    /// Print statistics to console
    pub fn print(&self, title: &str) {
        println!("\n📊 {}:", title);
        println!("  Total samples: {}", self.total_samples);
        println!("  Number of classes: {}", self.class_names.len());

        for (idx, (name, count)) in self.class_names.iter().zip(&self.class_counts).enumerate() {
            let share = if self.total_samples > 0 {
                *count as f32 / self.total_samples as f32
            } else {
                0.0
            };
            let bar: String = "█".repeat((share * 40.0) as usize);
            println!("    {:2}. {:12} {:6} {}", idx, name, count, bar);
        }
    }
}
