//! Grape Leaf Dataset Loader
//!
//! Loads a directory-per-class image layout from disk and checks it before
//! any training starts.
//!
//! ```text
//! root_dir/
//! ├── healthy/            (or Grape___healthy/)
//! │   ├── image1.jpg
//! │   └── ...
//! ├── leaf_blight/        (or Grape___Leaf_blight_(Isariopsis_Leaf_Spot)/)
//! ├── esca/               (or Grape___Esca_(Black_Measles)/)
//! └── black_rot/          (or Grape___Black_rot/)
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::dataset::DiseaseClass;
use crate::utils::error::{GrapeLeafError, Result};
use crate::NUM_CLASSES;

/// File extensions treated as images
const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// A single image sample with its label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label
    pub label: DiseaseClass,
}

/// A labelled image set read from a directory-per-class layout
#[derive(Debug, Clone)]
pub struct GrapeLeafDataset {
    /// Root directory of the dataset
    pub root_dir: PathBuf,
    /// All samples, grouped by class in ordinal order
    pub samples: Vec<ImageSample>,
}

impl GrapeLeafDataset {
    /// Load and check a dataset root
    ///
    /// Fails with a dataset error if the root is missing, if any of the four
    /// class subdirectories is missing or holds no images, or if one class
    /// appears under two directory names.
    pub fn load<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Loading grape leaf dataset from: {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(GrapeLeafError::dataset(
                &root_dir,
                "dataset directory does not exist",
            ));
        }

        let class_dirs = discover_class_dirs(&root_dir)?;

        let mut samples = Vec::new();
        for class in DiseaseClass::ALL {
            let class_dir = class_dirs[class.index()].as_ref().ok_or_else(|| {
                GrapeLeafError::dataset(
                    &root_dir,
                    format!(
                        "missing class directory '{}' (or '{}')",
                        class.id(),
                        class.plantvillage_dir_name()
                    ),
                )
            })?;

            let images = list_images(class_dir);
            if images.is_empty() {
                return Err(GrapeLeafError::dataset(
                    class_dir,
                    format!("class directory for '{}' contains no images", class.id()),
                ));
            }

            debug!("Class '{}' (label {}): {} images", class, class.index(), images.len());
            samples.extend(images.into_iter().map(|path| ImageSample { path, label: class }));
        }

        info!("Loaded {} total samples", samples.len());

        Ok(Self { root_dir, samples })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Per-class image counts
    pub fn stats(&self) -> DatasetStats {
        let mut per_class = [0usize; NUM_CLASSES];
        for sample in &self.samples {
            per_class[sample.label.index()] += 1;
        }
        DatasetStats {
            root_dir: self.root_dir.clone(),
            total: self.samples.len(),
            per_class,
        }
    }

    /// Fail unless the dataset fills at least one batch
    pub fn ensure_min_samples(&self, batch_size: usize) -> Result<()> {
        if self.samples.len() < batch_size {
            return Err(GrapeLeafError::dataset(
                &self.root_dir,
                format!(
                    "{} images is fewer than one batch of {}",
                    self.samples.len(),
                    batch_size
                ),
            ));
        }
        Ok(())
    }
}

/// Resolve subdirectories of `root_dir` to classes
fn discover_class_dirs(root_dir: &Path) -> Result<[Option<PathBuf>; NUM_CLASSES]> {
    let mut found: [Option<PathBuf>; NUM_CLASSES] = Default::default();

    let mut entries: Vec<_> = std::fs::read_dir(root_dir)
        .map_err(|e| GrapeLeafError::dataset(root_dir, format!("cannot read directory: {}", e)))?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(class) = DiseaseClass::from_dir_name(&name) else {
            warn!("Ignoring unrecognized directory {:?} in {:?}", name, root_dir);
            continue;
        };

        let slot = &mut found[class.index()];
        if let Some(existing) = slot {
            return Err(GrapeLeafError::dataset(
                root_dir,
                format!(
                    "class '{}' appears twice: {:?} and {:?}",
                    class,
                    existing.file_name().unwrap_or_default(),
                    name
                ),
            ));
        }
        *slot = Some(entry.path());
    }

    Ok(found)
}

/// Image files directly inside `dir`, sorted by name
fn list_images(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| is_image_file(path))
        .collect()
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Open and decode a training image
///
/// Unlike uploads, any format the decoder understands is accepted here. A
/// file that cannot be read or decoded is a dataset error naming the file.
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| GrapeLeafError::dataset(path, format!("cannot read image: {}", e)))?
        .decode()
        .map_err(|e| GrapeLeafError::dataset(path, format!("cannot decode image: {}", e)))
}

/// Per-class image counts for one dataset root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub root_dir: PathBuf,
    pub total: usize,
    /// Counts in class index order
    pub per_class: [usize; NUM_CLASSES],
}

impl DatasetStats {
    pub fn count(&self, class: DiseaseClass) -> usize {
        self.per_class[class.index()]
    }

    /// Ratio of the largest to the smallest class
    pub fn imbalance_ratio(&self) -> f64 {
        let max = self.per_class.iter().copied().max().unwrap_or(0);
        let min = self.per_class.iter().copied().min().unwrap_or(0);
        if min == 0 {
            f64::INFINITY
        } else {
            max as f64 / min as f64
        }
    }
}

impl fmt::Display for DatasetStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} images in {:?}", self.total, self.root_dir)?;
        for class in DiseaseClass::ALL {
            writeln!(f, "  {:12} {:>6}", class.id(), self.count(class))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    const CLASS_DIRS: [&str; 4] = ["healthy", "leaf_blight", "esca", "black_rot"];

    fn write_images(dir: &Path, count: usize) {
        std::fs::create_dir_all(dir).unwrap();
        for i in 0..count {
            let img = RgbImage::from_pixel(8, 8, Rgb([i as u8, 100, 50]));
            img.save(dir.join(format!("leaf_{:03}.png", i))).unwrap();
        }
    }

    fn make_dataset(names: &[&str], per_class: usize) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for name in names {
            write_images(&tmp.path().join(name), per_class);
        }
        tmp
    }

    #[test]
    fn test_load_complete_dataset() {
        let tmp = make_dataset(&CLASS_DIRS, 3);
        let dataset = GrapeLeafDataset::load(tmp.path()).unwrap();

        assert_eq!(dataset.len(), 12);
        let stats = dataset.stats();
        for class in DiseaseClass::ALL {
            assert_eq!(stats.count(class), 3);
        }
        assert_eq!(stats.imbalance_ratio(), 1.0);
    }

    #[test]
    fn test_plantvillage_names_resolve() {
        let tmp = make_dataset(&crate::dataset::PLANTVILLAGE_DIR_NAMES, 2);
        let dataset = GrapeLeafDataset::load(tmp.path()).unwrap();
        assert_eq!(dataset.stats().count(DiseaseClass::Esca), 2);
    }

    #[test]
    fn test_labels_follow_directory() {
        let tmp = make_dataset(&CLASS_DIRS, 1);
        let dataset = GrapeLeafDataset::load(tmp.path()).unwrap();
        for sample in &dataset.samples {
            let dir = sample.path.parent().unwrap().file_name().unwrap();
            assert_eq!(dir.to_string_lossy(), sample.label.id());
        }
    }

    #[test]
    fn test_missing_root_is_dataset_error() {
        let err = GrapeLeafDataset::load("/definitely/not/here").unwrap_err();
        assert!(matches!(err, GrapeLeafError::Dataset(_, _)));
    }

    #[test]
    fn test_missing_class_is_dataset_error() {
        let tmp = make_dataset(&["healthy", "leaf_blight", "black_rot"], 2);
        let err = GrapeLeafDataset::load(tmp.path()).unwrap_err();
        assert!(matches!(err, GrapeLeafError::Dataset(_, _)));
        assert!(err.to_string().contains("esca"));
    }

    #[test]
    fn test_empty_class_is_dataset_error() {
        let tmp = make_dataset(&CLASS_DIRS, 2);
        let esca = tmp.path().join("esca");
        std::fs::remove_dir_all(&esca).unwrap();
        std::fs::create_dir(&esca).unwrap();
        std::fs::write(esca.join("notes.txt"), "not an image").unwrap();

        let err = GrapeLeafDataset::load(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("no images"));
    }

    #[test]
    fn test_duplicate_spelling_is_dataset_error() {
        let tmp = make_dataset(&CLASS_DIRS, 1);
        write_images(&tmp.path().join("Grape___healthy"), 1);
        let err = GrapeLeafDataset::load(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("appears twice"));
    }

    #[test]
    fn test_unknown_directories_ignored() {
        let tmp = make_dataset(&CLASS_DIRS, 1);
        write_images(&tmp.path().join("Tomato___healthy"), 1);
        let dataset = GrapeLeafDataset::load(tmp.path()).unwrap();
        assert_eq!(dataset.len(), 4);
    }

    #[test]
    fn test_fewer_images_than_batch() {
        let tmp = make_dataset(&CLASS_DIRS, 2);
        let dataset = GrapeLeafDataset::load(tmp.path()).unwrap();
        assert!(dataset.ensure_min_samples(8).is_ok());
        assert!(dataset.ensure_min_samples(32).is_err());
    }

    #[test]
    fn test_open_image_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.jpg");
        std::fs::write(&path, b"\xff\xd8\xff garbage").unwrap();

        let err = open_image(&path).unwrap_err();
        assert!(err.to_string().contains("broken.jpg"));
    }
}
