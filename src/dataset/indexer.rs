use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::VisionConfig;
use crate::error::{Result, VisionError};
use crate::features::{decode_image, DescriptorSet, OrbExtractor};
use crate::index::{ClassEntry, Index};

/// Why a reference image contributed nothing to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The file could not be read.
    Unreadable(String),
    /// The bytes are not a decodable image.
    Undecodable(String),
    /// Decoded fine but ORB found no keypoints.
    NoFeatures,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unreadable(msg) => write!(f, "unreadable: {}", msg),
            SkipReason::Undecodable(msg) => write!(f, "undecodable: {}", msg),
            SkipReason::NoFeatures => write!(f, "no features"),
        }
    }
}

#[derive(Debug)]
pub enum ImageOutcome {
    Indexed(DescriptorSet),
    Skipped(SkipReason),
}

#[derive(Debug, Clone)]
pub struct SkippedImage {
    pub class_id: String,
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Result of a full dataset walk.
#[derive(Debug)]
pub struct IndexReport {
    pub index: Index,
    pub skipped: Vec<SkippedImage>,
}

impl IndexReport {
    pub fn class_count(&self) -> usize {
        self.index.len()
    }
}

/// Walks `<root>/<class_id>/<image>` and extracts descriptors per image.
///
/// Entries are visited in name order so repeated builds over the same tree
/// pick the same representative image per class.
pub struct DatasetIndexer {
    extractor: OrbExtractor,
    config: VisionConfig,
}

impl DatasetIndexer {
    pub fn new(config: &VisionConfig) -> Result<Self> {
        Ok(Self {
            extractor: OrbExtractor::new(config)?,
            config: config.clone(),
        })
    }

    /// Build a fresh index from `root`.
    ///
    /// Only a missing or unreadable root fails the build; individual images
    /// and class directories that cannot be used are recorded and skipped.
    pub fn build(&mut self, root: &Path) -> Result<IndexReport> {
        if !root.is_dir() {
            return Err(VisionError::DatasetRoot(root.to_path_buf()));
        }
        let class_dirs = sorted_entries(root)
            .map_err(|_| VisionError::DatasetRoot(root.to_path_buf()))?
            .into_iter()
            .filter(|p| p.is_dir());

        let mut entries = Vec::new();
        let mut skipped = Vec::new();

        for dir in class_dirs {
            let class_id = match dir.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => continue,
            };

            let files = match sorted_entries(&dir) {
                Ok(files) => files,
                Err(e) => {
                    warn!("Skipping class {}: cannot list {:?}: {}", class_id, dir, e);
                    continue;
                }
            };

            let mut sets = Vec::new();
            let mut images = Vec::new();
            for path in files
                .into_iter()
                .filter(|p| p.is_file() && self.config.is_supported_image(p))
            {
                match self.process_image(&path) {
                    ImageOutcome::Indexed(set) => {
                        let file_name = path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        images.push(format!("{}/{}", class_id, file_name));
                        sets.push(set);
                    }
                    ImageOutcome::Skipped(reason) => {
                        warn!("Skipping {:?}: {}", path, reason);
                        skipped.push(SkippedImage {
                            class_id: class_id.clone(),
                            path,
                            reason,
                        });
                    }
                }
            }

            debug!("class {}: {} usable images", class_id, sets.len());
            match ClassEntry::new(class_id.clone(), sets, images) {
                Some(entry) => entries.push(entry),
                None => warn!("Class {} has no usable images, omitted from index", class_id),
            }
        }

        let index = Index::from_entries(entries);
        info!(
            "Indexed {} classes ({} images, {} skipped) from {}",
            index.len(),
            index.num_descriptor_sets(),
            skipped.len(),
            root.display()
        );
        Ok(IndexReport { index, skipped })
    }

    /// Read, decode and extract a single reference image.
    pub fn process_image(&mut self, path: &Path) -> ImageOutcome {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) => return ImageOutcome::Skipped(SkipReason::Unreadable(e.to_string())),
        };
        let image = match decode_image(&bytes) {
            Ok(img) => img,
            Err(e) => return ImageOutcome::Skipped(SkipReason::Undecodable(e.to_string())),
        };
        match self.extractor.extract(&image) {
            Ok(set) if set.is_empty() => ImageOutcome::Skipped(SkipReason::NoFeatures),
            Ok(set) => ImageOutcome::Indexed(set),
            Err(e) => ImageOutcome::Skipped(SkipReason::Undecodable(e.to_string())),
        }
    }
}

fn sorted_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect::<Vec<_>>();
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{blank_image, textured_variant, write_image};

    fn indexer() -> DatasetIndexer {
        DatasetIndexer::new(&VisionConfig::default()).unwrap()
    }

    #[test]
    fn test_missing_root_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = indexer().build(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, VisionError::DatasetRoot(_)));
    }

    #[test]
    fn test_unusable_images_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let class_dir = dir.path().join("V10");
        fs::create_dir_all(&class_dir).unwrap();

        write_image(class_dir.join("a.png"), &textured_variant(1, 0, 320, 240).unwrap()).unwrap();
        write_image(class_dir.join("black.png"), &blank_image(320, 240, 3).unwrap()).unwrap();
        fs::write(class_dir.join("broken.jpg"), b"not an image").unwrap();
        fs::write(class_dir.join("notes.txt"), b"ignored").unwrap();

        let report = indexer().build(dir.path()).unwrap();
        assert_eq!(report.class_count(), 1);

        let entry = report.index.get("V10").unwrap();
        assert_eq!(entry.reference_count(), 1);
        assert_eq!(entry.images(), &["V10/a.png".to_string()]);

        assert_eq!(report.skipped.len(), 2);
        assert!(report
            .skipped
            .iter()
            .any(|s| s.reason == SkipReason::NoFeatures));
        assert!(report
            .skipped
            .iter()
            .any(|s| matches!(s.reason, SkipReason::Undecodable(_))));
    }

    #[test]
    fn test_class_without_usable_images_is_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("GOOD");
        let empty = dir.path().join("EMPTY");
        let blank = dir.path().join("BLANK");
        for d in [&good, &empty, &blank] {
            fs::create_dir_all(d).unwrap();
        }
        write_image(good.join("1.png"), &textured_variant(2, 0, 320, 240).unwrap()).unwrap();
        write_image(blank.join("1.png"), &blank_image(320, 240, 1).unwrap()).unwrap();
        fs::write(dir.path().join("stray.png"), b"root-level files are ignored").unwrap();

        let report = indexer().build(dir.path()).unwrap();
        let ids: Vec<&str> = report.index.class_ids().collect();
        assert_eq!(ids, vec!["GOOD"]);
        assert!(report.index.classes().all(|c| c.reference_count() >= 1));
    }

    #[test]
    fn test_representative_is_first_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let class_dir = dir.path().join("A100");
        fs::create_dir_all(&class_dir).unwrap();
        write_image(class_dir.join("b.png"), &textured_variant(3, 1, 320, 240).unwrap()).unwrap();
        write_image(class_dir.join("a.png"), &textured_variant(3, 0, 320, 240).unwrap()).unwrap();
        fs::rename(class_dir.join("a.png"), class_dir.join("a.PNG")).unwrap();

        let report = indexer().build(dir.path()).unwrap();
        let entry = report.index.get("A100").unwrap();
        assert_eq!(entry.reference_count(), 2);
        assert_eq!(entry.representative_image(), "A100/a.PNG");
    }
}
