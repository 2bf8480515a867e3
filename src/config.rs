//! Engine configuration.
//!
//! Every tunable of the extractor, matcher and ranker lives here so the
//! empirically chosen constants (ratio 0.75, 20 good matches, 0.25 score)
//! can be adjusted per deployment without touching the scoring code.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VisionError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Root of the reference catalog: one subdirectory per class.
    pub images_dir: PathBuf,
    /// Location of the persisted index artifact.
    pub cache_path: PathBuf,
    /// Images wider than this are downscaled before extraction.
    pub max_width: i32,
    /// Upper bound on ORB keypoints per image.
    pub n_features: i32,
    /// FAST detection threshold used by ORB.
    pub fast_threshold: i32,
    /// Lowe ratio: best < ratio * second_best.
    pub ratio_threshold: f32,
    /// Minimum mean good matches per reference image to accept a class.
    pub min_good_matches: f64,
    /// Minimum normalized ratio score to accept a class.
    pub score_threshold: f64,
    /// Rebuild from `images_dir` when a query finds neither a resident index
    /// nor a usable cache.
    pub rebuild_on_miss: bool,
    /// File extensions (lowercase, no dot) considered reference images.
    pub extensions: Vec<String>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            images_dir: PathBuf::from("data/images"),
            cache_path: PathBuf::from("data/cache/vision_index.bin"),
            max_width: 640,
            n_features: 800,
            fast_threshold: 10,
            ratio_threshold: crate::matching::NN_RATIO,
            min_good_matches: 20.0,
            score_threshold: 0.25,
            rebuild_on_miss: true,
            extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
        }
    }
}

impl VisionConfig {
    /// Load a configuration from YAML. Missing keys fall back to defaults.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let config: VisionConfig = serde_yaml::from_reader(file).map_err(|e| {
            VisionError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_width <= 0 {
            return Err(VisionError::Config("max_width must be positive".into()));
        }
        if self.n_features <= 0 {
            return Err(VisionError::Config("n_features must be positive".into()));
        }
        if !(self.ratio_threshold > 0.0 && self.ratio_threshold <= 1.0) {
            return Err(VisionError::Config(
                "ratio_threshold must be in (0, 1]".into(),
            ));
        }
        if self.min_good_matches < 0.0 || self.score_threshold < 0.0 {
            return Err(VisionError::Config(
                "acceptance thresholds must be non-negative".into(),
            ));
        }
        Ok(())
    }

    /// True if `path` carries one of the configured image extensions.
    pub fn is_supported_image(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                self.extensions.iter().any(|x| *x == e)
            })
            .unwrap_or(false)
    }
}
