use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced to callers of the recognition engine.
///
/// Recoverable per-item conditions (an unusable reference image, a corrupt
/// cache artifact) never show up here; they are reported as
/// [`crate::dataset::ImageOutcome`] and [`crate::index::CacheLoad`] values.
#[derive(Error, Debug)]
pub enum VisionError {
    #[error("invalid image data: {0}")]
    InvalidImage(String),

    #[error("dataset root {0:?} does not exist or is not a directory")]
    DatasetRoot(PathBuf),

    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, VisionError>;
