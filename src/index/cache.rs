//! On-disk persistence of the catalog index.
//!
//! The artifact reflects the index as of the last explicit rebuild. Nothing
//! here compares it against the images on disk: adding or removing reference
//! photos has no effect until the next rebuild.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, VisionError};
use crate::index::class_index::Index;

/// Bumped whenever the serialized layout of [`Index`] changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct CacheArtifactRef<'a> {
    version: u32,
    index: &'a Index,
}

#[derive(Deserialize)]
struct CacheArtifact {
    version: u32,
    index: Index,
}

/// Outcome of reading the cache artifact.
#[derive(Debug)]
pub enum CacheLoad {
    Loaded(Index),
    /// No artifact at the configured path.
    NotFound,
    /// Artifact present but unreadable, truncated, or from another format
    /// version. Treated as a miss by callers.
    Corrupt(String),
}

impl CacheLoad {
    pub fn into_index(self) -> Option<Index> {
        match self {
            CacheLoad::Loaded(index) => Some(index),
            CacheLoad::NotFound | CacheLoad::Corrupt(_) => None,
        }
    }
}

/// Single-file bincode store for an [`Index`].
#[derive(Debug, Clone)]
pub struct IndexCache {
    path: PathBuf,
}

impl IndexCache {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the full index, replacing any previous artifact.
    ///
    /// The bytes go to a sibling temp file first and are renamed into place.
    pub fn save(&self, index: &Index) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.tmp_path();
        if let Err(e) = self.write_artifact(&tmp_path, index) {
            if let Err(rm) = fs::remove_file(&tmp_path) {
                if rm.kind() != ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", tmp_path.display(), rm);
                }
            }
            return Err(e);
        }

        info!(
            "Saved index cache: {} classes, {} descriptor sets -> {}",
            index.len(),
            index.num_descriptor_sets(),
            self.path.display()
        );
        Ok(())
    }

    /// Read the artifact back. Never fails: absence and corruption are
    /// reported as values.
    pub fn load(&self) -> CacheLoad {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No index cache at {}", self.path.display());
                return CacheLoad::NotFound;
            }
            Err(e) => return self.corrupt(format!("read failed: {}", e)),
        };

        let artifact: CacheArtifact = match bincode::deserialize(&bytes) {
            Ok(a) => a,
            Err(e) => return self.corrupt(format!("decode failed: {}", e)),
        };

        if artifact.version != CACHE_FORMAT_VERSION {
            return self.corrupt(format!(
                "format version {} (expected {})",
                artifact.version, CACHE_FORMAT_VERSION
            ));
        }
        if let Err(msg) = artifact.index.check_invariants() {
            return self.corrupt(msg);
        }

        info!(
            "Loaded index cache: {} classes from {}",
            artifact.index.len(),
            self.path.display()
        );
        CacheLoad::Loaded(artifact.index)
    }

    fn write_artifact(&self, tmp_path: &Path, index: &Index) -> Result<()> {
        {
            let mut writer = BufWriter::new(File::create(tmp_path)?);
            let artifact = CacheArtifactRef {
                version: CACHE_FORMAT_VERSION,
                index,
            };
            bincode::serialize_into(&mut writer, &artifact)
                .map_err(|e| VisionError::Cache(e.to_string()))?;
            writer.flush()?;
        }
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }

    fn corrupt(&self, reason: String) -> CacheLoad {
        warn!(
            "Ignoring unusable index cache {}: {}",
            self.path.display(),
            reason
        );
        CacheLoad::Corrupt(reason)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}
