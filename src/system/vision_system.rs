//! Vision system: the entry point collaborators (HTTP handlers, CLI) call.
//!
//! `VisionSystem` owns the configuration, the on-disk cache and the shared
//! index handle. It is `Sync`; wrap it in an `Arc` and call it from as many
//! worker threads as needed. Extraction and matching are synchronous and
//! CPU-bound, and a full rebuild takes seconds for a few hundred images, so
//! callers are expected to bound request latency themselves.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::VisionConfig;
use crate::dataset::{DatasetIndexer, SkippedImage};
use crate::error::Result;
use crate::features::OrbExtractor;
use crate::index::{ClassSummary, Index, IndexCache};
use crate::matching::{best_match, top_k, AcceptanceGate, ClassMatcher, ClassScore, MatchResult};

use super::shared_state::IndexHandle;

/// A recognized catalog class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recognition {
    pub class_id: String,
    pub confidence: f64,
}

impl From<MatchResult> for Recognition {
    fn from(m: MatchResult) -> Self {
        Self {
            class_id: m.class_id,
            confidence: m.confidence,
        }
    }
}

/// Outcome of an explicit rebuild.
#[derive(Debug, Clone)]
pub struct RebuildSummary {
    pub class_count: usize,
    pub skipped: Vec<SkippedImage>,
}

pub struct VisionSystem {
    config: VisionConfig,
    cache: IndexCache,
    index: IndexHandle,
    /// Serializes rebuilds so cache writes never interleave.
    rebuild_lock: Mutex<()>,
    /// Number of dataset walks started, explicit or on demand.
    rebuilds: AtomicUsize,
    /// Idle OpenCV handles. A query checks one out and hands it back, so
    /// concurrent queries never share a handle.
    extractors: Mutex<Vec<OrbExtractor>>,
    matchers: Mutex<Vec<ClassMatcher>>,
}

impl VisionSystem {
    pub fn new(config: VisionConfig) -> Result<Self> {
        config.validate()?;
        let cache = IndexCache::new(config.cache_path.clone());
        Ok(Self {
            config,
            cache,
            index: IndexHandle::new(),
            rebuild_lock: Mutex::new(()),
            rebuilds: AtomicUsize::new(0),
            extractors: Mutex::new(Vec::new()),
            matchers: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }

    /// Rebuild from the configured images directory. Returns the class count.
    pub fn build_index(&self) -> Result<usize> {
        let root = self.config.images_dir.clone();
        self.build_index_from(&root)
    }

    pub fn build_index_from(&self, root: &Path) -> Result<usize> {
        Ok(self.rebuild(root)?.class_count)
    }

    /// Rebuild from `root`, replacing the resident index and the cache.
    ///
    /// The new index is assembled without touching the published one and
    /// swapped in only once complete.
    pub fn rebuild(&self, root: &Path) -> Result<RebuildSummary> {
        let _guard = self.rebuild_lock.lock();
        self.rebuild_locked(root)
    }

    /// Caller holds `rebuild_lock`.
    fn rebuild_locked(&self, root: &Path) -> Result<RebuildSummary> {
        self.rebuilds.fetch_add(1, Ordering::Relaxed);
        let report = DatasetIndexer::new(&self.config)?.build(root)?;
        let class_count = report.class_count();
        let index = self.index.publish(report.index);

        if let Err(e) = self.cache.save(&index) {
            warn!(
                "Index rebuilt but cache write to {} failed: {}",
                self.cache.path().display(),
                e
            );
        }

        info!("Published index with {} classes", class_count);
        Ok(RebuildSummary {
            class_count,
            skipped: report.skipped,
        })
    }

    /// Number of indexed classes. Loads the cache if nothing is resident but
    /// never rebuilds.
    pub fn get_index_size(&self) -> usize {
        self.resident_or_cached().map(|i| i.len()).unwrap_or(0)
    }

    /// One row per indexed class, in class id order. Never rebuilds.
    pub fn representatives(&self) -> Vec<ClassSummary> {
        self.resident_or_cached()
            .map(|index| index.classes().map(ClassSummary::from).collect())
            .unwrap_or_default()
    }

    /// Best accepted class for an encoded image, or `None`.
    ///
    /// Malformed bytes are an error; a valid image that matches nothing is
    /// `Ok(None)`.
    pub fn recognize(&self, image_bytes: &[u8]) -> Result<Option<Recognition>> {
        let scores = self.score_image(image_bytes)?;
        let gate = AcceptanceGate::from_config(&self.config);
        let result = best_match(&scores, &gate);
        match &result {
            Some(m) => debug!(
                "Recognized {} (avg_good={:.1}, confidence={:.3})",
                m.class_id, m.avg_good, m.confidence
            ),
            None => debug!("No class cleared the acceptance gate"),
        }
        Ok(result.map(Recognition::from))
    }

    /// Up to `k` accepted classes, strongest first.
    pub fn recognize_topk(&self, image_bytes: &[u8], k: usize) -> Result<Vec<Recognition>> {
        let scores = self.score_image(image_bytes)?;
        let gate = AcceptanceGate::from_config(&self.config);
        Ok(top_k(&scores, &gate, k)
            .into_iter()
            .map(Recognition::from)
            .collect())
    }

    /// Raw per-class scores for an encoded image, before any thresholding.
    pub fn score_image(&self, image_bytes: &[u8]) -> Result<Vec<ClassScore>> {
        // Validate the query before paying for any index loading.
        let idle = self.extractors.lock().pop();
        let mut extractor = match idle {
            Some(extractor) => extractor,
            None => OrbExtractor::new(&self.config)?,
        };
        let query = extractor.extract_from_bytes(image_bytes);
        self.extractors.lock().push(extractor);
        let query = query?;
        if query.is_empty() {
            debug!("Query image has no features");
            return Ok(Vec::new());
        }

        let index = self.index_for_query();
        if index.is_empty() {
            return Ok(Vec::new());
        }

        let idle = self.matchers.lock().pop();
        let matcher = match idle {
            Some(matcher) => matcher,
            None => ClassMatcher::new(self.config.ratio_threshold)?,
        };
        let scores = matcher.score_all(&query, &index);
        self.matchers.lock().push(matcher);
        scores
    }

    fn resident_or_cached(&self) -> Option<Arc<Index>> {
        self.index.get_or_init_with(|| self.cache.load().into_index())
    }

    /// Resident index, else cache, else (if configured) a rebuild. Falls back
    /// to an empty index rather than failing the query.
    fn index_for_query(&self) -> Arc<Index> {
        if let Some(index) = self.resident_or_cached() {
            return index;
        }
        if self.config.rebuild_on_miss {
            let _guard = self.rebuild_lock.lock();
            // another query may have finished the rebuild while we waited
            if let Some(index) = self.index.snapshot() {
                return index;
            }
            let root = self.config.images_dir.clone();
            info!("No resident or cached index, rebuilding from {}", root.display());
            if let Err(e) = self.rebuild_locked(&root) {
                warn!("On-demand rebuild failed: {}", e);
            }
        }
        self.index.snapshot().unwrap_or_default()
    }
}
