//! Reference catalog ingestion.

pub mod indexer;

pub use indexer::{DatasetIndexer, ImageOutcome, IndexReport, SkipReason, SkippedImage};
