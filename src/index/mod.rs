//! Catalog index data model and its on-disk cache.

pub mod cache;
pub mod class_index;

pub use cache::{CacheLoad, IndexCache, CACHE_FORMAT_VERSION};
pub use class_index::{ClassEntry, ClassSummary, Index};
