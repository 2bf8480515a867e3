//! Top-level recognition service and the shared index handle it publishes to.
//!
//! `VisionSystem` is what collaborators call: rebuild, size, recognize and
//! top-k. `IndexHandle` is the double-buffered slot the current index lives in.

pub mod shared_state;
mod vision_system;

pub use shared_state::IndexHandle;
pub use vision_system::{RebuildSummary, Recognition, VisionSystem};
