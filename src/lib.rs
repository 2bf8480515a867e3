pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod index;
pub mod matching;
pub mod system;
pub mod test_utils;

pub use config::VisionConfig;
pub use error::{Result, VisionError};
pub use system::{Recognition, VisionSystem};
