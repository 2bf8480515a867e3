//! Descriptor extraction: image decoding, grayscale + downscale, ORB.

pub mod descriptor_set;
pub mod extractor;

pub use descriptor_set::{hamming_distance, DescriptorSet, ORB_DESCRIPTOR_BYTES};
pub use extractor::{decode_image, OrbExtractor};
