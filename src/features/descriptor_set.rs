use opencv::core::{Mat, CV_8UC1};
use opencv::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VisionError};

/// Width in bytes of an ORB descriptor (256 bits).
pub const ORB_DESCRIPTOR_BYTES: usize = 32;

/// Binary descriptors extracted from a single image.
///
/// Rows are stored contiguously as plain bytes so the set can be shared across
/// threads and serialized without dragging OpenCV handles along. An empty set
/// is a valid result meaning "no exploitable features".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDescriptorSet")]
pub struct DescriptorSet {
    /// Number of keypoints the detector kept for this image.
    pub keypoint_count: usize,
    width: usize,
    data: Vec<u8>,
}

/// Wire shape of [`DescriptorSet`]; decoding goes through `from_rows` so a
/// ragged or zero-width buffer is rejected.
#[derive(Deserialize)]
struct RawDescriptorSet {
    keypoint_count: usize,
    width: usize,
    data: Vec<u8>,
}

impl TryFrom<RawDescriptorSet> for DescriptorSet {
    type Error = VisionError;

    fn try_from(raw: RawDescriptorSet) -> Result<Self> {
        Self::from_rows(raw.keypoint_count, raw.width, raw.data)
    }
}

impl DescriptorSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set from `width`-byte rows packed back to back.
    pub fn from_rows(keypoint_count: usize, width: usize, data: Vec<u8>) -> Result<Self> {
        if width == 0 && !data.is_empty() {
            return Err(VisionError::InvalidImage(
                "descriptor width must be non-zero".into(),
            ));
        }
        if width > 0 && data.len() % width != 0 {
            return Err(VisionError::InvalidImage(format!(
                "descriptor buffer of {} bytes is not a multiple of row width {}",
                data.len(),
                width
            )));
        }
        Ok(Self {
            keypoint_count,
            width,
            data,
        })
    }

    /// Copy descriptors out of an OpenCV matrix (one CV_8U row per keypoint).
    pub fn from_mat(keypoint_count: usize, descriptors: &Mat) -> Result<Self> {
        if descriptors.empty() || descriptors.rows() == 0 {
            return Ok(Self {
                keypoint_count,
                ..Self::default()
            });
        }
        if descriptors.typ() != CV_8UC1 {
            return Err(VisionError::InvalidImage(format!(
                "expected CV_8UC1 descriptors, got type {}",
                descriptors.typ()
            )));
        }

        let width = descriptors.cols() as usize;
        let mut data = Vec::with_capacity(width * descriptors.rows() as usize);
        for r in 0..descriptors.rows() {
            data.extend_from_slice(descriptors.at_row::<u8>(r)?);
        }

        Ok(Self {
            keypoint_count,
            width,
            data,
        })
    }

    /// Rebuild an OpenCV matrix for the brute-force matcher.
    pub fn to_mat(&self) -> Result<Mat> {
        if self.is_empty() {
            return Ok(Mat::default());
        }
        let rows: Vec<&[u8]> = self.rows().collect();
        Ok(Mat::from_slice_2d::<u8>(rows.as_slice())?)
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.data.len() / self.width
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Descriptor width in bytes (0 for an empty set).
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn row(&self, idx: usize) -> Option<&[u8]> {
        if idx >= self.len() {
            return None;
        }
        let start = idx * self.width;
        Some(&self.data[start..start + self.width])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        // chunks_exact panics on 0
        self.data.chunks_exact(self.width.max(1))
    }
}

/// Number of differing bits between two binary descriptors.
///
/// Only the common prefix is compared; callers check widths beforehand.
#[inline]
pub fn hamming_distance(a: &[u8], b: &[u8]) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hamming_distance() {
        let a = [0u8; 32];
        let b = [0u8; 32];
        assert_eq!(hamming_distance(&a, &b), 0);

        let mut c = [0u8; 32];
        c[0] = 0xFF;
        assert_eq!(hamming_distance(&a, &c), 8);

        c[1] = 0x0F;
        assert_eq!(hamming_distance(&a, &c), 12);
    }

    #[test]
    fn test_rows_layout() {
        let data: Vec<u8> = (0..64).collect();
        let set = DescriptorSet::from_rows(2, ORB_DESCRIPTOR_BYTES, data).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.row(1).unwrap()[0], 32);
        assert!(set.row(2).is_none());
        assert_eq!(set.rows().count(), 2);
    }

    #[test]
    fn test_ragged_buffer_rejected() {
        assert!(DescriptorSet::from_rows(1, 32, vec![0u8; 33]).is_err());
    }

    #[test]
    fn test_decoding_rejects_ragged_rows() {
        let ragged = DescriptorSet {
            keypoint_count: 2,
            width: 32,
            data: vec![1u8; 40],
        };
        let bytes = bincode::serialize(&ragged).unwrap();
        assert!(bincode::deserialize::<DescriptorSet>(&bytes).is_err());

        let zero_width = DescriptorSet {
            keypoint_count: 1,
            width: 0,
            data: vec![1u8; 32],
        };
        let bytes = bincode::serialize(&zero_width).unwrap();
        assert!(bincode::deserialize::<DescriptorSet>(&bytes).is_err());

        let good = DescriptorSet::from_rows(2, 32, vec![1u8; 64]).unwrap();
        let bytes = bincode::serialize(&good).unwrap();
        assert_eq!(bincode::deserialize::<DescriptorSet>(&bytes).unwrap(), good);
    }

    #[test]
    fn test_empty_set() {
        let set = DescriptorSet::empty();
        assert!(set.is_empty());
        assert_eq!(set.rows().count(), 0);
        assert!(set.to_mat().unwrap().empty());
    }

    #[test]
    fn test_mat_conversion_preserves_rows() {
        let data: Vec<u8> = (0..96).map(|v| (v * 7 % 251) as u8).collect();
        let set = DescriptorSet::from_rows(3, ORB_DESCRIPTOR_BYTES, data).unwrap();

        let mat = set.to_mat().unwrap();
        assert_eq!(mat.rows(), 3);
        assert_eq!(mat.cols(), 32);

        let back = DescriptorSet::from_mat(3, &mat).unwrap();
        assert_eq!(back, set);
    }
}
