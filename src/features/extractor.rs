use opencv::core::{KeyPoint, Mat, Ptr, Size, Vector, CV_8U};
use opencv::prelude::*;
use opencv::{features2d, imgcodecs, imgproc};

use crate::config::VisionConfig;
use crate::error::{Result, VisionError};
use crate::features::descriptor_set::DescriptorSet;

/// Decode encoded image bytes (JPEG, PNG, ...) into a BGR pixel buffer.
///
/// Empty or undecodable input is an input error, never a panic.
pub fn decode_image(bytes: &[u8]) -> Result<Mat> {
    if bytes.is_empty() {
        return Err(VisionError::InvalidImage("empty image buffer".into()));
    }
    let buf = Vector::<u8>::from_slice(bytes);
    let image = imgcodecs::imdecode(&buf, imgcodecs::IMREAD_COLOR)
        .map_err(|e| VisionError::InvalidImage(e.to_string()))?;
    if image.empty() {
        return Err(VisionError::InvalidImage(
            "bytes are not a supported image format".into(),
        ));
    }
    Ok(image)
}

/// ORB keypoint detector + descriptor extractor.
///
/// Images are reduced to a single intensity channel and downscaled to at most
/// `max_width` pixels wide (area resampling, aspect preserved) before
/// detection, so reference and query images go through identical geometry.
pub struct OrbExtractor {
    orb: Ptr<features2d::ORB>,
    max_width: i32,
}

impl OrbExtractor {
    pub fn new(config: &VisionConfig) -> Result<Self> {
        Self::with_params(config.n_features, config.fast_threshold, config.max_width)
    }

    pub fn with_params(n_features: i32, fast_threshold: i32, max_width: i32) -> Result<Self> {
        let orb = features2d::ORB::create(
            n_features,
            1.2,
            8,
            31,
            0,
            2,
            features2d::ORB_ScoreType::HARRIS_SCORE,
            31,
            fast_threshold,
        )?;
        Ok(Self { orb, max_width })
    }

    /// Extract descriptors from a decoded pixel buffer.
    ///
    /// A buffer with no detectable structure yields an empty set, not an error.
    pub fn extract(&mut self, image: &Mat) -> Result<DescriptorSet> {
        if image.empty() || image.rows() == 0 || image.cols() == 0 {
            return Err(VisionError::InvalidImage("empty pixel buffer".into()));
        }

        let gray = to_grayscale(image)?;
        let gray = downscale_to_width(gray, self.max_width)?;

        let mut keypoints = Vector::<KeyPoint>::new();
        let mut descriptors = Mat::default();
        let mask = Mat::default();
        self.orb
            .detect_and_compute(&gray, &mask, &mut keypoints, &mut descriptors, false)?;

        DescriptorSet::from_mat(keypoints.len(), &descriptors)
    }

    /// Decode then extract.
    pub fn extract_from_bytes(&mut self, bytes: &[u8]) -> Result<DescriptorSet> {
        let image = decode_image(bytes)?;
        self.extract(&image)
    }
}

fn to_grayscale(image: &Mat) -> Result<Mat> {
    let image = if image.depth() != CV_8U {
        let mut converted = Mat::default();
        image.convert_to(&mut converted, CV_8U, 1.0, 0.0)?;
        converted
    } else {
        image.try_clone()?
    };

    let code = match image.channels() {
        1 => return Ok(image),
        3 => imgproc::COLOR_BGR2GRAY,
        4 => imgproc::COLOR_BGRA2GRAY,
        n => {
            return Err(VisionError::InvalidImage(format!(
                "unsupported channel count {}",
                n
            )))
        }
    };

    let mut gray = Mat::default();
    imgproc::cvt_color(&image, &mut gray, code, 0)?;
    Ok(gray)
}

fn downscale_to_width(gray: Mat, max_width: i32) -> Result<Mat> {
    let (w, h) = (gray.cols(), gray.rows());
    if w <= max_width {
        return Ok(gray);
    }

    let scale = max_width as f64 / w as f64;
    let new_w = max_width;
    let new_h = ((h as f64 * scale) as i32).max(1);

    let mut resized = Mat::default();
    imgproc::resize(
        &gray,
        &mut resized,
        Size::new(new_w, new_h),
        0.0,
        0.0,
        imgproc::INTER_AREA,
    )?;
    Ok(resized)
}
