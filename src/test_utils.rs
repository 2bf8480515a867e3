//! Synthetic images for tests and demos.
//!
//! Scenes are drawn from a seeded RNG so the same seed always produces the
//! same pixels (and therefore the same ORB descriptors).
//!
//! ```no_run
//! use valve_vision::test_utils::{textured_image, encode_png};
//!
//! let img = textured_image(42, 480, 360).unwrap();
//! let png = encode_png(&img).unwrap();
//! assert!(!png.is_empty());
//! ```

use std::path::Path;

use opencv::core::{Mat, Point, Rect, Scalar, Vector, CV_8UC1, CV_8UC3, CV_8UC4};
use opencv::prelude::*;
use opencv::{imgcodecs, imgproc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Number of primitives drawn into a base scene.
const BASE_SHAPES: usize = 160;
/// Extra primitives that distinguish variants of the same scene.
const VARIANT_SHAPES: usize = 12;

/// Solid black image with the given channel count (1, 3 or 4).
pub fn blank_image(width: i32, height: i32, channels: i32) -> opencv::Result<Mat> {
    let typ = match channels {
        1 => CV_8UC1,
        4 => CV_8UC4,
        _ => CV_8UC3,
    };
    Mat::new_rows_cols_with_default(height, width, typ, Scalar::all(0.0))
}

/// A BGR scene of random rectangles, circles and lines on a gray background.
pub fn textured_image(seed: u64, width: i32, height: i32) -> opencv::Result<Mat> {
    let mut img = Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(128.0))?;
    let mut rng = StdRng::seed_from_u64(seed);
    draw_shapes(&mut img, &mut rng, BASE_SHAPES)?;
    Ok(img)
}

/// The scene of `seed` with a handful of extra primitives, standing in for a
/// second photo of the same object.
pub fn textured_variant(seed: u64, variant: u64, width: i32, height: i32) -> opencv::Result<Mat> {
    let mut img = textured_image(seed, width, height)?;
    if variant > 0 {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_mul(1_000_003).wrapping_add(variant));
        draw_shapes(&mut img, &mut rng, VARIANT_SHAPES)?;
    }
    Ok(img)
}

/// Copy of a rectangular region.
pub fn crop(image: &Mat, x: i32, y: i32, width: i32, height: i32) -> opencv::Result<Mat> {
    let roi = Mat::roi(image, Rect::new(x, y, width, height))?;
    roi.try_clone()
}

pub fn encode_png(image: &Mat) -> opencv::Result<Vec<u8>> {
    let mut buf = Vector::<u8>::new();
    imgcodecs::imencode(".png", image, &mut buf, &Vector::<i32>::new())?;
    Ok(buf.to_vec())
}

pub fn write_image<P: AsRef<Path>>(path: P, image: &Mat) -> opencv::Result<()> {
    let path = path.as_ref().to_string_lossy().into_owned();
    imgcodecs::imwrite(&path, image, &Vector::<i32>::new())?;
    Ok(())
}

fn draw_shapes(img: &mut Mat, rng: &mut StdRng, count: usize) -> opencv::Result<()> {
    let (w, h) = (img.cols(), img.rows());
    for _ in 0..count {
        let color = Scalar::new(
            rng.gen_range(0.0..255.0),
            rng.gen_range(0.0..255.0),
            rng.gen_range(0.0..255.0),
            0.0,
        );
        let x = rng.gen_range(0..w);
        let y = rng.gen_range(0..h);
        match rng.gen_range(0..3) {
            0 => {
                let rw = rng.gen_range(6..(w / 6).max(7));
                let rh = rng.gen_range(6..(h / 6).max(7));
                imgproc::rectangle(img, Rect::new(x, y, rw, rh), color, -1, imgproc::LINE_8, 0)?;
            }
            1 => {
                let r = rng.gen_range(4..(w.min(h) / 10).max(5));
                imgproc::circle(img, Point::new(x, y), r, color, -1, imgproc::LINE_8, 0)?;
            }
            _ => {
                let x2 = rng.gen_range(0..w);
                let y2 = rng.gen_range(0..h);
                let thickness = rng.gen_range(1..4);
                imgproc::line(
                    img,
                    Point::new(x, y),
                    Point::new(x2, y2),
                    color,
                    thickness,
                    imgproc::LINE_8,
                    0,
                )?;
            }
        }
    }
    Ok(())
}
