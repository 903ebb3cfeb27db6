// ============================================================
// Layer 4 — Image Loading
// ============================================================
// Decodes an image file into the flat channel-first buffer the
// CNN encoder expects:
//
//   file ─► RGB8 ─► resize to size×size ─► (x/255 − mean) / std
//        ─► [R plane | G plane | B plane]   (3 · size · size f32)
//
// Mean/std are the usual ImageNet statistics.
// Augmentation (flips, rotations, contrast) is not done here.

use anyhow::{Context, Result};
use image::{imageops::FilterType, RgbImage};
use std::path::Path;

const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD:  [f32; 3] = [0.229, 0.224, 0.225];

/// Read, resize and normalise one image.
pub fn load_image(path: impl AsRef<Path>, size: usize) -> Result<Vec<f32>> {
    let path  = path.as_ref();
    let image = image::open(path)
        .with_context(|| format!("Cannot decode image '{}'", path.display()))?
        .to_rgb8();
    Ok(preprocess_rgb8_image(&image, size))
}

/// Resize and normalise an already decoded RGB image.
pub fn preprocess_rgb8_image(image: &RgbImage, size: usize) -> Vec<f32> {
    let side    = size as u32;
    let resized = image::imageops::resize(image, side, side, FilterType::Triangle);

    let plane   = size * size;
    let mut out = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let offset = y as usize * size + x as usize;
        for c in 0..3 {
            out[c * plane + offset] = (pixel[c] as f32 / 255.0 - MEAN[c]) / STD[c];
        }
    }
    out
}

/// Buffer used in place of an image that failed to load.
pub fn blank_image(size: usize) -> Vec<f32> {
    vec![0.0; 3 * size * size]
}
