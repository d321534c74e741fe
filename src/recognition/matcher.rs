//! Template scoring of one frame region against the swatch set.

use image::imageops::{self, FilterType};
use image::RgbaImage;

use super::swatch::{PieceSwatch, SwatchSet, OPAQUE_ALPHA};
use crate::error::EngineError;
use crate::platform::Rect;

/// Best swatch for a region and its score in `0.0..=1.0`.
#[derive(Clone, Copy, Debug)]
pub struct Match<'a> {
    pub swatch: &'a PieceSwatch,
    pub score: f32,
}

/// Fraction of opaque swatch pixels whose RGB channels are all within
/// `tolerance` of the candidate. Both images must have the same size.
pub fn score(candidate: &RgbaImage, swatch: &RgbaImage, tolerance: u8) -> f32 {
    let mut opaque = 0u32;
    let mut close = 0u32;
    for (c, s) in candidate.pixels().zip(swatch.pixels()) {
        if s[3] < OPAQUE_ALPHA {
            continue;
        }
        opaque += 1;
        let within = (0..3).all(|i| c[i].abs_diff(s[i]) <= tolerance);
        if within {
            close += 1;
        }
    }
    if opaque == 0 {
        return 0.0;
    }
    close as f32 / opaque as f32
}

/// Crops `region` out of `image` and returns the best swatch scoring at
/// least the set's threshold. Ties keep the earliest declared swatch.
///
/// A region that does not fit inside the image is a recognizer error, not a
/// failed match.
pub fn classify<'a>(
    image: &RgbaImage,
    region: &Rect,
    swatches: &'a SwatchSet,
) -> Result<Option<Match<'a>>, EngineError> {
    if region.is_empty()
        || region.x < 0
        || region.y < 0
        || region.right() as i64 > image.width() as i64
        || region.bottom() as i64 > image.height() as i64
    {
        return Err(EngineError::Recognizer(format!(
            "region ({}, {}) {}x{} does not fit a {}x{} frame",
            region.x,
            region.y,
            region.width,
            region.height,
            image.width(),
            image.height()
        )));
    }

    let crop = imageops::crop_imm(
        image,
        region.x as u32,
        region.y as u32,
        region.width,
        region.height,
    )
    .to_image();

    // Swatches usually share one size; resize once per distinct size.
    let mut resized: Vec<((u32, u32), RgbaImage)> = Vec::new();
    let mut best: Option<Match<'a>> = None;
    for swatch in swatches.iter() {
        let size = swatch.image.dimensions();
        let candidate = match resized.iter().position(|(s, _)| *s == size) {
            Some(i) => &resized[i].1,
            None => {
                let scaled = if crop.dimensions() == size {
                    crop.clone()
                } else {
                    imageops::resize(&crop, size.0, size.1, FilterType::Triangle)
                };
                resized.push((size, scaled));
                &resized[resized.len() - 1].1
            }
        };

        let s = score(candidate, &swatch.image, swatches.tolerance());
        if s >= swatches.threshold() && best.is_none_or(|b| s > b.score) {
            best = Some(Match { swatch, score: s });
        }
    }
    Ok(best)
}
