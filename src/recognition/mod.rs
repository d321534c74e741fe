//! Piece and board recognition by swatch matching.
//!
//! This module provides:
//! - Swatch manifest loading (`SwatchSet`)
//! - Screen layout and aspect-ratio mapping (`Layout`)
//! - Falling-pair detection (`PieceRecognizer`)
//! - Board classification (`BoardRecognizer`)

pub mod board;
pub mod layout;
pub mod matcher;
pub mod piece;
pub mod swatch;

use std::path::Path;
use std::sync::Arc;

pub use board::{BoardCell, BoardRecognizer, BoardState};
pub use layout::{AspectTransform, Layout, PlacementConfig};
pub use piece::{DetectedPair, Orientation, PairKey, PieceKind, PieceRecognizer};
pub use swatch::{PieceSwatch, SwatchRole, SwatchSet};

use crate::error::ConfigError;

/// The recognizers one run uses, built once from layout and swatches.
pub struct Recognizers {
    pub layout: Arc<Layout>,
    pub piece: PieceRecognizer,
    pub board: BoardRecognizer,
}

impl Recognizers {
    pub fn new(layout: Layout, swatches: SwatchSet) -> Self {
        let layout = Arc::new(layout);
        let swatches = Arc::new(swatches);
        Self {
            piece: PieceRecognizer::new(layout.clone(), swatches.clone()),
            board: BoardRecognizer::new(layout.clone(), swatches),
            layout,
        }
    }

    /// Loads `layout.json`, `swatches.json` and the swatch images.
    pub fn load(
        layout_path: &Path,
        manifest_path: &Path,
        swatch_dir: &Path,
    ) -> Result<Self, ConfigError> {
        let layout = Layout::load(layout_path)?;
        let swatches = SwatchSet::load(manifest_path, swatch_dir)?;
        Ok(Self::new(layout, swatches))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::layout::{CellPos, GridSpec};
    use super::*;
    use image::{Rgba, RgbaImage};

    pub(crate) const RED: [u8; 3] = [220, 30, 30];
    pub(crate) const BLUE: [u8; 3] = [30, 30, 220];
    pub(crate) const EMPTY: [u8; 3] = [40, 40, 40];

    fn solid(rgb: [u8; 3]) -> RgbaImage {
        RgbaImage::from_pixel(4, 4, Rgba([rgb[0], rgb[1], rgb[2], 255]))
    }

    /// Red and blue potions plus a dark empty background.
    pub(crate) fn sample_swatches() -> SwatchSet {
        SwatchSet::new(
            vec![
                PieceSwatch::piece("red", "red-potion", solid(RED)),
                PieceSwatch::piece("blue", "blue-potion", solid(BLUE)),
                PieceSwatch::empty("background", solid(EMPTY)),
            ],
            0.8,
            40,
        )
        .unwrap()
    }

    /// Fills one grid cell of a baseline-sized image.
    pub(crate) fn paint_cell(image: &mut RgbaImage, grid: &GridSpec, cell: CellPos, rgb: [u8; 3]) {
        let b = grid.cell_box(cell);
        for y in b.y as u32..(b.y + b.height) as u32 {
            for x in b.x as u32..(b.x + b.width) as u32 {
                image.put_pixel(x, y, Rgba([rgb[0], rgb[1], rgb[2], 255]));
            }
        }
    }

    #[test]
    fn test_load_recognizers_from_files() {
        use std::fs;
        use tempfile::tempdir;

        let dir = tempdir().unwrap();
        let layout_path = dir.path().join("layout.json");
        fs::write(
            &layout_path,
            serde_json::to_string(&layout::tests::sample_layout()).unwrap(),
        )
        .unwrap();

        let swatch_dir = dir.path().join("swatches");
        fs::create_dir_all(&swatch_dir).unwrap();
        solid(RED).save(swatch_dir.join("red.png")).unwrap();
        let manifest = dir.path().join("swatches.json");
        fs::write(
            &manifest,
            r#"{ "swatches": [ { "name": "red", "piece": "red-potion", "image": "red.png" } ] }"#,
        )
        .unwrap();

        let recognizers = Recognizers::load(&layout_path, &manifest, &swatch_dir).unwrap();
        assert_eq!(recognizers.layout.board.columns, 6);

        fs::remove_file(swatch_dir.join("red.png")).unwrap();
        assert!(matches!(
            Recognizers::load(&layout_path, &manifest, &swatch_dir),
            Err(ConfigError::Asset { .. })
        ));
    }

    #[test]
    fn test_shipped_configuration_loads() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR"));
        let config = root.join("configuration");

        let recognizers = Recognizers::load(
            &config.join("layout.json"),
            &config.join("swatches.json"),
            &root.join("assets").join("swatches"),
        )
        .unwrap();
        assert_eq!(recognizers.layout.baseline.width, 1280);
        assert_eq!(recognizers.layout.board.columns, 10);

        let profile = crate::automation::config::load(&config.join("delays.json")).unwrap();
        assert_eq!(profile, crate::automation::config::defaults());
    }
}
