//! Reference swatches: one small image per piece kind plus the empty-cell
//! background, listed in `swatches.json`.
//!
//! ```json
//! {
//!   "threshold": 0.8,
//!   "tolerance": 40,
//!   "swatches": [
//!     { "name": "red", "piece": "red-potion", "image": "red.png" },
//!     { "name": "background", "empty": true, "image": "empty.png" }
//!   ]
//! }
//! ```
//!
//! Declaration order matters: on equal scores the earlier swatch wins.

use image::RgbaImage;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use super::piece::PieceKind;
use crate::error::ConfigError;

/// Pixels with alpha below this are ignored when scoring.
pub const OPAQUE_ALPHA: u8 = 128;

fn default_threshold() -> f32 {
    0.8
}

fn default_tolerance() -> u8 {
    40
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default = "default_threshold")]
    threshold: f32,
    #[serde(default = "default_tolerance")]
    tolerance: u8,
    swatches: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    name: String,
    #[serde(default)]
    piece: Option<String>,
    #[serde(default)]
    empty: bool,
    image: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SwatchRole {
    Piece(PieceKind),
    Empty,
}

#[derive(Clone, Debug)]
pub struct PieceSwatch {
    pub name: String,
    pub role: SwatchRole,
    pub image: RgbaImage,
}

impl PieceSwatch {
    pub fn piece(name: &str, kind: &str, image: RgbaImage) -> Self {
        Self {
            name: name.to_string(),
            role: SwatchRole::Piece(PieceKind::new(kind)),
            image,
        }
    }

    pub fn empty(name: &str, image: RgbaImage) -> Self {
        Self {
            name: name.to_string(),
            role: SwatchRole::Empty,
            image,
        }
    }
}

/// Ordered swatches and the scoring parameters shared by all of them.
#[derive(Clone, Debug)]
pub struct SwatchSet {
    swatches: Vec<PieceSwatch>,
    threshold: f32,
    tolerance: u8,
}

impl SwatchSet {
    pub fn new(
        swatches: Vec<PieceSwatch>,
        threshold: f32,
        tolerance: u8,
    ) -> Result<Self, ConfigError> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "swatch threshold {} must lie in (0, 1]",
                threshold
            )));
        }
        if !swatches
            .iter()
            .any(|s| matches!(s.role, SwatchRole::Piece(_)))
        {
            return Err(ConfigError::Invalid(
                "swatch manifest declares no piece swatch".to_string(),
            ));
        }
        for swatch in &swatches {
            if let SwatchRole::Piece(kind) = &swatch.role {
                PieceKind::parse(kind.as_str()).map_err(|e| {
                    ConfigError::Invalid(format!("swatch '{}': {}", swatch.name, e))
                })?;
            }
            let opaque = swatch.image.pixels().any(|p| p[3] >= OPAQUE_ALPHA);
            if !opaque {
                return Err(ConfigError::Invalid(format!(
                    "swatch '{}' has no opaque pixels",
                    swatch.name
                )));
            }
        }
        Ok(Self {
            swatches,
            threshold,
            tolerance,
        })
    }

    /// Reads the manifest and every image it names from `asset_dir`.
    pub fn load(manifest_path: &Path, asset_dir: &Path) -> Result<Self, ConfigError> {
        if !manifest_path.exists() {
            return Err(ConfigError::NotFound {
                path: manifest_path.to_path_buf(),
            });
        }
        let contents = fs::read_to_string(manifest_path).map_err(|source| ConfigError::Read {
            path: manifest_path.to_path_buf(),
            source,
        })?;
        let manifest: Manifest =
            serde_json::from_str(&contents).map_err(|e| ConfigError::Malformed {
                path: manifest_path.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut swatches = Vec::with_capacity(manifest.swatches.len());
        for entry in manifest.swatches {
            let role = match (entry.piece, entry.empty) {
                (Some(kind), false) => {
                    let kind = PieceKind::parse(&kind).map_err(|e| ConfigError::Malformed {
                        path: manifest_path.to_path_buf(),
                        message: format!("swatch '{}': {}", entry.name, e),
                    })?;
                    SwatchRole::Piece(kind)
                }
                (None, true) => SwatchRole::Empty,
                _ => {
                    return Err(ConfigError::Malformed {
                        path: manifest_path.to_path_buf(),
                        message: format!(
                            "swatch '{}' must name a piece or set \"empty\": true",
                            entry.name
                        ),
                    });
                }
            };

            let image_path = asset_dir.join(&entry.image);
            let image = image::open(&image_path)
                .map_err(|e| ConfigError::Asset {
                    path: image_path.clone(),
                    message: e.to_string(),
                })?
                .to_rgba8();
            if image.width() == 0 || image.height() == 0 {
                return Err(ConfigError::Asset {
                    path: image_path,
                    message: "image is empty".to_string(),
                });
            }

            swatches.push(PieceSwatch {
                name: entry.name,
                role,
                image,
            });
        }

        let set = Self::new(swatches, manifest.threshold, manifest.tolerance)?;
        crate::log(&format!(
            "Loaded {} swatches ({} piece kinds) from {}",
            set.swatches.len(),
            set.piece_kinds().len(),
            manifest_path.display()
        ));
        Ok(set)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PieceSwatch> {
        self.swatches.iter()
    }

    pub fn len(&self) -> usize {
        self.swatches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.swatches.is_empty()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn tolerance(&self) -> u8 {
        self.tolerance
    }

    /// Distinct piece kinds in declaration order.
    pub fn piece_kinds(&self) -> Vec<&PieceKind> {
        let mut kinds: Vec<&PieceKind> = Vec::new();
        for swatch in &self.swatches {
            if let SwatchRole::Piece(kind) = &swatch.role {
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
        }
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::tempdir;

    fn solid(rgb: [u8; 3]) -> RgbaImage {
        RgbaImage::from_pixel(4, 4, Rgba([rgb[0], rgb[1], rgb[2], 255]))
    }

    #[test]
    fn test_load_manifest_in_order() {
        let dir = tempdir().unwrap();
        solid([220, 30, 30]).save(dir.path().join("red.png")).unwrap();
        solid([30, 30, 220]).save(dir.path().join("blue.png")).unwrap();
        solid([40, 40, 40]).save(dir.path().join("empty.png")).unwrap();
        let manifest = dir.path().join("swatches.json");
        fs::write(
            &manifest,
            r#"{
                "tolerance": 25,
                "swatches": [
                    { "name": "red", "piece": "red-potion", "image": "red.png" },
                    { "name": "blue", "piece": "blue-potion", "image": "blue.png" },
                    { "name": "red-alt", "piece": "red-potion", "image": "red.png" },
                    { "name": "background", "empty": true, "image": "empty.png" }
                ]
            }"#,
        )
        .unwrap();

        let set = SwatchSet::load(&manifest, dir.path()).unwrap();
        assert_eq!(set.len(), 4);
        assert_eq!(set.threshold(), 0.8);
        assert_eq!(set.tolerance(), 25);
        let names: Vec<&str> = set.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["red", "blue", "red-alt", "background"]);
        let kinds: Vec<&str> = set.piece_kinds().iter().map(|k| k.as_str()).collect();
        assert_eq!(kinds, ["red-potion", "blue-potion"]);
        assert_eq!(*set.iter().last().unwrap().image.get_pixel(0, 0), Rgba([40, 40, 40, 255]));
    }

    #[test]
    fn test_missing_image_is_asset_error() {
        let dir = tempdir().unwrap();
        let manifest = dir.path().join("swatches.json");
        fs::write(
            &manifest,
            r#"{ "swatches": [ { "name": "red", "piece": "red-potion", "image": "nope.png" } ] }"#,
        )
        .unwrap();

        assert!(matches!(
            SwatchSet::load(&manifest, dir.path()),
            Err(ConfigError::Asset { .. })
        ));
    }

    #[test]
    fn test_manifest_role_must_be_unambiguous() {
        let dir = tempdir().unwrap();
        solid([1, 2, 3]).save(dir.path().join("x.png")).unwrap();
        let manifest = dir.path().join("swatches.json");
        let json = serde_json::json!({
            "swatches": [
                { "name": "x", "piece": "red-potion", "empty": true, "image": "x.png" }
            ]
        });
        fs::write(&manifest, json.to_string()).unwrap();
        assert!(matches!(
            SwatchSet::load(&manifest, dir.path()),
            Err(ConfigError::Malformed { .. })
        ));
    }

    #[test]
    fn test_set_needs_piece_swatch_and_sane_threshold() {
        let empty_only = vec![PieceSwatch::empty("bg", solid([0, 0, 0]))];
        assert!(SwatchSet::new(empty_only, 0.8, 40).is_err());

        let red = vec![PieceSwatch::piece("red", "red-potion", solid([200, 0, 0]))];
        assert!(SwatchSet::new(red.clone(), 0.0, 40).is_err());
        assert!(SwatchSet::new(red.clone(), 1.5, 40).is_err());
        assert!(SwatchSet::new(red, 1.0, 40).is_ok());

        let transparent = vec![PieceSwatch::piece("ghost", "ghost", RgbaImage::new(2, 2))];
        assert!(SwatchSet::new(transparent, 0.8, 40).is_err());

        let colon = vec![PieceSwatch::piece("red", "potion:red", solid([200, 0, 0]))];
        assert!(matches!(
            SwatchSet::new(colon, 0.8, 40),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_manifest_rejects_unsavable_piece_names() {
        let dir = tempdir().unwrap();
        solid([200, 0, 0]).save(dir.path().join("red.png")).unwrap();
        let manifest = dir.path().join("swatches.json");

        for piece in ["potion:red", " red-potion", "red-potion ", ""] {
            let json = serde_json::json!({
                "swatches": [ { "name": "red", "piece": piece, "image": "red.png" } ]
            });
            fs::write(&manifest, json.to_string()).unwrap();
            assert!(
                matches!(
                    SwatchSet::load(&manifest, dir.path()),
                    Err(ConfigError::Malformed { .. })
                ),
                "piece name {:?} should be rejected",
                piece
            );
        }
    }
}
