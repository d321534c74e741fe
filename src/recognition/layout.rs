//! Screen layout of the puzzle: board grid, spawn grid, drop line and
//! parking area, authored in baseline pixels.
//!
//! Live client sizes rarely match the baseline, so every region goes
//! through [`AspectTransform`]: a uniform scale plus centring offsets that
//! compensate for letterboxing (taller client) or pillarboxing (wider
//! client).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::platform::Rect;

/// Aspect ratios closer than this are treated as equal.
const ASPECT_EPSILON: f32 = 0.01;

const MAX_CELL_INSET: f32 = 0.45;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

/// Rectangle in baseline pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxSpec {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoxSpec {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Shrinks the box by `fraction` of its size on every side.
    pub fn inset(&self, fraction: f32) -> BoxSpec {
        let dx = self.width * fraction;
        let dy = self.height * fraction;
        BoxSpec {
            x: self.x + dx,
            y: self.y + dy,
            width: self.width - 2.0 * dx,
            height: self.height - 2.0 * dy,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellPos {
    pub row: usize,
    pub column: usize,
}

impl CellPos {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

/// A uniform grid of cells covering one area.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    #[serde(flatten)]
    pub area: BoxSpec,
    pub rows: usize,
    pub columns: usize,
}

impl GridSpec {
    pub fn cell_width(&self) -> f32 {
        self.area.width / self.columns.max(1) as f32
    }

    pub fn cell_height(&self) -> f32 {
        self.area.height / self.rows.max(1) as f32
    }

    pub fn contains(&self, cell: CellPos) -> bool {
        cell.row < self.rows && cell.column < self.columns
    }

    pub fn cell_box(&self, cell: CellPos) -> BoxSpec {
        BoxSpec {
            x: self.area.x + self.cell_width() * cell.column as f32,
            y: self.area.y + self.cell_height() * cell.row as f32,
            width: self.cell_width(),
            height: self.cell_height(),
        }
    }
}

/// Where new pairs appear.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnSpec {
    #[serde(flatten)]
    pub grid: GridSpec,
    /// Anchor cell of a falling pair.
    pub pivot: CellPos,
    /// Board column = spawn column + offset.
    #[serde(default)]
    pub column_offset: i32,
}

impl SpawnSpec {
    pub fn board_column(&self, spawn_column: usize) -> Option<usize> {
        usize::try_from(spawn_column as i64 + self.column_offset as i64).ok()
    }
}

/// Which placement strategy drives Targeting.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PlacementConfig {
    #[default]
    LeftmostFit,
    /// Fixed target column per ordered pair, keyed `"pieceA:pieceB"`.
    PairTable { columns: BTreeMap<String, usize> },
}

fn default_cell_inset() -> f32 {
    0.15
}

/// Contents of `layout.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub baseline: Size,
    pub board: GridSpec,
    pub spawn: SpawnSpec,
    /// Baseline y of the point where the cursor drops a pair.
    pub drop_y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mouse_parking: Option<BoxSpec>,
    #[serde(default = "default_cell_inset")]
    pub cell_inset: f32,
    #[serde(default)]
    pub placement: PlacementConfig,
}

impl Layout {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let layout: Layout =
            serde_json::from_str(&contents).map_err(|e| ConfigError::Malformed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(format!("layout: {}", msg)));

        if self.baseline.width == 0 || self.baseline.height == 0 {
            return invalid("baseline size must be non-zero".into());
        }
        for (name, grid) in [("board", &self.board), ("spawn", &self.spawn.grid)] {
            if grid.rows == 0 || grid.columns == 0 {
                return invalid(format!("{} grid needs at least one row and column", name));
            }
            if !self.within_baseline(&grid.area) {
                return invalid(format!("{} grid lies outside the baseline area", name));
            }
        }
        if !self.spawn.grid.contains(self.spawn.pivot) {
            return invalid(format!(
                "pivot ({}, {}) is outside the spawn grid",
                self.spawn.pivot.row, self.spawn.pivot.column
            ));
        }
        match self.spawn.board_column(self.spawn.pivot.column) {
            Some(column) if column < self.board.columns => {}
            _ => return invalid("pivot column does not map onto the board".into()),
        }
        if !(0.0..=MAX_CELL_INSET).contains(&self.cell_inset) {
            return invalid(format!(
                "cell_inset {} must lie in 0..={}",
                self.cell_inset, MAX_CELL_INSET
            ));
        }
        if let Some(parking) = &self.mouse_parking {
            if !self.within_baseline(parking) {
                return invalid("mouse_parking lies outside the baseline area".into());
            }
        }
        if let PlacementConfig::PairTable { columns } = &self.placement {
            if let Some((pair, column)) = columns.iter().find(|(_, c)| **c >= self.board.columns)
            {
                return invalid(format!(
                    "pair table sends {} to column {} but the board has {}",
                    pair, column, self.board.columns
                ));
            }
        }
        Ok(())
    }

    fn within_baseline(&self, b: &BoxSpec) -> bool {
        b.width > 0.0
            && b.height > 0.0
            && b.x >= 0.0
            && b.y >= 0.0
            && b.x + b.width <= self.baseline.width as f32
            && b.y + b.height <= self.baseline.height as f32
    }

    /// Transform from baseline pixels onto a client area of the given size.
    pub fn transform(&self, client_width: u32, client_height: u32) -> AspectTransform {
        AspectTransform::fit(self.baseline, client_width, client_height)
    }

    /// Region of one grid cell in client pixels, inset applied.
    pub fn cell_region(&self, grid: &GridSpec, cell: CellPos, tf: &AspectTransform) -> Rect {
        tf.map_box(&grid.cell_box(cell).inset(self.cell_inset))
    }

    /// Screen point where a pair covering `width` columns starting at
    /// `column` is dropped.
    pub fn drop_point(&self, client: &Rect, column: usize, width: usize) -> (i32, i32) {
        let tf = self.transform(client.width, client.height);
        let x = self.board.area.x + self.board.cell_width() * (column as f32 + width as f32 / 2.0);
        let (cx, cy) = tf.map_point(x, self.drop_y);
        (client.x + cx.round() as i32, client.y + cy.round() as i32)
    }

    /// Screen point at the centre of the parking area, if one is set.
    pub fn parking_point(&self, client: &Rect) -> Option<(i32, i32)> {
        let parking = self.mouse_parking?;
        let tf = self.transform(client.width, client.height);
        let (x, y) = parking.center();
        let (cx, cy) = tf.map_point(x, y);
        Some((client.x + cx.round() as i32, client.y + cy.round() as i32))
    }
}

/// Uniform scale plus letterbox/pillarbox offsets.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AspectTransform {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl AspectTransform {
    pub fn fit(baseline: Size, client_width: u32, client_height: u32) -> Self {
        let (ow, oh) = (baseline.width.max(1) as f32, baseline.height.max(1) as f32);
        let (cw, ch) = (client_width as f32, client_height.max(1) as f32);
        let original_aspect = ow / oh;
        let current_aspect = cw / ch;

        if (original_aspect - current_aspect).abs() < ASPECT_EPSILON {
            let scale = (cw / ow).min(ch / oh);
            return Self {
                scale,
                offset_x: (cw - ow * scale) / 2.0,
                offset_y: (ch - oh * scale) / 2.0,
            };
        }
        if current_aspect > original_aspect {
            // Wider: bars left and right
            let scale = ch / oh;
            return Self {
                scale,
                offset_x: (cw - ow * scale) / 2.0,
                offset_y: 0.0,
            };
        }
        // Taller: bars top and bottom
        let scale = cw / ow;
        Self {
            scale,
            offset_x: 0.0,
            offset_y: (ch - oh * scale) / 2.0,
        }
    }

    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.offset_x + x * self.scale,
            self.offset_y + y * self.scale,
        )
    }

    /// Maps a baseline box to whole client pixels (edges truncated).
    pub fn map_box(&self, b: &BoxSpec) -> Rect {
        let (x0, y0) = self.map_point(b.x, b.y);
        let (x1, y1) = self.map_point(b.x + b.width, b.y + b.height);
        let (x0, y0, x1, y1) = (x0 as i32, y0 as i32, x1 as i32, y1 as i32);
        Rect::new(x0, y0, (x1 - x0).max(0) as u32, (y1 - y0).max(0) as u32)
    }
}
