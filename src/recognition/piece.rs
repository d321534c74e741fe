//! Falling-pair detection in the spawn grid.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::layout::{CellPos, Layout};
use super::matcher;
use super::swatch::{SwatchRole, SwatchSet};
use crate::capture::Frame;
use crate::error::EngineError;

/// Semantic piece type, e.g. `red-potion`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PieceKind(String);

impl PieceKind {
    /// Separates the two kinds in the text form of a [`PairKey`].
    pub const SEPARATOR: char = ':';

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Accepts only names that survive the `first:second` text form:
    /// non-empty, no separator, no surrounding whitespace.
    pub fn parse(name: &str) -> Result<Self, String> {
        if name.is_empty() || name.trim() != name || name.contains(Self::SEPARATOR) {
            return Err(format!(
                "'{}' is not a valid piece name (non-empty, no '{}', no surrounding spaces)",
                name,
                Self::SEPARATOR
            ));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PieceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered pair of piece kinds, written `"first:second"`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    pub first: PieceKind,
    pub second: PieceKind,
}

impl PairKey {
    pub fn new(first: &str, second: &str) -> Result<Self, String> {
        Ok(Self {
            first: PieceKind::parse(first)?,
            second: PieceKind::parse(second)?,
        })
    }

    /// Whether both kinds satisfy [`PieceKind::parse`].
    pub fn is_valid(&self) -> bool {
        PieceKind::parse(self.first.as_str()).is_ok()
            && PieceKind::parse(self.second.as_str()).is_ok()
    }

    pub fn reversed(&self) -> Self {
        Self {
            first: self.second.clone(),
            second: self.first.clone(),
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.first, PieceKind::SEPARATOR, self.second)
    }
}

impl FromStr for PairKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((a, b)) = s.split_once(PieceKind::SEPARATOR) else {
            return Err(format!("'{}' is not a pair key of the form pieceA:pieceB", s));
        };
        PairKey::new(a.trim(), b.trim())
            .map_err(|e| format!("'{}' is not a pair key of the form pieceA:pieceB: {}", s, e))
    }
}

/// Where the partner sits relative to the pivot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// Partner to the right.
    R0,
    /// Partner below.
    R90,
    /// Partner to the left.
    R180,
    /// Partner above.
    R270,
}

impl Orientation {
    /// Neighbour offsets `(row, column)` in the order they are checked.
    const NEIGHBOURS: [(Orientation, i64, i64); 4] = [
        (Orientation::R0, 0, 1),
        (Orientation::R90, 1, 0),
        (Orientation::R180, 0, -1),
        (Orientation::R270, -1, 0),
    ];

    pub fn is_vertical(self) -> bool {
        matches!(self, Orientation::R90 | Orientation::R270)
    }
}

/// A pair as read from the spawn grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectedPair {
    pub pivot: PieceKind,
    pub partner: PieceKind,
    pub orientation: Orientation,
    /// Board column under the pivot.
    pub column: usize,
}

impl DetectedPair {
    pub fn key(&self) -> PairKey {
        PairKey {
            first: self.pivot.clone(),
            second: self.partner.clone(),
        }
    }

    /// Number of board columns the pair covers.
    pub fn footprint(&self) -> usize {
        if self.orientation.is_vertical() { 1 } else { 2 }
    }

    /// Leftmost board column the pair covers.
    pub fn left_column(&self) -> usize {
        match self.orientation {
            Orientation::R180 => self.column.saturating_sub(1),
            _ => self.column,
        }
    }

    /// The two pieces in landing order: `(left, right)` for a horizontal
    /// pair, `(bottom, top)` for a vertical one.
    pub fn landing_order(&self) -> (&PieceKind, &PieceKind) {
        match self.orientation {
            Orientation::R0 | Orientation::R270 => (&self.pivot, &self.partner),
            Orientation::R90 | Orientation::R180 => (&self.partner, &self.pivot),
        }
    }
}

impl fmt::Display for DetectedPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} + {} ({:?}) at column {}",
            self.pivot, self.partner, self.orientation, self.column
        )
    }
}

/// Reads the falling pair from the spawn grid.
pub struct PieceRecognizer {
    layout: Arc<Layout>,
    swatches: Arc<SwatchSet>,
}

impl PieceRecognizer {
    pub fn new(layout: Arc<Layout>, swatches: Arc<SwatchSet>) -> Self {
        Self { layout, swatches }
    }

    pub fn detect_pair(&self, frame: &Frame) -> Result<DetectedPair, EngineError> {
        let spawn = &self.layout.spawn;
        let pivot_cell = spawn.pivot;

        let pivot = self.piece_at(frame, pivot_cell)?.ok_or_else(|| {
            EngineError::DetectionFailed("pivot cell holds no recognised piece".to_string())
        })?;

        let mut partners = Vec::new();
        for (orientation, dr, dc) in Orientation::NEIGHBOURS {
            let row = pivot_cell.row as i64 + dr;
            let column = pivot_cell.column as i64 + dc;
            if row < 0 || column < 0 {
                continue;
            }
            let cell = CellPos::new(row as usize, column as usize);
            if !spawn.grid.contains(cell) {
                continue;
            }
            if let Some(kind) = self.piece_at(frame, cell)? {
                partners.push((orientation, kind));
            }
        }

        let (orientation, partner) = match partners.len() {
            1 => partners.remove(0),
            0 => {
                return Err(EngineError::DetectionFailed(format!(
                    "{} at the pivot has no partner",
                    pivot
                )));
            }
            n => {
                return Err(EngineError::DetectionFailed(format!(
                    "{} neighbours of the pivot hold pieces",
                    n
                )));
            }
        };

        let column = spawn.board_column(pivot_cell.column).ok_or_else(|| {
            EngineError::Recognizer("pivot column does not map onto the board".to_string())
        })?;

        Ok(DetectedPair {
            pivot,
            partner,
            orientation,
            column,
        })
    }

    fn piece_at(&self, frame: &Frame, cell: CellPos) -> Result<Option<PieceKind>, EngineError> {
        let tf = self.layout.transform(frame.width(), frame.height());
        let region = self.layout.cell_region(&self.layout.spawn.grid, cell, &tf);
        let found = matcher::classify(frame.image(), &region, &self.swatches)?;
        Ok(found.and_then(|m| match &m.swatch.role {
            SwatchRole::Piece(kind) => Some(kind.clone()),
            SwatchRole::Empty => None,
        }))
    }
}
