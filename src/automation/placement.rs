//! Target selection for a detected pair.
//!
//! Strategies are chosen from `layout.json` when a run starts:
//! - `leftmost_fit`: the leftmost column the pair fits in, flipped when
//!   flipping lands more pieces on their own kind.
//! - `pair_table`: a fixed column per ordered pair.

use std::collections::BTreeMap;

use crate::error::ConfigError;
use crate::recognition::{BoardState, DetectedPair, PairKey, PieceKind, PlacementConfig};

/// Where and how to drop a pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    /// Leftmost board column the pair will cover.
    pub column: usize,
    /// Columns covered: 1 for a vertical pair, 2 for a horizontal one.
    pub width: usize,
    /// Right-click to swap the pair before placing.
    pub flip: bool,
}

pub trait PlacementStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn choose(&self, pair: &DetectedPair, board: &BoardState) -> Placement;
}

/// Builds the strategy named in the layout.
pub fn from_config(config: &PlacementConfig) -> Result<Box<dyn PlacementStrategy>, ConfigError> {
    match config {
        PlacementConfig::LeftmostFit => Ok(Box::new(LeftmostFit)),
        PlacementConfig::PairTable { columns } => {
            let mut table = BTreeMap::new();
            for (key, column) in columns {
                let pair: PairKey = key
                    .parse()
                    .map_err(|e: String| ConfigError::Invalid(format!("pair table: {}", e)))?;
                table.insert(pair, *column);
            }
            Ok(Box::new(PairTable::new(table)))
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LeftmostFit;

impl LeftmostFit {
    fn fits(pair: &DetectedPair, board: &BoardState, column: usize) -> bool {
        if pair.orientation.is_vertical() {
            board.empty_from_top(column) >= 2
        } else {
            column + 1 < board.columns()
                && board.empty_from_top(column) >= 1
                && board.empty_from_top(column + 1) >= 1
        }
    }
}

impl PlacementStrategy for LeftmostFit {
    fn name(&self) -> &'static str {
        "leftmost_fit"
    }

    fn choose(&self, pair: &DetectedPair, board: &BoardState) -> Placement {
        let width = pair.footprint();
        let Some(column) = (0..board.columns()).find(|c| Self::fits(pair, board, *c)) else {
            crate::log(&format!(
                "No column fits {}; dropping in place at column {}",
                pair,
                pair.left_column()
            ));
            return Placement {
                column: pair.left_column(),
                width,
                flip: false,
            };
        };

        Placement {
            column,
            width,
            flip: prefers_flip(pair, board, column),
        }
    }
}

/// True when swapping the pair puts more pieces on same-kind column tops.
fn prefers_flip(pair: &DetectedPair, board: &BoardState, column: usize) -> bool {
    let (first, second) = pair.landing_order();
    let lands_on = |c: usize, kind: &PieceKind| board.top_piece(c) == Some(kind);

    let (kept, flipped) = if pair.orientation.is_vertical() {
        // Only the bottom piece touches the column top.
        (
            lands_on(column, first) as u8,
            lands_on(column, second) as u8,
        )
    } else {
        (
            lands_on(column, first) as u8 + lands_on(column + 1, second) as u8,
            lands_on(column, second) as u8 + lands_on(column + 1, first) as u8,
        )
    };
    flipped > kept
}

/// Fixed column per ordered pair. A pair listed only in reverse uses the
/// reversed entry and is flipped.
#[derive(Clone, Debug, Default)]
pub struct PairTable {
    columns: BTreeMap<PairKey, usize>,
}

impl PairTable {
    pub fn new(columns: BTreeMap<PairKey, usize>) -> Self {
        Self { columns }
    }
}

impl PlacementStrategy for PairTable {
    fn name(&self) -> &'static str {
        "pair_table"
    }

    fn choose(&self, pair: &DetectedPair, board: &BoardState) -> Placement {
        let width = pair.footprint();
        let key = pair.key();
        let (column, flip) = match self.columns.get(&key) {
            Some(column) => (*column, false),
            None => match self.columns.get(&key.reversed()) {
                Some(column) => (*column, true),
                None => {
                    crate::log(&format!(
                        "Pair {} is not in the pair table; using leftmost fit",
                        key
                    ));
                    return LeftmostFit.choose(pair, board);
                }
            },
        };

        let last = board.columns().saturating_sub(width);
        Placement {
            column: column.min(last),
            width,
            flip,
        }
    }
}
