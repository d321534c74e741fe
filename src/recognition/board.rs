//! Board grid classification.

use std::sync::Arc;

use super::layout::{CellPos, Layout};
use super::matcher;
use super::piece::PieceKind;
use super::swatch::{SwatchRole, SwatchSet};
use crate::capture::Frame;
use crate::error::EngineError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoardCell {
    Empty,
    Occupied(PieceKind),
    /// Nothing scored above the threshold.
    Unknown,
}

/// `rows x columns` cells, row 0 at the top. Rebuilt on every read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoardState {
    rows: usize,
    columns: usize,
    cells: Vec<BoardCell>,
}

impl BoardState {
    /// Builds a board from row-major rows. Every row must have the same
    /// length.
    pub fn from_rows(rows: Vec<Vec<BoardCell>>) -> Option<Self> {
        let columns = rows.first().map(Vec::len)?;
        if columns == 0 || rows.iter().any(|r| r.len() != columns) {
            return None;
        }
        Some(Self {
            rows: rows.len(),
            columns,
            cells: rows.into_iter().flatten().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&BoardCell> {
        if row >= self.rows || column >= self.columns {
            return None;
        }
        self.cells.get(row * self.columns + column)
    }

    /// Consecutive empty cells from the top of `column`. An `Unknown` cell
    /// ends the run like a piece does.
    pub fn empty_from_top(&self, column: usize) -> usize {
        (0..self.rows)
            .take_while(|row| matches!(self.cell(*row, column), Some(BoardCell::Empty)))
            .count()
    }

    /// Piece a new arrival in `column` would land on, if it is known.
    pub fn top_piece(&self, column: usize) -> Option<&PieceKind> {
        match self.cell(self.empty_from_top(column), column) {
            Some(BoardCell::Occupied(kind)) => Some(kind),
            _ => None,
        }
    }

    pub fn unknown_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| matches!(c, BoardCell::Unknown))
            .count()
    }
}

/// Classifies every board cell independently.
pub struct BoardRecognizer {
    layout: Arc<Layout>,
    swatches: Arc<SwatchSet>,
}

impl BoardRecognizer {
    pub fn new(layout: Arc<Layout>, swatches: Arc<SwatchSet>) -> Self {
        Self { layout, swatches }
    }

    pub fn detect_board(&self, frame: &Frame) -> Result<BoardState, EngineError> {
        let grid = &self.layout.board;
        let tf = self.layout.transform(frame.width(), frame.height());

        let mut cells = Vec::with_capacity(grid.rows * grid.columns);
        for row in 0..grid.rows {
            for column in 0..grid.columns {
                let region = self.layout.cell_region(grid, CellPos::new(row, column), &tf);
                let cell = match matcher::classify(frame.image(), &region, &self.swatches)? {
                    Some(m) => match &m.swatch.role {
                        SwatchRole::Piece(kind) => BoardCell::Occupied(kind.clone()),
                        SwatchRole::Empty => BoardCell::Empty,
                    },
                    None => BoardCell::Unknown,
                };
                cells.push(cell);
            }
        }

        Ok(BoardState {
            rows: grid.rows,
            columns: grid.columns,
            cells,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Rect;
    use crate::recognition::layout::tests::sample_layout;
    use crate::recognition::tests::{paint_cell, sample_swatches, BLUE, EMPTY, RED};
    use image::{Rgba, RgbaImage};

    fn board_frame(cells: &[(usize, usize, [u8; 3])]) -> Frame {
        let layout = sample_layout();
        let mut image = RgbaImage::from_pixel(800, 600, Rgba([EMPTY[0], EMPTY[1], EMPTY[2], 255]));
        for (row, column, rgb) in cells {
            paint_cell(&mut image, &layout.board, CellPos::new(*row, *column), *rgb);
        }
        Frame::new(image, Rect::new(0, 0, 800, 600))
    }

    #[test]
    fn test_detect_board_cells() {
        let rec = BoardRecognizer::new(Arc::new(sample_layout()), Arc::new(sample_swatches()));
        let frame = board_frame(&[(5, 0, RED), (4, 0, BLUE), (5, 1, [250, 250, 0])]);

        let board = rec.detect_board(&frame).unwrap();
        assert_eq!((board.rows(), board.columns()), (6, 6));
        assert_eq!(
            board.cell(5, 0),
            Some(&BoardCell::Occupied(PieceKind::new("red-potion")))
        );
        assert_eq!(
            board.cell(4, 0),
            Some(&BoardCell::Occupied(PieceKind::new("blue-potion")))
        );
        assert_eq!(board.cell(5, 1), Some(&BoardCell::Unknown));
        assert_eq!(board.cell(0, 0), Some(&BoardCell::Empty));
        assert_eq!(board.unknown_count(), 1);

        assert_eq!(board.empty_from_top(0), 4);
        assert_eq!(board.top_piece(0), Some(&PieceKind::new("blue-potion")));
        // Unknown blocks and is not a landing piece.
        assert_eq!(board.empty_from_top(1), 5);
        assert_eq!(board.top_piece(1), None);
        // Empty column: nothing to land on.
        assert_eq!(board.empty_from_top(2), 6);
        assert_eq!(board.top_piece(2), None);
    }

    #[test]
    fn test_from_rows_shape() {
        use BoardCell::*;
        assert!(BoardState::from_rows(vec![]).is_none());
        assert!(BoardState::from_rows(vec![vec![Empty], vec![Empty, Empty]]).is_none());

        let board = BoardState::from_rows(vec![vec![Empty, Unknown], vec![Empty, Empty]]).unwrap();
        assert_eq!(board.empty_from_top(0), 2);
        assert_eq!(board.empty_from_top(1), 0);
        assert_eq!(board.cell(2, 0), None);
    }
}
