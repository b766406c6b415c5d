//! Cells, the square chunk grid, and the wire row format
//!
//! A chunk grid is a flat row-major `Vec<Cell>` addressed by local
//! `(x, y)` with `y = 0` at the top. On the wire a grid is `S` strings of
//! `S` glyphs each, top row first; [`Grid::rows`] and [`Grid::from_rows`]
//! convert between the two shapes losslessly.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// One world cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cell {
    /// Solid rock.
    Wall,
    /// Walkable floor.
    Floor,
    /// Walkable floor carrying a tablet marker.
    Tablet,
}

impl Cell {
    /// Wire glyph for this cell.
    #[inline]
    pub const fn glyph(self) -> char {
        match self {
            Cell::Wall => '#',
            Cell::Floor => ' ',
            Cell::Tablet => '\u{25CA}',
        }
    }

    /// Parse a wire glyph.
    #[inline]
    pub fn from_glyph(c: char) -> Option<Self> {
        match c {
            '#' => Some(Cell::Wall),
            ' ' => Some(Cell::Floor),
            '\u{25CA}' => Some(Cell::Tablet),
            _ => None,
        }
    }

    /// Whether the cell can be walked on (floor or tablet).
    #[inline]
    pub const fn walkable(self) -> bool {
        !matches!(self, Cell::Wall)
    }
}

/// Errors surfaced when parsing the wire row format.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GridParseError {
    /// The row list was empty.
    #[error("grid has no rows")]
    Empty,
    /// The number of rows does not match the row length.
    #[error("grid is not square: {rows} rows of length {len}")]
    NotSquare {
        /// Number of rows received.
        rows: usize,
        /// Length of the first row.
        len: usize,
    },
    /// A row has the wrong number of glyphs.
    #[error("row {row} has length {len}, expected {expected}")]
    BadRowLength {
        /// Offending row index.
        row: usize,
        /// Glyph count of that row.
        len: usize,
        /// Expected glyph count.
        expected: usize,
    },
    /// A glyph is not one of the cell glyphs.
    #[error("unknown glyph {glyph:?} at row {row}, column {col}")]
    BadGlyph {
        /// Offending row index.
        row: usize,
        /// Offending column index.
        col: usize,
        /// The glyph encountered.
        glyph: char,
    },
}

/// A square grid of cells.
///
/// Accessors take local coordinates in `[0, size)`; out-of-range access is
/// a programming error and panics like slice indexing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    size: usize,
    cells: Vec<Cell>,
}

impl Grid {
    /// A grid of `size x size` cells, all set to `fill`.
    pub fn filled(size: usize, fill: Cell) -> Self {
        Self { size, cells: vec![fill; size * size] }
    }

    /// Side length of the grid.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.size && y < self.size, "({x},{y}) outside {0}x{0}", self.size);
        y * self.size + x
    }

    /// Cell at `(x, y)`.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Cell {
        self.cells[self.index(x, y)]
    }

    /// Overwrite the cell at `(x, y)`.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, cell: Cell) {
        let i = self.index(x, y);
        self.cells[i] = cell;
    }

    /// Number of cells equal to `cell`.
    pub fn count(&self, cell: Cell) -> usize {
        self.cells.iter().filter(|&&c| c == cell).count()
    }

    /// Serialize to wire rows: `size` strings of `size` glyphs, top first.
    pub fn rows(&self) -> Vec<String> {
        (0..self.size)
            .map(|y| (0..self.size).map(|x| self.get(x, y).glyph()).collect())
            .collect()
    }

    /// Parse wire rows back into a grid.
    pub fn from_rows(rows: &[String]) -> Result<Self, GridParseError> {
        let first = rows.first().ok_or(GridParseError::Empty)?;
        let size = first.chars().count();
        if rows.len() != size {
            return Err(GridParseError::NotSquare { rows: rows.len(), len: size });
        }
        let mut cells = Vec::with_capacity(size * size);
        for (row, line) in rows.iter().enumerate() {
            let mut n = 0usize;
            for (col, glyph) in line.chars().enumerate() {
                let cell = Cell::from_glyph(glyph)
                    .ok_or(GridParseError::BadGlyph { row, col, glyph })?;
                cells.push(cell);
                n += 1;
            }
            if n != size {
                return Err(GridParseError::BadRowLength { row, len: n, expected: size });
            }
        }
        Ok(Self { size, cells })
    }
}
