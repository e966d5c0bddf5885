//! Static occupancy map.
//!
//! The map is a row-major grid of [`CellState`]s with a metric resolution and
//! the world position of cell `(0, 0)`'s lower-left corner.  Maps are usually
//! loaded from a compact ASCII layout in which the *first* text line is the
//! *top* row of the map:
//!
//! | Char | Meaning |
//! |------|---------|
//! | `#`  | occupied |
//! | `.`  | free |
//! | `?`  | unknown |
//!
//! # Example
//!
//! ```rust
//! use mcl_perception::occupancy::{CellState, OccupancyGrid};
//!
//! let grid = OccupancyGrid::parse_ascii("###\n#..\n###", 0.5, (0.0, 0.0)).unwrap();
//! assert_eq!(grid.width(), 3);
//! assert_eq!(grid.cell(1, 1), Some(CellState::Free));
//! assert_eq!(grid.world_to_cell(0.75, 0.75), Some((1, 1)));
//! ```

use mcl_types::LocError;
use thiserror::Error;

/// Occupancy of one map cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Free,
    Occupied,
    Unknown,
}

/// Errors raised while building a map or a field derived from it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MapError {
    #[error("map has no cells")]
    Empty,

    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("unrecognised map character {ch:?} at row {row}, column {col}")]
    BadCell { ch: char, row: usize, col: usize },

    #[error("resolution must be positive and finite, got {0}")]
    BadResolution(f64),

    #[error("map contains no occupied cells")]
    NoObstacles,
}

impl From<MapError> for LocError {
    fn from(err: MapError) -> Self {
        LocError::Map(err.to_string())
    }
}

/// A metric occupancy grid.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyGrid {
    width: usize,
    height: usize,
    resolution: f64,
    origin: (f64, f64),
    /// Row-major, `cells[iy * width + ix]`, `iy = 0` at the bottom.
    cells: Vec<CellState>,
}

impl OccupancyGrid {
    /// Build a grid from raw row-major cells (`iy = 0` at the bottom).
    pub fn new(
        width: usize,
        height: usize,
        resolution: f64,
        origin: (f64, f64),
        cells: Vec<CellState>,
    ) -> Result<Self, MapError> {
        if width == 0 || height == 0 {
            return Err(MapError::Empty);
        }
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(MapError::BadResolution(resolution));
        }
        if cells.len() != width * height {
            return Err(MapError::RaggedRow {
                row: cells.len() / width,
                expected: width,
                found: cells.len() % width,
            });
        }
        Ok(Self {
            width,
            height,
            resolution,
            origin,
            cells,
        })
    }

    /// Parse the ASCII layout described in the module docs.  Blank lines are
    /// ignored; trailing whitespace is trimmed.
    pub fn parse_ascii(text: &str, resolution: f64, origin: (f64, f64)) -> Result<Self, MapError> {
        let rows: Vec<&str> = text
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.is_empty())
            .collect();
        let height = rows.len();
        let width = rows.first().map(|r| r.chars().count()).unwrap_or(0);
        if height == 0 || width == 0 {
            return Err(MapError::Empty);
        }

        let mut cells = vec![CellState::Unknown; width * height];
        for (row, line) in rows.iter().enumerate() {
            let found = line.chars().count();
            if found != width {
                return Err(MapError::RaggedRow {
                    row,
                    expected: width,
                    found,
                });
            }
            let iy = height - 1 - row;
            for (col, ch) in line.chars().enumerate() {
                cells[iy * width + col] = match ch {
                    '#' => CellState::Occupied,
                    '.' => CellState::Free,
                    '?' => CellState::Unknown,
                    _ => return Err(MapError::BadCell { ch, row, col }),
                };
            }
        }
        Self::new(width, height, resolution, origin, cells)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn origin(&self) -> (f64, f64) {
        self.origin
    }

    /// State of cell `(ix, iy)`, `None` outside the grid.
    pub fn cell(&self, ix: usize, iy: usize) -> Option<CellState> {
        if ix >= self.width || iy >= self.height {
            return None;
        }
        Some(self.cells[iy * self.width + ix])
    }

    /// Cell containing the world point `(x, y)`, `None` outside the grid.
    pub fn world_to_cell(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let fx = ((x - self.origin.0) / self.resolution).floor();
        let fy = ((y - self.origin.1) / self.resolution).floor();
        if !(fx.is_finite() && fy.is_finite()) || fx < 0.0 || fy < 0.0 {
            return None;
        }
        let (ix, iy) = (fx as usize, fy as usize);
        (ix < self.width && iy < self.height).then_some((ix, iy))
    }

    /// World coordinates of the centre of cell `(ix, iy)`.
    pub fn cell_center(&self, ix: usize, iy: usize) -> (f64, f64) {
        (
            self.origin.0 + (ix as f64 + 0.5) * self.resolution,
            self.origin.1 + (iy as f64 + 0.5) * self.resolution,
        )
    }

    /// Centres of every occupied cell.
    pub fn occupied_centers(&self) -> Vec<(f64, f64)> {
        let mut out = Vec::new();
        for iy in 0..self.height {
            for ix in 0..self.width {
                if self.cells[iy * self.width + ix] == CellState::Occupied {
                    out.push(self.cell_center(ix, iy));
                }
            }
        }
        out
    }
}
