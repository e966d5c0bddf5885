//! Likelihood field: distance from any map point to the closest obstacle.
//!
//! Built once from an [`OccupancyGrid`]: every occupied cell centre goes into
//! a [`Quadtree`], then the nearest-obstacle distance of every cell centre is
//! cached in a flat table.  Queries afterwards are O(1).

use std::time::Instant;

use tracing::info;

use crate::occupancy::{MapError, OccupancyGrid};
use crate::quadtree::{Point2, Quadtree};

/// Leaf capacity used when indexing obstacle cells.
const INDEX_LEAF_CAPACITY: usize = 8;

/// Answers "how far is `(x, y)` from the nearest mapped obstacle?".
///
/// `None` means the query lies outside the known map.
pub trait DistanceField {
    fn closest_obstacle_distance(&self, x: f64, y: f64) -> Option<f64>;
}

/// Precomputed nearest-obstacle distance per map cell.
#[derive(Debug, Clone)]
pub struct LikelihoodField {
    grid: OccupancyGrid,
    distances: Vec<f64>,
}

impl LikelihoodField {
    /// Precompute the field for `grid`.
    ///
    /// # Errors
    ///
    /// [`MapError::NoObstacles`] when the map has no occupied cell.
    pub fn from_grid(grid: OccupancyGrid) -> Result<Self, MapError> {
        let started = Instant::now();
        let obstacles: Vec<Point2> = grid
            .occupied_centers()
            .into_iter()
            .map(|(x, y)| Point2::new(x, y))
            .collect();
        let index =
            Quadtree::from_points(&obstacles, INDEX_LEAF_CAPACITY).ok_or(MapError::NoObstacles)?;

        let mut distances = Vec::with_capacity(grid.width() * grid.height());
        for iy in 0..grid.height() {
            for ix in 0..grid.width() {
                let (cx, cy) = grid.cell_center(ix, iy);
                let d = index
                    .nearest(Point2::new(cx, cy))
                    .map(|(_, d)| d)
                    .ok_or(MapError::NoObstacles)?;
                distances.push(d);
            }
        }

        info!(
            width = grid.width(),
            height = grid.height(),
            obstacles = obstacles.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "likelihood field built"
        );
        Ok(Self { grid, distances })
    }

    /// The map this field was built from.
    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }
}

impl DistanceField for LikelihoodField {
    fn closest_obstacle_distance(&self, x: f64, y: f64) -> Option<f64> {
        let (ix, iy) = self.grid.world_to_cell(x, y)?;
        self.distances.get(iy * self.grid.width() + ix).copied()
    }
}
