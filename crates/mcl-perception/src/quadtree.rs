//! Planar spatial index for nearest-obstacle queries.
//!
//! Partitions the map plane with a recursive **Quadtree** so that the
//! likelihood field can ask "which obstacle is closest to this point?"
//! without scanning every occupied cell.
//!
//! # Key types
//!
//! | Type | Role |
//! |------|------|
//! | [`Point2`]   | A planar coordinate.                                  |
//! | [`Aabb2`]    | An axis-aligned bounding rectangle.                   |
//! | [`Quadtree`] | Spatial index; insert points, query nearest neighbour. |
//!
//! # Example
//!
//! ```rust
//! use mcl_perception::quadtree::{Aabb2, Point2, Quadtree};
//!
//! let mut tree = Quadtree::new(Aabb2::new(Point2::new(0.0, 0.0), Point2::new(10.0, 10.0)), 4);
//! tree.insert(Point2::new(1.0, 1.0));
//! tree.insert(Point2::new(8.0, 8.0));
//!
//! let (closest, dist) = tree.nearest(Point2::new(2.0, 1.0)).unwrap();
//! assert_eq!(closest, Point2::new(1.0, 1.0));
//! assert!((dist - 1.0).abs() < 1e-12);
//! ```

// ────────────────────────────────────────────────────────────────────────────
// Point2
// ────────────────────────────────────────────────────────────────────────────

/// A point in the plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    /// Create a new point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn distance_sq(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Aabb2
// ────────────────────────────────────────────────────────────────────────────

/// An axis-aligned bounding rectangle, defined by its minimum and maximum
/// corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb2 {
    pub min: Point2,
    pub max: Point2,
}

impl Aabb2 {
    /// Create a rectangle from its two opposite corners.
    ///
    /// The constructor normalises the corners so that `min ≤ max` per axis.
    pub fn new(a: Point2, b: Point2) -> Self {
        Self {
            min: Point2::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point2::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Return the centre point of the rectangle.
    pub fn centre(&self) -> Point2 {
        Point2::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
        )
    }

    /// True when the point lies inside or on the boundary of the rectangle.
    pub fn contains_point(&self, p: Point2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Squared distance from `p` to the closest point of the rectangle
    /// (zero when `p` is inside).
    pub fn distance_sq_to(&self, p: Point2) -> f64 {
        let dx = (self.min.x - p.x).max(0.0).max(p.x - self.max.x);
        let dy = (self.min.y - p.y).max(0.0).max(p.y - self.max.y);
        dx * dx + dy * dy
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Quadtree
// ────────────────────────────────────────────────────────────────────────────

/// Deepest subdivision level.
pub const MAX_DEPTH: usize = 16;

/// A recursive spatial index that subdivides the plane into four quadrants.
///
/// Points are stored in the deepest node whose rectangle still contains
/// them.  Subdividing stops when either
/// - the number of points in a node is ≤ `capacity`, or
/// - [`MAX_DEPTH`] levels have already been created.
#[derive(Debug)]
pub struct Quadtree {
    root: QuadtreeNode,
}

impl Quadtree {
    /// Create an empty quadtree covering `bounds`.
    ///
    /// - `capacity` – maximum points per leaf before subdivision is attempted.
    pub fn new(bounds: Aabb2, capacity: usize) -> Self {
        Self {
            root: QuadtreeNode::new(bounds, capacity.max(1)),
        }
    }

    /// Build a tree over `points`, sized to their bounding rectangle.
    ///
    /// Returns `None` for an empty point set.
    pub fn from_points(points: &[Point2], capacity: usize) -> Option<Self> {
        let first = *points.first()?;
        let mut bounds = Aabb2::new(first, first);
        for p in points {
            bounds = Aabb2::new(
                Point2::new(bounds.min.x.min(p.x), bounds.min.y.min(p.y)),
                Point2::new(bounds.max.x.max(p.x), bounds.max.y.max(p.y)),
            );
        }
        let mut tree = Self::new(bounds, capacity);
        for &p in points {
            tree.insert(p);
        }
        Some(tree)
    }

    /// Insert a point into the tree.
    ///
    /// Points outside the root rectangle are silently ignored.
    pub fn insert(&mut self, point: Point2) {
        self.root.insert(point, MAX_DEPTH, 0);
    }

    /// Return the total number of points stored in the tree.
    pub fn len(&self) -> usize {
        self.root.count()
    }

    /// True when the tree contains no points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn contains(&self, p: Point2) -> bool {
        self.root.contains(p)
    }

    /// The stored point closest to `query` and its Euclidean distance.
    ///
    /// `query` may lie outside the tree's bounds.  Returns `None` for an
    /// empty tree.
    pub fn nearest(&self, query: Point2) -> Option<(Point2, f64)> {
        let mut best: Option<(Point2, f64)> = None;
        self.root.nearest(query, &mut best);
        best.map(|(p, d_sq)| (p, d_sq.sqrt()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// QuadtreeNode – internal implementation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct QuadtreeNode {
    bounds: Aabb2,
    capacity: usize,
    /// Points stored at this node (only non-empty when the node is a leaf).
    points: Vec<Point2>,
    /// Four children; `None` while this node is a leaf.
    children: Option<Box<[QuadtreeNode; 4]>>,
}

impl QuadtreeNode {
    fn new(bounds: Aabb2, capacity: usize) -> Self {
        Self {
            bounds,
            capacity,
            points: Vec::new(),
            children: None,
        }
    }

    fn count(&self) -> usize {
        match &self.children {
            None => self.points.len(),
            Some(children) => children.iter().map(|c| c.count()).sum(),
        }
    }

    fn insert(&mut self, point: Point2, max_depth: usize, depth: usize) {
        if !self.bounds.contains_point(point) {
            return;
        }

        match self.children.as_mut() {
            None => {
                self.points.push(point);
                if self.points.len() > self.capacity && depth < max_depth {
                    self.subdivide(max_depth, depth);
                }
            }
            Some(children) => {
                if let Some(child) = children.iter_mut().find(|c| c.bounds.contains_point(point)) {
                    child.insert(point, max_depth, depth + 1);
                }
            }
        }
    }

    #[cfg(test)]
    fn contains(&self, p: Point2) -> bool {
        if !self.bounds.contains_point(p) {
            return false;
        }
        match &self.children {
            None => self.points.contains(&p),
            Some(children) => children.iter().any(|c| c.contains(p)),
        }
    }

    /// Branch-and-bound search; `best` holds `(point, squared distance)`.
    fn nearest(&self, query: Point2, best: &mut Option<(Point2, f64)>) {
        if let Some((_, best_sq)) = best
            && self.bounds.distance_sq_to(query) >= *best_sq
        {
            return;
        }
        match &self.children {
            None => {
                for &p in &self.points {
                    let d_sq = p.distance_sq(query);
                    if best.is_none_or(|(_, b)| d_sq < b) {
                        *best = Some((p, d_sq));
                    }
                }
            }
            Some(children) => {
                // Visit the closest quadrant first so later ones prune early.
                let mut order: [usize; 4] = [0, 1, 2, 3];
                order.sort_by(|&a, &b| {
                    children[a]
                        .bounds
                        .distance_sq_to(query)
                        .total_cmp(&children[b].bounds.distance_sq_to(query))
                });
                for i in order {
                    children[i].nearest(query, best);
                }
            }
        }
    }

    /// Split this leaf into four children and redistribute existing points.
    fn subdivide(&mut self, max_depth: usize, depth: usize) {
        let c = self.bounds.centre();
        let min = self.bounds.min;
        let max = self.bounds.max;

        let quadrants = [
            Aabb2::new(min, c),
            Aabb2::new(Point2::new(c.x, min.y), Point2::new(max.x, c.y)),
            Aabb2::new(Point2::new(min.x, c.y), Point2::new(c.x, max.y)),
            Aabb2::new(c, max),
        ];

        let cap = self.capacity;
        let mut children = Box::new(quadrants.map(|b| QuadtreeNode::new(b, cap)));

        let points = std::mem::take(&mut self.points);
        for p in points {
            if let Some(child) = children.iter_mut().find(|c| c.bounds.contains_point(p)) {
                child.insert(p, max_depth, depth + 1);
            }
        }

        self.children = Some(children);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
