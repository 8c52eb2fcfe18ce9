use std::sync::Arc;

use super::{PathStrategy, PlanError};
use crate::angle::AzEl;
use crate::target::{ElevationScaledOffset, Target};

/// Offset grid around one reference target, walked row by row in
/// alternating direction. Used for beam maps of a single object.
pub struct GridMapping {
    reference: Target,
    rows: usize,
    cols: usize,
    row_step: f64,
    col_step: f64,
    path: Vec<Target>,
    grid: Vec<(usize, usize)>,
    cursor: usize,
}

impl GridMapping {
    pub fn new(reference: Target, rows: usize, cols: usize, row_step: f64, col_step: f64) -> Self {
        Self {
            reference,
            rows,
            cols,
            row_step,
            col_step,
            path: Vec::new(),
            grid: Vec::new(),
            cursor: 0,
        }
    }

    pub fn set_target(&mut self, reference: Target) {
        self.reference = reference;
    }

    /// (row, column) of the point most recently yielded by [`route`](PathStrategy::route).
    pub fn current_grid_point(&self) -> Option<(usize, usize)> {
        self.cursor.checked_sub(1).and_then(|i| self.grid.get(i).copied())
    }

    /// Degrees of travel along the grid.
    pub fn path_length(&self) -> f64 {
        if self.rows == 0 || self.cols == 0 {
            return 0.0;
        }
        (self.cols - 1) as f64 * self.rows as f64 * self.col_step
            + (self.rows - 1) as f64 * self.row_step
    }

    fn compute_path(&mut self) -> Result<(), PlanError> {
        self.path.clear();
        self.grid.clear();
        let row_centre = (self.rows as f64 - 1.0) / 2.0;
        let col_centre = (self.cols as f64 - 1.0) / 2.0;
        for i in 0..self.rows {
            let r = (i as f64 - row_centre) * self.row_step;
            let mut cols: Vec<usize> = (0..self.cols).collect();
            if i % 2 == 1 {
                cols.reverse();
            }
            for j in cols {
                let c = (j as f64 - col_centre) * self.col_step;
                let source = Arc::new(ElevationScaledOffset::new(
                    self.reference.source(),
                    AzEl::new(c, r),
                ));
                let name = format!("{}_{:.3}_{:.3}", self.reference.name(), r, c);
                self.path.push(self.reference.copy(name, source)?);
                self.grid.push((i, j));
            }
        }
        Ok(())
    }
}

impl PathStrategy for GridMapping {
    fn find_optimal_path(&mut self, _refresh: bool) -> Result<(Vec<Target>, f64), PlanError> {
        self.compute_path()?;
        Ok((self.path.clone(), self.path_length().to_radians()))
    }

    fn route(&mut self) -> Result<Box<dyn Iterator<Item = Target> + '_>, PlanError> {
        self.compute_path()?;
        if self.path.is_empty() {
            return Err(PlanError::EmptyPath);
        }
        self.cursor = 0;
        Ok(Box::new(GridWalk { grid: self }))
    }
}

struct GridWalk<'a> {
    grid: &'a mut GridMapping,
}

impl Iterator for GridWalk<'_> {
    type Item = Target;

    fn next(&mut self) -> Option<Target> {
        let target = self.grid.path.get(self.grid.cursor)?.clone();
        self.grid.cursor += 1;
        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sun() -> Target {
        Target::fixed("Sun", AzEl::new(180.0, 0.0))
    }

    #[test]
    fn walks_rows_in_alternating_direction() {
        let mut grid = GridMapping::new(sun(), 3, 3, 1.5, 1.5);
        let (path, length) = grid.find_optimal_path(true).unwrap();
        assert_eq!(path.len(), 9);
        assert_eq!(path[0].name(), "Sun_-1.500_-1.500");
        assert_eq!(path[3].name(), "Sun_0.000_1.500");
        assert_eq!(path[8].name(), "Sun_1.500_1.500");
        assert_abs_diff_eq!(length.to_degrees(), 2.0 * 3.0 * 1.5 + 2.0 * 1.5, epsilon = 1e-9);
    }

    #[test]
    fn offsets_follow_the_reference() {
        let mut grid = GridMapping::new(sun(), 1, 3, 1.0, 2.0);
        let (path, _) = grid.find_optimal_path(true).unwrap();
        // at zero elevation the azimuth offset is not scaled
        assert_abs_diff_eq!(path[0].position().azimuth(), 178.0, epsilon = 1e-9);
        assert_abs_diff_eq!(path[2].position().azimuth(), 182.0, epsilon = 1e-9);
    }

    #[test]
    fn route_tracks_grid_point() {
        let mut grid = GridMapping::new(sun(), 2, 2, 1.0, 1.0);
        let names: Vec<String> = grid
            .route()
            .unwrap()
            .take(3)
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(names.len(), 3);
        assert_eq!(grid.current_grid_point(), Some((1, 1)));
    }
}
