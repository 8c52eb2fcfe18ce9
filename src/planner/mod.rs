//! Visiting order for the currently visible targets.

mod grid;
mod solver;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

pub use grid::GridMapping;
pub use solver::{
    AutoSolver, DistanceMatrix, ExactSolver, HeuristicSolver, Solver, Tour, TravelCost,
};

use crate::angle::AzEl;
use crate::catalog::TargetCatalog;
use crate::mount::MountController;
use crate::target::{PositionSource, Target, TargetError};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("no targets in path")]
    EmptyPath,
    #[error(transparent)]
    Target(#[from] TargetError),
}

/// Mechanical travel in radians.
impl TravelCost for MountController {
    fn travel(&self, from: &AzEl, to: &AzEl) -> f64 {
        self.distance(from, to).to_radians()
    }
}

/// Something that yields targets in visiting order.
pub trait PathStrategy: Send {
    /// Ordered targets and the path length in radians.
    fn find_optimal_path(&mut self, refresh: bool) -> Result<(Vec<Target>, f64), PlanError>;

    /// Targets one at a time. Fails with [`PlanError::EmptyPath`] when
    /// nothing is visible.
    fn route(&mut self) -> Result<Box<dyn Iterator<Item = Target> + '_>, PlanError>;
}

pub struct RoutePlanner {
    catalog: Arc<dyn TargetCatalog>,
    categories: Vec<String>,
    names: Vec<String>,
    start: Arc<dyn PositionSource>,
    cost: Arc<dyn TravelCost>,
    solver: Box<dyn Solver>,
    el_cutoff: f64,
    max_batch: usize,
    targets: BTreeMap<String, Target>,
}

impl RoutePlanner {
    /// `start` is the mount's own position, `cost` the travel between two
    /// poses. The cutoff is clamped to [0, 90] and the batch size to at
    /// least 1.
    pub fn new(
        catalog: Arc<dyn TargetCatalog>,
        start: Arc<dyn PositionSource>,
        cost: Arc<dyn TravelCost>,
        el_cutoff: f64,
        max_batch: usize,
    ) -> Self {
        Self {
            catalog,
            categories: Vec::new(),
            names: Vec::new(),
            start,
            cost,
            solver: Box::new(AutoSolver::default()),
            el_cutoff: el_cutoff.clamp(0.0, 90.0),
            max_batch: max_batch.max(1),
            targets: BTreeMap::new(),
        }
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_names(mut self, names: Vec<String>) -> Self {
        self.names = names;
        self
    }

    pub fn with_solver(mut self, solver: Box<dyn Solver>) -> Self {
        self.solver = solver;
        self
    }

    pub fn el_cutoff(&self) -> f64 {
        self.el_cutoff
    }

    pub fn max_batch(&self) -> usize {
        self.max_batch
    }

    /// Reloads every category and named target.
    pub fn refresh(&mut self) -> Result<(), PlanError> {
        self.targets.clear();
        for category in self.categories.iter().filter(|c| !c.is_empty()) {
            for target in self.catalog.load_category(category, self.el_cutoff)? {
                self.targets.insert(target.name().to_string(), target);
            }
        }
        for name in self.names.iter().filter(|n| !n.is_empty()) {
            let target = self.catalog.load_target(name)?;
            self.targets.insert(name.clone(), target);
        }
        Ok(())
    }

    /// Loaded targets at or above the cutoff.
    pub fn visible(&self) -> Vec<Target> {
        self.filter_el(self.targets.values().cloned())
    }

    fn filter_el(&self, targets: impl IntoIterator<Item = Target>) -> Vec<Target> {
        targets
            .into_iter()
            .filter(|t| t.position().elevation() >= self.el_cutoff)
            .collect()
    }

    /// Short open path over `nodes`, starting from the mount's position.
    /// Returns indices into `nodes` and the length, the leg from the start
    /// excluded.
    pub fn solve(&self, nodes: &[Target]) -> Result<(Vec<usize>, f64), PlanError> {
        if nodes.is_empty() {
            return Ok((Vec::new(), 0.0));
        }
        let start = self.start.compute()?;

        let mut points = Vec::with_capacity(nodes.len() + 1);
        points.push(start);
        points.extend(nodes.iter().map(Target::position));
        let matrix = DistanceMatrix::build(&points, self.cost.as_ref());

        // matrix ids: 0 is the start, node k is k + 1
        let mut order: Vec<usize> = (1..points.len()).collect();
        order.sort_by(|&a, &b| points[a].azimuth().total_cmp(&points[b].azimuth()));
        let closest = order
            .iter()
            .enumerate()
            .map(|(k, &id)| (k, matrix.get(0, id)))
            .fold((0, f64::INFINITY), |acc, cur| if cur.1 < acc.1 { cur } else { acc })
            .0;
        order.rotate_left(closest);
        order.insert(0, 0);

        let path = self.find_optimal(&matrix, order);
        let length = matrix.path_length(&path);
        Ok((path.into_iter().map(|id| id - 1).collect(), length))
    }

    fn find_optimal(&self, matrix: &DistanceMatrix, order: Vec<usize>) -> Vec<usize> {
        if order.len() <= self.max_batch {
            return self.solver.solve(matrix, &order).order.split_off(1);
        }

        let mut path = Vec::with_capacity(order.len());
        let mut anchor: Option<usize> = None;
        for mut batch in partition(order, self.max_batch) {
            if let Some(anchor) = anchor {
                batch.insert(0, anchor);
            }
            let solved = self.solver.solve(matrix, &batch).order;
            anchor = solved.last().copied();
            path.extend_from_slice(&solved[1..]);
        }
        path
    }
}

/// Bisects until every part has at most `max` elements.
fn partition(list: Vec<usize>, max: usize) -> Vec<Vec<usize>> {
    if list.len() <= max {
        return vec![list];
    }
    let mut left = list;
    let right = left.split_off(left.len() / 2);
    let mut parts = partition(left, max);
    parts.extend(partition(right, max));
    parts
}

impl PathStrategy for RoutePlanner {
    fn find_optimal_path(&mut self, refresh: bool) -> Result<(Vec<Target>, f64), PlanError> {
        if refresh || self.targets.is_empty() {
            self.refresh()?;
        }
        let visible = self.visible();
        let t0 = Instant::now();
        let (path, length) = self.solve(&visible)?;
        log::info!("Path finding took {:.3} ms", t0.elapsed().as_secs_f64() * 1e3);
        let ordered: Vec<Target> = path.into_iter().map(|i| visible[i].clone()).collect();
        log::debug!(
            "Path: {:?}",
            ordered.iter().map(Target::name).collect::<Vec<_>>()
        );
        log::debug!(
            "Path length: {:.3} rad ({:.1} deg)",
            length,
            length.to_degrees()
        );
        Ok((ordered, length))
    }

    fn route(&mut self) -> Result<Box<dyn Iterator<Item = Target> + '_>, PlanError> {
        self.refresh()?;
        let pending: Vec<Target> = self.targets.values().cloned().collect();
        if self.filter_el(pending.iter().cloned()).is_empty() {
            return Err(PlanError::EmptyPath);
        }
        Ok(Box::new(Route {
            planner: self,
            pending,
        }))
    }
}

/// Re-plans over the remaining targets before every step, so each yielded
/// target is the best next one from where the mount is now.
pub struct Route<'a> {
    planner: &'a RoutePlanner,
    pending: Vec<Target>,
}

impl Iterator for Route<'_> {
    type Item = Target;

    fn next(&mut self) -> Option<Target> {
        self.pending.retain_mut(|t| match t.compute() {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Dropping {} from path: {}", t.name(), e);
                false
            }
        });
        let visible = self.planner.filter_el(self.pending.iter().cloned());

        let t0 = Instant::now();
        let path = match self.planner.solve(&visible) {
            Ok((path, _)) => path,
            Err(e) => {
                log::error!("Path finding failed: {}", e);
                self.pending.clear();
                return None;
            }
        };
        let Some(&first) = path.first() else {
            self.pending.clear();
            return None;
        };
        log::info!("Path finding took {:.3} ms", t0.elapsed().as_secs_f64() * 1e3);
        log::debug!(
            "Path: {:?}",
            path.iter().map(|&i| visible[i].name()).collect::<Vec<_>>()
        );

        let next = visible[first].clone();
        self.pending.retain(|t| t.name() != next.name());
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::FixedPosition;
    use std::collections::HashSet;

    /// Azimuth-only travel on a circle.
    struct Circle;

    impl TravelCost for Circle {
        fn travel(&self, from: &AzEl, to: &AzEl) -> f64 {
            let d = (from.azimuth() - to.azimuth()).abs();
            d.min(360.0 - d).to_radians()
        }
    }

    struct Fixed(Vec<Target>);

    impl TargetCatalog for Fixed {
        fn load_category(&self, _category: &str, _el: f64) -> Result<Vec<Target>, TargetError> {
            Ok(self.0.clone())
        }

        fn load_target(&self, name: &str) -> Result<Target, TargetError> {
            self.0
                .iter()
                .find(|t| t.name() == name)
                .cloned()
                .ok_or_else(|| TargetError::UnknownTarget(name.to_string()))
        }
    }

    fn planner(targets: Vec<Target>, el_cutoff: f64, batch: usize) -> RoutePlanner {
        RoutePlanner::new(
            Arc::new(Fixed(targets)),
            Arc::new(FixedPosition(AzEl::new(0.0, 45.0))),
            Arc::new(Circle),
            el_cutoff,
            batch,
        )
        .with_categories(vec!["ALL".into()])
    }

    fn at(name: &str, az: f64, el: f64) -> Target {
        Target::fixed(name, AzEl::new(az, el))
    }

    #[test]
    fn visits_every_target_once_without_anchor() {
        let targets = vec![at("A", 10.0, 30.0), at("B", 350.0, 30.0), at("C", 180.0, 30.0)];
        let mut p = planner(targets, 10.0, 5);
        let (path, length) = p.find_optimal_path(true).unwrap();
        let names: Vec<&str> = path.iter().map(Target::name).collect();
        assert_eq!(names.len(), 3);
        assert_eq!(names.iter().collect::<HashSet<_>>().len(), 3);
        assert!(length >= 0.0);
    }

    #[test]
    fn batches_stitch_without_loss_or_duplicates() {
        let targets = vec![
            at("A", 10.0, 30.0),
            at("B", 100.0, 30.0),
            at("C", 200.0, 30.0),
            at("D", 300.0, 30.0),
        ];
        for batch in [1, 2, 3] {
            let mut p = planner(targets.clone(), 0.0, batch);
            let (path, _) = p.find_optimal_path(true).unwrap();
            let mut names: Vec<&str> = path.iter().map(Target::name).collect();
            names.sort();
            assert_eq!(names, vec!["A", "B", "C", "D"], "batch size {}", batch);
        }
    }

    #[test]
    fn starts_near_the_mount() {
        let targets = vec![at("far", 180.0, 30.0), at("near", 5.0, 30.0), at("mid", 90.0, 30.0)];
        let mut p = planner(targets, 0.0, 5);
        let (path, length) = p.find_optimal_path(true).unwrap();
        let names: Vec<&str> = path.iter().map(Target::name).collect();
        assert_eq!(names, vec!["near", "mid", "far"]);
        approx::assert_abs_diff_eq!(length, 175f64.to_radians(), epsilon = 1e-9);
    }

    #[test]
    fn partition_bisects() {
        assert_eq!(partition(vec![0, 1, 2, 3, 4], 2), vec![vec![0, 1], vec![2], vec![3, 4]]);
        assert_eq!(partition(vec![0, 1, 2], 3), vec![vec![0, 1, 2]]);
    }

    #[test]
    fn route_yields_each_target_once() {
        let targets = vec![
            at("A", 10.0, 30.0),
            at("B", 120.0, 30.0),
            at("C", 240.0, 30.0),
            at("low", 50.0, 2.0),
        ];
        let mut p = planner(targets, 10.0, 5);
        let names: Vec<String> = p.route().unwrap().map(|t| t.name().to_string()).collect();
        assert_eq!(names.len(), 3);
        assert!(!names.contains(&"low".to_string()));
    }

    #[test]
    fn nothing_above_cutoff_is_an_empty_path() {
        let targets = vec![at("A", 10.0, 5.0), at("B", 120.0, 8.0)];
        let mut p = planner(targets, 90.0, 5);
        assert!(matches!(p.route().err(), Some(PlanError::EmptyPath)));
        let (path, length) = p.find_optimal_path(false).unwrap();
        assert!(path.is_empty());
        assert_eq!(length, 0.0);
    }

    #[test]
    fn settings_are_clamped() {
        let p = planner(Vec::new(), 120.0, 0);
        assert_eq!(p.el_cutoff(), 90.0);
        assert_eq!(p.max_batch(), 1);
    }
}
