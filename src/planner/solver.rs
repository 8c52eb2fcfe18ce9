//! Per-batch shortest open path over a distance matrix.
//!
//! Every solver keeps the first node of the batch in place; it is either the
//! mount's own position or the last node of the previous batch.

use crate::angle::AzEl;

/// Cost of moving the mount between two poses.
pub trait TravelCost: Send + Sync {
    fn travel(&self, from: &AzEl, to: &AzEl) -> f64;
}

#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    size: usize,
    data: Vec<f64>,
}

impl DistanceMatrix {
    pub fn build(points: &[AzEl], cost: &dyn TravelCost) -> Self {
        let size = points.len();
        let mut data = Vec::with_capacity(size * size);
        for from in points {
            for to in points {
                data.push(cost.travel(from, to));
            }
        }
        Self { size, data }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.size + j]
    }

    /// Sum of consecutive legs of `path`.
    pub fn path_length(&self, path: &[usize]) -> f64 {
        path.windows(2).map(|w| self.get(w[0], w[1])).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tour {
    pub order: Vec<usize>,
    pub length: f64,
}

pub trait Solver: Send + Sync {
    /// Orders `nodes` (matrix indices) into a short open path starting at
    /// `nodes[0]`.
    fn solve(&self, matrix: &DistanceMatrix, nodes: &[usize]) -> Tour;
}

/// Depth-first search over all orders with pruning on the best length so far.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactSolver;

impl ExactSolver {
    fn search(
        matrix: &DistanceMatrix,
        path: &mut Vec<usize>,
        rest: &mut Vec<usize>,
        length: f64,
        best: &mut Tour,
    ) {
        if length >= best.length {
            return;
        }
        if rest.is_empty() {
            best.order = path.clone();
            best.length = length;
            return;
        }
        for k in 0..rest.len() {
            let next = rest.swap_remove(k);
            let last = path[path.len() - 1];
            path.push(next);
            Self::search(matrix, path, rest, length + matrix.get(last, next), best);
            path.pop();
            rest.push(next);
            let end = rest.len() - 1;
            rest.swap(k, end);
        }
    }
}

impl Solver for ExactSolver {
    fn solve(&self, matrix: &DistanceMatrix, nodes: &[usize]) -> Tour {
        if nodes.len() <= 2 {
            return Tour {
                order: nodes.to_vec(),
                length: matrix.path_length(nodes),
            };
        }
        let mut best = Tour {
            order: nodes.to_vec(),
            length: f64::INFINITY,
        };
        let mut path = vec![nodes[0]];
        let mut rest = nodes[1..].to_vec();
        Self::search(matrix, &mut path, &mut rest, 0.0, &mut best);
        best
    }
}

/// Nearest neighbour construction followed by 2-opt until no move improves.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicSolver;

impl HeuristicSolver {
    fn nearest_neighbour(matrix: &DistanceMatrix, nodes: &[usize]) -> Vec<usize> {
        let mut order = vec![nodes[0]];
        let mut rest = nodes[1..].to_vec();
        while !rest.is_empty() {
            let last = order[order.len() - 1];
            let (k, _) = rest
                .iter()
                .enumerate()
                .map(|(k, &n)| (k, matrix.get(last, n)))
                .fold((0, f64::INFINITY), |acc, cur| if cur.1 < acc.1 { cur } else { acc });
            order.push(rest.remove(k));
        }
        order
    }

    fn two_opt(matrix: &DistanceMatrix, order: &mut [usize]) {
        let n = order.len();
        let mut length = matrix.path_length(order);
        let mut improved = true;
        while improved {
            improved = false;
            for i in 1..n.saturating_sub(1) {
                for j in i + 1..n {
                    order[i..=j].reverse();
                    let candidate = matrix.path_length(order);
                    if candidate + 1e-12 < length {
                        length = candidate;
                        improved = true;
                    } else {
                        order[i..=j].reverse();
                    }
                }
            }
        }
    }
}

impl Solver for HeuristicSolver {
    fn solve(&self, matrix: &DistanceMatrix, nodes: &[usize]) -> Tour {
        if nodes.is_empty() {
            return Tour {
                order: Vec::new(),
                length: 0.0,
            };
        }
        let mut order = Self::nearest_neighbour(matrix, nodes);
        Self::two_opt(matrix, &mut order);
        let length = matrix.path_length(&order);
        Tour { order, length }
    }
}

/// Exact up to `exact_limit` nodes, heuristic above.
#[derive(Debug, Clone, Copy)]
pub struct AutoSolver {
    pub exact_limit: usize,
}

impl Default for AutoSolver {
    fn default() -> Self {
        Self { exact_limit: 9 }
    }
}

impl Solver for AutoSolver {
    fn solve(&self, matrix: &DistanceMatrix, nodes: &[usize]) -> Tour {
        if nodes.len() <= self.exact_limit {
            ExactSolver.solve(matrix, nodes)
        } else {
            HeuristicSolver.solve(matrix, nodes)
        }
    }
}
