//! Graph Laplacian and largest eigenvalue estimation
//!
//! The Laplacian is stored source-major: entry `[s, t]` holds the weight of
//! edge `s -> t` and degrees are counted over edge sources. Messages flow from
//! source to target, so the operator applied to node features is the
//! transpose of the scaled Laplacian.

use nalgebra::linalg::{Schur, SymmetricEigen};
use nalgebra::DMatrix;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::EdgeIndex;
use crate::error::{Error, Result};

/// Eigen-solver iteration cap
const MAX_EIGEN_ITERATIONS: usize = 10_000;

/// Eigenvalues below this are treated as zero
const ZERO_EIGENVALUE: f64 = 1e-10;

/// Laplacian normalization scheme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaplacianNormalization {
    /// `L = D - A`
    #[default]
    Unnormalized,
    /// `L = I - D^{-1/2} A D^{-1/2}`
    Symmetric,
    /// `L = I - D^{-1} A`
    RandomWalk,
}

/// Dense graph Laplacian
#[derive(Debug, Clone)]
pub struct Laplacian {
    matrix: Array2<f64>,
    normalization: LaplacianNormalization,
}

impl Laplacian {
    /// Build the Laplacian of an edge list over `num_nodes` nodes.
    ///
    /// Self-loops are dropped and duplicate edges add up.
    pub fn from_edges(
        edges: &EdgeIndex,
        num_nodes: usize,
        normalization: LaplacianNormalization,
    ) -> Result<Self> {
        edges.validate(num_nodes)?;

        let loops = edges.self_loops();
        if loops > 0 {
            warn!(self_loops = loops, "dropping self-loops from edge list");
        }

        let mut adjacency = Array2::<f64>::zeros((num_nodes, num_nodes));
        let mut degree = vec![0.0; num_nodes];
        for &(s, t) in edges.iter().filter(|(s, t)| s != t) {
            adjacency[[s, t]] += 1.0;
            degree[s] += 1.0;
        }

        let inverse = |d: f64, power: f64| if d > 0.0 { d.powf(-power) } else { 0.0 };

        let mut matrix = Array2::<f64>::zeros((num_nodes, num_nodes));
        match normalization {
            LaplacianNormalization::Unnormalized => {
                for i in 0..num_nodes {
                    matrix[[i, i]] = degree[i];
                }
                matrix -= &adjacency;
            }
            LaplacianNormalization::Symmetric => {
                for ((s, t), &a) in adjacency.indexed_iter() {
                    matrix[[s, t]] = -inverse(degree[s], 0.5) * a * inverse(degree[t], 0.5);
                }
                for i in 0..num_nodes {
                    matrix[[i, i]] += 1.0;
                }
            }
            LaplacianNormalization::RandomWalk => {
                for ((s, t), &a) in adjacency.indexed_iter() {
                    matrix[[s, t]] = -inverse(degree[s], 1.0) * a;
                }
                for i in 0..num_nodes {
                    matrix[[i, i]] += 1.0;
                }
            }
        }

        Ok(Self {
            matrix,
            normalization,
        })
    }

    /// Laplacian matrix, source-major
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// Number of nodes
    pub fn num_nodes(&self) -> usize {
        self.matrix.nrows()
    }

    /// Whether the matrix equals its transpose
    pub fn is_symmetric(&self) -> bool {
        let n = self.num_nodes();
        (0..n).all(|i| (0..i).all(|j| (self.matrix[[i, j]] - self.matrix[[j, i]]).abs() < 1e-12))
    }

    /// Real part of the eigenvalue of largest magnitude
    pub fn lambda_max(&self) -> Result<f64> {
        let n = self.num_nodes();
        if n == 0 {
            return Err(Error::SpectralEstimation("graph has no nodes".to_string()));
        }

        let dense = DMatrix::from_fn(n, n, |i, j| self.matrix[[i, j]]);

        let lambda = if self.is_symmetric() {
            let eigen = SymmetricEigen::try_new(dense, f64::EPSILON, MAX_EIGEN_ITERATIONS)
                .ok_or_else(|| {
                    Error::SpectralEstimation("symmetric eigen-solver did not converge".to_string())
                })?;
            eigen
                .eigenvalues
                .iter()
                .copied()
                .max_by(|a, b| a.abs().total_cmp(&b.abs()))
                .unwrap_or(0.0)
        } else {
            let schur = Schur::try_new(dense, f64::EPSILON, MAX_EIGEN_ITERATIONS).ok_or_else(
                || Error::SpectralEstimation("Schur decomposition did not converge".to_string()),
            )?;
            schur
                .complex_eigenvalues()
                .iter()
                .max_by(|a, b| a.norm_sqr().total_cmp(&b.norm_sqr()))
                .map(|c| c.re)
                .unwrap_or(0.0)
        };

        if !lambda.is_finite() || lambda.abs() < ZERO_EIGENVALUE {
            return Err(Error::SpectralEstimation(format!(
                "largest eigenvalue is {} (graph has no usable edges)",
                lambda
            )));
        }

        debug!(
            lambda_max = lambda,
            nodes = n,
            normalization = ?self.normalization,
            "estimated Laplacian spectrum"
        );
        Ok(lambda)
    }

    /// Chebyshev operator `(2 L / lambda_max - I)^T`, ready to multiply
    /// node features of shape `[num_nodes, channels]`
    pub fn scaled_operator(&self, lambda_max: f64) -> Array2<f64> {
        let n = self.num_nodes();
        let mut scaled = self.matrix.mapv(|v| 2.0 * v / lambda_max);
        for i in 0..n {
            scaled[[i, i]] -= 1.0;
        }
        scaled.t().to_owned()
    }

    /// Build the Laplacian, estimate its spectrum and return the Chebyshev
    /// operator together with the estimated `lambda_max`
    pub fn chebyshev_operator(
        edges: &EdgeIndex,
        num_nodes: usize,
        normalization: LaplacianNormalization,
    ) -> Result<(Array2<f64>, f64)> {
        let laplacian = Self::from_edges(edges, num_nodes, normalization)?;
        let lambda_max = laplacian.lambda_max()?;
        Ok((laplacian.scaled_operator(lambda_max), lambda_max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn path(n: usize) -> EdgeIndex {
        let pairs: Vec<(usize, usize)> = (0..n - 1).map(|i| (i, i + 1)).collect();
        EdgeIndex::undirected(&pairs)
    }

    #[test]
    fn test_unnormalized_matrix() {
        let lap = Laplacian::from_edges(&path(3), 3, LaplacianNormalization::Unnormalized).unwrap();
        let m = lap.matrix();
        assert_eq!(m[[0, 0]], 1.0);
        assert_eq!(m[[1, 1]], 2.0);
        assert_eq!(m[[0, 1]], -1.0);
        assert_eq!(m[[0, 2]], 0.0);
        assert!(lap.is_symmetric());
    }

    #[test]
    fn test_path_lambda_max() {
        let lap = Laplacian::from_edges(&path(5), 5, LaplacianNormalization::Unnormalized).unwrap();
        let expected = 2.0 + 2.0 * (std::f64::consts::PI / 5.0).cos();
        assert_relative_eq!(lap.lambda_max().unwrap(), expected, epsilon = 1e-8);
    }

    #[test]
    fn test_complete_graph_lambda_max() {
        let edges = EdgeIndex::undirected(&[(0, 1), (1, 2), (0, 2)]);
        let lap = Laplacian::from_edges(&edges, 3, LaplacianNormalization::Unnormalized).unwrap();
        assert_relative_eq!(lap.lambda_max().unwrap(), 3.0, epsilon = 1e-8);
    }

    #[test]
    fn test_symmetric_normalization_bounded() {
        let lap = Laplacian::from_edges(&path(2), 2, LaplacianNormalization::Symmetric).unwrap();
        assert_relative_eq!(lap.lambda_max().unwrap(), 2.0, epsilon = 1e-8);

        let lap = Laplacian::from_edges(&path(6), 6, LaplacianNormalization::Symmetric).unwrap();
        assert!(lap.lambda_max().unwrap() <= 2.0 + 1e-8);
    }

    #[test]
    fn test_random_walk_rows() {
        let edges = EdgeIndex::new(vec![(0, 1), (0, 2)]);
        let lap = Laplacian::from_edges(&edges, 3, LaplacianNormalization::RandomWalk).unwrap();
        let m = lap.matrix();
        assert_relative_eq!(m[[0, 1]], -0.5);
        assert_relative_eq!(m[[0, 2]], -0.5);
        assert_relative_eq!(m[[1, 1]], 1.0);
    }

    #[test]
    fn test_directed_cycle_uses_real_part() {
        // L = I - P for a 3-cycle: eigenvalues 0 and 1.5 +/- i*sqrt(3)/2
        let edges = EdgeIndex::new(vec![(0, 1), (1, 2), (2, 0)]);
        let lap = Laplacian::from_edges(&edges, 3, LaplacianNormalization::Unnormalized).unwrap();
        assert!(!lap.is_symmetric());
        assert_relative_eq!(lap.lambda_max().unwrap(), 1.5, epsilon = 1e-8);
    }

    #[test]
    fn test_self_loops_dropped() {
        let edges = EdgeIndex::new(vec![(0, 0), (0, 1), (1, 0)]);
        let lap = Laplacian::from_edges(&edges, 2, LaplacianNormalization::Unnormalized).unwrap();
        assert_eq!(lap.matrix()[[0, 0]], 1.0);
    }

    #[test]
    fn test_duplicate_edges_accumulate() {
        let edges = EdgeIndex::new(vec![(0, 1), (0, 1)]);
        let lap = Laplacian::from_edges(&edges, 2, LaplacianNormalization::Unnormalized).unwrap();
        assert_eq!(lap.matrix()[[0, 0]], 2.0);
        assert_eq!(lap.matrix()[[0, 1]], -2.0);
    }

    #[test]
    fn test_no_edges_fails() {
        let edges = EdgeIndex::new(vec![(1, 1)]);
        let lap = Laplacian::from_edges(&edges, 3, LaplacianNormalization::Unnormalized).unwrap();
        assert!(matches!(lap.lambda_max(), Err(Error::SpectralEstimation(_))));
    }

    #[test]
    fn test_scaled_operator_transposes() {
        let edges = EdgeIndex::new(vec![(0, 1)]);
        let lap = Laplacian::from_edges(&edges, 2, LaplacianNormalization::Unnormalized).unwrap();
        let op = lap.scaled_operator(2.0);
        // L = [[1, -1], [0, 0]] -> L_hat = [[0, -1], [0, -1]] -> transposed
        assert_relative_eq!(op[[0, 0]], 0.0);
        assert_relative_eq!(op[[1, 0]], -1.0);
        assert_relative_eq!(op[[0, 1]], 0.0);
        assert_relative_eq!(op[[1, 1]], -1.0);
    }

    #[test]
    fn test_out_of_range_edge() {
        let edges = EdgeIndex::new(vec![(0, 4)]);
        assert!(Laplacian::from_edges(&edges, 3, LaplacianNormalization::Unnormalized).is_err());
    }
}
