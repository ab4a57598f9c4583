//! Edge lists and graph connectivity over time

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Directed, unweighted edge list in `(source, target)` form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeIndex {
    edges: Vec<(usize, usize)>,
}

impl EdgeIndex {
    /// Create an edge list from `(source, target)` pairs
    pub fn new(edges: Vec<(usize, usize)>) -> Self {
        Self { edges }
    }

    /// Create an edge list from a COO array of shape `[2, num_edges]`
    pub fn from_coo(coo: &Array2<usize>) -> Result<Self> {
        if coo.nrows() != 2 {
            return Err(Error::shape("[2, num_edges]", coo.dim()));
        }

        let edges = coo
            .row(0)
            .iter()
            .zip(coo.row(1).iter())
            .map(|(&s, &t)| (s, t))
            .collect();

        Ok(Self { edges })
    }

    /// Edge list with both directions of every given pair
    pub fn undirected(pairs: &[(usize, usize)]) -> Self {
        let edges = pairs
            .iter()
            .flat_map(|&(a, b)| [(a, b), (b, a)])
            .collect();
        Self { edges }
    }

    /// Bidirectional ring over `num_nodes` nodes
    pub fn ring(num_nodes: usize) -> Self {
        let pairs: Vec<(usize, usize)> = (0..num_nodes)
            .map(|i| (i, (i + 1) % num_nodes))
            .filter(|&(a, b)| a != b)
            .collect();
        Self::undirected(&pairs)
    }

    /// Edges as `(source, target)` pairs
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// Iterate over edges
    pub fn iter(&self) -> impl Iterator<Item = &(usize, usize)> {
        self.edges.iter()
    }

    /// Number of edges
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the edge list is empty
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Number of self-loops
    pub fn self_loops(&self) -> usize {
        self.edges.iter().filter(|(s, t)| s == t).count()
    }

    /// Check that every endpoint is a valid node index
    pub fn validate(&self, num_nodes: usize) -> Result<()> {
        for &(s, t) in &self.edges {
            let node = s.max(t);
            if node >= num_nodes {
                return Err(Error::NodeOutOfRange { node, num_nodes });
            }
        }
        Ok(())
    }
}

impl From<Vec<(usize, usize)>> for EdgeIndex {
    fn from(edges: Vec<(usize, usize)>) -> Self {
        Self::new(edges)
    }
}

/// Graph connectivity for a signal with `T` time steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Connectivity {
    /// One edge list shared by every time step
    Static(EdgeIndex),
    /// One edge list per time step
    TimeVarying(Vec<EdgeIndex>),
}

impl Connectivity {
    /// Time-varying connectivity that repeats the same edges `num_steps` times
    pub fn repeated(edges: &EdgeIndex, num_steps: usize) -> Self {
        Connectivity::TimeVarying(vec![edges.clone(); num_steps])
    }

    /// Whether the topology changes over time
    pub fn is_time_varying(&self) -> bool {
        matches!(self, Connectivity::TimeVarying(_))
    }

    /// Connectivity seen by a layer that keeps every `stride`-th time step
    ///
    /// Static graphs are unchanged; time-varying graphs keep the edge list of
    /// the step each strided output is centered on.
    pub fn strided(&self, stride: usize) -> Self {
        match self {
            Connectivity::Static(edges) => Connectivity::Static(edges.clone()),
            Connectivity::TimeVarying(steps) => {
                Connectivity::TimeVarying(steps.iter().step_by(stride.max(1)).cloned().collect())
            }
        }
    }

    /// Check node indices and, for time-varying graphs, the number of steps
    pub fn validate(&self, num_nodes: usize, num_steps: usize) -> Result<()> {
        match self {
            Connectivity::Static(edges) => edges.validate(num_nodes),
            Connectivity::TimeVarying(steps) => {
                if steps.len() != num_steps {
                    return Err(Error::ConnectivityLength {
                        expected: num_steps,
                        got: steps.len(),
                    });
                }
                steps.iter().try_for_each(|edges| edges.validate(num_nodes))
            }
        }
    }
}

impl From<EdgeIndex> for Connectivity {
    fn from(edges: EdgeIndex) -> Self {
        Connectivity::Static(edges)
    }
}

impl From<Vec<EdgeIndex>> for Connectivity {
    fn from(steps: Vec<EdgeIndex>) -> Self {
        Connectivity::TimeVarying(steps)
    }
}
