//! Chebyshev spectral graph convolution

use ndarray::{Array1, Array2, Array3, ArrayView2, ArrayViewD, ArrayViewMutD, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{param_name, unit_uniform, xavier_uniform, Parameterized};
use crate::error::{Error, Result};

/// Chebyshev graph convolution of order `K`
///
/// With the scaled Laplacian operator `L`:
/// ```text
/// Tx_0 = X
/// Tx_1 = L X
/// Tx_k = 2 L Tx_{k-1} - Tx_{k-2}
/// out  = sum_k Tx_k W_k^T + b
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChebConv {
    /// Filter weights [K, out_channels, in_channels]
    pub weight: Array3<f64>,
    /// Bias vector [out_channels]
    pub bias: Array1<f64>,
}

impl ChebConv {
    /// Create a new Chebyshev convolution
    pub fn new<R: Rng + ?Sized>(in_channels: usize, out_channels: usize, k: usize, rng: &mut R) -> Self {
        // each W_k is initialized as its own (out, in) matrix
        let weight = xavier_uniform((k, out_channels, in_channels), in_channels, out_channels, rng);
        let bias = unit_uniform(out_channels, rng);
        Self { weight, bias }
    }

    /// Polynomial order K
    pub fn order(&self) -> usize {
        self.weight.dim().0
    }

    /// Number of input channels
    pub fn in_channels(&self) -> usize {
        self.weight.dim().2
    }

    /// Number of output channels
    pub fn out_channels(&self) -> usize {
        self.weight.dim().1
    }

    /// Check that the filter bank has at least one order and the bias
    /// matches the output channels
    pub fn validate(&self) -> Result<()> {
        if self.order() == 0 {
            return Err(Error::InvalidConfig("Chebyshev order must be at least 1".to_string()));
        }
        if self.bias.len() != self.out_channels() {
            return Err(Error::InvalidConfig(format!(
                "Chebyshev bias has {} entries for {} filters",
                self.bias.len(),
                self.out_channels()
            )));
        }
        Ok(())
    }

    /// Forward pass for one graph signal
    ///
    /// # Arguments
    /// * `x` - Node features of shape [num_nodes, in_channels]
    /// * `operator` - Scaled Laplacian operator of shape [num_nodes, num_nodes]
    ///
    /// # Returns
    /// Filtered features of shape [num_nodes, out_channels]
    pub fn forward(&self, x: ArrayView2<'_, f64>, operator: &Array2<f64>) -> Result<Array2<f64>> {
        self.validate()?;

        let (num_nodes, in_channels) = x.dim();
        if in_channels != self.in_channels() {
            return Err(Error::shape(
                format!("[{}, {}]", num_nodes, self.in_channels()),
                x.dim(),
            ));
        }
        if operator.dim() != (num_nodes, num_nodes) {
            return Err(Error::shape((num_nodes, num_nodes), operator.dim()));
        }

        let filter = |k: usize, tx: &Array2<f64>| tx.dot(&self.weight.index_axis(Axis(0), k).t());

        let tx_0 = x.to_owned();
        let mut out = filter(0, &tx_0);

        if self.order() > 1 {
            let mut prev = tx_0;
            let mut curr = operator.dot(&x);
            out += &filter(1, &curr);

            for k in 2..self.order() {
                let next = operator.dot(&curr) * 2.0 - &prev;
                out += &filter(k, &next);
                prev = curr;
                curr = next;
            }
        }

        out += &self.bias;
        Ok(out)
    }
}

impl Parameterized for ChebConv {
    fn visit_parameters<'a>(&'a self, prefix: &str, visit: &mut dyn FnMut(String, ArrayViewD<'a, f64>)) {
        visit(param_name(prefix, "weight"), self.weight.view().into_dyn());
        visit(param_name(prefix, "bias"), self.bias.view().into_dyn());
    }

    fn visit_parameters_mut(&mut self, prefix: &str, visit: &mut dyn FnMut(&str, ArrayViewMutD<'_, f64>)) {
        visit(&param_name(prefix, "weight"), self.weight.view_mut().into_dyn());
        visit(&param_name(prefix, "bias"), self.bias.view_mut().into_dyn());
    }
}
