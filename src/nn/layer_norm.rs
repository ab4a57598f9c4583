//! Layer normalization

use ndarray::{Array, Array1, ArrayViewD, ArrayViewMutD, Axis, Dimension, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{param_name, unit_uniform, Parameterized};
use crate::error::{Error, Result};

/// Layer Normalization over a single axis
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LayerNorm {
    /// Learnable scale parameter
    pub gamma: Array1<f64>,
    /// Learnable shift parameter
    pub beta: Array1<f64>,
    /// Epsilon for numerical stability
    pub eps: f64,
}

impl LayerNorm {
    /// Create a new LayerNorm layer with randomly initialized scale and shift
    pub fn new<R: Rng + ?Sized>(normalized_shape: usize, rng: &mut R) -> Self {
        Self {
            gamma: unit_uniform(normalized_shape, rng),
            beta: unit_uniform(normalized_shape, rng),
            eps: 1e-5,
        }
    }

    /// Number of normalized features
    pub fn normalized_shape(&self) -> usize {
        self.gamma.len()
    }

    /// Check that scale and shift have the same length
    pub fn validate(&self) -> Result<()> {
        if self.beta.len() != self.gamma.len() {
            return Err(Error::InvalidConfig(format!(
                "layer norm scale has {} entries but shift has {}",
                self.gamma.len(),
                self.beta.len()
            )));
        }
        Ok(())
    }

    /// Normalize every lane along `axis` to zero mean and unit variance,
    /// then scale and shift
    pub fn forward<D: Dimension>(&self, input: &Array<f64, D>, axis: Axis) -> Result<Array<f64, D>> {
        self.validate()?;

        let features = input.len_of(axis);
        if features != self.normalized_shape() {
            return Err(Error::shape(
                format!("{} features on axis {}", self.normalized_shape(), axis.index()),
                features,
            ));
        }

        let mut output = input.clone();
        let n = features as f64;

        for mut lane in output.lanes_mut(axis) {
            let mean = lane.sum() / n;
            let variance = lane.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
            let std = (variance + self.eps).sqrt();

            Zip::from(&mut lane)
                .and(&self.gamma)
                .and(&self.beta)
                .for_each(|x, &g, &b| *x = (*x - mean) / std * g + b);
        }

        Ok(output)
    }
}

impl Parameterized for LayerNorm {
    fn visit_parameters<'a>(&'a self, prefix: &str, visit: &mut dyn FnMut(String, ArrayViewD<'a, f64>)) {
        visit(param_name(prefix, "gamma"), self.gamma.view().into_dyn());
        visit(param_name(prefix, "beta"), self.beta.view().into_dyn());
    }

    fn visit_parameters_mut(&mut self, prefix: &str, visit: &mut dyn FnMut(&str, ArrayViewMutD<'_, f64>)) {
        visit(&param_name(prefix, "gamma"), self.gamma.view_mut().into_dyn());
        visit(&param_name(prefix, "beta"), self.beta.view_mut().into_dyn());
    }
}
