//! Neural network layers
//!
//! Dense `ndarray` layers used by the MSTGCN blocks:
//! - `ChebConv` - Chebyshev spectral graph convolution
//! - `Conv2d` - 2-D convolution, used with unit kernel height along time
//! - `LayerNorm` - layer normalization over one axis

mod cheb_conv;
mod conv;
mod layer_norm;

pub use cheb_conv::ChebConv;
pub use conv::Conv2d;
pub use layer_norm::LayerNorm;

use ndarray::{Array, ArrayViewD, ArrayViewMutD, Dimension, ShapeBuilder};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;

/// Rectified linear unit, applied element-wise
pub fn relu<D: Dimension>(x: Array<f64, D>) -> Array<f64, D> {
    x.mapv_into(|v| v.max(0.0))
}

/// Xavier (Glorot) uniform initialization with bound `sqrt(6 / (fan_in + fan_out))`
pub fn xavier_uniform<Sh, D, R>(shape: Sh, fan_in: usize, fan_out: usize, rng: &mut R) -> Array<f64, D>
where
    Sh: ShapeBuilder<Dim = D>,
    D: Dimension,
    R: Rng + ?Sized,
{
    let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
    Array::random_using(shape, Uniform::new(-bound, bound), rng)
}

/// Uniform `U(0, 1)` initialization used for one-dimensional parameters
pub fn unit_uniform<Sh, D, R>(shape: Sh, rng: &mut R) -> Array<f64, D>
where
    Sh: ShapeBuilder<Dim = D>,
    D: Dimension,
    R: Rng + ?Sized,
{
    Array::random_using(shape, Uniform::new(0.0, 1.0), rng)
}

/// Layers holding learnable tensors
pub trait Parameterized {
    /// Visit every learnable tensor with its dotted name
    fn visit_parameters<'a>(&'a self, prefix: &str, visit: &mut dyn FnMut(String, ArrayViewD<'a, f64>));

    /// Visit every learnable tensor mutably
    fn visit_parameters_mut(&mut self, prefix: &str, visit: &mut dyn FnMut(&str, ArrayViewMutD<'_, f64>));

    /// Total number of learnable scalars
    fn num_parameters(&self) -> usize {
        let mut count = 0;
        self.visit_parameters("", &mut |_, view| count += view.len());
        count
    }
}

/// Dotted parameter name
pub(crate) fn param_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}
