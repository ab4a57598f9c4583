//! MSTGCN block
//!
//! ```text
//! X (B, N, F_in, T)
//!   |
//!   +---> ChebConv per time slice --> ReLU --> time Conv2d (1x3, stride s)
//!   |                                                   |
//!   +------------> residual Conv2d (1x1, stride s) ---> + --> ReLU --> LayerNorm
//!                                                                       |
//!                                                                       v
//!                                                        (B, N, F_time, ceil(T / s))
//! ```

use ndarray::{s, Array2, Array4, ArrayViewD, ArrayViewMutD, Axis};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::{Connectivity, Laplacian, LaplacianNormalization};
use crate::nn::{param_name, relu, ChebConv, Conv2d, LayerNorm, Parameterized};

/// Kernel width of the temporal convolution
const TIME_KERNEL: usize = 3;

/// One spatial-temporal graph convolution block
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MstgcnBlock {
    cheb_conv: ChebConv,
    time_conv: Conv2d,
    residual_conv: Conv2d,
    layer_norm: LayerNorm,
    time_strides: usize,
    normalization: LaplacianNormalization,
}

impl MstgcnBlock {
    /// Create a new block
    ///
    /// # Arguments
    /// * `in_channels` - Number of input features
    /// * `k` - Order of Chebyshev polynomials
    /// * `nb_chev_filter` - Number of Chebyshev filters
    /// * `nb_time_filter` - Number of time filters
    /// * `time_strides` - Stride of the temporal and residual convolutions
    /// * `normalization` - Laplacian used by the Chebyshev filter
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        k: usize,
        nb_chev_filter: usize,
        nb_time_filter: usize,
        time_strides: usize,
        normalization: LaplacianNormalization,
        rng: &mut R,
    ) -> Result<Self> {
        if k == 0 {
            return Err(Error::InvalidConfig("Chebyshev order must be at least 1".to_string()));
        }

        let cheb_conv = ChebConv::new(in_channels, nb_chev_filter, k, rng);
        let time_conv = Conv2d::new(
            nb_chev_filter,
            nb_time_filter,
            (1, TIME_KERNEL),
            (1, time_strides),
            (0, 1),
            rng,
        )?;
        let residual_conv = Conv2d::new(in_channels, nb_time_filter, (1, 1), (1, time_strides), (0, 0), rng)?;
        let layer_norm = LayerNorm::new(nb_time_filter, rng);

        Ok(Self {
            cheb_conv,
            time_conv,
            residual_conv,
            layer_norm,
            time_strides,
            normalization,
        })
    }

    /// Check that the layers agree on channel counts and stride
    ///
    /// Blocks built by [`MstgcnBlock::new`] always pass; deserialized blocks
    /// may not.
    pub fn validate(&self) -> Result<()> {
        self.cheb_conv.validate()?;
        self.time_conv.validate()?;
        self.residual_conv.validate()?;
        self.layer_norm.validate()?;

        let stride = (1, self.time_strides);
        if self.time_strides == 0 || self.time_conv.stride != stride || self.residual_conv.stride != stride {
            return Err(Error::InvalidConfig(format!(
                "block stride {} disagrees with its convolutions",
                self.time_strides
            )));
        }

        let wiring = [
            (self.time_conv.in_channels(), self.nb_chev_filter()),
            (self.residual_conv.in_channels(), self.in_channels()),
            (self.residual_conv.out_channels(), self.nb_time_filter()),
            (self.layer_norm.normalized_shape(), self.nb_time_filter()),
        ];
        if wiring.iter().any(|(a, b)| a != b) {
            return Err(Error::InvalidConfig("block layers disagree on channel counts".to_string()));
        }
        Ok(())
    }

    /// Number of input features
    pub fn in_channels(&self) -> usize {
        self.cheb_conv.in_channels()
    }

    /// Order of the Chebyshev polynomials
    pub fn cheb_order(&self) -> usize {
        self.cheb_conv.order()
    }

    /// Number of Chebyshev filters
    pub fn nb_chev_filter(&self) -> usize {
        self.cheb_conv.out_channels()
    }

    /// Number of time filters
    pub fn nb_time_filter(&self) -> usize {
        self.time_conv.out_channels()
    }

    /// Time stride
    pub fn time_strides(&self) -> usize {
        self.time_strides
    }

    /// Output length for an input of `len` time steps
    pub fn output_len(&self, len: usize) -> usize {
        (len + self.time_strides - 1) / self.time_strides
    }

    /// Chebyshev graph filtering followed by ReLU
    ///
    /// Input shape: [batch, nodes, in_channels, time]
    /// Output shape: [batch, nodes, nb_chev_filter, time]
    pub fn spatial_filter(&self, x: &Array4<f64>, connectivity: &Connectivity) -> Result<Array4<f64>> {
        let (batch, num_nodes, in_channels, num_steps) = x.dim();
        if in_channels != self.in_channels() {
            return Err(Error::shape(
                format!("[batch, nodes, {}, time]", self.in_channels()),
                x.dim(),
            ));
        }
        connectivity.validate(num_nodes, num_steps)?;

        let operators: Vec<Array2<f64>> = match connectivity {
            Connectivity::Static(edges) => {
                let (op, _) = Laplacian::chebyshev_operator(edges, num_nodes, self.normalization)?;
                vec![op]
            }
            Connectivity::TimeVarying(steps) => steps
                .iter()
                .map(|edges| {
                    Laplacian::chebyshev_operator(edges, num_nodes, self.normalization).map(|(op, _)| op)
                })
                .collect::<Result<_>>()?,
        };
        let operator_at = |t: usize| match connectivity {
            Connectivity::Static(_) => &operators[0],
            Connectivity::TimeVarying(_) => &operators[t],
        };

        let slices = (0..batch * num_steps)
            .into_par_iter()
            .map(|idx| {
                let (b, t) = (idx / num_steps, idx % num_steps);
                let features = x.slice(s![b, .., .., t]);
                self.cheb_conv.forward(features, operator_at(t)).map(relu)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut output = Array4::zeros((batch, num_nodes, self.nb_chev_filter(), num_steps));
        for (idx, slice) in slices.into_iter().enumerate() {
            let (b, t) = (idx / num_steps, idx % num_steps);
            output.slice_mut(s![b, .., .., t]).assign(&slice);
        }

        Ok(output)
    }

    /// Forward pass through the block
    ///
    /// Input shape: [batch, nodes, in_channels, time]
    /// Output shape: [batch, nodes, nb_time_filter, ceil(time / time_strides)]
    pub fn forward(&self, x: &Array4<f64>, connectivity: &Connectivity) -> Result<Array4<f64>> {
        let spatial = self.spatial_filter(x, connectivity)?;

        // (B, F, N, T) layout for the convolutions
        let temporal = self.time_conv.forward(spatial.view().permuted_axes([0, 2, 1, 3]))?;
        let residual = self.residual_conv.forward(x.view().permuted_axes([0, 2, 1, 3]))?;

        if temporal.dim() != residual.dim() {
            return Err(Error::shape(temporal.dim(), residual.dim()));
        }

        let fused = relu(temporal + residual);
        let normed = self.layer_norm.forward(&fused, Axis(1))?;
        let output = normed.permuted_axes([0, 2, 1, 3]).as_standard_layout().into_owned();

        debug!(input = ?x.dim(), output = ?output.dim(), "mstgcn block forward");
        Ok(output)
    }
}

impl Parameterized for MstgcnBlock {
    fn visit_parameters<'a>(&'a self, prefix: &str, visit: &mut dyn FnMut(String, ArrayViewD<'a, f64>)) {
        self.cheb_conv.visit_parameters(&param_name(prefix, "cheb_conv"), visit);
        self.time_conv.visit_parameters(&param_name(prefix, "time_conv"), visit);
        self.residual_conv.visit_parameters(&param_name(prefix, "residual_conv"), visit);
        self.layer_norm.visit_parameters(&param_name(prefix, "layer_norm"), visit);
    }

    fn visit_parameters_mut(&mut self, prefix: &str, visit: &mut dyn FnMut(&str, ArrayViewMutD<'_, f64>)) {
        self.cheb_conv.visit_parameters_mut(&param_name(prefix, "cheb_conv"), visit);
        self.time_conv.visit_parameters_mut(&param_name(prefix, "time_conv"), visit);
        self.residual_conv.visit_parameters_mut(&param_name(prefix, "residual_conv"), visit);
        self.layer_norm.visit_parameters_mut(&param_name(prefix, "layer_norm"), visit);
    }
}
