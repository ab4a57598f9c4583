//! 2-D convolution layer

use ndarray::{s, Array1, Array4, ArrayView4, ArrayViewD, ArrayViewMutD};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{param_name, unit_uniform, xavier_uniform, Parameterized};
use crate::error::{Error, Result};

/// 2-D convolution over `[batch, channels, height, width]` input
///
/// MSTGCN uses unit kernel height so the convolution runs along the last
/// (time) axis independently for every node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conv2d {
    /// Weight tensor [out_channels, in_channels, kernel_h, kernel_w]
    pub weight: Array4<f64>,
    /// Bias vector [out_channels]
    pub bias: Array1<f64>,
    /// Stride (height, width)
    pub stride: (usize, usize),
    /// Zero padding (height, width)
    pub padding: (usize, usize),
}

impl Conv2d {
    /// Create a new Conv2d layer
    ///
    /// Both strides must be at least 1.
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel: (usize, usize),
        stride: (usize, usize),
        padding: (usize, usize),
        rng: &mut R,
    ) -> Result<Self> {
        if stride.0 == 0 || stride.1 == 0 {
            return Err(Error::InvalidConfig(format!("convolution stride {:?} must be non-zero", stride)));
        }

        let receptive = kernel.0 * kernel.1;
        let weight = xavier_uniform(
            (out_channels, in_channels, kernel.0, kernel.1),
            in_channels * receptive,
            out_channels * receptive,
            rng,
        );
        let bias = unit_uniform(out_channels, rng);

        Ok(Self {
            weight,
            bias,
            stride,
            padding,
        })
    }

    /// Check that strides are non-zero and the bias matches the output channels
    pub fn validate(&self) -> Result<()> {
        if self.stride.0 == 0 || self.stride.1 == 0 {
            return Err(Error::InvalidConfig(format!(
                "convolution stride {:?} must be non-zero",
                self.stride
            )));
        }
        if self.bias.len() != self.out_channels() {
            return Err(Error::InvalidConfig(format!(
                "convolution bias has {} entries for {} output channels",
                self.bias.len(),
                self.out_channels()
            )));
        }
        Ok(())
    }

    /// Number of input channels
    pub fn in_channels(&self) -> usize {
        self.weight.dim().1
    }

    /// Number of output channels
    pub fn out_channels(&self) -> usize {
        self.weight.dim().0
    }

    /// Kernel size (height, width)
    pub fn kernel(&self) -> (usize, usize) {
        let (_, _, kh, kw) = self.weight.dim();
        (kh, kw)
    }

    /// Output spatial size for a given input size
    pub fn output_size(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        let (kh, kw) = self.kernel();
        let padded_h = height + 2 * self.padding.0;
        let padded_w = width + 2 * self.padding.1;

        if padded_h < kh || padded_w < kw {
            return Err(Error::shape(
                format!("padded input of at least {}x{}", kh, kw),
                (padded_h, padded_w),
            ));
        }

        Ok((
            (padded_h - kh) / self.stride.0 + 1,
            (padded_w - kw) / self.stride.1 + 1,
        ))
    }

    /// Forward pass
    /// Input shape: [batch, in_channels, height, width]
    /// Output shape: [batch, out_channels, out_height, out_width]
    pub fn forward(&self, input: ArrayView4<'_, f64>) -> Result<Array4<f64>> {
        let (batch, in_channels, height, width) = input.dim();
        if in_channels != self.in_channels() {
            return Err(Error::shape(
                format!("{} input channels", self.in_channels()),
                format!("{} input channels", in_channels),
            ));
        }

        self.validate()?;

        let (kh, kw) = self.kernel();
        let (out_h, out_w) = self.output_size(height, width)?;
        let (ph, pw) = self.padding;

        let padded = if ph > 0 || pw > 0 {
            let mut padded = Array4::zeros((batch, in_channels, height + 2 * ph, width + 2 * pw));
            padded
                .slice_mut(s![.., .., ph..ph + height, pw..pw + width])
                .assign(&input);
            padded
        } else {
            input.to_owned()
        };

        let out_channels = self.out_channels();
        let mut output = Array4::zeros((batch, out_channels, out_h, out_w));

        for b in 0..batch {
            for oc in 0..out_channels {
                for oh in 0..out_h {
                    for ow in 0..out_w {
                        let h0 = oh * self.stride.0;
                        let w0 = ow * self.stride.1;
                        let mut sum = self.bias[oc];

                        for ic in 0..in_channels {
                            for i in 0..kh {
                                for j in 0..kw {
                                    sum += padded[[b, ic, h0 + i, w0 + j]] * self.weight[[oc, ic, i, j]];
                                }
                            }
                        }

                        output[[b, oc, oh, ow]] = sum;
                    }
                }
            }
        }

        Ok(output)
    }
}

impl Parameterized for Conv2d {
    fn visit_parameters<'a>(&'a self, prefix: &str, visit: &mut dyn FnMut(String, ArrayViewD<'a, f64>)) {
        visit(param_name(prefix, "weight"), self.weight.view().into_dyn());
        visit(param_name(prefix, "bias"), self.bias.view().into_dyn());
    }

    fn visit_parameters_mut(&mut self, prefix: &str, visit: &mut dyn FnMut(&str, ArrayViewMutD<'_, f64>)) {
        visit(&param_name(prefix, "weight"), self.weight.view_mut().into_dyn());
        visit(&param_name(prefix, "bias"), self.bias.view_mut().into_dyn());
    }
}
