//! Full MSTGCN model

use std::fs;
use std::path::Path;

use ndarray::{Array3, Array4, ArrayViewD, ArrayViewMutD, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::block::MstgcnBlock;
use crate::config::MstgcnConfig;
use crate::error::{Error, Result};
use crate::graph::Connectivity;
use crate::nn::{param_name, Conv2d, Parameterized};

/// Multi-component spatial-temporal graph convolutional network
///
/// A stack of [`MstgcnBlock`]s followed by a fusion convolution that turns
/// the remaining time axis into `num_for_predict` forecast steps.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Mstgcn {
    config: MstgcnConfig,
    blocks: Vec<MstgcnBlock>,
    final_conv: Conv2d,
}

impl Mstgcn {
    /// Create a new model, seeding the initializer from `config.seed` when set
    pub fn new(config: MstgcnConfig) -> Result<Self> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, &mut rng)
    }

    /// Create a new model drawing initial parameters from `rng`
    pub fn with_rng<R: Rng + ?Sized>(config: MstgcnConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;

        let mut blocks = Vec::with_capacity(config.nb_block);
        blocks.push(MstgcnBlock::new(
            config.in_channels,
            config.k,
            config.nb_chev_filter,
            config.nb_time_filter,
            config.time_strides,
            config.normalization,
            rng,
        )?);
        for _ in 1..config.nb_block {
            blocks.push(MstgcnBlock::new(
                config.nb_time_filter,
                config.k,
                config.nb_chev_filter,
                config.nb_time_filter,
                1,
                config.normalization,
                rng,
            )?);
        }

        let final_conv = Conv2d::new(
            config.output_len(),
            config.num_for_predict,
            (1, config.nb_time_filter),
            (1, 1),
            (0, 0),
            rng,
        )?;

        let model = Self {
            config,
            blocks,
            final_conv,
        };

        info!(
            blocks = model.blocks.len(),
            parameters = model.num_parameters(),
            "built MSTGCN model"
        );
        Ok(model)
    }

    /// Forward pass
    ///
    /// Input shape: [batch, nodes, in_channels, len_input]
    /// Output shape: [batch, nodes, num_for_predict]
    pub fn forward(&self, x: &Array4<f64>, connectivity: &Connectivity) -> Result<Array3<f64>> {
        let (batch, num_nodes, in_channels, num_steps) = x.dim();
        if in_channels != self.config.in_channels || num_steps != self.config.len_input {
            return Err(Error::shape(
                format!(
                    "[batch, nodes, {}, {}]",
                    self.config.in_channels, self.config.len_input
                ),
                x.dim(),
            ));
        }

        let mut connectivity = connectivity.clone();
        let mut out = x.clone();

        for block in &self.blocks {
            out = block.forward(&out, &connectivity)?;
            connectivity = connectivity.strided(block.time_strides());
        }

        let forecast = self.fuse(&out)?;

        debug!(batch, nodes = num_nodes, output = ?forecast.dim(), "mstgcn forward");
        Ok(forecast)
    }

    /// Fusion convolution over the last block's output
    ///
    /// Input shape: [batch, nodes, nb_time_filter, output_len]
    /// Output shape: [batch, nodes, num_for_predict]
    fn fuse(&self, hidden: &Array4<f64>) -> Result<Array3<f64>> {
        // (B, T, N, F): time steps act as channels, the kernel spans all features
        let fused = self.final_conv.forward(hidden.view().permuted_axes([0, 3, 1, 2]))?;
        let width = fused.len_of(Axis(3));
        if width == 0 {
            return Err(Error::shape("fusion output with at least one column", fused.dim()));
        }

        Ok(fused
            .index_axis(Axis(3), width - 1)
            .permuted_axes([0, 2, 1])
            .as_standard_layout()
            .into_owned())
    }

    /// Check that the layers match the configuration
    ///
    /// Models built by [`Mstgcn::new`] always pass; this guards models read
    /// from disk.
    pub fn validate(&self) -> Result<()> {
        let config = &self.config;
        config.validate()?;

        if self.blocks.len() != config.nb_block {
            return Err(Error::InvalidConfig(format!(
                "model has {} blocks but the configuration asks for {}",
                self.blocks.len(),
                config.nb_block
            )));
        }

        for (i, block) in self.blocks.iter().enumerate() {
            block.validate()?;

            let (in_channels, stride) = if i == 0 {
                (config.in_channels, config.time_strides)
            } else {
                (config.nb_time_filter, 1)
            };
            let expected = (in_channels, config.k, config.nb_chev_filter, config.nb_time_filter, stride);
            let got = (
                block.in_channels(),
                block.cheb_order(),
                block.nb_chev_filter(),
                block.nb_time_filter(),
                block.time_strides(),
            );
            if expected != got {
                return Err(Error::InvalidConfig(format!(
                    "block {} has (in, k, chev, time, stride) = {:?}, expected {:?}",
                    i, got, expected
                )));
            }
        }

        self.final_conv.validate()?;
        let expected = (
            config.output_len(),
            config.num_for_predict,
            (1, config.nb_time_filter),
        );
        let got = (
            self.final_conv.in_channels(),
            self.final_conv.out_channels(),
            self.final_conv.kernel(),
        );
        if expected != got || self.final_conv.stride != (1, 1) || self.final_conv.padding != (0, 0) {
            return Err(Error::InvalidConfig(format!(
                "fusion convolution has (in, out, kernel) = {:?}, expected {:?}",
                got, expected
            )));
        }

        Ok(())
    }

    /// Get configuration
    pub fn config(&self) -> &MstgcnConfig {
        &self.config
    }

    /// Blocks in evaluation order
    pub fn blocks(&self) -> &[MstgcnBlock] {
        &self.blocks
    }

    /// Named views of every learnable tensor
    pub fn parameters(&self) -> Vec<(String, ArrayViewD<'_, f64>)> {
        let mut params = Vec::new();
        self.visit_parameters("", &mut |name, view| params.push((name, view)));
        params
    }

    /// Apply an external update to every learnable tensor
    ///
    /// This is the only way parameters change after construction; an
    /// optimizer calls it between forward passes.
    pub fn update_parameters<F>(&mut self, mut update: F)
    where
        F: FnMut(&str, ArrayViewMutD<'_, f64>),
    {
        self.visit_parameters_mut("", &mut update);
    }

    /// Get model summary as string
    pub fn summary(&self) -> String {
        let mut s = String::new();
        s.push_str("MSTGCN Model Summary\n");
        s.push_str("====================\n");
        s.push_str(&format!("Blocks: {}\n", self.blocks.len()));
        s.push_str(&format!("Input channels: {}\n", self.config.in_channels));
        s.push_str(&format!("Chebyshev order: {}\n", self.config.k));
        s.push_str(&format!("Chebyshev filters: {}\n", self.config.nb_chev_filter));
        s.push_str(&format!("Time filters: {}\n", self.config.nb_time_filter));
        s.push_str(&format!("Time strides: {}\n", self.config.time_strides));
        s.push_str(&format!("Input length: {}\n", self.config.len_input));
        s.push_str(&format!("Forecast horizon: {}\n", self.config.num_for_predict));
        s.push_str(&format!("Laplacian: {:?}\n", self.config.normalization));
        s.push_str(&format!("Total parameters: {}\n", self.num_parameters()));
        s
    }

    /// Save model to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load model from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let model: Self = serde_json::from_str(&json)?;
        model.validate()?;
        Ok(model)
    }
}

impl Parameterized for Mstgcn {
    fn visit_parameters<'a>(&'a self, prefix: &str, visit: &mut dyn FnMut(String, ArrayViewD<'a, f64>)) {
        for (i, block) in self.blocks.iter().enumerate() {
            block.visit_parameters(&param_name(prefix, &format!("blocks.{}", i)), visit);
        }
        self.final_conv.visit_parameters(&param_name(prefix, "final_conv"), visit);
    }

    fn visit_parameters_mut(&mut self, prefix: &str, visit: &mut dyn FnMut(&str, ArrayViewMutD<'_, f64>)) {
        for (i, block) in self.blocks.iter_mut().enumerate() {
            block.visit_parameters_mut(&param_name(prefix, &format!("blocks.{}", i)), visit);
        }
        self.final_conv.visit_parameters_mut(&param_name(prefix, "final_conv"), visit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeIndex;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use tempfile::NamedTempFile;

    fn input(config: &MstgcnConfig, batch: usize, nodes: usize) -> Array4<f64> {
        let mut rng = StdRng::seed_from_u64(99);
        Array4::random_using(
            (batch, nodes, config.in_channels, config.len_input),
            Uniform::new(-1.0, 1.0),
            &mut rng,
        )
    }

    #[test]
    fn test_model_creation() {
        let model = Mstgcn::new(MstgcnConfig::default().nb_block(3)).unwrap();
        assert_eq!(model.blocks().len(), 3);
        assert_eq!(model.blocks()[0].time_strides(), 2);
        assert_eq!(model.blocks()[1].time_strides(), 1);
        assert_eq!(model.blocks()[1].in_channels(), 8);
        assert!(model.num_parameters() > 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MstgcnConfig::default().nb_block(0);
        assert!(matches!(Mstgcn::new(config), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_forward_shape() {
        let config = MstgcnConfig::default().seed(1);
        let model = Mstgcn::new(config.clone()).unwrap();
        let x = input(&config, 2, 5);
        let out = model.forward(&x, &EdgeIndex::ring(5).into()).unwrap();
        assert_eq!(out.dim(), (2, 5, 3));
    }

    #[test]
    fn test_stride_that_does_not_divide_length() {
        let config = MstgcnConfig::new(1, 12, 2).time_strides(5).seed(2);
        let model = Mstgcn::new(config.clone()).unwrap();
        let x = input(&config, 1, 4);
        let out = model.forward(&x, &EdgeIndex::ring(4).into()).unwrap();
        assert_eq!(out.dim(), (1, 4, 2));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let config = MstgcnConfig::default().seed(3);
        let model = Mstgcn::new(config).unwrap();
        let x = Array4::zeros((1, 4, 2, 10));
        assert!(matches!(
            model.forward(&x, &EdgeIndex::ring(4).into()),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_parameter_names_unique() {
        let model = Mstgcn::new(MstgcnConfig::default().seed(4)).unwrap();
        let params = model.parameters();
        assert_eq!(params.len(), 2 * 8 + 2);

        let mut names: Vec<&str> = params.iter().map(|(n, _)| n.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), params.len());
        assert!(names.contains(&"final_conv.weight"));
    }

    #[test]
    fn test_update_parameters() {
        let mut model = Mstgcn::new(MstgcnConfig::default().seed(5)).unwrap();
        model.update_parameters(|_, mut view| view.fill(0.0));
        assert!(model.parameters().iter().all(|(_, v)| v.iter().all(|&x| x == 0.0)));
    }

    #[test]
    fn test_save_load() {
        let config = MstgcnConfig::default().seed(6);
        let model = Mstgcn::new(config.clone()).unwrap();
        let file = NamedTempFile::new().unwrap();
        model.save(file.path()).unwrap();

        let loaded = Mstgcn::load(file.path()).unwrap();
        assert_eq!(loaded.config(), model.config());

        let x = input(&config, 1, 5);
        let conn: Connectivity = EdgeIndex::ring(5).into();
        let a = model.forward(&x, &conn).unwrap();
        let b = loaded.forward(&x, &conn).unwrap();
        for (p, q) in a.iter().zip(b.iter()) {
            approx::assert_relative_eq!(*p, *q, epsilon = 1e-9);
        }
    }

    fn corrupt_saved_model(edit: impl FnOnce(&mut serde_json::Value)) -> Result<Mstgcn> {
        let model = Mstgcn::new(MstgcnConfig::default().seed(7)).unwrap();
        let file = NamedTempFile::new().unwrap();
        model.save(file.path()).unwrap();

        let mut value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(file.path()).unwrap()).unwrap();
        edit(&mut value);
        fs::write(file.path(), value.to_string()).unwrap();

        Mstgcn::load(file.path())
    }

    #[test]
    fn test_load_rejects_short_bias() {
        let result = corrupt_saved_model(|v| {
            v["final_conv"]["bias"]["dim"] = serde_json::json!([1]);
            v["final_conv"]["bias"]["data"] = serde_json::json!([0.5]);
        });
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_load_rejects_missing_block() {
        let result = corrupt_saved_model(|v| {
            v["blocks"].as_array_mut().unwrap().pop();
        });
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_load_rejects_zero_stride() {
        let result = corrupt_saved_model(|v| {
            v["blocks"][0]["time_strides"] = serde_json::json!(0);
        });
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_load_rejects_mismatched_config() {
        let result = corrupt_saved_model(|v| {
            v["config"]["num_for_predict"] = serde_json::json!(5);
        });
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_later_blocks_see_every_stride_th_graph() {
        let config = MstgcnConfig::default().seed(8);
        let model = Mstgcn::new(config.clone()).unwrap();
        let x = input(&config, 1, 5);

        // graphs differ only at odd steps; with stride 2 the second block
        // sees the even steps
        let ring = EdgeIndex::ring(5);
        let star = EdgeIndex::undirected(&[(0, 1), (0, 2), (0, 3), (0, 4)]);
        let steps: Vec<EdgeIndex> = (0..config.len_input)
            .map(|t| if t % 2 == 0 { ring.clone() } else { star.clone() })
            .collect();
        let connectivity = Connectivity::TimeVarying(steps.clone());

        let output = model.forward(&x, &connectivity).unwrap();

        let hidden = model.blocks[0].forward(&x, &connectivity).unwrap();
        let strided = model.blocks[1].forward(&hidden, &Connectivity::Static(ring)).unwrap();
        assert_eq!(output, model.fuse(&strided).unwrap());

        let prefix = Connectivity::TimeVarying(steps[..config.output_len()].to_vec());
        let prefixed = model.blocks[1].forward(&hidden, &prefix).unwrap();
        assert_ne!(output, model.fuse(&prefixed).unwrap());
    }

    #[test]
    fn test_summary() {
        let model = Mstgcn::new(MstgcnConfig::default()).unwrap();
        let summary = model.summary();
        assert!(summary.contains("MSTGCN Model Summary"));
        assert!(summary.contains("Total parameters"));
    }
}
