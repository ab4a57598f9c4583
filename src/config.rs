//! Model configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::graph::LaplacianNormalization;

/// MSTGCN construction parameters.
///
/// All values are fixed when the model is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MstgcnConfig {
    /// Number of MSTGCN blocks
    pub nb_block: usize,
    /// Number of input features per node
    pub in_channels: usize,
    /// Order of Chebyshev polynomials (degree is `k - 1`)
    pub k: usize,
    /// Number of Chebyshev filters
    pub nb_chev_filter: usize,
    /// Number of time filters
    pub nb_time_filter: usize,
    /// Time stride of the first block
    pub time_strides: usize,
    /// Number of future steps to predict
    pub num_for_predict: usize,
    /// Length of the input sequence
    pub len_input: usize,
    /// Laplacian used by the Chebyshev filters
    pub normalization: LaplacianNormalization,
    /// Random seed for parameter initialization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for MstgcnConfig {
    fn default() -> Self {
        Self {
            nb_block: 2,
            in_channels: 2,
            k: 3,
            nb_chev_filter: 8,
            nb_time_filter: 8,
            time_strides: 2,
            num_for_predict: 3,
            len_input: 12,
            normalization: LaplacianNormalization::Unnormalized,
            seed: None,
        }
    }
}

impl MstgcnConfig {
    /// Create a configuration with default filter sizes
    pub fn new(in_channels: usize, len_input: usize, num_for_predict: usize) -> Self {
        Self {
            in_channels,
            len_input,
            num_for_predict,
            ..Default::default()
        }
    }

    /// Set the number of blocks
    pub fn nb_block(mut self, nb_block: usize) -> Self {
        self.nb_block = nb_block;
        self
    }

    /// Set the Chebyshev order
    pub fn k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Set the number of Chebyshev filters
    pub fn nb_chev_filter(mut self, n: usize) -> Self {
        self.nb_chev_filter = n;
        self
    }

    /// Set the number of time filters
    pub fn nb_time_filter(mut self, n: usize) -> Self {
        self.nb_time_filter = n;
        self
    }

    /// Set the time stride of the first block
    pub fn time_strides(mut self, stride: usize) -> Self {
        self.time_strides = stride;
        self
    }

    /// Set the Laplacian normalization
    pub fn normalization(mut self, normalization: LaplacianNormalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Set the random seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Temporal length after the first block: `ceil(len_input / time_strides)`
    pub fn output_len(&self) -> usize {
        (self.len_input + self.time_strides - 1) / self.time_strides
    }

    /// Check that every size is usable
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("nb_block", self.nb_block),
            ("in_channels", self.in_channels),
            ("k", self.k),
            ("nb_chev_filter", self.nb_chev_filter),
            ("nb_time_filter", self.nb_time_filter),
            ("time_strides", self.time_strides),
            ("num_for_predict", self.num_for_predict),
            ("len_input", self.len_input),
        ];

        for (name, value) in sizes {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{} must be positive", name)));
            }
        }

        Ok(())
    }

    /// Load configuration from TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MstgcnConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_is_valid() {
        let config = MstgcnConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.output_len(), 6);
    }

    #[test]
    fn test_output_len_rounds_up() {
        let config = MstgcnConfig::new(1, 12, 3).time_strides(5);
        assert_eq!(config.output_len(), 3);

        let config = MstgcnConfig::new(1, 12, 3).time_strides(1);
        assert_eq!(config.output_len(), 12);
    }

    #[test]
    fn test_zero_size_rejected() {
        let config = MstgcnConfig::default().k(0);
        match config.validate() {
            Err(Error::InvalidConfig(msg)) => assert!(msg.contains('k')),
            other => panic!("expected InvalidConfig, got {:?}", other),
        }

        assert!(MstgcnConfig::default().time_strides(0).validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = MstgcnConfig::default()
            .nb_block(3)
            .normalization(LaplacianNormalization::Symmetric)
            .seed(7);

        let file = NamedTempFile::new().unwrap();
        config.to_file(file.path()).unwrap();
        let loaded = MstgcnConfig::from_file(file.path()).unwrap();

        assert_eq!(config, loaded);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: MstgcnConfig = toml::from_str("nb_block = 4\nlen_input = 24\n").unwrap();
        assert_eq!(config.nb_block, 4);
        assert_eq!(config.len_input, 24);
        assert_eq!(config.k, 3);
        assert_eq!(config.normalization, LaplacianNormalization::Unnormalized);
    }
}
