//! # MSTGCN Forecast
//!
//! Multi-component spatial-temporal graph convolutional network for traffic
//! flow forecasting, built on `ndarray`.
//!
//! ## Modules
//!
//! - `graph` - Edge lists, static/time-varying connectivity and Laplacians
//! - `nn` - Chebyshev graph convolution, 2-D convolution, layer normalization
//! - `model` - MSTGCN blocks and the full model
//! - `config` - Model configuration
//! - `error` - Error types
//!
//! ## Example
//!
//! ```rust
//! use mstgcn_forecast::prelude::*;
//! use ndarray::Array4;
//!
//! let config = MstgcnConfig::default().seed(42);
//! let model = Mstgcn::new(config).unwrap();
//!
//! // (batch, nodes, features, time)
//! let x = Array4::<f64>::ones((2, 5, 2, 12));
//! let forecast = model.forward(&x, &EdgeIndex::ring(5).into()).unwrap();
//!
//! assert_eq!(forecast.dim(), (2, 5, 3));
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod nn;

pub use config::MstgcnConfig;
pub use error::{Error, Result};
pub use graph::{Connectivity, EdgeIndex, Laplacian, LaplacianNormalization};
pub use model::{Mstgcn, MstgcnBlock};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::MstgcnConfig;
    pub use crate::error::{Error, Result};
    pub use crate::graph::{Connectivity, EdgeIndex, Laplacian, LaplacianNormalization};
    pub use crate::model::{Mstgcn, MstgcnBlock};
    pub use crate::nn::Parameterized;
}
