//! Graph connectivity and spectral utilities
//!
//! - `connectivity` - edge lists and static/time-varying connectivity
//! - `laplacian` - Laplacian construction and largest eigenvalue estimation

mod connectivity;
mod laplacian;

pub use connectivity::{Connectivity, EdgeIndex};
pub use laplacian::{Laplacian, LaplacianNormalization};
