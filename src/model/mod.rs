//! MSTGCN model
//!
//! - `MstgcnBlock` - spatial Chebyshev filter, temporal convolution,
//!   residual projection and layer normalization
//! - `Mstgcn` - block stack with the final fusion convolution

mod block;
mod mstgcn;

pub use block::MstgcnBlock;
pub use mstgcn::Mstgcn;
