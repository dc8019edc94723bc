//! Host tensor types shared by the graph model, the executor, and kernels.

mod dtype;
mod host;
mod shape;

pub use dtype::DType;
pub use host::{live_tensor_count, Tensor, TensorData};
pub use shape::{broadcast_shape, Shape};
