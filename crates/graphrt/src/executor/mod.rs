//! Graph execution: validation, scheduling, and per-run dynamic state.

mod context;
mod error;
mod graph_executor;
mod model_analysis;
mod tensor_array;
mod tensor_list;

pub use context::{ContextPath, ExecutionContext, Frame};
pub use error::{ExecutorError, TensorArrayError, TensorListError};
pub use graph_executor::GraphExecutor;
pub(crate) use graph_executor::TensorsMap;
pub use model_analysis::{execution_subgraph, topological_order, ExecutionSubgraph};
pub use tensor_array::TensorArray;
pub use tensor_list::TensorList;
