//! A dataflow graph execution engine for tensor programs.
//!
//! `graphrt` runs serialized-model style graphs: nodes carry an op name,
//! named parameter mappings onto their input edges, and literal attributes.
//! The engine resolves how to run them; backends decide how tensor math is
//! computed.
//!
//! # Architecture
//!
//! - [`tensor`]: host tensors with explicit disposal and live accounting.
//! - [`graph`]: the static graph model and the op catalog.
//! - [`kernels`]: the backend trait every numeric op dispatches through.
//! - [`ops`]: per-category op executors mapping nodes onto kernel calls.
//! - [`executor`]: validation, compilation caching, synchronous execution,
//!   and wave-scheduled execution for graphs with control flow, loop frames,
//!   and TensorArrays.
//!
//! The reference CPU backend lives in the `graphrt-backend-ref-cpu` crate.

pub mod executor;
pub mod graph;
pub mod kernels;
pub mod ops;
pub mod tensor;

pub use executor::{ExecutionContext, ExecutorError, GraphExecutor, TensorArray, TensorList};
pub use graph::{Graph, Node, OpCategory};
pub use tensor::{DType, Shape, Tensor};
