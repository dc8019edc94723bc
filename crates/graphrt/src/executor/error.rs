//! Typed executor failures.
//!
//! Errors flow through `anyhow` everywhere, but the failure modes callers
//! branch on are concrete enums so tests and embedders can downcast instead
//! of string matching.

use thiserror::Error;

use crate::tensor::{DType, Shape};

/// Failures raised while validating or running a graph.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(
        "cannot compute the outputs [{outputs}] from the provided inputs [{provided}]; \
         missing the following inputs: [{missing}]"
    )]
    MissingInput { outputs: String, provided: String, missing: String },

    #[error("the provided input keys [{0}] are not part of the graph")]
    UnknownInput(String),

    #[error("the shape of input '{name}' must be compatible with {expected:?}, but was {actual}")]
    ShapeMismatch { name: String, expected: Vec<i64>, actual: Shape },

    #[error("the dtype of input '{name}' must be {expected}, but was {actual}")]
    DTypeMismatch { name: String, expected: DType, actual: DType },

    #[error("the output '{0}' is not found in the graph")]
    OutputNotFound(String),

    #[error(
        "this execution contains the node '{node}', which has the dynamic op '{op}'; \
         use execute_async instead"
    )]
    DynamicGraphInSyncExecute { node: String, op: String },

    #[error("unsupported op '{op}' in category '{category}'")]
    UnsupportedOp { op: String, category: &'static str },

    #[error("the executor has been disposed and cannot be used")]
    Disposed,
}

/// Failures raised by TensorArray state machine violations.
#[derive(Debug, Error)]
pub enum TensorArrayError {
    #[error("TensorArray {0} has already been closed")]
    Closed(String),

    #[error("TensorArray {name}: tried to write to index {index}, but array size is {size} and the array is not resizable")]
    WriteOutOfBounds { name: String, index: i64, size: usize },

    #[error("TensorArray {name}: tried to read from index {index}, but array size is {size}")]
    ReadOutOfBounds { name: String, index: i64, size: usize },

    #[error("TensorArray {name}: could not read index {index}, because it has never been written")]
    NeverWritten { name: String, index: usize },

    #[error("TensorArray {name}: could not write to index {index}, because it has already been written")]
    AlreadyWritten { name: String, index: usize },

    #[error("TensorArray {name}: could not write to index {index}, because it has already been read")]
    WriteAfterRead { name: String, index: usize },

    #[error(
        "TensorArray {name}: could not read index {index} twice, because it was cleared after \
         a previous read (try setting clear_after_read to false)"
    )]
    ReadAfterClear { name: String, index: usize },

    #[error("TensorArray {name} holds dtype {expected}, but the tensor has dtype {actual}")]
    DTypeMismatch { name: String, expected: DType, actual: DType },

    #[error("TensorArray {name}: tensor shape {actual} does not match element shape {expected:?} at index {index}")]
    ShapeMismatch { name: String, index: usize, expected: Vec<i64>, actual: Shape },

    #[error("TensorArray {name}: expected {expected} indices to scatter, but tensor has leading dimension {actual}")]
    BadScatter { name: String, expected: usize, actual: usize },

    #[error("TensorArray {name}: split lengths sum to {lengths}, but tensor has leading dimension {actual}")]
    BadSplit { name: String, lengths: usize, actual: usize },

    #[error("TensorArray with id {0} was not found in the execution context")]
    NotFound(usize),
}

/// Failures raised by TensorList misuse.
#[derive(Debug, Error)]
pub enum TensorListError {
    #[error("invalid data types; op elements {expected}, but list elements {actual}")]
    DTypeMismatch { expected: DType, actual: DType },

    #[error("TensorList shape mismatch: expected {expected:?}, but tensor has shape {actual}")]
    ShapeMismatch { expected: Vec<i64>, actual: Shape },

    #[error("trying to access element {index} in a list with {size} elements")]
    IndexOutOfBounds { index: i64, size: usize },

    #[error("trying to set element {index} in a list with max {max} elements")]
    SetOutOfBounds { index: i64, max: i64 },

    #[error("element at index {0} has not been set")]
    ElementUnset(usize),

    #[error("trying to pop from an empty list")]
    EmptyList,

    #[error("trying to push element into a full list (max {0} elements)")]
    Full(i64),

    #[error("operation expected a list with {expected} elements but got a list with {actual} elements")]
    WrongSize { expected: i64, actual: usize },

    #[error("expected len(indices) == tensor.shape[0], but saw: {expected} vs. {actual}")]
    BadScatter { expected: usize, actual: usize },

    #[error("max index must be < max list size ({index} vs. {max})")]
    ScatterOutOfBounds { index: i64, max: i64 },

    #[error("expected sum of lengths to be {actual} to match the tensor's leading dimension, but it is {lengths}")]
    BadSplit { lengths: i64, actual: usize },

    #[error("tensor must be at least a vector, but saw shape {0}")]
    NotAVector(Shape),

    #[error("TensorList with id {0} was not found in the execution context")]
    NotFound(usize),
}
