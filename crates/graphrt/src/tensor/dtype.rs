//! Enumerates the scalar element types understood by the executor and kernels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical dtype identifier shared between graph declarations and live tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit floating point following IEEE-754 semantics.
    Float32,
    /// 32-bit signed integer, used for indices, sizes, and TensorArray ids.
    Int32,
    /// Boolean, produced by comparison and logical ops and consumed by `Switch`.
    Bool,
}

impl DType {
    /// Returns the number of bytes required per scalar element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::Float32 | DType::Int32 => 4,
            DType::Bool => 1,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Float32 => write!(f, "float32"),
            DType::Int32 => write!(f, "int32"),
            DType::Bool => write!(f, "bool"),
        }
    }
}
