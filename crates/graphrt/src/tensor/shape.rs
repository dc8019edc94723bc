//! Concrete tensor shapes and compatibility checks against declared shapes.
//!
//! Graph nodes may declare shapes with `-1` wildcard dimensions; live tensors
//! always carry fully concrete shapes. The two meet in
//! [`Shape::is_compatible_with`], which placeholder validation relies on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A concrete, fully known tensor shape. Rank zero denotes a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// The scalar shape `[]`.
    pub fn scalar() -> Self {
        Shape(Vec::new())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total element count. A scalar has one element.
    pub fn num_elements(&self) -> usize {
        self.0.iter().product()
    }

    /// Row-major strides, in elements.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.0.len()];
        for i in (0..self.0.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.0[i + 1];
        }
        strides
    }

    /// Checks this concrete shape against a declared shape where `-1` marks an
    /// unknown dimension. Ranks must match exactly.
    pub fn is_compatible_with(&self, declared: &[i64]) -> bool {
        if declared.len() != self.0.len() {
            return false;
        }
        self.0
            .iter()
            .zip(declared)
            .all(|(&dim, &want)| want < 0 || dim as i64 == want)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape(dims.to_vec())
    }
}

/// Computes the broadcast shape of two operand shapes, numpy style. Returns
/// `None` when a pair of dimensions is incompatible.
pub fn broadcast_shape(a: &Shape, b: &Shape) -> Option<Shape> {
    let rank = a.rank().max(b.rank());
    let mut dims = vec![0usize; rank];
    for i in 0..rank {
        let da = if i < rank - a.rank() { 1 } else { a.dims()[i - (rank - a.rank())] };
        let db = if i < rank - b.rank() { 1 } else { b.dims()[i - (rank - b.rank())] };
        if da == db || da == 1 || db == 1 {
            dims[i] = da.max(db);
        } else {
            return None;
        }
    }
    Some(Shape(dims))
}
