//! Backend seam for tensor math.
//!
//! The executor never computes element values itself. Every numeric operation
//! is routed through the [`Kernels`] trait so backends can swap in optimized
//! implementations while the graph semantics stay fixed. The reference CPU
//! backend lives in a separate crate and is pulled in by the executor tests.
//!
//! Families of ops with a shared signature (elementwise unary, broadcasting
//! binary, comparisons, reductions) are collapsed into one method taking a
//! selector enum, keeping the trait small and object safe.

use anyhow::Result;

use crate::tensor::{DType, Shape, Tensor};

/// Elementwise unary ops over float tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Abs,
    Neg,
    Exp,
    Log,
    Sqrt,
    Rsqrt,
    Square,
    Reciprocal,
    Relu,
    Relu6,
    Elu,
    Selu,
    Sigmoid,
    Tanh,
    Floor,
    Ceil,
    Round,
    Sign,
}

/// Elementwise binary ops with numpy-style broadcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Maximum,
    Minimum,
    SquaredDifference,
}

/// Broadcasting comparisons, producing bool tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

/// Broadcasting boolean connectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Axis reductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Mean,
    Prod,
    Max,
    Min,
    All,
    Any,
}

/// Pooling flavors for [`Kernels::pool2d`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Max,
    Avg,
}

/// Interpolation methods for [`Kernels::resize2d`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMethod {
    Bilinear,
    NearestNeighbor,
}

/// The full set of primitives a backend must provide.
///
/// Conventions: image ops take NHWC layout; `axes` and `perm` arguments are
/// already normalized to non-negative in-range values by the caller; every
/// returned tensor is freshly allocated and owned by the caller.
pub trait Kernels: Send + Sync {
    fn unary(&self, op: UnaryOp, x: &Tensor) -> Result<Tensor>;
    fn binary(&self, op: BinaryOp, a: &Tensor, b: &Tensor) -> Result<Tensor>;
    fn compare(&self, op: CompareOp, a: &Tensor, b: &Tensor) -> Result<Tensor>;
    fn logical(&self, op: LogicalOp, a: &Tensor, b: &Tensor) -> Result<Tensor>;
    fn logical_not(&self, x: &Tensor) -> Result<Tensor>;
    /// Broadcasting ternary select: where `cond` is true take `a`, else `b`.
    fn select(&self, cond: &Tensor, a: &Tensor, b: &Tensor) -> Result<Tensor>;
    fn clip_by_value(&self, x: &Tensor, min: f32, max: f32) -> Result<Tensor>;

    /// 2-D matrix product with optional transposes. Rank-3 inputs are treated
    /// as batched with broadcast over the leading dimension.
    fn matmul(&self, a: &Tensor, b: &Tensor, transpose_a: bool, transpose_b: bool)
        -> Result<Tensor>;
    fn transpose(&self, x: &Tensor, perm: &[usize]) -> Result<Tensor>;

    fn reduce(&self, op: ReduceOp, x: &Tensor, axes: &[usize], keep_dims: bool) -> Result<Tensor>;
    /// Index of the extreme element along `axis`, as int32. `largest` selects
    /// arg-max versus arg-min.
    fn arg_extreme(&self, x: &Tensor, axis: usize, largest: bool) -> Result<Tensor>;
    /// Values and int32 indices of the `k` largest elements along the last
    /// axis, in descending order when `sorted` is set.
    fn top_k(&self, x: &Tensor, k: usize, sorted: bool) -> Result<(Tensor, Tensor)>;
    /// Softmax over the last axis; `log` selects log-softmax.
    fn softmax(&self, x: &Tensor, log: bool) -> Result<Tensor>;

    fn concat(&self, tensors: &[Tensor], axis: usize) -> Result<Tensor>;
    fn slice(&self, x: &Tensor, begin: &[usize], size: &[usize]) -> Result<Tensor>;
    fn split(&self, x: &Tensor, sizes: &[usize], axis: usize) -> Result<Vec<Tensor>>;
    fn gather(&self, x: &Tensor, indices: &Tensor, axis: usize) -> Result<Tensor>;
    fn tile(&self, x: &Tensor, reps: &[usize]) -> Result<Tensor>;
    fn reverse(&self, x: &Tensor, axes: &[usize]) -> Result<Tensor>;
    fn pad(&self, x: &Tensor, paddings: &[(usize, usize)], constant: f32) -> Result<Tensor>;

    fn cast(&self, x: &Tensor, dtype: DType) -> Result<Tensor>;
    fn fill(&self, shape: &Shape, value: f32, dtype: DType) -> Result<Tensor>;
    fn range(&self, start: f32, stop: f32, step: f32, dtype: DType) -> Result<Tensor>;
    fn random_uniform(&self, shape: &Shape, min: f32, max: f32) -> Result<Tensor>;
    fn random_standard_normal(&self, shape: &Shape) -> Result<Tensor>;

    /// NHWC convolution with an HWIO filter. `same_pad` selects SAME versus
    /// VALID padding.
    fn conv2d(
        &self,
        x: &Tensor,
        filter: &Tensor,
        strides: [usize; 2],
        same_pad: bool,
    ) -> Result<Tensor>;
    fn pool2d(
        &self,
        x: &Tensor,
        kind: PoolKind,
        window: [usize; 2],
        strides: [usize; 2],
        same_pad: bool,
    ) -> Result<Tensor>;
    fn resize2d(
        &self,
        x: &Tensor,
        method: ResizeMethod,
        size: [usize; 2],
        align_corners: bool,
    ) -> Result<Tensor>;

    /// Coordinates of true elements of `cond`, shape `[count, rank]`, int32,
    /// in row-major order.
    fn where_true(&self, cond: &Tensor) -> Result<Tensor>;
    /// Elements of `x` absent from `y`, plus their indices into `x`.
    fn list_diff(&self, x: &Tensor, y: &Tensor) -> Result<(Tensor, Tensor)>;
}
