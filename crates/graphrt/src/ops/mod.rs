//! Per-category op executors.
//!
//! Each category module maps a [`Node`] onto kernel calls, resolving its
//! named params from the bound tensors map and its attrs. Most ops produce
//! their outputs immediately; ops whose behavior depends on tensor values
//! (Switch routing, the TensorArray family, Where, ListDiff) return a
//! deferred closure the wave scheduler resolves between waves.

pub(crate) mod executors;

pub(crate) use executors::utils;

use anyhow::Result;

use crate::executor::{ExecutionContext, ExecutorError, TensorsMap};
use crate::graph::{Node, OpCategory};
use crate::kernels::Kernels;
use crate::tensor::Tensor;

/// Deferred op body, resolved once the current wave has drained.
pub(crate) type DeferredOp =
    Box<dyn FnOnce(&dyn Kernels, &mut ExecutionContext) -> Result<Vec<Option<Tensor>>>>;

/// What executing one node produced: either its output slots, or a deferred
/// body for value-dependent ops.
pub(crate) enum OpOutcome {
    Value(Vec<Option<Tensor>>),
    Deferred(DeferredOp),
}

impl OpOutcome {
    pub(crate) fn single(tensor: Tensor) -> Self {
        OpOutcome::Value(vec![Some(tensor)])
    }
}

/// Routes a node to its category executor.
pub(crate) fn execute_op(
    node: &Node,
    tensors: &TensorsMap,
    context: &mut ExecutionContext,
    kernels: &dyn Kernels,
) -> Result<OpOutcome> {
    match node.category {
        OpCategory::Arithmetic => executors::arithmetic::execute(node, tensors, context, kernels),
        OpCategory::BasicMath => executors::basic_math::execute(node, tensors, context, kernels),
        OpCategory::Control => executors::control::execute(node, tensors, context, kernels),
        OpCategory::Convolution => {
            executors::convolution::execute(node, tensors, context, kernels)
        }
        OpCategory::Creation => executors::creation::execute(node, tensors, context, kernels),
        OpCategory::Dynamic => executors::dynamic::execute(node, tensors, context, kernels),
        OpCategory::Evaluation => executors::evaluation::execute(node, tensors, context, kernels),
        OpCategory::Graph => executors::graph_ops::execute(node, tensors, context, kernels),
        OpCategory::Image => executors::image::execute(node, tensors, context, kernels),
        OpCategory::Logical => executors::logical::execute(node, tensors, context, kernels),
        OpCategory::Matrices => executors::matrices::execute(node, tensors, context, kernels),
        OpCategory::Normalization => {
            executors::normalization::execute(node, tensors, context, kernels)
        }
        OpCategory::Reduction => executors::reduction::execute(node, tensors, context, kernels),
        OpCategory::SliceJoin => executors::slice_join::execute(node, tensors, context, kernels),
        OpCategory::Spectral => Err(ExecutorError::UnsupportedOp {
            op: node.op.clone(),
            category: OpCategory::Spectral.as_str(),
        }
        .into()),
        OpCategory::Transformation => {
            executors::transformation::execute(node, tensors, context, kernels)
        }
    }
}

pub(crate) fn unsupported(node: &Node) -> anyhow::Error {
    ExecutorError::UnsupportedOp { op: node.op.clone(), category: node.category.as_str() }.into()
}
