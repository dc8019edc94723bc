//! Arg-extrema and top-k.

use anyhow::{ensure, Result};

use super::utils::{attr_bool, normalize_axis, param_i64, param_tensor};
use crate::executor::{ExecutionContext, TensorsMap};
use crate::graph::Node;
use crate::kernels::Kernels;
use crate::ops::{unsupported, OpOutcome};

pub(crate) fn execute(
    node: &Node,
    tensors: &TensorsMap,
    context: &mut ExecutionContext,
    kernels: &dyn Kernels,
) -> Result<OpOutcome> {
    match node.op.as_str() {
        "ArgMax" | "ArgMin" => {
            let x = param_tensor(node, "x", tensors, context)?;
            let axis = param_i64(node, "axis", tensors, context).unwrap_or(0);
            let axis = normalize_axis(axis, x.rank())?;
            let largest = node.op == "ArgMax";
            Ok(OpOutcome::single(kernels.arg_extreme(&x, axis, largest)?))
        }
        "TopKV2" => {
            let x = param_tensor(node, "x", tensors, context)?;
            let k = param_i64(node, "k", tensors, context)?;
            ensure!(k >= 0, "node '{}': k must be non-negative, got {k}", node.name);
            let sorted = attr_bool(node, "sorted", true);
            let (values, indices) = kernels.top_k(&x, k as usize, sorted)?;
            Ok(OpOutcome::Value(vec![Some(values), Some(indices)]))
        }
        _ => Err(unsupported(node)),
    }
}
