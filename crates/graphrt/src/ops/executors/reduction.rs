//! Axis reductions.

use anyhow::Result;

use super::utils::{attr_bool, normalize_axis, param_int_vec, param_tensor};
use crate::executor::{ExecutionContext, TensorsMap};
use crate::graph::Node;
use crate::kernels::{Kernels, ReduceOp};
use crate::ops::{unsupported, OpOutcome};

pub(crate) fn execute(
    node: &Node,
    tensors: &TensorsMap,
    context: &mut ExecutionContext,
    kernels: &dyn Kernels,
) -> Result<OpOutcome> {
    let op = match node.op.as_str() {
        "Sum" => ReduceOp::Sum,
        "Mean" => ReduceOp::Mean,
        "Prod" => ReduceOp::Prod,
        "Max" => ReduceOp::Max,
        "Min" => ReduceOp::Min,
        "All" => ReduceOp::All,
        "Any" => ReduceOp::Any,
        _ => return Err(unsupported(node)),
    };
    let x = param_tensor(node, "x", tensors, context)?;
    // Missing axes means reduce everything.
    let axes = match param_int_vec(node, "axis", tensors, context) {
        Ok(axes) => axes
            .iter()
            .map(|&axis| normalize_axis(axis, x.rank()))
            .collect::<Result<Vec<_>>>()?,
        Err(_) => (0..x.rank()).collect(),
    };
    let keep_dims = attr_bool(node, "keep_dims", false);
    Ok(OpOutcome::single(kernels.reduce(op, &x, &axes, keep_dims)?))
}
