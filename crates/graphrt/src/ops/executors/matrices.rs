//! Matrix products and transposition.

use anyhow::Result;

use super::utils::{attr_bool, normalize_axis, param_int_vec, param_tensor};
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
        "MatMul" | "BatchMatMul" | "BatchMatMulV2" => {
            let a = param_tensor(node, "a", tensors, context)?;
            let b = param_tensor(node, "b", tensors, context)?;
            let transpose_a = attr_bool(node, "transpose_a", false);
            let transpose_b = attr_bool(node, "transpose_b", false);
            Ok(OpOutcome::single(kernels.matmul(&a, &b, transpose_a, transpose_b)?))
        }
        "Transpose" => {
            let x = param_tensor(node, "x", tensors, context)?;
            let perm = param_int_vec(node, "perm", tensors, context)?;
            let perm = perm
                .iter()
                .map(|&axis| normalize_axis(axis, x.rank()))
                .collect::<Result<Vec<_>>>()?;
            Ok(OpOutcome::single(kernels.transpose(&x, &perm)?))
        }
        _ => Err(unsupported(node)),
    }
}
