//! Ops whose output shapes depend on tensor values. Always deferred, which
//! routes them through the wave scheduler.

use anyhow::Result;

use super::utils::param_tensor;
use crate::executor::{ExecutionContext, TensorsMap};
use crate::graph::Node;
use crate::kernels::Kernels;
use crate::ops::{unsupported, OpOutcome};

pub(crate) fn execute(
    node: &Node,
    tensors: &TensorsMap,
    context: &mut ExecutionContext,
    _kernels: &dyn Kernels,
) -> Result<OpOutcome> {
    match node.op.as_str() {
        "Where" => {
            let condition = param_tensor(node, "condition", tensors, context)?;
            Ok(OpOutcome::Deferred(Box::new(move |kernels, _| {
                Ok(vec![Some(kernels.where_true(&condition)?)])
            })))
        }
        "ListDiff" => {
            let x = param_tensor(node, "x", tensors, context)?;
            let y = param_tensor(node, "y", tensors, context)?;
            Ok(OpOutcome::Deferred(Box::new(move |kernels, _| {
                let (out, indices) = kernels.list_diff(&x, &y)?;
                Ok(vec![Some(out), Some(indices)])
            })))
        }
        _ => Err(unsupported(node)),
    }
}
