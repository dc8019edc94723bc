//! Softmax family over the last axis.

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
    kernels: &dyn Kernels,
) -> Result<OpOutcome> {
    let log = match node.op.as_str() {
        "Softmax" => false,
        "LogSoftmax" => true,
        _ => return Err(unsupported(node)),
    };
    let x = param_tensor(node, "x", tensors, context)?;
    Ok(OpOutcome::single(kernels.softmax(&x, log)?))
}
