//! Broadcasting binary arithmetic and AddN.

use anyhow::Result;

use super::utils::{param_tensor, param_tensors};
use crate::executor::{ExecutionContext, TensorsMap};
use crate::graph::Node;
use crate::kernels::{BinaryOp, Kernels};
use crate::ops::{unsupported, OpOutcome};

pub(crate) fn execute(
    node: &Node,
    tensors: &TensorsMap,
    context: &mut ExecutionContext,
    kernels: &dyn Kernels,
) -> Result<OpOutcome> {
    if node.op == "AddN" {
        let operands = param_tensors(node, "tensors", tensors, context)?;
        anyhow::ensure!(!operands.is_empty(), "AddN node '{}' has no operands", node.name);
        let mut acc = operands[0].alias()?;
        for operand in &operands[1..] {
            let next = kernels.binary(BinaryOp::Add, &acc, operand)?;
            acc.dispose();
            acc = next;
        }
        return Ok(OpOutcome::single(acc));
    }

    let op = match node.op.as_str() {
        "Add" | "AddV2" => BinaryOp::Add,
        "Sub" => BinaryOp::Sub,
        "Mul" => BinaryOp::Mul,
        "Div" | "RealDiv" => BinaryOp::Div,
        "FloorDiv" => BinaryOp::FloorDiv,
        "Mod" => BinaryOp::Mod,
        "Pow" => BinaryOp::Pow,
        "Maximum" => BinaryOp::Maximum,
        "Minimum" => BinaryOp::Minimum,
        "SquaredDifference" => BinaryOp::SquaredDifference,
        _ => return Err(unsupported(node)),
    };
    let a = param_tensor(node, "a", tensors, context)?;
    let b = param_tensor(node, "b", tensors, context)?;
    Ok(OpOutcome::single(kernels.binary(op, &a, &b)?))
}
