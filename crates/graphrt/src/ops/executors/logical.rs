//! Comparisons, boolean connectives, and select.

use anyhow::Result;

use super::utils::param_tensor;
use crate::executor::{ExecutionContext, TensorsMap};
use crate::graph::Node;
use crate::kernels::{CompareOp, Kernels, LogicalOp};
use crate::ops::{unsupported, OpOutcome};

pub(crate) fn execute(
    node: &Node,
    tensors: &TensorsMap,
    context: &mut ExecutionContext,
    kernels: &dyn Kernels,
) -> Result<OpOutcome> {
    match node.op.as_str() {
        "LogicalNot" => {
            let x = param_tensor(node, "x", tensors, context)?;
            Ok(OpOutcome::single(kernels.logical_not(&x)?))
        }
        "LogicalAnd" | "LogicalOr" => {
            let op = if node.op == "LogicalAnd" { LogicalOp::And } else { LogicalOp::Or };
            let a = param_tensor(node, "a", tensors, context)?;
            let b = param_tensor(node, "b", tensors, context)?;
            Ok(OpOutcome::single(kernels.logical(op, &a, &b)?))
        }
        "Select" | "SelectV2" => {
            let condition = param_tensor(node, "condition", tensors, context)?;
            let a = param_tensor(node, "a", tensors, context)?;
            let b = param_tensor(node, "b", tensors, context)?;
            Ok(OpOutcome::single(kernels.select(&condition, &a, &b)?))
        }
        "Equal" | "NotEqual" | "Greater" | "GreaterEqual" | "Less" | "LessEqual" => {
            let op = match node.op.as_str() {
                "Equal" => CompareOp::Equal,
                "NotEqual" => CompareOp::NotEqual,
                "Greater" => CompareOp::Greater,
                "GreaterEqual" => CompareOp::GreaterEqual,
                "Less" => CompareOp::Less,
                _ => CompareOp::LessEqual,
            };
            let a = param_tensor(node, "a", tensors, context)?;
            let b = param_tensor(node, "b", tensors, context)?;
            Ok(OpOutcome::single(kernels.compare(op, &a, &b)?))
        }
        _ => Err(unsupported(node)),
    }
}
