//! Elementwise unary math and ClipByValue.

use anyhow::Result;

use super::utils::{param_f64, param_tensor};
use crate::executor::{ExecutionContext, TensorsMap};
use crate::graph::Node;
use crate::kernels::{Kernels, UnaryOp};
use crate::ops::{unsupported, OpOutcome};

pub(crate) fn execute(
    node: &Node,
    tensors: &TensorsMap,
    context: &mut ExecutionContext,
    kernels: &dyn Kernels,
) -> Result<OpOutcome> {
    if node.op == "ClipByValue" {
        let x = param_tensor(node, "x", tensors, context)?;
        let min = param_f64(node, "clip_value_min", tensors, context)? as f32;
        let max = param_f64(node, "clip_value_max", tensors, context)? as f32;
        return Ok(OpOutcome::single(kernels.clip_by_value(&x, min, max)?));
    }

    let op = match node.op.as_str() {
        "Abs" => UnaryOp::Abs,
        "Neg" => UnaryOp::Neg,
        "Exp" => UnaryOp::Exp,
        "Log" => UnaryOp::Log,
        "Sqrt" => UnaryOp::Sqrt,
        "Rsqrt" => UnaryOp::Rsqrt,
        "Square" => UnaryOp::Square,
        "Reciprocal" => UnaryOp::Reciprocal,
        "Relu" => UnaryOp::Relu,
        "Relu6" => UnaryOp::Relu6,
        "Elu" => UnaryOp::Elu,
        "Selu" => UnaryOp::Selu,
        "Sigmoid" => UnaryOp::Sigmoid,
        "Tanh" => UnaryOp::Tanh,
        "Floor" => UnaryOp::Floor,
        "Ceil" => UnaryOp::Ceil,
        "Round" => UnaryOp::Round,
        "Sign" => UnaryOp::Sign,
        _ => return Err(unsupported(node)),
    };
    let x = param_tensor(node, "x", tensors, context)?;
    Ok(OpOutcome::single(kernels.unary(op, &x)?))
}
