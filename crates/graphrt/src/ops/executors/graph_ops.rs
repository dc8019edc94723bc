//! Structural ops: constants, placeholders, identities, and shape queries.

use anyhow::{bail, Result};

use super::utils::{get_tensor, param_tensor, param_tensors};
use crate::executor::{ExecutionContext, TensorsMap};
use crate::graph::Node;
use crate::kernels::Kernels;
use crate::ops::{unsupported, OpOutcome};
use crate::tensor::Tensor;

fn shape_tensor(tensor: &Tensor) -> Result<Tensor> {
    let dims: Vec<i32> = tensor.shape().dims().iter().map(|&d| d as i32).collect();
    Tensor::from_i32(vec![dims.len()], dims)
}

pub(crate) fn execute(
    node: &Node,
    tensors: &TensorsMap,
    context: &mut ExecutionContext,
    _kernels: &dyn Kernels,
) -> Result<OpOutcome> {
    match node.op.as_str() {
        // Weights are bound before execution starts; reaching a Const here
        // means no weight was installed for it.
        "Const" => match get_tensor(&node.name, tensors, context) {
            Some(tensor) => Ok(OpOutcome::single(tensor)),
            None => bail!("no weight bound for Const node '{}'", node.name),
        },
        "Placeholder" => match get_tensor(&node.name, tensors, context) {
            Some(tensor) => Ok(OpOutcome::single(tensor)),
            None => bail!("placeholder '{}' was not fed", node.name),
        },
        "PlaceholderWithDefault" => {
            let value = match get_tensor(&node.name, tensors, context) {
                Some(tensor) => tensor,
                None => param_tensor(node, "default", tensors, context)?,
            };
            Ok(OpOutcome::single(value.alias()?))
        }
        "Identity" | "Snapshot" | "StopGradient" => {
            let x = param_tensor(node, "x", tensors, context)?;
            Ok(OpOutcome::single(x.alias()?))
        }
        "Shape" => {
            let x = param_tensor(node, "x", tensors, context)?;
            Ok(OpOutcome::single(shape_tensor(&x)?))
        }
        "ShapeN" => {
            let xs = param_tensors(node, "x", tensors, context)?;
            let shapes =
                xs.iter().map(|x| shape_tensor(x).map(Some)).collect::<Result<Vec<_>>>()?;
            Ok(OpOutcome::Value(shapes))
        }
        "Size" => {
            let x = param_tensor(node, "x", tensors, context)?;
            Ok(OpOutcome::single(Tensor::scalar_i32(x.num_elements() as i32)))
        }
        "Rank" => {
            let x = param_tensor(node, "x", tensors, context)?;
            Ok(OpOutcome::single(Tensor::scalar_i32(x.rank() as i32)))
        }
        "NoOp" => Ok(OpOutcome::single(Tensor::scalar_f32(0.0))),
        _ => Err(unsupported(node)),
    }
}
