//! Ops that build tensors from scratch.

use anyhow::{ensure, Result};

use super::utils::{attr_dtype, attr_f64, param_f64, param_int_vec, param_tensor, to_usize_vec};
use crate::executor::{ExecutionContext, TensorsMap};
use crate::graph::Node;
use crate::kernels::Kernels;
use crate::ops::{unsupported, OpOutcome};
use crate::tensor::{DType, Shape};

pub(crate) fn execute(
    node: &Node,
    tensors: &TensorsMap,
    context: &mut ExecutionContext,
    kernels: &dyn Kernels,
) -> Result<OpOutcome> {
    match node.op.as_str() {
        "Fill" => {
            let dims = param_int_vec(node, "shape", tensors, context)?;
            let shape = Shape::new(to_usize_vec(&dims, "shape")?);
            let value = param_f64(node, "value", tensors, context)? as f32;
            let dtype = attr_dtype(node, "dtype").unwrap_or(DType::Float32);
            Ok(OpOutcome::single(kernels.fill(&shape, value, dtype)?))
        }
        "Range" => {
            let start = param_f64(node, "start", tensors, context)? as f32;
            let stop = param_f64(node, "stop", tensors, context)? as f32;
            let step = param_f64(node, "step", tensors, context)? as f32;
            let dtype = attr_dtype(node, "dtype").unwrap_or(DType::Float32);
            Ok(OpOutcome::single(kernels.range(start, stop, step, dtype)?))
        }
        "ZerosLike" | "OnesLike" => {
            let x = param_tensor(node, "x", tensors, context)?;
            let value = if node.op == "OnesLike" { 1.0 } else { 0.0 };
            Ok(OpOutcome::single(kernels.fill(x.shape(), value, x.dtype())?))
        }
        "RandomUniform" => {
            let dims = param_int_vec(node, "shape", tensors, context)?;
            let shape = Shape::new(to_usize_vec(&dims, "shape")?);
            let min = attr_f64(node, "minval", 0.0) as f32;
            let max = attr_f64(node, "maxval", 1.0) as f32;
            let dtype = attr_dtype(node, "dtype").unwrap_or(DType::Float32);
            ensure!(
                dtype == DType::Float32,
                "node '{}': RandomUniform only produces float32",
                node.name
            );
            Ok(OpOutcome::single(kernels.random_uniform(&shape, min, max)?))
        }
        "RandomStandardNormal" => {
            let dims = param_int_vec(node, "shape", tensors, context)?;
            let shape = Shape::new(to_usize_vec(&dims, "shape")?);
            Ok(OpOutcome::single(kernels.random_standard_normal(&shape)?))
        }
        _ => Err(unsupported(node)),
    }
}
