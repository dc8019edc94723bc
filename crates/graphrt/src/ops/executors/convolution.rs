//! 2-D convolution and pooling over NHWC inputs.

use anyhow::{bail, ensure, Result};

use super::utils::{attr_int_vec, attr_str, param_tensor, to_usize_vec};
use crate::executor::{ExecutionContext, TensorsMap};
use crate::graph::Node;
use crate::kernels::{Kernels, PoolKind};
use crate::ops::{unsupported, OpOutcome};

fn spatial_pair(node: &Node, attr: &str) -> Result<[usize; 2]> {
    let values = attr_int_vec(node, attr)
        .ok_or_else(|| anyhow::anyhow!("node '{}' is missing attr '{attr}'", node.name))?;
    let values = to_usize_vec(&values, attr)?;
    // Declared NHWC style as [1, h, w, 1], or directly as [h, w].
    match values.as_slice() {
        [1, h, w, 1] => Ok([*h, *w]),
        [h, w] => Ok([*h, *w]),
        _ => bail!("attr '{attr}' of node '{}' must name two spatial values", node.name),
    }
}

fn same_padding(node: &Node) -> Result<bool> {
    match attr_str(node, "pad") {
        Some("same") | Some("SAME") => Ok(true),
        Some("valid") | Some("VALID") | None => Ok(false),
        Some(other) => bail!("node '{}' has unsupported padding '{other}'", node.name),
    }
}

pub(crate) fn execute(
    node: &Node,
    tensors: &TensorsMap,
    context: &mut ExecutionContext,
    kernels: &dyn Kernels,
) -> Result<OpOutcome> {
    match node.op.as_str() {
        "Conv2D" => {
            let x = param_tensor(node, "x", tensors, context)?;
            let filter = param_tensor(node, "filter", tensors, context)?;
            let strides = spatial_pair(node, "strides")?;
            if let Some(dilations) = attr_int_vec(node, "dilations") {
                ensure!(
                    dilations.iter().all(|&d| d == 1),
                    "node '{}': dilated convolution is not supported",
                    node.name
                );
            }
            let same = same_padding(node)?;
            Ok(OpOutcome::single(kernels.conv2d(&x, &filter, strides, same)?))
        }
        "MaxPool" | "AvgPool" => {
            let x = param_tensor(node, "x", tensors, context)?;
            let window = spatial_pair(node, "kernel_size")?;
            let strides = spatial_pair(node, "strides")?;
            let same = same_padding(node)?;
            let kind = if node.op == "MaxPool" { PoolKind::Max } else { PoolKind::Avg };
            Ok(OpOutcome::single(kernels.pool2d(&x, kind, window, strides, same)?))
        }
        _ => Err(unsupported(node)),
    }
}
