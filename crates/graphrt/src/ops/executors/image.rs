//! Image resizing over NHWC batches.

use anyhow::{bail, Result};

use super::utils::{attr_bool, param_int_vec, param_tensor};
use crate::executor::{ExecutionContext, TensorsMap};
use crate::graph::Node;
use crate::kernels::{Kernels, ResizeMethod};
use crate::ops::{unsupported, OpOutcome};

pub(crate) fn execute(
    node: &Node,
    tensors: &TensorsMap,
    context: &mut ExecutionContext,
    kernels: &dyn Kernels,
) -> Result<OpOutcome> {
    let method = match node.op.as_str() {
        "ResizeBilinear" => ResizeMethod::Bilinear,
        "ResizeNearestNeighbor" => ResizeMethod::NearestNeighbor,
        _ => return Err(unsupported(node)),
    };
    let images = param_tensor(node, "images", tensors, context)?;
    let size = param_int_vec(node, "size", tensors, context)?;
    let [height, width] = match size.as_slice() {
        [h, w] if *h >= 0 && *w >= 0 => [*h as usize, *w as usize],
        _ => bail!("node '{}': size must be two non-negative values", node.name),
    };
    let align_corners = attr_bool(node, "align_corners", false);
    Ok(OpOutcome::single(kernels.resize2d(&images, method, [height, width], align_corners)?))
}
