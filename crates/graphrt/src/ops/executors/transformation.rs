//! Shape and dtype transformations.

use anyhow::{bail, ensure, Result};

use super::utils::{
    attr_dtype, attr_int_vec, normalize_axis, param_f64, param_i64, param_int_vec, param_tensor,
};
use crate::executor::{ExecutionContext, TensorsMap};
use crate::graph::Node;
use crate::kernels::Kernels;
use crate::ops::{unsupported, OpOutcome};

/// Resolves a requested shape against an element count, filling in at most
/// one -1 dimension.
fn resolve_shape(requested: &[i64], num_elements: usize) -> Result<Vec<usize>> {
    let known: usize = requested.iter().filter(|&&d| d >= 0).map(|&d| d as usize).product();
    let wildcards = requested.iter().filter(|&&d| d < 0).count();
    match wildcards {
        0 => Ok(requested.iter().map(|&d| d as usize).collect()),
        1 => {
            ensure!(
                known > 0 && num_elements % known == 0,
                "cannot infer a -1 dimension: {num_elements} elements do not fit {requested:?}"
            );
            Ok(requested
                .iter()
                .map(|&d| if d < 0 { num_elements / known } else { d as usize })
                .collect())
        }
        _ => bail!("at most one dimension may be -1, got {requested:?}"),
    }
}

pub(crate) fn execute(
    node: &Node,
    tensors: &TensorsMap,
    context: &mut ExecutionContext,
    kernels: &dyn Kernels,
) -> Result<OpOutcome> {
    match node.op.as_str() {
        "Cast" => {
            let x = param_tensor(node, "x", tensors, context)?;
            let dtype = attr_dtype(node, "dtype")
                .ok_or_else(|| anyhow::anyhow!("node '{}' is missing attr 'dtype'", node.name))?;
            Ok(OpOutcome::single(kernels.cast(&x, dtype)?))
        }
        "Reshape" => {
            let x = param_tensor(node, "x", tensors, context)?;
            let requested = param_int_vec(node, "shape", tensors, context)?;
            let dims = resolve_shape(&requested, x.num_elements())?;
            Ok(OpOutcome::single(x.reshaped(dims)?))
        }
        "ExpandDims" => {
            let x = param_tensor(node, "x", tensors, context)?;
            let axis = param_i64(node, "axis", tensors, context)?;
            let axis = normalize_axis(axis, x.rank() + 1)?;
            let mut dims = x.shape().dims().to_vec();
            dims.insert(axis, 1);
            Ok(OpOutcome::single(x.reshaped(dims)?))
        }
        "Squeeze" => {
            let x = param_tensor(node, "x", tensors, context)?;
            let axes = attr_int_vec(node, "axis").unwrap_or_default();
            let dims = x.shape().dims();
            let squeezed: Vec<usize> = if axes.is_empty() {
                dims.iter().copied().filter(|&d| d != 1).collect()
            } else {
                let axes = axes
                    .iter()
                    .map(|&axis| normalize_axis(axis, x.rank()))
                    .collect::<Result<Vec<_>>>()?;
                for &axis in &axes {
                    ensure!(
                        dims[axis] == 1,
                        "node '{}': cannot squeeze axis {axis} of size {}",
                        node.name,
                        dims[axis]
                    );
                }
                dims.iter()
                    .enumerate()
                    .filter(|(i, _)| !axes.contains(i))
                    .map(|(_, &d)| d)
                    .collect()
            };
            Ok(OpOutcome::single(x.reshaped(squeezed)?))
        }
        "Pad" | "PadV2" => {
            let x = param_tensor(node, "x", tensors, context)?;
            let flat = param_int_vec(node, "padding", tensors, context)?;
            ensure!(
                flat.len() == x.rank() * 2,
                "node '{}': padding must hold a before/after pair per dimension",
                node.name
            );
            let paddings: Vec<(usize, usize)> = flat
                .chunks(2)
                .map(|pair| {
                    ensure!(pair[0] >= 0 && pair[1] >= 0, "padding must be non-negative");
                    Ok((pair[0] as usize, pair[1] as usize))
                })
                .collect::<Result<Vec<_>>>()?;
            let constant = if node.op == "PadV2" {
                param_f64(node, "constant_value", tensors, context).unwrap_or(0.0) as f32
            } else {
                0.0
            };
            Ok(OpOutcome::single(kernels.pad(&x, &paddings, constant)?))
        }
        _ => Err(unsupported(node)),
    }
}
