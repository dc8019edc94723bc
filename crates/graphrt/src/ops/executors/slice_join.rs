//! Slicing, joining, and rearranging along axes.

use anyhow::{bail, ensure, Result};

use super::utils::{
    attr_i64, normalize_axis, param_i64, param_int_vec, param_tensor, param_tensors, to_usize_vec,
};
use crate::executor::{ExecutionContext, TensorsMap};
use crate::graph::Node;
use crate::kernels::Kernels;
use crate::ops::{unsupported, OpOutcome};
use crate::tensor::Tensor;

fn pack(tensors: &[Tensor], axis: usize, kernels: &dyn Kernels) -> Result<Tensor> {
    ensure!(!tensors.is_empty(), "cannot pack zero tensors");
    let expanded = tensors
        .iter()
        .map(|t| {
            let mut dims = t.shape().dims().to_vec();
            ensure!(axis <= dims.len(), "pack axis {axis} out of range for rank {}", dims.len());
            dims.insert(axis, 1);
            t.reshaped(dims)
        })
        .collect::<Result<Vec<_>>>()?;
    let packed = kernels.concat(&expanded, axis)?;
    for t in &expanded {
        t.dispose();
    }
    Ok(packed)
}

fn unpack(tensor: &Tensor, axis: usize, kernels: &dyn Kernels) -> Result<Vec<Tensor>> {
    let dims = tensor.shape().dims();
    ensure!(axis < dims.len(), "unpack axis {axis} out of range for rank {}", dims.len());
    let pieces = kernels.split(tensor, &vec![1; dims[axis]], axis)?;
    pieces
        .iter()
        .map(|piece| {
            let mut out_dims = piece.shape().dims().to_vec();
            out_dims.remove(axis);
            let element = piece.reshaped(out_dims)?;
            piece.dispose();
            Ok(element)
        })
        .collect()
}

pub(crate) fn execute(
    node: &Node,
    tensors: &TensorsMap,
    context: &mut ExecutionContext,
    kernels: &dyn Kernels,
) -> Result<OpOutcome> {
    match node.op.as_str() {
        "Concat" | "ConcatV2" => {
            let operands = param_tensors(node, "tensors", tensors, context)?;
            ensure!(!operands.is_empty(), "node '{}' concatenates zero tensors", node.name);
            let axis = param_i64(node, "axis", tensors, context)?;
            let axis = normalize_axis(axis, operands[0].rank())?;
            Ok(OpOutcome::single(kernels.concat(&operands, axis)?))
        }
        "Gather" | "GatherV2" => {
            let x = param_tensor(node, "x", tensors, context)?;
            let indices = param_tensor(node, "indices", tensors, context)?;
            let axis = param_i64(node, "axis", tensors, context).unwrap_or(0);
            let axis = normalize_axis(axis, x.rank())?;
            Ok(OpOutcome::single(kernels.gather(&x, &indices, axis)?))
        }
        "Slice" => {
            let x = param_tensor(node, "x", tensors, context)?;
            let begin = param_int_vec(node, "begin", tensors, context)?;
            let size = param_int_vec(node, "size", tensors, context)?;
            let dims = x.shape().dims();
            ensure!(
                begin.len() == dims.len() && size.len() == dims.len(),
                "node '{}': begin and size must have one entry per dimension",
                node.name
            );
            let begin = to_usize_vec(&begin, "begin")?;
            // A size of -1 takes everything from begin to the end.
            let size: Vec<usize> = size
                .iter()
                .zip(dims.iter().zip(&begin))
                .map(|(&s, (&dim, &b))| if s < 0 { dim - b } else { s as usize })
                .collect();
            Ok(OpOutcome::single(kernels.slice(&x, &begin, &size)?))
        }
        "Split" => {
            let x = param_tensor(node, "x", tensors, context)?;
            let axis = param_i64(node, "axis", tensors, context)?;
            let axis = normalize_axis(axis, x.rank())?;
            let count = attr_i64(node, "num_split", 1);
            ensure!(count > 0, "node '{}': num_split must be positive", node.name);
            let dim = x.shape().dims()[axis];
            ensure!(
                dim % count as usize == 0,
                "node '{}': dimension {dim} is not divisible into {count} parts",
                node.name
            );
            let sizes = vec![dim / count as usize; count as usize];
            let pieces = kernels.split(&x, &sizes, axis)?;
            Ok(OpOutcome::Value(pieces.into_iter().map(Some).collect()))
        }
        "SplitV" => {
            let x = param_tensor(node, "x", tensors, context)?;
            let sizes = param_int_vec(node, "size_splits", tensors, context)?;
            let axis = param_i64(node, "axis", tensors, context)?;
            let axis = normalize_axis(axis, x.rank())?;
            let dim = x.shape().dims()[axis] as i64;
            let known: i64 = sizes.iter().filter(|&&s| s >= 0).sum();
            let wildcards = sizes.iter().filter(|&&s| s < 0).count();
            let sizes: Vec<usize> = match wildcards {
                0 => to_usize_vec(&sizes, "size_splits")?,
                1 => sizes
                    .iter()
                    .map(|&s| if s < 0 { (dim - known) as usize } else { s as usize })
                    .collect(),
                _ => bail!("node '{}': at most one split size may be -1", node.name),
            };
            let pieces = kernels.split(&x, &sizes, axis)?;
            Ok(OpOutcome::Value(pieces.into_iter().map(Some).collect()))
        }
        "Pack" => {
            let operands = param_tensors(node, "tensors", tensors, context)?;
            let axis = attr_i64(node, "axis", 0);
            let rank = operands.first().map(|t| t.rank()).unwrap_or(0);
            let axis = normalize_axis(axis, rank + 1)?;
            Ok(OpOutcome::single(pack(&operands, axis, kernels)?))
        }
        "Unpack" => {
            let x = param_tensor(node, "tensor", tensors, context)?;
            let axis = normalize_axis(attr_i64(node, "axis", 0), x.rank())?;
            let pieces = unpack(&x, axis, kernels)?;
            Ok(OpOutcome::Value(pieces.into_iter().map(Some).collect()))
        }
        "Tile" => {
            let x = param_tensor(node, "x", tensors, context)?;
            let reps = param_int_vec(node, "reps", tensors, context)?;
            let reps = to_usize_vec(&reps, "reps")?;
            Ok(OpOutcome::single(kernels.tile(&x, &reps)?))
        }
        "Reverse" | "ReverseV2" => {
            let x = param_tensor(node, "x", tensors, context)?;
            let axes = param_int_vec(node, "axis", tensors, context)?;
            let axes = axes
                .iter()
                .map(|&axis| normalize_axis(axis, x.rank()))
                .collect::<Result<Vec<_>>>()?;
            Ok(OpOutcome::single(kernels.reverse(&x, &axes)?))
        }
        _ => Err(unsupported(node)),
    }
}
