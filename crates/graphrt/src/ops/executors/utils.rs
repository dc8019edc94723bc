//! Param resolution shared by the category executors.
//!
//! Params come from two places: input params read tensors (or values out of
//! tensors) bound on the node's input edges, attr params read literals baked
//! into the node. Tensor lookups honor the frame fallback chain, so a node
//! inside a loop sees values produced in enclosing frames.

use anyhow::{anyhow, bail, ensure, Result};

use crate::executor::{ExecutionContext, TensorsMap};
use crate::graph::{parse_node_name, AttrValue, InputParamKind, Node};
use crate::tensor::{DType, Tensor, TensorData};

/// Resolves a possibly slot-qualified tensor reference against the bound
/// tensors, searching from the current frame out to the root. The first
/// context with a binding for the node wins, even if the requested slot is
/// empty there.
pub(crate) fn get_tensor(
    name: &str,
    tensors: &TensorsMap,
    context: &ExecutionContext,
) -> Option<Tensor> {
    let (base, slot) = parse_node_name(name);
    for path in context.current_path().lookup_chain() {
        if let Some(bound) = tensors.get(&(base.to_owned(), path)) {
            return bound.get(slot).cloned().flatten();
        }
    }
    None
}

fn input_name(node: &Node, index: usize) -> Result<&str> {
    node.input_names
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("node '{}' has no input at index {index}", node.name))
}

fn bound_input(
    node: &Node,
    index: usize,
    tensors: &TensorsMap,
    context: &ExecutionContext,
) -> Result<Tensor> {
    let name = input_name(node, index)?;
    get_tensor(name, tensors, context)
        .ok_or_else(|| anyhow!("input '{name}' of node '{}' is not bound", node.name))
}

/// A single tensor-valued input param.
pub(crate) fn param_tensor(
    node: &Node,
    param: &str,
    tensors: &TensorsMap,
    context: &ExecutionContext,
) -> Result<Tensor> {
    let spec = node
        .input_params
        .get(param)
        .ok_or_else(|| anyhow!("node '{}' ({}) is missing param '{param}'", node.name, node.op))?;
    ensure!(
        spec.kind == InputParamKind::Tensor,
        "param '{param}' of node '{}' is not a tensor param",
        node.name
    );
    bound_input(node, spec.start, tensors, context)
}

/// A variadic tensor param covering a contiguous input range.
pub(crate) fn param_tensors(
    node: &Node,
    param: &str,
    tensors: &TensorsMap,
    context: &ExecutionContext,
) -> Result<Vec<Tensor>> {
    let spec = node
        .input_params
        .get(param)
        .ok_or_else(|| anyhow!("node '{}' ({}) is missing param '{param}'", node.name, node.op))?;
    ensure!(
        spec.kind == InputParamKind::Tensors,
        "param '{param}' of node '{}' is not a tensors param",
        node.name
    );
    let end = node.input_names.len().saturating_sub(spec.trailing);
    (spec.start..end).map(|i| bound_input(node, i, tensors, context)).collect()
}

/// A scalar number param, read from an input tensor or an attr.
pub(crate) fn param_i64(
    node: &Node,
    param: &str,
    tensors: &TensorsMap,
    context: &ExecutionContext,
) -> Result<i64> {
    if let Some(spec) = node.input_params.get(param) {
        ensure!(
            spec.kind == InputParamKind::Number,
            "param '{param}' of node '{}' is not a number param",
            node.name
        );
        let tensor = bound_input(node, spec.start, tensors, context)?;
        return match tensor.data()? {
            TensorData::I32(v) if v.len() == 1 => Ok(v[0] as i64),
            TensorData::F32(v) if v.len() == 1 => Ok(v[0] as i64),
            _ => bail!("param '{param}' of node '{}' is not a numeric scalar", node.name),
        };
    }
    match node.attrs.get(param) {
        Some(AttrValue::Int(v)) => Ok(*v),
        Some(AttrValue::Float(v)) => Ok(*v as i64),
        _ => bail!("node '{}' ({}) is missing param '{param}'", node.name, node.op),
    }
}

pub(crate) fn param_f64(
    node: &Node,
    param: &str,
    tensors: &TensorsMap,
    context: &ExecutionContext,
) -> Result<f64> {
    if let Some(spec) = node.input_params.get(param) {
        ensure!(
            spec.kind == InputParamKind::Number,
            "param '{param}' of node '{}' is not a number param",
            node.name
        );
        let tensor = bound_input(node, spec.start, tensors, context)?;
        return match tensor.data()? {
            TensorData::F32(v) if v.len() == 1 => Ok(v[0] as f64),
            TensorData::I32(v) if v.len() == 1 => Ok(v[0] as f64),
            _ => bail!("param '{param}' of node '{}' is not a numeric scalar", node.name),
        };
    }
    match node.attrs.get(param) {
        Some(AttrValue::Float(v)) => Ok(*v),
        Some(AttrValue::Int(v)) => Ok(*v as f64),
        _ => bail!("node '{}' ({}) is missing param '{param}'", node.name, node.op),
    }
}

/// A vector-of-numbers param, read from an input tensor or an attr.
pub(crate) fn param_int_vec(
    node: &Node,
    param: &str,
    tensors: &TensorsMap,
    context: &ExecutionContext,
) -> Result<Vec<i64>> {
    if let Some(spec) = node.input_params.get(param) {
        ensure!(
            spec.kind == InputParamKind::NumberArray,
            "param '{param}' of node '{}' is not a number array param",
            node.name
        );
        let tensor = bound_input(node, spec.start, tensors, context)?;
        return tensor.int_vec();
    }
    match node.attrs.get(param) {
        Some(AttrValue::IntVec(v)) | Some(AttrValue::Shape(v)) => Ok(v.clone()),
        _ => bail!("node '{}' ({}) is missing param '{param}'", node.name, node.op),
    }
}

pub(crate) fn attr_bool(node: &Node, name: &str, default: bool) -> bool {
    match node.attrs.get(name) {
        Some(AttrValue::Bool(v)) => *v,
        _ => default,
    }
}

pub(crate) fn attr_f64(node: &Node, name: &str, default: f64) -> f64 {
    match node.attrs.get(name) {
        Some(AttrValue::Float(v)) => *v,
        Some(AttrValue::Int(v)) => *v as f64,
        _ => default,
    }
}

pub(crate) fn attr_i64(node: &Node, name: &str, default: i64) -> i64 {
    match node.attrs.get(name) {
        Some(AttrValue::Int(v)) => *v,
        _ => default,
    }
}

pub(crate) fn attr_str<'a>(node: &'a Node, name: &str) -> Option<&'a str> {
    match node.attrs.get(name) {
        Some(AttrValue::Str(v)) => Some(v.as_str()),
        _ => None,
    }
}

pub(crate) fn attr_dtype(node: &Node, name: &str) -> Option<DType> {
    match node.attrs.get(name) {
        Some(AttrValue::DType(v)) => Some(*v),
        _ => None,
    }
}

pub(crate) fn attr_int_vec(node: &Node, name: &str) -> Option<Vec<i64>> {
    match node.attrs.get(name) {
        Some(AttrValue::IntVec(v)) | Some(AttrValue::Shape(v)) => Some(v.clone()),
        _ => None,
    }
}

/// Maps a possibly negative axis onto `0..rank`. Scalars accept axis 0.
pub(crate) fn normalize_axis(axis: i64, rank: usize) -> Result<usize> {
    let bound = rank.max(1) as i64;
    let resolved = if axis < 0 { axis + bound } else { axis };
    ensure!(
        (0..bound).contains(&resolved),
        "axis {axis} is out of range for rank {rank}"
    );
    Ok(resolved as usize)
}

/// Converts a parsed index vector to usize, rejecting negatives.
pub(crate) fn to_usize_vec(values: &[i64], what: &str) -> Result<Vec<usize>> {
    values
        .iter()
        .map(|&v| {
            ensure!(v >= 0, "{what} must be non-negative, got {v}");
            Ok(v as usize)
        })
        .collect()
}
