//! Control flow and TensorArray ops.
//!
//! Frame ops (`Enter`, `Exit`, `NextIteration`) mutate the execution
//! context's frame stack at dispatch time; the executor keys their output by
//! the frame that is current after the mutation, which is what makes loop
//! iterations distinct. `Switch` and the TensorArray and TensorList
//! families are deferred: their effect depends on tensor values, so they
//! resolve between waves.
//!
//! Param convention: data-carrying inputs use tensor params (`tensor`,
//! `data`, `pred`); a TensorArray or TensorList reference is the number
//! param `tensor_array_id` / `tensor_list_id`, carried through the graph as
//! a scalar int32; `indices`, `lengths` and `element_shape` are number-array
//! params; construction attrs use snake_case names (`frame_name`,
//! `is_constant`, `element_shape`, `element_dtype`, `dynamic_size`,
//! `clear_after_read`, `identical_element_shapes`, `num_elements`).

use anyhow::Result;
use std::collections::HashSet;

use super::utils::{
    attr_bool, attr_dtype, attr_i64, attr_int_vec, attr_str, get_tensor, param_i64,
    param_int_vec, param_tensor,
};
use crate::executor::{ExecutionContext, TensorArray, TensorList, TensorsMap};
use crate::graph::Node;
use crate::kernels::Kernels;
use crate::ops::{unsupported, OpOutcome};
use crate::tensor::{DType, Tensor};

pub(crate) fn execute(
    node: &Node,
    tensors: &TensorsMap,
    context: &mut ExecutionContext,
    _kernels: &dyn Kernels,
) -> Result<OpOutcome> {
    match node.op.as_str() {
        "Enter" => {
            let data = param_tensor(node, "tensor", tensors, context)?;
            let frame = attr_str(node, "frame_name").unwrap_or(&node.name).to_owned();
            context.enter_frame(&frame);
            Ok(OpOutcome::single(data.alias()?))
        }
        "Exit" => {
            let data = param_tensor(node, "tensor", tensors, context)?;
            context.exit_frame()?;
            Ok(OpOutcome::single(data.alias()?))
        }
        "NextIteration" => {
            let data = param_tensor(node, "tensor", tensors, context)?;
            context.next_iteration()?;
            Ok(OpOutcome::single(data.alias()?))
        }
        "LoopCond" => {
            let pred = param_tensor(node, "pred", tensors, context)?;
            Ok(OpOutcome::single(pred.alias()?))
        }
        "Switch" => {
            let data = param_tensor(node, "data", tensors, context)?;
            let pred = param_tensor(node, "pred", tensors, context)?;
            Ok(OpOutcome::Deferred(Box::new(move |_, _| {
                let taken = pred.scalar_value_bool()?;
                let out = data.alias()?;
                // Output slot 0 is the false branch, slot 1 the true branch.
                Ok(if taken { vec![None, Some(out)] } else { vec![Some(out), None] })
            })))
        }
        "Merge" => {
            // Ready as soon as any input is bound; the first bound input in
            // declaration order wins.
            for input in &node.input_names {
                if let Some(tensor) = get_tensor(input, tensors, context) {
                    return Ok(OpOutcome::single(tensor.alias()?));
                }
            }
            Ok(OpOutcome::Value(Vec::new()))
        }
        "TensorArrayV3" => {
            let size = param_i64(node, "size", tensors, context)?.max(0) as usize;
            let name = attr_str(node, "name").unwrap_or(&node.name).to_owned();
            let dtype = attr_dtype(node, "dtype").unwrap_or(DType::Float32);
            let element_shape = attr_int_vec(node, "element_shape").unwrap_or_default();
            let identical = attr_bool(node, "identical_element_shapes", false);
            let dynamic_size = attr_bool(node, "dynamic_size", false);
            let clear_after_read = attr_bool(node, "clear_after_read", true);
            Ok(OpOutcome::Deferred(Box::new(move |_, context| {
                let array = TensorArray::new(
                    name,
                    dtype,
                    size,
                    element_shape,
                    identical,
                    dynamic_size,
                    clear_after_read,
                );
                let id = array.id();
                context.register_tensor_array(array);
                Ok(vec![Some(Tensor::scalar_i32(id as i32)), Some(Tensor::scalar_f32(1.0))])
            })))
        }
        "TensorArrayWriteV3" => {
            let id = param_i64(node, "tensor_array_id", tensors, context)? as usize;
            let index = param_i64(node, "index", tensors, context)?;
            let tensor = param_tensor(node, "tensor", tensors, context)?;
            Ok(OpOutcome::Deferred(Box::new(move |_, context| {
                let stored = tensor.alias()?;
                context.tensor_array_mut(id)?.write(index, stored)?;
                Ok(vec![Some(Tensor::scalar_f32(1.0))])
            })))
        }
        "TensorArrayReadV3" => {
            let id = param_i64(node, "tensor_array_id", tensors, context)? as usize;
            let index = param_i64(node, "index", tensors, context)?;
            Ok(OpOutcome::Deferred(Box::new(move |_, context| {
                let tensor = context.tensor_array_mut(id)?.read(index)?;
                Ok(vec![Some(tensor)])
            })))
        }
        "TensorArrayGatherV3" => {
            let id = param_i64(node, "tensor_array_id", tensors, context)? as usize;
            let indices = param_tensor(node, "indices", tensors, context)
                .ok()
                .map(|t| t.int_vec())
                .transpose()?;
            let dtype = attr_dtype(node, "dtype");
            Ok(OpOutcome::Deferred(Box::new(move |kernels, context| {
                let tensor = context.tensor_array_mut(id)?.gather(indices, dtype, kernels)?;
                Ok(vec![Some(tensor)])
            })))
        }
        "TensorArrayScatterV3" => {
            let id = param_i64(node, "tensor_array_id", tensors, context)? as usize;
            let indices = param_tensor(node, "indices", tensors, context)?.int_vec()?;
            let tensor = param_tensor(node, "tensor", tensors, context)?;
            Ok(OpOutcome::Deferred(Box::new(move |kernels, context| {
                context.tensor_array_mut(id)?.scatter(&indices, &tensor, kernels)?;
                Ok(vec![Some(Tensor::scalar_f32(1.0))])
            })))
        }
        "TensorArrayConcatV3" => {
            let id = param_i64(node, "tensor_array_id", tensors, context)? as usize;
            let dtype = attr_dtype(node, "dtype");
            Ok(OpOutcome::Deferred(Box::new(move |kernels, context| {
                let tensor = context.tensor_array_mut(id)?.concat(dtype, kernels)?;
                Ok(vec![Some(tensor)])
            })))
        }
        "TensorArraySplitV3" => {
            let id = param_i64(node, "tensor_array_id", tensors, context)? as usize;
            let tensor = param_tensor(node, "tensor", tensors, context)?;
            let lengths = param_tensor(node, "lengths", tensors, context)?.int_vec()?;
            Ok(OpOutcome::Deferred(Box::new(move |kernels, context| {
                context.tensor_array_mut(id)?.split(&lengths, &tensor, kernels)?;
                Ok(vec![Some(Tensor::scalar_f32(1.0))])
            })))
        }
        "TensorArraySizeV3" => {
            let id = param_i64(node, "tensor_array_id", tensors, context)? as usize;
            Ok(OpOutcome::Deferred(Box::new(move |_, context| {
                let size = context.tensor_array(id)?.size();
                Ok(vec![Some(Tensor::scalar_i32(size as i32))])
            })))
        }
        "TensorArrayCloseV3" => {
            let id = param_i64(node, "tensor_array_id", tensors, context)? as usize;
            Ok(OpOutcome::Deferred(Box::new(move |_, context| {
                context.tensor_array_mut(id)?.clear_and_close(&HashSet::new());
                Ok(vec![Some(Tensor::scalar_f32(0.0))])
            })))
        }
        "EmptyTensorList" | "TensorListReserve" => {
            let element_shape = param_int_vec(node, "element_shape", tensors, context)
                .unwrap_or_default();
            let size_param =
                if node.op == "EmptyTensorList" { "max_num_elements" } else { "num_elements" };
            let max = param_i64(node, size_param, tensors, context).unwrap_or(-1);
            let dtype = attr_dtype(node, "element_dtype").unwrap_or(DType::Float32);
            Ok(OpOutcome::Deferred(Box::new(move |_, context| {
                let list = TensorList::new(dtype, element_shape, max);
                let id = list.id();
                context.register_tensor_list(list);
                Ok(vec![Some(Tensor::scalar_i32(id as i32))])
            })))
        }
        "TensorListFromTensor" => {
            let tensor = param_tensor(node, "tensor", tensors, context)?;
            let element_shape = param_int_vec(node, "element_shape", tensors, context)
                .unwrap_or_default();
            Ok(OpOutcome::Deferred(Box::new(move |kernels, context| {
                let list = TensorList::from_tensor(&tensor, element_shape, kernels)?;
                let id = list.id();
                context.register_tensor_list(list);
                Ok(vec![Some(Tensor::scalar_i32(id as i32))])
            })))
        }
        "TensorListScatter" | "TensorListScatterV2" => {
            let tensor = param_tensor(node, "tensor", tensors, context)?;
            let indices = param_int_vec(node, "indices", tensors, context)?;
            let element_shape = param_int_vec(node, "element_shape", tensors, context)
                .unwrap_or_default();
            let max = param_i64(node, "num_elements", tensors, context).unwrap_or(-1);
            Ok(OpOutcome::Deferred(Box::new(move |kernels, context| {
                let list = TensorList::scatter(&tensor, &indices, element_shape, max, kernels)?;
                let id = list.id();
                context.register_tensor_list(list);
                Ok(vec![Some(Tensor::scalar_i32(id as i32))])
            })))
        }
        "TensorListSplit" => {
            let tensor = param_tensor(node, "tensor", tensors, context)?;
            let element_shape = param_int_vec(node, "element_shape", tensors, context)
                .unwrap_or_default();
            let lengths = param_int_vec(node, "lengths", tensors, context)?;
            Ok(OpOutcome::Deferred(Box::new(move |kernels, context| {
                let list = TensorList::split(&tensor, element_shape, &lengths, kernels)?;
                let id = list.id();
                context.register_tensor_list(list);
                Ok(vec![Some(Tensor::scalar_i32(id as i32))])
            })))
        }
        "TensorListGetItem" => {
            let id = param_i64(node, "tensor_list_id", tensors, context)? as usize;
            let index = param_i64(node, "index", tensors, context)?;
            let dtype = attr_dtype(node, "element_dtype");
            Ok(OpOutcome::Deferred(Box::new(move |_, context| {
                let tensor = context.tensor_list(id)?.get_item(index, dtype)?;
                Ok(vec![Some(tensor)])
            })))
        }
        "TensorListSetItem" => {
            let id = param_i64(node, "tensor_list_id", tensors, context)? as usize;
            let index = param_i64(node, "index", tensors, context)?;
            let tensor = param_tensor(node, "tensor", tensors, context)?;
            Ok(OpOutcome::Deferred(Box::new(move |_, context| {
                let stored = tensor.alias()?;
                context.tensor_list_mut(id)?.set_item(index, stored)?;
                Ok(vec![Some(Tensor::scalar_i32(id as i32))])
            })))
        }
        "TensorListPushBack" => {
            let id = param_i64(node, "tensor_list_id", tensors, context)? as usize;
            let tensor = param_tensor(node, "tensor", tensors, context)?;
            Ok(OpOutcome::Deferred(Box::new(move |_, context| {
                let stored = tensor.alias()?;
                context.tensor_list_mut(id)?.push_back(stored)?;
                Ok(vec![Some(Tensor::scalar_i32(id as i32))])
            })))
        }
        "TensorListPopBack" => {
            let id = param_i64(node, "tensor_list_id", tensors, context)? as usize;
            let dtype = attr_dtype(node, "element_dtype");
            Ok(OpOutcome::Deferred(Box::new(move |_, context| {
                let tensor = context.tensor_list_mut(id)?.pop_back(dtype)?;
                Ok(vec![Some(tensor)])
            })))
        }
        "TensorListStack" => {
            let id = param_i64(node, "tensor_list_id", tensors, context)? as usize;
            let dtype = attr_dtype(node, "element_dtype");
            let num_elements = attr_i64(node, "num_elements", -1);
            Ok(OpOutcome::Deferred(Box::new(move |kernels, context| {
                let tensor = context.tensor_list(id)?.stack(num_elements, dtype, kernels)?;
                Ok(vec![Some(tensor)])
            })))
        }
        "TensorListGather" => {
            let id = param_i64(node, "tensor_list_id", tensors, context)? as usize;
            let indices = param_int_vec(node, "indices", tensors, context)?;
            let dtype = attr_dtype(node, "element_dtype");
            Ok(OpOutcome::Deferred(Box::new(move |kernels, context| {
                let tensor = context.tensor_list(id)?.gather(&indices, dtype, kernels)?;
                Ok(vec![Some(tensor)])
            })))
        }
        "TensorListConcat" => {
            let id = param_i64(node, "tensor_list_id", tensors, context)? as usize;
            let dtype = attr_dtype(node, "element_dtype");
            Ok(OpOutcome::Deferred(Box::new(move |kernels, context| {
                let tensor = context.tensor_list(id)?.concat(dtype, kernels)?;
                Ok(vec![Some(tensor)])
            })))
        }
        _ => Err(unsupported(node)),
    }
}
