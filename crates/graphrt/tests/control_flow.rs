//! Wave-scheduled execution: Switch routing, while loops over frame paths,
//! Merge semantics, and the TensorArray and TensorList ops driven through a
//! graph.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

use graphrt::graph::AttrValue;
use graphrt::{DType, Graph, GraphExecutor, Node, Tensor};
use graphrt_backend_ref_cpu::CpuKernels;

fn executor(graph: Graph) -> GraphExecutor {
    GraphExecutor::new(Arc::new(graph), Arc::new(CpuKernels::new()))
}

/// `Switch` routes its data to output slot 1 when the predicate is true and
/// slot 0 otherwise; the untaken branch never materializes.
fn switch_graph() -> Result<Graph> {
    Graph::new(vec![
        Node::for_op("data", "Placeholder")?,
        Node::for_op("pred", "Placeholder")?,
        Node::for_op("switch", "Switch")?
            .with_inputs(["data", "pred"])
            .with_tensor_param("data", 0)
            .with_tensor_param("pred", 1),
        Node::for_op("on_false", "Identity")?.with_inputs(["switch:0"]).with_tensor_param("x", 0),
        Node::for_op("on_true", "Identity")?.with_inputs(["switch:1"]).with_tensor_param("x", 0),
    ])
}

fn switch_inputs(value: f32, pred: bool) -> HashMap<String, Tensor> {
    HashMap::from([
        ("data".to_owned(), Tensor::scalar_f32(value)),
        ("pred".to_owned(), Tensor::scalar_bool(pred)),
    ])
}

#[test]
fn switch_routes_to_the_taken_branch() -> Result<()> {
    let executor = executor(switch_graph()?);

    let results = executor.execute_async(switch_inputs(7.0, true), Some(&["on_true"]))?;
    assert_eq!(results[0].scalar_value_f32()?, 7.0);

    let results = executor.execute_async(switch_inputs(8.0, false), Some(&["on_false"]))?;
    assert_eq!(results[0].scalar_value_f32()?, 8.0);
    Ok(())
}

#[test]
fn requesting_the_untaken_branch_fails() -> Result<()> {
    let executor = executor(switch_graph()?);
    let err =
        executor.execute_async(switch_inputs(7.0, false), Some(&["on_true"])).unwrap_err();
    assert!(err.to_string().contains("cannot compute"), "{err}");
    Ok(())
}

/// A counting loop: `while (v < limit) v += one`, built from the raw control
/// ops. `limit` and `one` enter the frame as loop constants.
fn while_loop_graph() -> Result<Graph> {
    let frame = AttrValue::Str("loop".to_owned());
    Graph::new(vec![
        Node::for_op("init", "Placeholder")?,
        Node::for_op("limit", "Const")?,
        Node::for_op("one", "Const")?,
        Node::for_op("enter", "Enter")?
            .with_inputs(["init"])
            .with_tensor_param("tensor", 0)
            .with_attr("frame_name", frame.clone()),
        Node::for_op("limit_in", "Enter")?
            .with_inputs(["limit"])
            .with_tensor_param("tensor", 0)
            .with_attr("frame_name", frame.clone())
            .with_attr("is_constant", AttrValue::Bool(true)),
        Node::for_op("one_in", "Enter")?
            .with_inputs(["one"])
            .with_tensor_param("tensor", 0)
            .with_attr("frame_name", frame)
            .with_attr("is_constant", AttrValue::Bool(true)),
        Node::for_op("merge", "Merge")?.with_inputs(["enter", "next"]),
        Node::for_op("less", "Less")?
            .with_inputs(["merge", "limit_in"])
            .with_tensor_param("a", 0)
            .with_tensor_param("b", 1),
        Node::for_op("cond", "LoopCond")?.with_inputs(["less"]).with_tensor_param("pred", 0),
        Node::for_op("switch", "Switch")?
            .with_inputs(["merge", "cond"])
            .with_tensor_param("data", 0)
            .with_tensor_param("pred", 1),
        Node::for_op("exit", "Exit")?.with_inputs(["switch:0"]).with_tensor_param("tensor", 0),
        Node::for_op("body", "Add")?
            .with_inputs(["switch:1", "one_in"])
            .with_tensor_param("a", 0)
            .with_tensor_param("b", 1),
        Node::for_op("next", "NextIteration")?
            .with_inputs(["body"])
            .with_tensor_param("tensor", 0),
    ])
}

fn while_loop_executor() -> Result<GraphExecutor> {
    let graph = Arc::new(while_loop_graph()?);
    let weights = HashMap::from([
        ("limit".to_owned(), vec![Tensor::scalar_f32(3.0)]),
        ("one".to_owned(), vec![Tensor::scalar_f32(1.0)]),
    ]);
    Ok(GraphExecutor::new(graph, Arc::new(CpuKernels::new())).with_weights(weights))
}

#[test]
fn while_loop_runs_until_the_condition_fails() -> Result<()> {
    let executor = while_loop_executor()?;
    let inputs = HashMap::from([("init".to_owned(), Tensor::scalar_f32(0.0))]);
    let results = executor.execute_async(inputs, Some(&["exit"]))?;
    assert_eq!(results[0].scalar_value_f32()?, 3.0);
    Ok(())
}

#[test]
fn while_loop_with_a_false_condition_skips_the_body() -> Result<()> {
    let executor = while_loop_executor()?;
    let inputs = HashMap::from([("init".to_owned(), Tensor::scalar_f32(5.0))]);
    let results = executor.execute_async(inputs, Some(&["exit"]))?;
    assert_eq!(results[0].scalar_value_f32()?, 5.0);
    Ok(())
}

#[test]
fn merge_takes_the_first_bound_input_in_declaration_order() -> Result<()> {
    let graph = Graph::new(vec![
        Node::for_op("a", "Placeholder")?,
        Node::for_op("b", "Placeholder")?,
        Node::for_op("merge", "Merge")?.with_inputs(["a", "b"]),
    ])?;
    let executor = executor(graph);
    let inputs = HashMap::from([
        ("a".to_owned(), Tensor::scalar_f32(1.0)),
        ("b".to_owned(), Tensor::scalar_f32(2.0)),
    ]);
    let results = executor.execute_async(inputs, Some(&["merge"]))?;
    assert_eq!(results[0].scalar_value_f32()?, 1.0);
    Ok(())
}

/// Scatter a `[3, 2]` tensor into an array, then read one element back and
/// gather two. The scatter's flow output sequences the consumers.
fn tensor_array_graph() -> Result<Graph> {
    Graph::new(vec![
        Node::for_op("items", "Placeholder")?,
        Node::for_op("ta_size", "Const")?,
        Node::for_op("scatter_indices", "Const")?,
        Node::for_op("read_index", "Const")?,
        Node::for_op("gather_indices", "Const")?,
        Node::for_op("ta", "TensorArrayV3")?
            .with_inputs(["ta_size"])
            .with_number_param("size", 0)
            .with_attr("dtype", AttrValue::DType(DType::Float32))
            .with_attr("clear_after_read", AttrValue::Bool(false)),
        Node::for_op("scatter", "TensorArrayScatterV3")?
            .with_inputs(["ta", "scatter_indices", "items"])
            .with_number_param("tensor_array_id", 0)
            .with_tensor_param("indices", 1)
            .with_tensor_param("tensor", 2),
        Node::for_op("read", "TensorArrayReadV3")?
            .with_inputs(["ta", "read_index", "scatter"])
            .with_number_param("tensor_array_id", 0)
            .with_number_param("index", 1),
        Node::for_op("gather", "TensorArrayGatherV3")?
            .with_inputs(["ta", "gather_indices", "scatter"])
            .with_number_param("tensor_array_id", 0)
            .with_tensor_param("indices", 1),
    ])
}

#[test]
fn tensor_array_scatter_read_gather() -> Result<()> {
    let graph = Arc::new(tensor_array_graph()?);
    let weights = HashMap::from([
        ("ta_size".to_owned(), vec![Tensor::scalar_i32(3)]),
        ("scatter_indices".to_owned(), vec![Tensor::from_i32(vec![3], vec![0, 1, 2])?]),
        ("read_index".to_owned(), vec![Tensor::scalar_i32(1)]),
        ("gather_indices".to_owned(), vec![Tensor::from_i32(vec![2], vec![0, 2])?]),
    ]);
    let executor =
        GraphExecutor::new(graph, Arc::new(CpuKernels::new())).with_weights(weights);

    let items = Tensor::from_f32(vec![3, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
    let inputs = HashMap::from([("items".to_owned(), items)]);
    let results = executor.execute_async(inputs, Some(&["read", "gather"]))?;

    assert_eq!(results[0].shape().dims(), &[2]);
    assert_eq!(results[0].f32_data()?.as_ref(), &[3.0, 4.0]);
    assert_eq!(results[1].shape().dims(), &[2, 2]);
    assert_eq!(results[1].f32_data()?.as_ref(), &[1.0, 2.0, 5.0, 6.0]);
    Ok(())
}

/// Unstack a `[3, 2]` tensor into a list, then read one element back and
/// stack the whole list again.
fn tensor_list_graph() -> Result<Graph> {
    let dtype = AttrValue::DType(DType::Float32);
    Graph::new(vec![
        Node::for_op("items", "Placeholder")?,
        Node::for_op("item_shape", "Const")?,
        Node::for_op("item_index", "Const")?,
        Node::for_op("list", "TensorListFromTensor")?
            .with_inputs(["items", "item_shape"])
            .with_tensor_param("tensor", 0)
            .with_number_array_param("element_shape", 1)
            .with_attr("element_dtype", dtype.clone()),
        Node::for_op("item", "TensorListGetItem")?
            .with_inputs(["list", "item_index"])
            .with_number_param("tensor_list_id", 0)
            .with_number_param("index", 1)
            .with_attr("element_dtype", dtype.clone()),
        Node::for_op("stacked", "TensorListStack")?
            .with_inputs(["list"])
            .with_number_param("tensor_list_id", 0)
            .with_attr("element_dtype", dtype),
    ])
}

#[test]
fn tensor_list_from_tensor_get_item_stack() -> Result<()> {
    let graph = Arc::new(tensor_list_graph()?);
    let weights = HashMap::from([
        ("item_shape".to_owned(), vec![Tensor::from_i32(vec![1], vec![2])?]),
        ("item_index".to_owned(), vec![Tensor::scalar_i32(1)]),
    ]);
    let executor =
        GraphExecutor::new(graph, Arc::new(CpuKernels::new())).with_weights(weights);

    let items = Tensor::from_f32(vec![3, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
    let inputs = HashMap::from([("items".to_owned(), items)]);
    let results = executor.execute_async(inputs, Some(&["item", "stacked"]))?;

    assert_eq!(results[0].shape().dims(), &[2]);
    assert_eq!(results[0].f32_data()?.as_ref(), &[3.0, 4.0]);
    assert_eq!(results[1].shape().dims(), &[3, 2]);
    assert_eq!(results[1].f32_data()?.as_ref(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    Ok(())
}

/// Reserve a two-element list, fill it through chained `TensorListSetItem`
/// nodes (each passes the list id on), and stack the result.
fn tensor_list_reserve_graph() -> Result<Graph> {
    let dtype = AttrValue::DType(DType::Float32);
    Graph::new(vec![
        Node::for_op("first", "Placeholder")?,
        Node::for_op("second", "Placeholder")?,
        Node::for_op("list_shape", "Const")?,
        Node::for_op("list_size", "Const")?,
        Node::for_op("index0", "Const")?,
        Node::for_op("index1", "Const")?,
        Node::for_op("list", "TensorListReserve")?
            .with_inputs(["list_shape", "list_size"])
            .with_number_array_param("element_shape", 0)
            .with_number_param("num_elements", 1)
            .with_attr("element_dtype", dtype.clone()),
        Node::for_op("set0", "TensorListSetItem")?
            .with_inputs(["list", "index0", "first"])
            .with_number_param("tensor_list_id", 0)
            .with_number_param("index", 1)
            .with_tensor_param("tensor", 2),
        Node::for_op("set1", "TensorListSetItem")?
            .with_inputs(["set0", "index1", "second"])
            .with_number_param("tensor_list_id", 0)
            .with_number_param("index", 1)
            .with_tensor_param("tensor", 2),
        Node::for_op("stacked", "TensorListStack")?
            .with_inputs(["set1"])
            .with_number_param("tensor_list_id", 0)
            .with_attr("element_dtype", dtype)
            .with_attr("num_elements", AttrValue::Int(2)),
    ])
}

#[test]
fn tensor_list_reserve_set_items_stack() -> Result<()> {
    let graph = Arc::new(tensor_list_reserve_graph()?);
    let weights = HashMap::from([
        ("list_shape".to_owned(), vec![Tensor::from_i32(vec![1], vec![2])?]),
        ("list_size".to_owned(), vec![Tensor::scalar_i32(2)]),
        ("index0".to_owned(), vec![Tensor::scalar_i32(0)]),
        ("index1".to_owned(), vec![Tensor::scalar_i32(1)]),
    ]);
    let executor =
        GraphExecutor::new(graph, Arc::new(CpuKernels::new())).with_weights(weights);

    let inputs = HashMap::from([
        ("first".to_owned(), Tensor::from_f32(vec![2], vec![1.0, 2.0])?),
        ("second".to_owned(), Tensor::from_f32(vec![2], vec![3.0, 4.0])?),
    ]);
    let results = executor.execute_async(inputs, Some(&["stacked"]))?;

    assert_eq!(results[0].shape().dims(), &[2, 2]);
    assert_eq!(results[0].f32_data()?.as_ref(), &[1.0, 2.0, 3.0, 4.0]);
    Ok(())
}
