//! End to end tests for the synchronous execution path: input and output
//! validation, compilation caching, and weight lifetime.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

use graphrt::executor::ExecutorError;
use graphrt::graph::AttrValue;
use graphrt::{DType, Graph, GraphExecutor, Node, Tensor};
use graphrt_backend_ref_cpu::CpuKernels;

/// `neg(input + bias)` with `bias` a weight. `input` declares shape `[-1]`
/// and dtype float32, so validation tests have something to violate.
fn add_neg_graph() -> Result<Graph> {
    Graph::new(vec![
        Node::for_op("input", "Placeholder")?
            .with_attr("dtype", AttrValue::DType(DType::Float32))
            .with_attr("shape", AttrValue::Shape(vec![-1])),
        Node::for_op("bias", "Const")?,
        Node::for_op("add", "Add")?
            .with_inputs(["input", "bias"])
            .with_tensor_param("a", 0)
            .with_tensor_param("b", 1),
        Node::for_op("neg", "Neg")?.with_inputs(["add"]).with_tensor_param("x", 0),
    ])
}

fn add_neg_executor() -> Result<GraphExecutor> {
    let graph = Arc::new(add_neg_graph()?);
    let weights = HashMap::from([(
        "bias".to_owned(),
        vec![Tensor::from_f32(vec![2], vec![1.0, 2.0])?],
    )]);
    Ok(GraphExecutor::new(graph, Arc::new(CpuKernels::new())).with_weights(weights))
}

fn feed(value: Tensor) -> HashMap<String, Tensor> {
    HashMap::from([("input".to_owned(), value)])
}

#[test]
fn executes_to_the_default_outputs() -> Result<()> {
    let executor = add_neg_executor()?;
    let results = executor.execute(feed(Tensor::from_f32(vec![2], vec![1.0, 1.0])?), None)?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].f32_data()?.as_ref(), &[-2.0, -3.0]);
    Ok(())
}

#[test]
fn requested_outputs_can_include_intermediates() -> Result<()> {
    let executor = add_neg_executor()?;
    let results = executor.execute(
        feed(Tensor::from_f32(vec![2], vec![0.0, 1.0])?),
        Some(&["neg", "add"]),
    )?;
    assert_eq!(results[0].f32_data()?.as_ref(), &[-1.0, -3.0]);
    assert_eq!(results[1].f32_data()?.as_ref(), &[1.0, 3.0]);
    Ok(())
}

#[test]
fn non_strict_mode_feeds_an_intermediate_node() -> Result<()> {
    let graph = Arc::new(add_neg_graph()?);
    let executor = GraphExecutor::new(graph, Arc::new(CpuKernels::new()))
        .with_strict_input_check(false);
    let inputs =
        HashMap::from([("add".to_owned(), Tensor::from_f32(vec![2], vec![4.0, 5.0])?)]);
    let results = executor.execute(inputs, Some(&["neg"]))?;
    assert_eq!(results[0].f32_data()?.as_ref(), &[-4.0, -5.0]);
    Ok(())
}

#[test]
fn strict_mode_rejects_non_placeholder_feeds() -> Result<()> {
    let executor = add_neg_executor()?;
    let mut inputs = feed(Tensor::from_f32(vec![2], vec![0.0, 0.0])?);
    inputs.insert("add".to_owned(), Tensor::from_f32(vec![2], vec![0.0, 0.0])?);
    let err = executor.execute(inputs, None).unwrap_err();
    assert!(err.to_string().contains("not graph placeholders"), "{err}");
    Ok(())
}

#[test]
fn missing_placeholder_is_reported() -> Result<()> {
    let executor = add_neg_executor()?;
    let err = executor.execute(HashMap::new(), None).unwrap_err();
    assert!(
        matches!(err.downcast_ref::<ExecutorError>(), Some(ExecutorError::MissingInput { .. })),
        "{err}"
    );
    Ok(())
}

#[test]
fn unknown_input_name_is_reported() -> Result<()> {
    let executor = add_neg_executor()?;
    let inputs =
        HashMap::from([("no_such_node".to_owned(), Tensor::scalar_f32(1.0))]);
    let err = executor.execute(inputs, None).unwrap_err();
    match err.downcast_ref::<ExecutorError>() {
        Some(ExecutorError::UnknownInput(name)) => assert_eq!(name, "no_such_node"),
        other => panic!("unexpected error {other:?}"),
    }
    Ok(())
}

#[test]
fn unknown_output_name_is_reported() -> Result<()> {
    let executor = add_neg_executor()?;
    let err = executor
        .execute(feed(Tensor::from_f32(vec![2], vec![0.0, 0.0])?), Some(&["no_such_node"]))
        .unwrap_err();
    assert!(
        matches!(err.downcast_ref::<ExecutorError>(), Some(ExecutorError::OutputNotFound(_))),
        "{err}"
    );
    Ok(())
}

#[test]
fn declared_shape_and_dtype_are_enforced() -> Result<()> {
    let executor = add_neg_executor()?;

    // Rank 2 against a declared rank 1 shape.
    let err = executor
        .execute(feed(Tensor::from_f32(vec![1, 2], vec![0.0, 0.0])?), None)
        .unwrap_err();
    assert!(
        matches!(err.downcast_ref::<ExecutorError>(), Some(ExecutorError::ShapeMismatch { .. })),
        "{err}"
    );

    let err = executor.execute(feed(Tensor::from_i32(vec![2], vec![0, 0])?), None).unwrap_err();
    assert!(
        matches!(err.downcast_ref::<ExecutorError>(), Some(ExecutorError::DTypeMismatch { .. })),
        "{err}"
    );

    // The declared `-1` dimension accepts any extent.
    let results = executor.execute(feed(Tensor::from_f32(vec![2], vec![1.0, 1.0])?), None)?;
    assert_eq!(results[0].f32_data()?.len(), 2);
    Ok(())
}

#[test]
fn repeated_signatures_reuse_the_compiled_order() -> Result<()> {
    let executor = add_neg_executor()?;
    executor.execute(feed(Tensor::from_f32(vec![2], vec![0.0, 0.0])?), None)?;
    assert_eq!(executor.compile_cache_hits(), 0);
    executor.execute(feed(Tensor::from_f32(vec![2], vec![1.0, 1.0])?), None)?;
    executor.execute(feed(Tensor::from_f32(vec![2], vec![2.0, 2.0])?), None)?;
    assert_eq!(executor.compile_cache_hits(), 2);

    // A different output signature compiles its own order.
    executor.execute(feed(Tensor::from_f32(vec![2], vec![0.0, 0.0])?), Some(&["add"]))?;
    assert_eq!(executor.compile_cache_hits(), 2);
    Ok(())
}

#[test]
fn sync_execution_rejects_control_flow_graphs() -> Result<()> {
    let graph = Arc::new(Graph::new(vec![
        Node::for_op("data", "Placeholder")?,
        Node::for_op("pred", "Placeholder")?,
        Node::for_op("switch", "Switch")?
            .with_inputs(["data", "pred"])
            .with_tensor_param("data", 0)
            .with_tensor_param("pred", 1),
        Node::for_op("taken", "Identity")?.with_inputs(["switch:1"]).with_tensor_param("x", 0),
    ])?);
    let executor = GraphExecutor::new(graph, Arc::new(CpuKernels::new()));
    let inputs = HashMap::from([
        ("data".to_owned(), Tensor::scalar_f32(7.0)),
        ("pred".to_owned(), Tensor::scalar_bool(true)),
    ]);

    let err = executor.execute(inputs.clone(), Some(&["taken"])).unwrap_err();
    assert!(
        matches!(
            err.downcast_ref::<ExecutorError>(),
            Some(ExecutorError::DynamicGraphInSyncExecute { .. })
        ),
        "{err}"
    );

    // The same graph runs through the wave scheduler.
    let results = executor.execute_async(inputs, Some(&["taken"]))?;
    assert_eq!(results[0].scalar_value_f32()?, 7.0);
    Ok(())
}

#[test]
fn disposed_executor_rejects_calls_and_frees_weights() -> Result<()> {
    let graph = Arc::new(add_neg_graph()?);
    let bias = Tensor::from_f32(vec![2], vec![1.0, 2.0])?;
    let executor = GraphExecutor::new(graph, Arc::new(CpuKernels::new()))
        .with_weights(HashMap::from([("bias".to_owned(), vec![bias.clone()])]));

    executor.dispose();
    assert!(bias.is_disposed());

    let err = executor
        .execute(feed(Tensor::from_f32(vec![2], vec![0.0, 0.0])?), None)
        .unwrap_err();
    assert!(
        matches!(err.downcast_ref::<ExecutorError>(), Some(ExecutorError::Disposed)),
        "{err}"
    );
    Ok(())
}
