//! Tensor lifetime accounting across whole executions.
//!
//! These tests assert exact values of the process-wide live tensor counter,
//! so they serialize on a lock and live in their own test binary where no
//! other test creates tensors concurrently.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use graphrt::graph::AttrValue;
use graphrt::tensor::live_tensor_count;
use graphrt::{Graph, GraphExecutor, Node, Tensor};
use graphrt_backend_ref_cpu::CpuKernels;

static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

fn add_neg_graph() -> Result<Graph> {
    Graph::new(vec![
        Node::for_op("input", "Placeholder")?,
        Node::for_op("bias", "Const")?,
        Node::for_op("add", "Add")?
            .with_inputs(["input", "bias"])
            .with_tensor_param("a", 0)
            .with_tensor_param("b", 1),
        Node::for_op("neg", "Neg")?.with_inputs(["add"]).with_tensor_param("x", 0),
    ])
}

#[test]
fn sync_execution_frees_every_intermediate() -> Result<()> {
    let _guard = serial();
    let before = live_tensor_count();

    let input = Tensor::from_f32(vec![2], vec![1.0, 1.0])?;
    let bias = Tensor::from_f32(vec![2], vec![1.0, 2.0])?;
    let executor = GraphExecutor::new(Arc::new(add_neg_graph()?), Arc::new(CpuKernels::new()))
        .with_weights(HashMap::from([("bias".to_owned(), vec![bias])]));
    assert_eq!(live_tensor_count(), before + 2);

    let results =
        executor.execute(HashMap::from([("input".to_owned(), input.clone())]), None)?;
    // Exactly the input, the weight, and the result survive the run.
    assert_eq!(live_tensor_count(), before + 3);
    assert!(!input.is_disposed());
    assert_eq!(results[0].f32_data()?.as_ref(), &[-2.0, -3.0]);

    drop(executor);
    assert_eq!(live_tensor_count(), before + 2);
    input.dispose();
    results[0].dispose();
    assert_eq!(live_tensor_count(), before);
    Ok(())
}

#[test]
fn repeated_executions_do_not_accumulate_tensors() -> Result<()> {
    let _guard = serial();
    let before = live_tensor_count();

    let bias = Tensor::from_f32(vec![2], vec![1.0, 2.0])?;
    let executor = GraphExecutor::new(Arc::new(add_neg_graph()?), Arc::new(CpuKernels::new()))
        .with_weights(HashMap::from([("bias".to_owned(), vec![bias])]));

    for _ in 0..3 {
        let input = Tensor::from_f32(vec![2], vec![1.0, 1.0])?;
        let results =
            executor.execute(HashMap::from([("input".to_owned(), input.clone())]), None)?;
        input.dispose();
        for tensor in &results {
            tensor.dispose();
        }
    }
    // Only the weight remains.
    assert_eq!(live_tensor_count(), before + 1);
    drop(executor);
    assert_eq!(live_tensor_count(), before);
    Ok(())
}

#[test]
fn loop_execution_frees_per_iteration_tensors() -> Result<()> {
    let _guard = serial();
    let before = live_tensor_count();

    let frame = AttrValue::Str("loop".to_owned());
    let graph = Graph::new(vec![
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
    ])?;

    let init = Tensor::scalar_f32(0.0);
    let weights = HashMap::from([
        ("limit".to_owned(), vec![Tensor::scalar_f32(3.0)]),
        ("one".to_owned(), vec![Tensor::scalar_f32(1.0)]),
    ]);
    let executor =
        GraphExecutor::new(Arc::new(graph), Arc::new(CpuKernels::new())).with_weights(weights);
    assert_eq!(live_tensor_count(), before + 3);

    let results = executor
        .execute_async(HashMap::from([("init".to_owned(), init.clone())]), Some(&["exit"]))?;
    assert_eq!(results[0].scalar_value_f32()?, 3.0);
    // Three iterations' worth of merge, comparison, switch, and body tensors
    // are gone; the input, both weights, and the result remain.
    assert_eq!(live_tensor_count(), before + 4);

    executor.dispose();
    init.dispose();
    results[0].dispose();
    assert_eq!(live_tensor_count(), before);
    Ok(())
}
