//! Static analysis of one execution request.
//!
//! Before running anything the executor walks backwards from the requested
//! outputs to find the subgraph that actually has to run, which inputs are
//! still unaccounted for, and whether the subgraph contains control flow or
//! value-dependent ops that force the wave scheduler. The forward pass then
//! produces a topological order seeded from the provided inputs and weights.

use std::collections::HashSet;

use crate::graph::{Graph, OpCategory};

/// Result of the backward reachability walk.
#[derive(Debug, Default)]
pub struct ExecutionSubgraph {
    /// Names of every node the execution must evaluate or consume.
    pub used_nodes: HashSet<String>,
    /// Placeholders reachable from the outputs that no input feeds.
    pub missing_inputs: Vec<String>,
    /// First reachable node whose op forces asynchronous execution, with its
    /// op name.
    pub dynamic_node: Option<(String, String)>,
}

/// Walks backwards from `outputs`, stopping at provided inputs and weights.
pub fn execution_subgraph(
    graph: &Graph,
    input_names: &HashSet<String>,
    output_names: &[String],
    weight_names: &HashSet<String>,
) -> ExecutionSubgraph {
    let mut info = ExecutionSubgraph::default();
    let mut frontier: Vec<String> = output_names.to_vec();
    while let Some(name) = frontier.pop() {
        if info.used_nodes.contains(&name) {
            continue;
        }
        info.used_nodes.insert(name.clone());
        let Some(node) = graph.node(&name) else { continue };
        if info.dynamic_node.is_none()
            && matches!(node.category, OpCategory::Control | OpCategory::Dynamic)
        {
            info.dynamic_node = Some((node.name.clone(), node.op.clone()));
        }
        if input_names.contains(&name) {
            continue;
        }
        if weight_names.contains(&name) {
            continue;
        }
        if matches!(node.op.as_str(), "Placeholder" | "PlaceholderWithDefault") {
            info.missing_inputs.push(name);
            continue;
        }
        for input in &node.inputs {
            frontier.push(input.clone());
        }
    }
    info
}

/// Forward topological order over `used_nodes`, seeded from the provided
/// inputs and the graph's weights. A node is scheduled once every one of its
/// inputs has been scheduled, so the result is only complete for graphs
/// without control flow cycles.
pub fn topological_order(
    graph: &Graph,
    input_names: &[String],
    used_nodes: &HashSet<String>,
) -> Vec<String> {
    let mut frontier: Vec<String> = Vec::new();
    let mut seeded: HashSet<String> = HashSet::new();
    for name in input_names.iter().chain(graph.weights()) {
        // A weight outside the used subgraph has nothing to feed.
        if used_nodes.contains(name) && seeded.insert(name.clone()) {
            frontier.push(name.clone());
        }
    }

    let mut visited: HashSet<String> = HashSet::new();
    let mut order: Vec<String> = Vec::new();
    while let Some(name) = frontier.pop() {
        if !visited.insert(name.clone()) {
            continue;
        }
        order.push(name.clone());
        let Some(node) = graph.node(&name) else { continue };
        for child in &node.children {
            if visited.contains(child) || !used_nodes.contains(child) {
                continue;
            }
            let child_node = graph.node(child).expect("children reference graph nodes");
            if child_node.inputs.iter().all(|input| visited.contains(input)) {
                frontier.push(child.clone());
            }
        }
    }
    order
}
