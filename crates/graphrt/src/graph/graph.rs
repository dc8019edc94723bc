//! Whole-graph structure: node table, derived edges, and role sets.

use anyhow::{bail, Result};
use std::collections::HashMap;

use super::node::{Node, OpCategory};

/// An immutable dataflow graph, validated and with children edges resolved.
#[derive(Debug)]
pub struct Graph {
    nodes: HashMap<String, Node>,
    order: Vec<String>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    placeholders: Vec<String>,
    weights: Vec<String>,
    has_control_flow: bool,
    has_dynamic_ops: bool,
}

impl Graph {
    /// Validates the node list and derives children edges and role sets.
    ///
    /// Roles follow the structure, not op names alone: inputs are nodes with
    /// no incoming edges, outputs are nodes with no consumers, placeholders
    /// and weights are `Placeholder` and `Const` nodes respectively.
    pub fn new(node_list: Vec<Node>) -> Result<Graph> {
        let mut nodes: HashMap<String, Node> = HashMap::with_capacity(node_list.len());
        let mut order = Vec::with_capacity(node_list.len());
        for node in node_list {
            if nodes.contains_key(&node.name) {
                bail!("duplicate node name '{}'", node.name);
            }
            order.push(node.name.clone());
            nodes.insert(node.name.clone(), node);
        }

        // Children are appended in node declaration order, keeping duplicate
        // edges so fan-out counts match actual consumption.
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for name in &order {
            let inputs = nodes[name].inputs.clone();
            for input in inputs {
                if !nodes.contains_key(&input) {
                    bail!("node '{name}' references unknown input '{input}'");
                }
                children.entry(input).or_default().push(name.clone());
            }
        }
        for (name, kids) in children {
            nodes.get_mut(&name).expect("child map key came from node table").children = kids;
        }

        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        let mut placeholders = Vec::new();
        let mut weights = Vec::new();
        let mut has_control_flow = false;
        let mut has_dynamic_ops = false;
        for name in &order {
            let node = &nodes[name];
            if node.inputs.is_empty() {
                inputs.push(name.clone());
            }
            if node.children.is_empty() {
                outputs.push(name.clone());
            }
            match node.op.as_str() {
                "Placeholder" | "PlaceholderWithDefault" => placeholders.push(name.clone()),
                "Const" => weights.push(name.clone()),
                _ => {}
            }
            match node.category {
                OpCategory::Control => has_control_flow = true,
                OpCategory::Dynamic => has_dynamic_ops = true,
                _ => {}
            }
        }

        Ok(Graph {
            nodes,
            order,
            inputs,
            outputs,
            placeholders,
            weights,
            has_control_flow,
            has_dynamic_ops,
        })
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Node names in declaration order.
    pub fn node_names(&self) -> &[String] {
        &self.order
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    pub fn weights(&self) -> &[String] {
        &self.weights
    }

    pub fn has_control_flow(&self) -> bool {
        self.has_control_flow
    }

    pub fn has_dynamic_ops(&self) -> bool {
        self.has_dynamic_ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::OpCategory;

    fn diamond() -> Graph {
        // input -> intermediate -> output, with input also feeding output.
        let nodes = vec![
            Node::new("input", "Placeholder", OpCategory::Graph),
            Node::new("intermediate", "Identity", OpCategory::Graph).with_inputs(["input"]),
            Node::new("output", "Add", OpCategory::Arithmetic)
                .with_inputs(["intermediate", "input"]),
        ];
        Graph::new(nodes).unwrap()
    }

    #[test]
    fn children_and_roles_are_derived() {
        let g = diamond();
        assert_eq!(g.node("input").unwrap().children, vec!["intermediate", "output"]);
        assert_eq!(g.inputs(), ["input"]);
        assert_eq!(g.outputs(), ["output"]);
        assert_eq!(g.placeholders(), ["input"]);
        assert!(g.weights().is_empty());
        assert!(!g.has_control_flow());
    }

    #[test]
    fn unknown_input_is_rejected() {
        let nodes = vec![Node::new("a", "Identity", OpCategory::Graph).with_inputs(["ghost"])];
        assert!(Graph::new(nodes).is_err());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let nodes = vec![
            Node::new("a", "Placeholder", OpCategory::Graph),
            Node::new("a", "Identity", OpCategory::Graph),
        ];
        assert!(Graph::new(nodes).is_err());
    }

    #[test]
    fn duplicate_edges_kept_in_children() {
        let nodes = vec![
            Node::new("x", "Placeholder", OpCategory::Graph),
            Node::new("sq", "Mul", OpCategory::Arithmetic).with_inputs(["x", "x"]),
        ];
        let g = Graph::new(nodes).unwrap();
        assert_eq!(g.node("x").unwrap().children, vec!["sq", "sq"]);
    }
}
