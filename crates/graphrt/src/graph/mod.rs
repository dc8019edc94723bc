//! The static dataflow graph model executed by [`crate::executor`].

#[allow(clippy::module_inception)]
mod graph;
mod node;

pub use graph::Graph;
pub use node::{parse_node_name, AttrValue, InputParam, InputParamKind, Node, OpCategory};
