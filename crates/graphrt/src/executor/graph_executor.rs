//! The graph executor: validation, compilation, and both execution modes.
//!
//! `execute` runs static graphs over a cached topological order. Graphs with
//! control flow or value-dependent ops go through `execute_async`, which
//! schedules nodes in waves: a stack of ready nodes is drained, executing
//! synchronous ops inline, while ops whose results depend on tensor values
//! (Switch, the TensorArray and TensorList families, Where, ListDiff) are
//! deferred and
//! resolved as a batch between waves. Children become ready once their
//! inputs are bound in the current context; Merge is special cased to become
//! ready on its first bound input.
//!
//! Intermediate tensors are disposed eagerly: when a node executes, its
//! outputs are credited with one consumer per child edge, and each of its
//! inputs gives up one credit, freeing the tensor on the last consumer.
//! Provided inputs, weights, and requested outputs are never disposed.

use anyhow::{anyhow, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::context::{ContextPath, ExecutionContext};
use super::error::ExecutorError;
use super::model_analysis::{execution_subgraph, topological_order, ExecutionSubgraph};
use crate::graph::{parse_node_name, AttrValue, Graph, Node};
use crate::kernels::Kernels;
use crate::ops::{self, utils, OpOutcome};
use crate::tensor::Tensor;

/// Tensors bound during one execution, keyed by node name and the frame path
/// they were produced under. Each value holds one slot per node output.
pub(crate) type TensorsMap = HashMap<(String, ContextPath), Vec<Option<Tensor>>>;

/// Executes a [`Graph`] against a [`Kernels`] backend.
pub struct GraphExecutor {
    graph: Arc<Graph>,
    kernels: Arc<dyn Kernels>,
    weight_map: HashMap<String, Vec<Tensor>>,
    weight_ids: HashSet<usize>,
    strict_input_check: bool,
    compiled: Mutex<HashMap<String, Arc<Vec<String>>>>,
    compile_cache_hits: AtomicU64,
    disposed: AtomicBool,
}

struct PendingNode {
    name: String,
    /// Binding key, fixed at dispatch time.
    key: (String, ContextPath),
    path: ContextPath,
    deferred: ops::DeferredOp,
}

impl GraphExecutor {
    pub fn new(graph: Arc<Graph>, kernels: Arc<dyn Kernels>) -> Self {
        GraphExecutor {
            graph,
            kernels,
            weight_map: HashMap::new(),
            weight_ids: HashSet::new(),
            strict_input_check: true,
            compiled: Mutex::new(HashMap::new()),
            compile_cache_hits: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    /// Installs the weight tensors backing the graph's `Const` nodes.
    /// Weights are owned by the caller and never disposed by the executor.
    pub fn with_weights(mut self, weights: HashMap<String, Vec<Tensor>>) -> Self {
        self.weight_ids = weights.values().flatten().map(Tensor::id).collect();
        self.weight_map = weights;
        self
    }

    /// With strict checking (the default) the provided inputs must exactly
    /// cover the graph's placeholders. Without it, any graph node may be fed
    /// and placeholders are only required when an output depends on them.
    pub fn with_strict_input_check(mut self, strict: bool) -> Self {
        self.strict_input_check = strict;
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Number of executions that reused a cached node ordering.
    pub fn compile_cache_hits(&self) -> u64 {
        self.compile_cache_hits.load(Ordering::SeqCst)
    }

    /// Releases the weights. The executor rejects all calls afterwards.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            for tensor in self.weight_map.values().flatten() {
                tensor.dispose();
            }
        }
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ExecutorError::Disposed.into());
        }
        Ok(())
    }

    /// Synchronous execution for static graphs. Fails with
    /// [`ExecutorError::DynamicGraphInSyncExecute`] when the required
    /// subgraph contains control flow or value-dependent ops.
    pub fn execute(
        &self,
        inputs: HashMap<String, Tensor>,
        outputs: Option<&[&str]>,
    ) -> Result<Vec<Tensor>> {
        self.ensure_usable()?;
        let output_names = self.normalize_outputs(outputs);
        self.check_inputs(&inputs)?;
        self.check_input_shape_and_type(&inputs)?;
        self.check_outputs(&output_names)?;

        let order = self.compile(&inputs, &output_names)?;
        debug!(nodes = order.len(), "executing compiled plan");

        let mut context = ExecutionContext::new();
        let (mut tensors_map, frozen) = self.seed_tensors_map(&inputs);
        let output_bases: HashSet<String> =
            output_names.iter().map(|n| parse_node_name(n).0.to_owned()).collect();
        let mut consumer_counts: HashMap<usize, usize> = HashMap::new();

        for name in order.iter() {
            let key = (name.clone(), ContextPath::root());
            if tensors_map.contains_key(&key) {
                continue;
            }
            let node = self
                .graph
                .node(name)
                .ok_or_else(|| anyhow!("compiled plan references unknown node '{name}'"))?;
            let tensors = match ops::execute_op(node, &tensors_map, &mut context, &*self.kernels)? {
                OpOutcome::Value(tensors) => tensors,
                OpOutcome::Deferred(_) => {
                    return Err(ExecutorError::DynamicGraphInSyncExecute {
                        node: node.name.clone(),
                        op: node.op.clone(),
                    }
                    .into());
                }
            };
            tensors_map.insert(key, tensors);
            check_tensor_for_disposal(
                &self.graph,
                node,
                name,
                &ContextPath::root(),
                &tensors_map,
                &context,
                &mut consumer_counts,
                &frozen,
                &output_bases,
            );
        }

        let results = self.collect_outputs(&output_names, &tensors_map, &context)?;
        let mut keep: HashSet<usize> = frozen;
        keep.extend(results.iter().map(Tensor::id));
        dispose_unkept(&tensors_map, &keep);
        Ok(results)
    }

    /// Executes graphs with control flow or value-dependent ops by wave
    /// scheduling. Also handles static graphs, at the cost of the dynamic
    /// bookkeeping.
    pub fn execute_async(
        &self,
        inputs: HashMap<String, Tensor>,
        outputs: Option<&[&str]>,
    ) -> Result<Vec<Tensor>> {
        self.ensure_usable()?;
        let output_names = self.normalize_outputs(outputs);
        self.check_inputs(&inputs)?;
        self.check_input_shape_and_type(&inputs)?;
        self.check_outputs(&output_names)?;

        let input_bases: HashSet<String> =
            inputs.keys().map(|n| parse_node_name(n).0.to_owned()).collect();
        let output_bases: Vec<String> =
            output_names.iter().map(|n| parse_node_name(n).0.to_owned()).collect();
        let weight_bases: HashSet<String> = self.graph.weights().iter().cloned().collect();
        let info = execution_subgraph(&self.graph, &input_bases, &output_bases, &weight_bases);
        if !info.missing_inputs.is_empty() {
            return Err(self.missing_input_error(&inputs, &output_names, &info.missing_inputs));
        }
        if info.dynamic_node.is_none() {
            warn!(
                "this graph has no control flow or value-dependent ops, \
                 execute() will run it faster"
            );
        }

        let mut context = ExecutionContext::new();
        let (mut tensors_map, frozen) = self.seed_tensors_map(&inputs);
        let output_base_set: HashSet<String> = output_bases.iter().cloned().collect();
        let mut consumer_counts: HashMap<usize, usize> = HashMap::new();

        // Seed the ready stack with every fed node and every weight, all in
        // the root context.
        let mut stack: Vec<(String, ContextPath)> = Vec::new();
        let mut added: HashSet<(String, ContextPath)> = HashSet::new();
        for name in input_bases.iter().chain(weight_bases.iter()) {
            if self.graph.contains(name) && info.used_nodes.contains(name) {
                let item = (name.clone(), ContextPath::root());
                if added.insert(item.clone()) {
                    stack.push(item);
                }
            }
        }

        while !stack.is_empty() {
            let pending = self.process_stack(
                &mut stack,
                &mut tensors_map,
                &mut context,
                &mut added,
                &mut consumer_counts,
                &frozen,
                &output_base_set,
                &info,
            )?;
            for item in pending {
                context.set_current_path(item.path.clone());
                let tensors = (item.deferred)(&*self.kernels, &mut context)?;
                let node = self
                    .graph
                    .node(&item.name)
                    .ok_or_else(|| anyhow!("scheduled unknown node '{}'", item.name))?;
                tensors_map.insert(item.key.clone(), tensors);
                check_tensor_for_disposal(
                    &self.graph,
                    node,
                    &item.key.0,
                    &item.key.1,
                    &tensors_map,
                    &context,
                    &mut consumer_counts,
                    &frozen,
                    &output_base_set,
                );
                process_child_nodes(
                    &self.graph,
                    node,
                    &mut stack,
                    &context,
                    &tensors_map,
                    &mut added,
                    &info.used_nodes,
                );
            }
        }

        let unresolved: Vec<&String> = output_bases
            .iter()
            .filter(|name| {
                let control = self.graph.node(name).map(|n| n.is_control()).unwrap_or(false);
                !control && utils::get_tensor(name, &tensors_map, &context).is_none()
            })
            .collect();
        if !unresolved.is_empty() {
            let provided: Vec<&String> = inputs.keys().collect();
            return Err(anyhow!(
                "cannot compute the outputs {unresolved:?} from the provided inputs {provided:?}"
            ));
        }

        let results = self.collect_outputs(&output_names, &tensors_map, &context)?;
        let mut keep: HashSet<usize> = frozen;
        keep.extend(results.iter().map(Tensor::id));
        dispose_unkept(&tensors_map, &keep);
        context.dispose(&keep);
        Ok(results)
    }

    /// Drains the ready stack, executing synchronous ops inline and
    /// collecting deferred ops for batch resolution.
    #[allow(clippy::too_many_arguments)]
    fn process_stack(
        &self,
        stack: &mut Vec<(String, ContextPath)>,
        tensors_map: &mut TensorsMap,
        context: &mut ExecutionContext,
        added: &mut HashSet<(String, ContextPath)>,
        consumer_counts: &mut HashMap<usize, usize>,
        frozen: &HashSet<usize>,
        output_bases: &HashSet<String>,
        info: &ExecutionSubgraph,
    ) -> Result<Vec<PendingNode>> {
        let mut pending = Vec::new();
        while let Some((name, path)) = stack.pop() {
            context.set_current_path(path.clone());
            let node = self
                .graph
                .node(&name)
                .ok_or_else(|| anyhow!("scheduled unknown node '{name}'"))?;

            // A constant-carrying Enter binds in the frame it was dispatched
            // from, so its key is fixed before the frame push happens.
            let pre_key = if node.op == "Enter" && attr_is_constant(node) {
                Some((name.clone(), context.current_path().clone()))
            } else {
                None
            };

            if tensors_map.contains_key(&(name.clone(), ContextPath::root())) {
                process_child_nodes(
                    &self.graph,
                    node,
                    stack,
                    context,
                    tensors_map,
                    added,
                    &info.used_nodes,
                );
                continue;
            }

            let outcome = ops::execute_op(node, tensors_map, context, &*self.kernels)?;
            let key =
                pre_key.unwrap_or_else(|| (name.clone(), context.current_path().clone()));
            match outcome {
                OpOutcome::Value(tensors) => {
                    tensors_map.insert(key.clone(), tensors);
                    check_tensor_for_disposal(
                        &self.graph,
                        node,
                        &key.0,
                        &key.1,
                        tensors_map,
                        context,
                        consumer_counts,
                        frozen,
                        output_bases,
                    );
                    process_child_nodes(
                        &self.graph,
                        node,
                        stack,
                        context,
                        tensors_map,
                        added,
                        &info.used_nodes,
                    );
                }
                OpOutcome::Deferred(deferred) => {
                    pending.push(PendingNode {
                        name,
                        key,
                        path: context.current_path().clone(),
                        deferred,
                    });
                }
            }
        }
        Ok(pending)
    }

    fn normalize_outputs(&self, outputs: Option<&[&str]>) -> Vec<String> {
        match outputs {
            Some(names) if !names.is_empty() => names.iter().map(|s| s.to_string()).collect(),
            _ => self.graph.outputs().to_vec(),
        }
    }

    fn check_inputs(&self, inputs: &HashMap<String, Tensor>) -> Result<()> {
        let not_in_graph: Vec<&str> = inputs
            .keys()
            .map(|name| parse_node_name(name).0)
            .filter(|base| !self.graph.contains(base))
            .collect();
        if !not_in_graph.is_empty() {
            return Err(ExecutorError::UnknownInput(not_in_graph.join(",")).into());
        }
        if self.strict_input_check {
            let fed: HashSet<&str> = inputs.keys().map(|name| parse_node_name(name).0).collect();
            let placeholders: HashSet<&str> =
                self.graph.placeholders().iter().map(String::as_str).collect();
            let extra: Vec<&&str> = fed.difference(&placeholders).collect();
            if !extra.is_empty() {
                return Err(anyhow!(
                    "the inputs {extra:?} are not graph placeholders; disable strict input \
                     checking to feed arbitrary nodes"
                ));
            }
            let mut missing: Vec<&str> = placeholders.difference(&fed).copied().collect();
            if !missing.is_empty() {
                missing.sort_unstable();
                let provided: Vec<&String> = inputs.keys().collect();
                let outputs = self.graph.outputs().join(",");
                return Err(ExecutorError::MissingInput {
                    outputs,
                    provided: provided.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(","),
                    missing: missing.join(","),
                }
                .into());
            }
        }
        Ok(())
    }

    fn check_input_shape_and_type(&self, inputs: &HashMap<String, Tensor>) -> Result<()> {
        for (name, tensor) in inputs {
            let base = parse_node_name(name).0;
            let Some(node) = self.graph.node(base) else { continue };
            if let Some(AttrValue::Shape(declared)) = node.attrs.get("shape") {
                if !tensor.shape().is_compatible_with(declared) {
                    return Err(ExecutorError::ShapeMismatch {
                        name: base.to_owned(),
                        expected: declared.clone(),
                        actual: tensor.shape().clone(),
                    }
                    .into());
                }
            }
            if let Some(AttrValue::DType(declared)) = node.attrs.get("dtype") {
                if tensor.dtype() != *declared {
                    return Err(ExecutorError::DTypeMismatch {
                        name: base.to_owned(),
                        expected: *declared,
                        actual: tensor.dtype(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn check_outputs(&self, outputs: &[String]) -> Result<()> {
        for name in outputs {
            let base = parse_node_name(name).0;
            if !self.graph.contains(base) {
                return Err(ExecutorError::OutputNotFound(name.clone()).into());
            }
        }
        Ok(())
    }

    /// Looks up or builds the topological order for one input/output
    /// signature. The cache key is insensitive to map iteration order.
    fn compile(
        &self,
        inputs: &HashMap<String, Tensor>,
        outputs: &[String],
    ) -> Result<Arc<Vec<String>>> {
        let mut input_names: Vec<&str> = inputs.keys().map(String::as_str).collect();
        input_names.sort_unstable();
        let mut sorted_outputs: Vec<&str> = outputs.iter().map(String::as_str).collect();
        sorted_outputs.sort_unstable();
        let key = format!("{}--{}", input_names.join(","), sorted_outputs.join(","));

        let mut cache = self.compiled.lock().expect("compile cache mutex poisoned");
        if let Some(order) = cache.get(&key) {
            self.compile_cache_hits.fetch_add(1, Ordering::SeqCst);
            return Ok(Arc::clone(order));
        }

        let input_bases: HashSet<String> =
            inputs.keys().map(|n| parse_node_name(n).0.to_owned()).collect();
        let output_bases: Vec<String> =
            outputs.iter().map(|n| parse_node_name(n).0.to_owned()).collect();
        let weight_bases: HashSet<String> = self.graph.weights().iter().cloned().collect();
        let info = execution_subgraph(&self.graph, &input_bases, &output_bases, &weight_bases);
        if let Some((node, op)) = info.dynamic_node {
            return Err(ExecutorError::DynamicGraphInSyncExecute { node, op }.into());
        }
        if !info.missing_inputs.is_empty() {
            return Err(self.missing_input_error(inputs, outputs, &info.missing_inputs));
        }
        let seed: Vec<String> = input_bases.into_iter().collect();
        let order = Arc::new(topological_order(&self.graph, &seed, &info.used_nodes));
        cache.insert(key, Arc::clone(&order));
        Ok(order)
    }

    fn missing_input_error(
        &self,
        inputs: &HashMap<String, Tensor>,
        outputs: &[String],
        missing: &[String],
    ) -> anyhow::Error {
        let mut provided: Vec<&str> = inputs.keys().map(String::as_str).collect();
        provided.sort_unstable();
        ExecutorError::MissingInput {
            outputs: outputs.join(","),
            provided: provided.join(","),
            missing: missing.join(","),
        }
        .into()
    }

    /// Binds weights and provided inputs in the root context and reports the
    /// set of tensor ids eager disposal must never touch.
    fn seed_tensors_map(
        &self,
        inputs: &HashMap<String, Tensor>,
    ) -> (TensorsMap, HashSet<usize>) {
        let mut map: TensorsMap = HashMap::new();
        let mut frozen: HashSet<usize> = self.weight_ids.clone();
        for (name, tensors) in &self.weight_map {
            map.insert(
                (name.clone(), ContextPath::root()),
                tensors.iter().cloned().map(Some).collect(),
            );
        }
        for (name, tensor) in inputs {
            let (base, slot) = parse_node_name(name);
            let entry = map.entry((base.to_owned(), ContextPath::root())).or_default();
            if entry.len() <= slot {
                entry.resize(slot + 1, None);
            }
            entry[slot] = Some(tensor.clone());
            frozen.insert(tensor.id());
        }
        (map, frozen)
    }

    fn collect_outputs(
        &self,
        outputs: &[String],
        tensors_map: &TensorsMap,
        context: &ExecutionContext,
    ) -> Result<Vec<Tensor>> {
        outputs
            .iter()
            .map(|name| {
                utils::get_tensor(name, tensors_map, context)
                    .ok_or_else(|| anyhow!("the output '{name}' was not produced by the execution"))
            })
            .collect()
    }
}

impl Drop for GraphExecutor {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn attr_is_constant(node: &Node) -> bool {
    matches!(node.attrs.get("is_constant"), Some(AttrValue::Bool(true)))
}

/// Pushes every child of `node` whose inputs are all bound in the current
/// context. Merge children are ready as soon as any one input is bound.
fn process_child_nodes(
    graph: &Graph,
    node: &Node,
    stack: &mut Vec<(String, ContextPath)>,
    context: &ExecutionContext,
    tensors_map: &TensorsMap,
    added: &mut HashSet<(String, ContextPath)>,
    used_nodes: &HashSet<String>,
) {
    for child_name in &node.children {
        let item = (child_name.clone(), context.current_path().clone());
        if added.contains(&item) || !used_nodes.contains(child_name) {
            continue;
        }
        let Some(child) = graph.node(child_name) else { continue };
        let ready = if child.op == "Merge" {
            child
                .input_names
                .iter()
                .any(|input| utils::get_tensor(input, tensors_map, context).is_some())
        } else {
            child
                .input_names
                .iter()
                .all(|input| utils::get_tensor(input, tensors_map, context).is_some())
        };
        if ready {
            added.insert(item.clone());
            stack.push(item);
        }
    }
}

/// Eager disposal accounting, run right after a node binds its outputs.
///
/// The node's fresh outputs are credited with one pending consumer per child
/// edge; each of its inputs then pays one credit, and a tensor whose credit
/// reaches zero is disposed. Control nodes and requested outputs are exempt,
/// as are frozen tensors (inputs and weights).
#[allow(clippy::too_many_arguments)]
fn check_tensor_for_disposal(
    graph: &Graph,
    node: &Node,
    node_name: &str,
    node_path: &ContextPath,
    tensors_map: &TensorsMap,
    context: &ExecutionContext,
    consumer_counts: &mut HashMap<usize, usize>,
    frozen: &HashSet<usize>,
    output_bases: &HashSet<String>,
) {
    if node.is_control() || (node_path.is_root() && output_bases.contains(node_name)) {
        return;
    }

    if let Some(tensors) = tensors_map.get(&(node_name.to_owned(), node_path.clone())) {
        for tensor in tensors.iter().flatten() {
            *consumer_counts.entry(tensor.id()).or_insert(0) += node.children.len();
        }
    }

    for input_name in &node.inputs {
        let from_control =
            graph.node(input_name).map(|input| input.is_control()).unwrap_or(false);
        if from_control {
            continue;
        }
        // Disposal only considers tensors produced in this exact context;
        // outer-frame values are owned by their own frame.
        let key = (input_name.clone(), context.current_path().clone());
        let Some(tensors) = tensors_map.get(&key) else { continue };
        for tensor in tensors.iter().flatten() {
            if frozen.contains(&tensor.id()) {
                continue;
            }
            match consumer_counts.get(&tensor.id()).copied() {
                Some(1) => {
                    tensor.dispose();
                    consumer_counts.remove(&tensor.id());
                }
                Some(count) => {
                    consumer_counts.insert(tensor.id(), count - 1);
                }
                None => {}
            }
        }
    }
}

/// Backstop for tensors eager disposal could not reach, e.g. values produced
/// inside loop iterations that never fed another node.
fn dispose_unkept(tensors_map: &TensorsMap, keep: &HashSet<usize>) {
    for tensors in tensors_map.values() {
        for tensor in tensors.iter().flatten() {
            if !keep.contains(&tensor.id()) {
                tensor.dispose();
            }
        }
    }
}
