//! Graph nodes: op identity, input wiring, and parameter mappings.
//!
//! A node's executor does not read its inputs positionally. Named input
//! params map a logical parameter ("a", "axis", "indices") onto an input edge
//! index, and attr params carry literal values baked into the graph. This
//! mirrors how serialized graphs describe ops and keeps the per-category
//! executors independent of any particular wire format.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::tensor::DType;

/// Executor category an op dispatches through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpCategory {
    Arithmetic,
    BasicMath,
    Control,
    Convolution,
    Creation,
    Dynamic,
    Evaluation,
    Graph,
    Image,
    Logical,
    Matrices,
    Normalization,
    Reduction,
    SliceJoin,
    Spectral,
    Transformation,
}

impl OpCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            OpCategory::Arithmetic => "arithmetic",
            OpCategory::BasicMath => "basic_math",
            OpCategory::Control => "control",
            OpCategory::Convolution => "convolution",
            OpCategory::Creation => "creation",
            OpCategory::Dynamic => "dynamic",
            OpCategory::Evaluation => "evaluation",
            OpCategory::Graph => "graph",
            OpCategory::Image => "image",
            OpCategory::Logical => "logical",
            OpCategory::Matrices => "matrices",
            OpCategory::Normalization => "normalization",
            OpCategory::Reduction => "reduction",
            OpCategory::SliceJoin => "slice_join",
            OpCategory::Spectral => "spectral",
            OpCategory::Transformation => "transformation",
        }
    }

    /// Category lookup for every op the dispatcher knows.
    pub fn of(op: &str) -> Option<OpCategory> {
        let category = match op {
            "Add" | "AddV2" | "AddN" | "Sub" | "Mul" | "Div" | "RealDiv" | "FloorDiv" | "Mod"
            | "Pow" | "Maximum" | "Minimum" | "SquaredDifference" => OpCategory::Arithmetic,
            "Abs" | "Neg" | "Exp" | "Log" | "Sqrt" | "Rsqrt" | "Square" | "Reciprocal"
            | "Relu" | "Relu6" | "Elu" | "Selu" | "Sigmoid" | "Tanh" | "Floor" | "Ceil"
            | "Round" | "Sign" | "ClipByValue" => OpCategory::BasicMath,
            "Switch" | "Merge" | "Enter" | "Exit" | "NextIteration" | "LoopCond"
            | "TensorArrayV3" | "TensorArrayWriteV3" | "TensorArrayReadV3"
            | "TensorArrayGatherV3" | "TensorArrayScatterV3" | "TensorArrayConcatV3"
            | "TensorArraySplitV3" | "TensorArraySizeV3" | "TensorArrayCloseV3"
            | "EmptyTensorList" | "TensorListReserve" | "TensorListFromTensor"
            | "TensorListScatter" | "TensorListScatterV2" | "TensorListGather"
            | "TensorListGetItem" | "TensorListSetItem" | "TensorListStack"
            | "TensorListSplit" | "TensorListConcat" | "TensorListPushBack"
            | "TensorListPopBack" => OpCategory::Control,
            "Conv2D" | "MaxPool" | "AvgPool" => OpCategory::Convolution,
            "Fill" | "Range" | "ZerosLike" | "OnesLike" | "RandomUniform"
            | "RandomStandardNormal" => OpCategory::Creation,
            "Where" | "ListDiff" => OpCategory::Dynamic,
            "ArgMax" | "ArgMin" | "TopKV2" => OpCategory::Evaluation,
            "Const" | "Placeholder" | "PlaceholderWithDefault" | "Identity" | "Snapshot"
            | "StopGradient" | "Shape" | "ShapeN" | "Size" | "Rank" | "NoOp" => OpCategory::Graph,
            "ResizeBilinear" | "ResizeNearestNeighbor" => OpCategory::Image,
            "LogicalAnd" | "LogicalOr" | "LogicalNot" | "Equal" | "NotEqual" | "Greater"
            | "GreaterEqual" | "Less" | "LessEqual" | "Select" | "SelectV2" => OpCategory::Logical,
            "MatMul" | "BatchMatMul" | "BatchMatMulV2" | "Transpose" => OpCategory::Matrices,
            "Softmax" | "LogSoftmax" => OpCategory::Normalization,
            "Max" | "Min" | "Sum" | "Mean" | "Prod" | "All" | "Any" => OpCategory::Reduction,
            "Concat" | "ConcatV2" | "Gather" | "GatherV2" | "Slice" | "Split" | "SplitV"
            | "Pack" | "Unpack" | "Tile" | "Reverse" | "ReverseV2" => OpCategory::SliceJoin,
            "FFT" | "IFFT" | "RFFT" | "IRFFT" => OpCategory::Spectral,
            "Cast" | "Reshape" | "ExpandDims" | "Squeeze" | "Pad" | "PadV2" => {
                OpCategory::Transformation
            }
            _ => return None,
        };
        Some(category)
    }
}

/// How a named parameter is materialized from a node's input edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputParamKind {
    /// A single tensor at one input index.
    Tensor,
    /// All input tensors from a start index to the end of the list, minus
    /// `trailing` inputs that carry other params.
    Tensors,
    /// A scalar value read out of the tensor at one input index.
    Number,
    /// A vector of values read out of the tensor at one input index.
    NumberArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputParam {
    pub start: usize,
    pub trailing: usize,
    pub kind: InputParamKind,
}

/// Literal attribute values baked into the graph definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    IntVec(Vec<i64>),
    /// Declared shape, `-1` marking unknown dimensions.
    Shape(Vec<i64>),
    DType(DType),
}

/// One operation in the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub op: String,
    pub category: OpCategory,
    /// Raw input references, possibly carrying an `:slot` suffix.
    pub input_names: Vec<String>,
    /// Base node names of the inputs, in edge order.
    pub inputs: Vec<String>,
    /// Names of nodes consuming any output of this node. Filled in by
    /// [`Graph::new`](super::Graph::new); duplicates are kept so consumer
    /// counts reflect multi-edge fan-out.
    pub children: Vec<String>,
    pub input_params: HashMap<String, InputParam>,
    pub attrs: HashMap<String, AttrValue>,
}

impl Node {
    pub fn new(name: impl Into<String>, op: impl Into<String>, category: OpCategory) -> Self {
        Node {
            name: name.into(),
            op: op.into(),
            category,
            input_names: Vec::new(),
            inputs: Vec::new(),
            children: Vec::new(),
            input_params: HashMap::new(),
            attrs: HashMap::new(),
        }
    }

    /// Builds a node for a cataloged op, inferring its category.
    pub fn for_op(name: impl Into<String>, op: impl Into<String>) -> anyhow::Result<Self> {
        let op = op.into();
        let category = OpCategory::of(&op)
            .ok_or_else(|| anyhow::anyhow!("op '{op}' is not in the op catalog"))?;
        Ok(Node::new(name, op, category))
    }

    pub fn with_inputs<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        for name in names {
            let raw: String = name.into();
            self.inputs.push(parse_node_name(&raw).0.to_owned());
            self.input_names.push(raw);
        }
        self
    }

    pub fn with_tensor_param(mut self, param: &str, index: usize) -> Self {
        self.input_params.insert(
            param.to_owned(),
            InputParam { start: index, trailing: 0, kind: InputParamKind::Tensor },
        );
        self
    }

    /// Variadic tensor param covering inputs `start..len - trailing`.
    pub fn with_tensors_param(mut self, param: &str, start: usize, trailing: usize) -> Self {
        self.input_params.insert(
            param.to_owned(),
            InputParam { start, trailing, kind: InputParamKind::Tensors },
        );
        self
    }

    pub fn with_number_param(mut self, param: &str, index: usize) -> Self {
        self.input_params.insert(
            param.to_owned(),
            InputParam { start: index, trailing: 0, kind: InputParamKind::Number },
        );
        self
    }

    pub fn with_number_array_param(mut self, param: &str, index: usize) -> Self {
        self.input_params.insert(
            param.to_owned(),
            InputParam { start: index, trailing: 0, kind: InputParamKind::NumberArray },
        );
        self
    }

    pub fn with_attr(mut self, name: &str, value: AttrValue) -> Self {
        self.attrs.insert(name.to_owned(), value);
        self
    }

    pub fn is_control(&self) -> bool {
        self.category == OpCategory::Control
    }
}

/// Splits a tensor reference into its node name and output slot.
/// `"rnn/cell:1"` yields `("rnn/cell", 1)`; a bare name is slot 0.
pub fn parse_node_name(name: &str) -> (&str, usize) {
    match name.rsplit_once(':') {
        Some((base, slot)) => match slot.parse::<usize>() {
            Ok(slot) => (base, slot),
            Err(_) => (name, 0),
        },
        None => (name, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_name_slots() {
        assert_eq!(parse_node_name("add"), ("add", 0));
        assert_eq!(parse_node_name("switch:1"), ("switch", 1));
        assert_eq!(parse_node_name("scope/op:2"), ("scope/op", 2));
    }

    #[test]
    fn catalog_covers_core_ops() {
        assert_eq!(OpCategory::of("Add"), Some(OpCategory::Arithmetic));
        assert_eq!(OpCategory::of("Switch"), Some(OpCategory::Control));
        assert_eq!(OpCategory::of("Where"), Some(OpCategory::Dynamic));
        assert_eq!(OpCategory::of("FFT"), Some(OpCategory::Spectral));
        assert_eq!(OpCategory::of("NotAnOp"), None);
    }

    #[test]
    fn inputs_strip_slot_suffixes() {
        let node = Node::new("merge", "Merge", OpCategory::Control)
            .with_inputs(["switch:1", "iter"]);
        assert_eq!(node.inputs, vec!["switch", "iter"]);
        assert_eq!(node.input_names, vec!["switch:1", "iter"]);
    }
}
