//! Graph-level intermediate representation.
//!
//! A [`Graph`] is a tree of [`Block`]s. Each block is an ordered list of
//! [`Node`]s, and nodes consume and produce SSA [`Value`]s. Control-flow
//! nodes (`prim::If`, `prim::Loop`) own nested blocks. All three entity
//! kinds live in arenas owned by the graph and are addressed by handle.

use crate::arena::{Arena, Handle};
use crate::types::{Constant, Device, TensorType, Type};

/// What a node does.
///
/// The set is closed: anything that is neither a known primitive nor a
/// built-in `aten::` operator is [`NodeKind::Other`].
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// Two-way conditional; owns a true block and a false block.
    If,
    /// Counted/conditional loop; owns one body block.
    Loop,
    /// Call through a function value (first input).
    CallFunction,
    /// Method call on a module object (first input).
    CallMethod { name: String },
    /// Compile-time constant.
    Constant(Constant),
    /// Builds a list from its inputs.
    ListConstruct,
    /// Splits a list into its elements.
    ListUnpack,
    /// Built-in tensor operator, e.g. `aten::add`.
    Operator(String),
    /// Any other primitive, e.g. `prim::device`.
    Other(String),
}

impl NodeKind {
    /// The fully qualified name used in the textual IR.
    pub fn qualified_name(&self) -> &str {
        match self {
            Self::If => "prim::If",
            Self::Loop => "prim::Loop",
            Self::CallFunction => "prim::CallFunction",
            Self::CallMethod { .. } => "prim::CallMethod",
            Self::Constant(_) => "prim::Constant",
            Self::ListConstruct => "prim::ListConstruct",
            Self::ListUnpack => "prim::ListUnpack",
            Self::Operator(name) | Self::Other(name) => name,
        }
    }
}

/// An SSA value.
#[derive(Clone, Debug)]
pub struct Value {
    /// Debug name, printed as `%name`.
    pub name: Option<String>,
    pub ty: Type,
    /// The node that defines this value; `None` for block parameters.
    pub producer: Option<Handle<Node>>,
}

/// An operation instance.
#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub inputs: Vec<Handle<Value>>,
    pub outputs: Vec<Handle<Value>>,
    /// Nested blocks: `[true, false]` for `If`, `[body]` for `Loop`.
    pub blocks: Vec<Handle<Block>>,
}

/// An ordered sequence of nodes with parameters and exit values.
#[derive(Clone, Debug, Default)]
pub struct Block {
    pub params: Vec<Handle<Value>>,
    pub nodes: Vec<Handle<Node>>,
    /// Values yielded when control falls off the end of the block.
    pub outputs: Vec<Handle<Value>>,
}

/// Result of statically evaluating a value that is expected to be a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StaticDevice {
    /// A constant device.
    Known(Device),
    /// A constant `None`: the argument was not supplied.
    Absent,
    /// Computed at runtime, or a constant of some other type.
    Indeterminate,
}

/// A computation graph with nested control-flow blocks.
#[derive(Clone, Debug)]
pub struct Graph {
    pub nodes: Arena<Node>,
    pub values: Arena<Value>,
    pub blocks: Arena<Block>,
    root: Handle<Block>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Creates an empty graph with a single top-level block.
    pub fn new() -> Self {
        let mut blocks = Arena::new();
        let root = blocks.append(Block::default());
        Self {
            nodes: Arena::new(),
            values: Arena::new(),
            blocks,
            root,
        }
    }

    /// The top-level block.
    pub fn root(&self) -> Handle<Block> {
        self.root
    }

    /// Adds a graph input (a parameter of the top-level block).
    pub fn add_input(&mut self, name: impl Into<String>, ty: Type) -> Handle<Value> {
        self.add_block_param(self.root, Some(name.into()), ty)
    }

    /// Adds a parameter to `block`.
    ///
    /// # Panics
    ///
    /// Panics if `block` does not belong to this graph.
    pub fn add_block_param(
        &mut self,
        block: Handle<Block>,
        name: Option<String>,
        ty: Type,
    ) -> Handle<Value> {
        assert!(
            self.blocks.contains(block),
            "add_block_param: block {block:?} not in graph"
        );
        let value = self.values.append(Value {
            name,
            ty,
            producer: None,
        });
        self.blocks[block].params.push(value);
        value
    }

    /// Appends a node to the end of `block`, creating one output value per
    /// entry of `outputs`.
    ///
    /// # Panics
    ///
    /// Panics if `block` or any input handle does not belong to this graph.
    pub fn append_node(
        &mut self,
        block: Handle<Block>,
        kind: NodeKind,
        inputs: Vec<Handle<Value>>,
        outputs: Vec<(Option<String>, Type)>,
    ) -> Handle<Node> {
        assert!(
            self.blocks.contains(block),
            "append_node({}): block {block:?} not in graph",
            kind.qualified_name(),
        );
        for &input in &inputs {
            assert!(
                self.values.contains(input),
                "append_node({}): value {input:?} not registered in graph",
                kind.qualified_name(),
            );
        }

        let node = self.nodes.append(Node {
            kind,
            inputs,
            outputs: Vec::with_capacity(outputs.len()),
            blocks: Vec::new(),
        });
        for (name, ty) in outputs {
            let value = self.values.append(Value {
                name,
                ty,
                producer: Some(node),
            });
            self.nodes[node].outputs.push(value);
        }
        self.blocks[block].nodes.push(node);
        node
    }

    /// Appends a `prim::Constant` node and returns its single output.
    pub fn add_constant(&mut self, block: Handle<Block>, constant: Constant) -> Handle<Value> {
        let ty = constant.ty();
        let node = self.append_node(block, NodeKind::Constant(constant), vec![], vec![(None, ty)]);
        self.nodes[node].outputs[0]
    }

    /// Creates a new, empty block nested in `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` does not belong to this graph.
    pub fn add_block(&mut self, node: Handle<Node>) -> Handle<Block> {
        assert!(
            self.nodes.contains(node),
            "add_block: node {node:?} not in graph"
        );
        let block = self.blocks.append(Block::default());
        self.nodes[node].blocks.push(block);
        block
    }

    /// Sets the exit values of `block`.
    ///
    /// # Panics
    ///
    /// Panics if any handle does not belong to this graph.
    pub fn set_block_outputs(&mut self, block: Handle<Block>, outputs: Vec<Handle<Value>>) {
        for &value in &outputs {
            assert!(
                self.values.contains(value),
                "set_block_outputs: value {value:?} not registered in graph"
            );
        }
        self.blocks[block].outputs = outputs;
    }

    /// Sets the graph outputs (exit values of the top-level block).
    pub fn set_outputs(&mut self, outputs: Vec<Handle<Value>>) {
        self.set_block_outputs(self.root, outputs);
    }

    pub fn inputs(&self) -> &[Handle<Value>] {
        &self.blocks[self.root].params
    }

    pub fn outputs(&self) -> &[Handle<Value>] {
        &self.blocks[self.root].outputs
    }

    /// The single output of `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` does not have exactly one output.
    pub fn output(&self, node: Handle<Node>) -> Handle<Value> {
        let outputs = &self.nodes[node].outputs;
        assert_eq!(
            outputs.len(),
            1,
            "output: {} has {} outputs",
            self.nodes[node].kind.qualified_name(),
            outputs.len()
        );
        outputs[0]
    }

    /// The tensor type of `value`, if it is tensor-typed.
    pub fn tensor_type(&self, value: Handle<Value>) -> Option<&TensorType> {
        self.values[value].ty.as_tensor()
    }

    /// The device annotation of `value`; `None` for unknown or non-tensor.
    pub fn device(&self, value: Handle<Value>) -> Option<Device> {
        self.tensor_type(value).and_then(|t| t.device)
    }

    /// Overwrites the device annotation of a tensor-typed value.
    ///
    /// Returns `true` if the annotation changed. Writing the current
    /// annotation again is a no-op. Non-tensor values are left alone and
    /// report no change.
    pub fn set_device(&mut self, value: Handle<Value>, device: Option<Device>) -> bool {
        match &mut self.values[value].ty {
            Type::Tensor(tensor) if tensor.device != device => {
                *tensor = tensor.with_device(device);
                true
            }
            _ => false,
        }
    }

    /// The constant `value` evaluates to, if it is produced by a
    /// `prim::Constant` node.
    pub fn constant_value(&self, value: Handle<Value>) -> Option<&Constant> {
        let producer = self.values[value].producer?;
        match &self.nodes[producer].kind {
            NodeKind::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// Statically evaluates `value` as a device argument.
    pub fn static_device(&self, value: Handle<Value>) -> StaticDevice {
        match self.constant_value(value) {
            Some(Constant::Device(device)) => StaticDevice::Known(*device),
            Some(Constant::None) => StaticDevice::Absent,
            Some(_) | None => StaticDevice::Indeterminate,
        }
    }

    /// A printable `%name` for `value`, falling back to its handle index.
    pub fn value_name(&self, value: Handle<Value>) -> String {
        match &self.values[value].name {
            Some(name) => format!("%{name}"),
            None => format!("%{}", value.index()),
        }
    }
}
