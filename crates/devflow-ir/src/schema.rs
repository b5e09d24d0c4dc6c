//! Operator schemas and the registry that resolves a node to its schema.

use std::collections::HashMap;

use crate::arena::Handle;
use crate::graph::{Graph, Node, NodeKind};
use crate::types::Type;

/// A declared operator parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Argument {
    pub name: String,
    pub ty: Type,
}

/// The signature of one overload of a built-in operator.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionSchema {
    /// Qualified operator name, e.g. `aten::to`.
    pub name: String,
    /// Overload name, e.g. `device`; empty for the default overload.
    pub overload: String,
    pub arguments: Vec<Argument>,
    pub returns: Vec<Type>,
}

impl FunctionSchema {
    pub fn new(name: impl Into<String>, overload: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overload: overload.into(),
            arguments: Vec::new(),
            returns: Vec::new(),
        }
    }

    /// Appends a parameter.
    pub fn arg(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.arguments.push(Argument {
            name: name.into(),
            ty,
        });
        self
    }

    /// Appends a return type.
    pub fn returns(mut self, ty: Type) -> Self {
        self.returns.push(ty);
        self
    }

    /// Returns `true` if the given input types can be bound to this
    /// overload's parameters, position by position.
    pub fn accepts<'a>(&self, inputs: impl ExactSizeIterator<Item = &'a Type>) -> bool {
        inputs.len() == self.arguments.len()
            && inputs
                .zip(&self.arguments)
                .all(|(ty, arg)| ty.is_subtype_of(&arg.ty))
    }
}

/// Overload sets of built-in operators, keyed by qualified name.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Vec<FunctionSchema>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with the built-in `aten` operators.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for schema in builtin_schemas() {
            registry.register(schema);
        }
        registry
    }

    /// Adds an overload. Overloads are tried in registration order.
    pub fn register(&mut self, schema: FunctionSchema) {
        self.schemas
            .entry(schema.name.clone())
            .or_default()
            .push(schema);
    }

    /// Number of registered overloads.
    pub fn len(&self) -> usize {
        self.schemas.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Resolves the schema of an operator node.
    ///
    /// Returns the first overload whose parameters accept the node's input
    /// types, or `None` if the node is not an operator or no overload fits.
    pub fn lookup(&self, graph: &Graph, node: Handle<Node>) -> Option<&FunctionSchema> {
        let node = &graph.nodes[node];
        let NodeKind::Operator(name) = &node.kind else {
            return None;
        };
        self.schemas.get(name)?.iter().find(|schema| {
            schema.accepts(node.inputs.iter().map(|&v| &graph.values[v].ty))
        })
    }
}

fn builtin_schemas() -> Vec<FunctionSchema> {
    let tensor = Type::tensor;
    let optional_device = || Type::optional(Type::Device);
    let int_list = || Type::list(Type::Int);

    let mut schemas = Vec::new();

    for name in ["add", "sub", "mul", "div"] {
        schemas.push(
            FunctionSchema::new(format!("aten::{name}"), "Tensor")
                .arg("self", tensor())
                .arg("other", tensor())
                .returns(tensor()),
        );
        schemas.push(
            FunctionSchema::new(format!("aten::{name}"), "Scalar")
                .arg("self", tensor())
                .arg("other", Type::Number)
                .returns(tensor()),
        );
    }
    schemas.push(
        FunctionSchema::new("aten::matmul", "")
            .arg("self", tensor())
            .arg("other", tensor())
            .returns(tensor()),
    );
    for name in ["relu", "neg", "sigmoid", "tanh", "exp", "clone"] {
        schemas.push(
            FunctionSchema::new(format!("aten::{name}"), "")
                .arg("self", tensor())
                .returns(tensor()),
        );
    }
    schemas.push(
        FunctionSchema::new("aten::where", "self")
            .arg("condition", tensor())
            .arg("self", tensor())
            .arg("other", tensor())
            .returns(tensor()),
    );
    schemas.push(
        FunctionSchema::new("aten::cat", "")
            .arg("tensors", Type::list(tensor()))
            .arg("dim", Type::Int)
            .returns(tensor()),
    );
    schemas.push(
        FunctionSchema::new("aten::to", "device")
            .arg("self", tensor())
            .arg("device", Type::Device)
            .returns(tensor()),
    );
    schemas.push(
        FunctionSchema::new("aten::to", "prim_Device")
            .arg("self", tensor())
            .arg("device", optional_device())
            .returns(tensor()),
    );
    for name in ["zeros", "ones", "empty", "rand"] {
        schemas.push(
            FunctionSchema::new(format!("aten::{name}"), "")
                .arg("size", int_list())
                .arg("device", optional_device())
                .returns(tensor()),
        );
    }
    schemas.push(
        FunctionSchema::new("aten::full", "")
            .arg("size", int_list())
            .arg("fill_value", Type::Number)
            .arg("device", optional_device())
            .returns(tensor()),
    );
    schemas.push(
        FunctionSchema::new("aten::scalar_tensor", "")
            .arg("s", Type::Number)
            .arg("device", optional_device())
            .returns(tensor()),
    );
    schemas.push(
        FunctionSchema::new("aten::zeros_like", "")
            .arg("self", tensor())
            .arg("device", optional_device())
            .returns(tensor()),
    );
    schemas.push(
        FunctionSchema::new("aten::size", "int")
            .arg("self", tensor())
            .arg("dim", Type::Int)
            .returns(Type::Int),
    );
    schemas.push(
        FunctionSchema::new("aten::dim", "")
            .arg("self", tensor())
            .returns(Type::Int),
    );
    schemas
}
