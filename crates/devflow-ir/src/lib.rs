//! devflow intermediate representation.
//!
//! An arena-based SSA graph IR with nested control-flow blocks, tensor
//! types that carry an optional device annotation, and the operator
//! schema registry analysis passes consult.

pub mod arena;
mod display;
mod error;
pub mod graph;
mod schema;
mod types;
mod validate;

pub use arena::{Arena, Handle};
pub use display::{dump_graph, format_value_decl};
pub use error::IrError;
pub use graph::{Block, Graph, Node, NodeKind, StaticDevice, Value};
pub use schema::{Argument, FunctionSchema, SchemaRegistry};
pub use types::{
    Constant, Device, DeviceKind, Dimension, ScalarType, TensorShape, TensorType, Type,
};
pub use validate::validate_graph;
