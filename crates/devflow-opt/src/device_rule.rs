//! Device rule for built-in operators.
//!
//! An operator that takes an explicit device argument (`aten::to`,
//! factory functions) places its result there, regardless of where its
//! tensor operands live. Everything else falls back to
//! [operand resolution](crate::operands).

use devflow_ir::{FunctionSchema, Graph, Handle, Node, SchemaRegistry, StaticDevice, Type};

use crate::lattice::DeviceState;
use crate::operands::{propagate_from_operands, set_output_devices};

/// How the outputs of an operator node get their device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceDecision {
    /// A device argument is statically bound to this device.
    Explicit(devflow_ir::Device),
    /// No device argument was supplied; use the operands.
    FromOperands,
    /// A device argument cannot be evaluated; leave outputs untouched.
    Abort,
}

/// Inspects the schema's device-typed parameters in declaration order.
pub fn decide(graph: &Graph, schema: &FunctionSchema, node: Handle<Node>) -> DeviceDecision {
    let inputs = &graph.nodes[node].inputs;
    for (i, argument) in schema.arguments.iter().enumerate() {
        if !Type::Device.is_subtype_of(&argument.ty) {
            continue;
        }
        let Some(&input) = inputs.get(i) else {
            return DeviceDecision::Abort;
        };
        match graph.static_device(input) {
            StaticDevice::Known(device) => return DeviceDecision::Explicit(device),
            // Left to the library default; look for another device argument.
            StaticDevice::Absent => continue,
            StaticDevice::Indeterminate => {
                log::trace!(
                    "{}: device argument '{}' is not a static device",
                    schema.name,
                    argument.name
                );
                return DeviceDecision::Abort;
            }
        }
    }
    DeviceDecision::FromOperands
}

/// Applies the device rule to an operator node.
///
/// Nodes without a resolvable schema are left untouched. Returns `true`
/// if any output annotation changed.
pub fn apply_device_rule(graph: &mut Graph, registry: &SchemaRegistry, node: Handle<Node>) -> bool {
    let Some(schema) = registry.lookup(graph, node) else {
        log::trace!(
            "no schema for {}, skipping",
            graph.nodes[node].kind.qualified_name()
        );
        return false;
    };
    match decide(graph, schema, node) {
        DeviceDecision::Explicit(device) => {
            set_output_devices(graph, node, DeviceState::Known(device))
        }
        DeviceDecision::FromOperands => propagate_from_operands(graph, node),
        DeviceDecision::Abort => false,
    }
}
