//! Operand-based device resolution.
//!
//! A node whose device is not fixed by an explicit argument runs where its
//! tensor operands live. Operands are scanned once, left to right, and the
//! scan stops at the first irreconcilable disagreement.

use devflow_ir::{Graph, Handle, Node};

use crate::lattice::{DeviceState, Operand, merge_operand};

/// Resolves the device implied by the tensor operands of `node`.
///
/// Non-tensor inputs do not participate. A node without tensor operands
/// resolves to [`DeviceState::Unknown`].
pub fn resolve_operand_device(graph: &Graph, node: Handle<Node>) -> DeviceState {
    let mut acc: Option<Operand> = None;
    for &input in &graph.nodes[node].inputs {
        let Some(ty) = graph.tensor_type(input) else {
            continue;
        };
        let operand = Operand::of(ty);
        acc = match acc {
            None => Some(operand),
            Some(current) => match merge_operand(current, operand) {
                Some(merged) => Some(merged),
                None => {
                    log::trace!(
                        "{} disagrees with earlier operands, device unknown",
                        graph.value_name(input)
                    );
                    return DeviceState::Unknown;
                }
            },
        };
    }
    acc.map_or(DeviceState::Unknown, |operand| operand.device)
}

/// Writes `device` to every tensor-typed output of `node`.
///
/// Returns `true` if any annotation changed.
pub fn set_output_devices(graph: &mut Graph, node: Handle<Node>, device: DeviceState) -> bool {
    let mut changed = false;
    for i in 0..graph.nodes[node].outputs.len() {
        let output = graph.nodes[node].outputs[i];
        changed |= graph.set_device(output, device.into());
    }
    changed
}

/// Resolves the operand device of `node` and applies it to its outputs.
pub fn propagate_from_operands(graph: &mut Graph, node: Handle<Node>) -> bool {
    let device = resolve_operand_device(graph, node);
    set_output_devices(graph, node, device)
}
