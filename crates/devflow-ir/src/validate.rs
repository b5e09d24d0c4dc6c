//! Structural checks for graphs handed over by the graph builder.

use crate::arena::{Arena, Handle};
use crate::error::IrError;
use crate::graph::{Graph, NodeKind};

/// Collects every structural problem in `graph`.
///
/// An empty result means the graph satisfies the assumptions analysis
/// passes make: handles are in range, conditionals own two blocks that
/// yield as many values as the conditional produces, loops own one body
/// block, and producer links agree with node outputs.
pub fn validate_graph(graph: &Graph) -> Vec<IrError> {
    let mut errors = Vec::new();

    for (_, block) in graph.blocks.iter() {
        for &node in &block.nodes {
            check_handle(&graph.nodes, node, "node", &mut errors);
        }
        for &value in block.params.iter().chain(&block.outputs) {
            check_handle(&graph.values, value, "value", &mut errors);
        }
    }

    for (handle, node) in graph.nodes.iter() {
        for &value in node.inputs.iter().chain(&node.outputs) {
            check_handle(&graph.values, value, "value", &mut errors);
        }
        for &block in &node.blocks {
            check_handle(&graph.blocks, block, "block", &mut errors);
        }
        let label = || format!("{} {handle:?}", node.kind.qualified_name());

        match node.kind {
            NodeKind::If => {
                if node.blocks.len() != 2 {
                    errors.push(IrError::BranchCount {
                        node: label(),
                        found: node.blocks.len(),
                    });
                    continue;
                }
                for (i, &block) in node.blocks.iter().enumerate() {
                    let Some(block) = graph.blocks.try_get(block) else {
                        continue;
                    };
                    if block.outputs.len() != node.outputs.len() {
                        errors.push(IrError::BranchArity {
                            node: label(),
                            block: i,
                            expected: node.outputs.len(),
                            found: block.outputs.len(),
                        });
                    }
                }
            }
            NodeKind::Loop if node.blocks.len() != 1 => {
                errors.push(IrError::LoopBody {
                    node: label(),
                    found: node.blocks.len(),
                });
            }
            _ => {}
        }
    }

    for (handle, value) in graph.values.iter() {
        let Some(producer) = value.producer else {
            continue;
        };
        match graph.nodes.try_get(producer) {
            Some(node) if node.outputs.contains(&handle) => {}
            Some(node) => errors.push(IrError::ProducerMismatch {
                value: graph.value_name(handle),
                node: format!("{} {producer:?}", node.kind.qualified_name()),
            }),
            None => check_handle(&graph.nodes, producer, "node", &mut errors),
        }
    }

    errors
}

fn check_handle<T>(
    arena: &Arena<T>,
    handle: Handle<T>,
    name: &'static str,
    errors: &mut Vec<IrError>,
) {
    if !arena.contains(handle) {
        errors.push(IrError::BadHandle {
            arena: name,
            index: handle.index(),
            size: arena.len(),
        });
    }
}
