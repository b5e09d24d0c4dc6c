//! Graph validation pass.
//!
//! Checks structural invariants of the graph and logs warnings for
//! problems found. This pass never modifies the graph.

use devflow_ir::{Graph, validate_graph};

use crate::Pass;

/// Validates graph structural invariants. Returns `false` (never modifies the graph).
#[derive(Debug)]
pub struct GraphValidation;

impl Pass for GraphValidation {
    fn name(&self) -> &str {
        "graph-validation"
    }

    fn run(&self, graph: &mut Graph) -> bool {
        for error in validate_graph(graph) {
            log::warn!("{error}");
        }
        false
    }
}
