//! Analysis passes for devflow graphs.
//!
//! Provides a [`Pass`] trait, a [`PassManager`] with fixed-point iteration,
//! and the built-in passes: structural validation and device propagation.

pub mod device_prop;
pub mod device_rule;
pub mod lattice;
pub mod operands;
mod validation;

pub use device_prop::{DevicePropagation, propagate_devices};
pub use device_rule::DeviceDecision;
pub use lattice::DeviceState;
pub use validation::GraphValidation;

use std::fmt::Debug;

use devflow_ir::Graph;

/// A pass that analyses a graph and may update its annotations.
pub trait Pass: Debug {
    /// Human-readable name of the pass.
    fn name(&self) -> &str;

    /// Run the pass on a graph. Returns `true` if anything was modified.
    fn run(&self, graph: &mut Graph) -> bool;
}

/// Optimization level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptLevel {
    /// No passes.
    O0,
    /// Validation and device propagation.
    O1,
    /// Same as O1 for now.
    O2,
}

/// Maximum number of fixed-point iterations before giving up.
const MAX_ITERATIONS: usize = 10;

/// Runs passes in sequence with fixed-point iteration.
#[derive(Debug)]
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PassManager {
    /// Creates an empty pass manager with no passes.
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Creates a pass manager with passes appropriate for the given level.
    pub fn for_level(level: OptLevel) -> Self {
        let mut pm = Self::new();
        match level {
            OptLevel::O0 => {}
            OptLevel::O1 | OptLevel::O2 => {
                pm.add_pass(Box::new(GraphValidation));
                pm.add_pass(Box::new(DevicePropagation::default()));
            }
        }
        pm
    }

    /// Adds a pass to the pipeline.
    pub fn add_pass(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// Names of the scheduled passes, in order.
    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Runs all passes until a fixed point is reached or the iteration limit.
    ///
    /// Returns `true` if any pass modified the graph.
    pub fn run(&self, graph: &mut Graph) -> bool {
        let mut any_changed = false;
        for iteration in 0..MAX_ITERATIONS {
            let mut changed = false;
            for pass in &self.passes {
                let pass_changed = pass.run(graph);
                log::debug!(
                    "iteration {iteration}: pass '{}' {}",
                    pass.name(),
                    if pass_changed { "changed the graph" } else { "made no change" }
                );
                changed |= pass_changed;
            }
            any_changed |= changed;
            if !changed {
                break;
            }
        }
        any_changed
    }
}

/// Convenience function: runs the O1 pipeline on a graph.
pub fn optimize(graph: &mut Graph) -> bool {
    PassManager::for_level(OptLevel::O1).run(graph)
}
