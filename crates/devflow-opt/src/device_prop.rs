//! Device propagation pass.
//!
//! Walks the top-level block once, in node order, and annotates every
//! tensor-producing node it understands with the device its outputs live
//! on. Conditionals are handled by analysing both branches and merging
//! their exit values. Loops and calls are skipped, so annotations inside
//! or behind them are whatever they already were. Unknown is always a
//! valid answer.

use devflow_ir::{
    Block, Graph, Handle, Node, NodeKind, SchemaRegistry, dump_graph, format_value_decl,
};

use crate::Pass;
use crate::device_rule::apply_device_rule;
use crate::lattice::{DeviceState, merge};

/// Propagates device annotations through tensor-producing nodes.
#[derive(Debug)]
pub struct DevicePropagation {
    registry: SchemaRegistry,
}

impl Default for DevicePropagation {
    fn default() -> Self {
        Self::new(SchemaRegistry::with_builtins())
    }
}

impl DevicePropagation {
    pub fn new(registry: SchemaRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }
}

impl Pass for DevicePropagation {
    fn name(&self) -> &str {
        "device-propagation"
    }

    fn run(&self, graph: &mut Graph) -> bool {
        propagate_devices(graph, &self.registry)
    }
}

/// Runs device propagation over `graph`.
///
/// Returns `true` if any device annotation changed. Running it again on
/// its own output returns `false`.
///
/// # Panics
///
/// Panics if a conditional does not own exactly two blocks, or if a branch
/// yields a different number of values than the conditional produces.
pub fn propagate_devices(graph: &mut Graph, registry: &SchemaRegistry) -> bool {
    log::trace!("running device propagation");
    let mut propagator = Propagator {
        graph: &mut *graph,
        registry,
        changed: false,
    };
    let root = propagator.graph.root();
    propagator.process_block(root);

    let changed = propagator.changed;
    if changed {
        log::debug!("after device propagation:\n{}", dump_graph(graph));
    }
    changed
}

/// The categories of node the traversal distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NodeCategory {
    Conditional,
    Loop,
    Call,
    Constant,
    ListOp,
    Operator,
    Other,
}

impl NodeCategory {
    fn of(kind: &NodeKind) -> Self {
        match kind {
            NodeKind::If => Self::Conditional,
            NodeKind::Loop => Self::Loop,
            NodeKind::CallFunction | NodeKind::CallMethod { .. } => Self::Call,
            NodeKind::Constant(_) => Self::Constant,
            NodeKind::ListConstruct | NodeKind::ListUnpack => Self::ListOp,
            NodeKind::Operator(_) => Self::Operator,
            NodeKind::Other(_) => Self::Other,
        }
    }
}

struct Propagator<'a> {
    graph: &'a mut Graph,
    registry: &'a SchemaRegistry,
    changed: bool,
}

impl Propagator<'_> {
    fn process_block(&mut self, block: Handle<Block>) {
        log::trace!("processing block {block:?}");
        // Indexed loop: nodes are processed with `&mut self.graph` borrowed.
        for i in 0..self.graph.blocks[block].nodes.len() {
            let node = self.graph.blocks[block].nodes[i];
            self.process_node(node);
        }
    }

    fn process_node(&mut self, node: Handle<Node>) {
        let category = NodeCategory::of(&self.graph.nodes[node].kind);
        log::trace!(
            "processing node {node:?} ({})",
            self.graph.nodes[node].kind.qualified_name()
        );

        match category {
            NodeCategory::Conditional => self.process_if(node),
            NodeCategory::Operator if self.has_tensor_output(node) => {
                let changed = apply_device_rule(self.graph, self.registry, node);
                self.changed |= changed;
                log::trace!(
                    "processed node {node:?}, outputs [{}]{}",
                    describe_outputs(self.graph, node),
                    if changed { " (changed)" } else { "" }
                );
            }
            // Loops and calls are not analysed. Constants are annotated by
            // whoever built them; list ops and other primitives are not
            // modelled.
            NodeCategory::Loop
            | NodeCategory::Call
            | NodeCategory::Constant
            | NodeCategory::ListOp
            | NodeCategory::Operator
            | NodeCategory::Other => {}
        }
    }

    fn has_tensor_output(&self, node: Handle<Node>) -> bool {
        self.graph.nodes[node]
            .outputs
            .iter()
            .any(|&v| self.graph.values[v].ty.is_tensor())
    }

    fn process_if(&mut self, node: Handle<Node>) {
        let blocks = &self.graph.nodes[node].blocks;
        assert_eq!(
            blocks.len(),
            2,
            "prim::If {node:?} must own a true and a false block"
        );
        let (accept, reject) = (blocks[0], blocks[1]);

        self.process_block(accept);
        self.process_block(reject);

        let changed = self.merge_branch_outputs(node, accept, reject);
        self.changed |= changed;
        log::trace!(
            "processed prim::If {node:?}, outputs [{}]{}",
            describe_outputs(self.graph, node),
            if changed { " (changed)" } else { "" }
        );
    }

    /// Merges the `i`-th exit values of both branches into the `i`-th output
    /// of the conditional.
    fn merge_branch_outputs(
        &mut self,
        node: Handle<Node>,
        accept: Handle<Block>,
        reject: Handle<Block>,
    ) -> bool {
        let outputs = self.graph.nodes[node].outputs.clone();
        let accept = self.graph.blocks[accept].outputs.clone();
        let reject = self.graph.blocks[reject].outputs.clone();
        assert_eq!(
            accept.len(),
            reject.len(),
            "prim::If {node:?}: branches yield different numbers of values"
        );
        assert_eq!(
            accept.len(),
            outputs.len(),
            "prim::If {node:?}: branches yield {} values for {} outputs",
            accept.len(),
            outputs.len()
        );

        let mut changed = false;
        for ((&a, &b), &out) in accept.iter().zip(&reject).zip(&outputs) {
            let (Some(a), Some(b)) = (self.graph.tensor_type(a), self.graph.tensor_type(b)) else {
                continue;
            };
            let merged = merge(DeviceState::from(a.device), DeviceState::from(b.device));
            changed |= self.graph.set_device(out, merged.into());
        }
        changed
    }
}

fn describe_outputs(graph: &Graph, node: Handle<Node>) -> String {
    let outputs: Vec<_> = graph.nodes[node]
        .outputs
        .iter()
        .map(|&v| format_value_decl(graph, v))
        .collect();
    outputs.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use devflow_ir::{Constant, Device, TensorShape, TensorType, Type, Value};

    fn tensor_on(device: Device) -> Type {
        Type::Tensor(TensorType::on(device))
    }

    fn op(
        graph: &mut Graph,
        block: Handle<Block>,
        name: &str,
        inputs: Vec<Handle<Value>>,
    ) -> Handle<Value> {
        let node = graph.append_node(
            block,
            NodeKind::Operator(name.into()),
            inputs,
            vec![(None, Type::tensor())],
        );
        graph.output(node)
    }

    /// `if c: a = relu(x) else: a = relu(y)` with `x` on `dx` and `y` on `dy`.
    fn conditional(dx: Device, dy: Device) -> (Graph, Handle<Value>) {
        let mut graph = Graph::new();
        let root = graph.root();
        let c = graph.add_input("c", Type::Bool);
        let x = graph.add_input("x", tensor_on(dx));
        let y = graph.add_input("y", tensor_on(dy));
        let node = graph.append_node(root, NodeKind::If, vec![c], vec![(None, Type::tensor())]);
        let accept = graph.add_block(node);
        let a = op(&mut graph, accept, "aten::relu", vec![x]);
        graph.set_block_outputs(accept, vec![a]);
        let reject = graph.add_block(node);
        let b = op(&mut graph, reject, "aten::relu", vec![y]);
        graph.set_block_outputs(reject, vec![b]);
        let out = graph.output(node);
        graph.set_outputs(vec![out]);
        (graph, out)
    }

    #[test]
    fn straight_line_chain() {
        let registry = SchemaRegistry::with_builtins();
        let mut graph = Graph::new();
        let root = graph.root();
        let x = graph.add_input("x", tensor_on(Device::cuda(0)));
        let a = op(&mut graph, root, "aten::relu", vec![x]);
        let b = op(&mut graph, root, "aten::add", vec![a, x]);

        assert!(propagate_devices(&mut graph, &registry));
        assert_eq!(graph.device(a), Some(Device::cuda(0)));
        assert_eq!(graph.device(b), Some(Device::cuda(0)));
        assert!(!propagate_devices(&mut graph, &registry));
    }

    #[test]
    fn conditional_branches_agree() {
        let registry = SchemaRegistry::with_builtins();
        let (mut graph, out) = conditional(Device::cuda(0), Device::cuda(0));
        assert!(propagate_devices(&mut graph, &registry));
        assert_eq!(graph.device(out), Some(Device::cuda(0)));
    }

    #[test]
    fn conditional_branches_disagree() {
        let registry = SchemaRegistry::with_builtins();
        let (mut graph, out) = conditional(Device::cuda(0), Device::CPU);
        graph.set_device(out, Some(Device::CPU));
        assert!(propagate_devices(&mut graph, &registry));
        assert_eq!(graph.device(out), None);
    }

    #[test]
    fn join_does_not_exempt_host_scalars() {
        let registry = SchemaRegistry::with_builtins();
        let mut graph = Graph::new();
        let root = graph.root();
        let c = graph.add_input("c", Type::Bool);
        let scalar = graph.add_input(
            "s",
            Type::Tensor(TensorType::on(Device::CPU).with_shape(TensorShape::scalar())),
        );
        let x = graph.add_input("x", tensor_on(Device::cuda(0)));
        let node = graph.append_node(root, NodeKind::If, vec![c], vec![(None, Type::tensor())]);
        let accept = graph.add_block(node);
        graph.set_block_outputs(accept, vec![scalar]);
        let reject = graph.add_block(node);
        graph.set_block_outputs(reject, vec![x]);

        assert!(!propagate_devices(&mut graph, &registry));
        assert_eq!(graph.device(graph.output(node)), None);
    }

    #[test]
    fn join_change_is_reported() {
        // Branches only forward inputs, so the join is the only write.
        let registry = SchemaRegistry::with_builtins();
        let mut graph = Graph::new();
        let root = graph.root();
        let c = graph.add_input("c", Type::Bool);
        let x = graph.add_input("x", tensor_on(Device::cuda(2)));
        let node = graph.append_node(root, NodeKind::If, vec![c], vec![(None, Type::tensor())]);
        let accept = graph.add_block(node);
        graph.set_block_outputs(accept, vec![x]);
        let reject = graph.add_block(node);
        graph.set_block_outputs(reject, vec![x]);

        assert!(propagate_devices(&mut graph, &registry));
        assert_eq!(graph.device(graph.output(node)), Some(Device::cuda(2)));
    }

    #[test]
    fn non_tensor_join_positions_are_skipped() {
        let registry = SchemaRegistry::with_builtins();
        let mut graph = Graph::new();
        let root = graph.root();
        let c = graph.add_input("c", Type::Bool);
        let n = graph.add_input("n", Type::Int);
        let node = graph.append_node(root, NodeKind::If, vec![c], vec![(None, Type::Int)]);
        let accept = graph.add_block(node);
        graph.set_block_outputs(accept, vec![n]);
        let reject = graph.add_block(node);
        graph.set_block_outputs(reject, vec![n]);

        assert!(!propagate_devices(&mut graph, &registry));
    }

    #[test]
    #[should_panic(expected = "must own a true and a false block")]
    fn conditional_without_false_block_panics() {
        let registry = SchemaRegistry::with_builtins();
        let mut graph = Graph::new();
        let root = graph.root();
        let c = graph.add_input("c", Type::Bool);
        let node = graph.append_node(root, NodeKind::If, vec![c], vec![]);
        graph.add_block(node);
        propagate_devices(&mut graph, &registry);
    }

    #[test]
    #[should_panic(expected = "branches yield")]
    fn branch_arity_mismatch_panics() {
        let registry = SchemaRegistry::with_builtins();
        let mut graph = Graph::new();
        let root = graph.root();
        let c = graph.add_input("c", Type::Bool);
        let x = graph.add_input("x", Type::tensor());
        let node = graph.append_node(root, NodeKind::If, vec![c], vec![(None, Type::tensor())]);
        let accept = graph.add_block(node);
        graph.set_block_outputs(accept, vec![x, x]);
        let reject = graph.add_block(node);
        graph.set_block_outputs(reject, vec![x]);
        propagate_devices(&mut graph, &registry);
    }

    #[test]
    fn skipped_kinds_keep_annotations() {
        let registry = SchemaRegistry::with_builtins();
        let mut graph = Graph::new();
        let root = graph.root();
        let x = graph.add_input("x", tensor_on(Device::cuda(0)));

        let stale = Some(Device::cuda(5));
        let mut skipped = Vec::new();
        for kind in [
            NodeKind::Loop,
            NodeKind::CallFunction,
            NodeKind::CallMethod {
                name: "forward".into(),
            },
            NodeKind::ListConstruct,
            NodeKind::ListUnpack,
            NodeKind::Constant(Constant::None),
            NodeKind::Other("prim::device".into()),
        ] {
            let node = graph.append_node(root, kind, vec![x], vec![(None, Type::tensor())]);
            let out = graph.output(node);
            graph.set_device(out, stale);
            skipped.push(out);
        }

        assert!(!propagate_devices(&mut graph, &registry));
        for out in skipped {
            assert_eq!(graph.device(out), stale);
        }
    }

    #[test]
    fn pass_trait_uses_builtin_registry() {
        let pass = DevicePropagation::default();
        assert_eq!(pass.name(), "device-propagation");
        assert!(!pass.registry().is_empty());

        let (mut graph, out) = conditional(Device::cuda(1), Device::cuda(1));
        assert!(pass.run(&mut graph));
        assert_eq!(graph.device(out), Some(Device::cuda(1)));
        assert!(!pass.run(&mut graph));
    }
}
