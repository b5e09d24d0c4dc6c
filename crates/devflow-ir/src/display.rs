//! Display implementations and text dump for debugging.
//!
//! The dump format is the textual IR understood by `devflow-parser`.

use std::fmt::{self, Write as _};

use crate::arena::Handle;
use crate::graph::{Block, Graph, NodeKind, Value};
use crate::types::{Constant, Device, DeviceKind, Dimension, ScalarType, TensorType, Type};

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}:{index}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "{n}"),
            Self::Dynamic => write!(f, "?"),
        }
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields = Vec::new();
        if let Some(dtype) = self.dtype {
            fields.push(format!("dtype={dtype}"));
        }
        if let Some(shape) = &self.shape {
            let dims: Vec<_> = shape.dims.iter().map(ToString::to_string).collect();
            fields.push(format!("shape=[{}]", dims.join(", ")));
        }
        if let Some(device) = self.device {
            fields.push(format!("device={device}"));
        }
        if fields.is_empty() {
            write!(f, "Tensor")
        } else {
            write!(f, "Tensor({})", fields.join(", "))
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tensor(t) => write!(f, "{t}"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Number => write!(f, "number"),
            Self::Bool => write!(f, "bool"),
            Self::Str => write!(f, "str"),
            Self::Device => write!(f, "Device"),
            Self::NoneType => write!(f, "None"),
            Self::Any => write!(f, "Any"),
            Self::Optional(inner) => write!(f, "{inner}?"),
            Self::List(element) => write!(f, "List[{element}]"),
            Self::Union(members) => {
                let members: Vec<_> = members.iter().map(ToString::to_string).collect();
                write!(f, "Union[{}]", members.join(", "))
            }
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            // Debug formatting keeps the decimal point, so it reparses as a float.
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Device(d) => write!(f, "device(\"{d}\")"),
        }
    }
}

/// Produces the textual form of a whole graph.
pub fn dump_graph(graph: &Graph) -> String {
    let mut out = String::new();
    let root = &graph.blocks[graph.root()];
    let _ = writeln!(out, "graph({}):", format_params(graph, root));
    write_nodes(&mut out, graph, root, 1);
    let _ = writeln!(out, "  return ({})", format_values(graph, &root.outputs));
    out
}

/// Formats `%name : Type` for one value.
pub fn format_value_decl(graph: &Graph, value: Handle<Value>) -> String {
    format!("{} : {}", graph.value_name(value), graph.values[value].ty)
}

fn format_params(graph: &Graph, block: &Block) -> String {
    let params: Vec<_> = block
        .params
        .iter()
        .map(|&v| format_value_decl(graph, v))
        .collect();
    params.join(", ")
}

fn format_values(graph: &Graph, values: &[Handle<Value>]) -> String {
    let names: Vec<_> = values.iter().map(|&v| graph.value_name(v)).collect();
    names.join(", ")
}

fn write_nodes(out: &mut String, graph: &Graph, block: &Block, depth: usize) {
    let indent = "  ".repeat(depth);
    for &handle in &block.nodes {
        let node = &graph.nodes[handle];
        let _ = write!(out, "{indent}");
        if !node.outputs.is_empty() {
            let decls: Vec<_> = node
                .outputs
                .iter()
                .map(|&v| format_value_decl(graph, v))
                .collect();
            let _ = write!(out, "{} = ", decls.join(", "));
        }
        let _ = write!(out, "{}", node.kind.qualified_name());
        match &node.kind {
            NodeKind::Constant(Constant::None) => {}
            NodeKind::Constant(c) => {
                let _ = write!(out, "[value={c}]");
            }
            NodeKind::CallMethod { name } => {
                let _ = write!(out, "[name={name:?}]");
            }
            _ => {}
        }
        let _ = writeln!(out, "({})", format_values(graph, &node.inputs));

        for (i, &child) in node.blocks.iter().enumerate() {
            let child = &graph.blocks[child];
            let _ = writeln!(out, "{indent}  block{i}({}):", format_params(graph, child));
            write_nodes(out, graph, child, depth + 2);
            let _ = writeln!(
                out,
                "{indent}    -> ({})",
                format_values(graph, &child.outputs)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TensorShape;

    #[test]
    fn display_devices_and_types() {
        assert_eq!(Device::cuda(1).to_string(), "cuda:1");
        assert_eq!(Device::CPU.to_string(), "cpu");
        assert_eq!(Type::tensor().to_string(), "Tensor");
        let refined = TensorType::on(Device::cuda(0))
            .with_dtype(ScalarType::F32)
            .with_shape(TensorShape {
                dims: vec![Dimension::Fixed(2), Dimension::Dynamic],
            });
        assert_eq!(
            refined.to_string(),
            "Tensor(dtype=f32, shape=[2, ?], device=cuda:0)"
        );
        assert_eq!(Type::optional(Type::Device).to_string(), "Device?");
        assert_eq!(
            Type::Union(vec![Type::Device, Type::Str]).to_string(),
            "Union[Device, str]"
        );
        assert_eq!(Type::list(Type::Int).to_string(), "List[int]");
    }

    #[test]
    fn display_constants() {
        assert_eq!(Constant::Float(1.0).to_string(), "1.0");
        assert_eq!(Constant::Str("a\"b".into()).to_string(), "\"a\\\"b\"");
        assert_eq!(
            Constant::Device(Device::cuda(0)).to_string(),
            "device(\"cuda:0\")"
        );
    }

    #[test]
    fn dump_conditional_graph() {
        let mut graph = Graph::new();
        let root = graph.root();
        let x = graph.add_input("x", Type::Tensor(TensorType::on(Device::cuda(0))));
        let c = graph.add_input("c", Type::Bool);
        let dev = graph.add_constant(root, Constant::Device(Device::CPU));
        let if_node = graph.append_node(
            root,
            NodeKind::If,
            vec![c],
            vec![(Some("r".into()), Type::tensor())],
        );
        let t = graph.add_block(if_node);
        let moved = graph.append_node(
            t,
            NodeKind::Operator("aten::to".into()),
            vec![x, dev],
            vec![(Some("y".into()), Type::tensor())],
        );
        let y = graph.output(moved);
        graph.set_block_outputs(t, vec![y]);
        let f = graph.add_block(if_node);
        graph.set_block_outputs(f, vec![x]);
        let r = graph.output(if_node);
        graph.set_outputs(vec![r]);

        let expected = "\
graph(%x : Tensor(device=cuda:0), %c : bool):
  %2 : Device = prim::Constant[value=device(\"cpu\")]()
  %r : Tensor = prim::If(%c)
    block0():
      %y : Tensor = aten::to(%x, %2)
      -> (%y)
    block1():
      -> (%x)
  return (%r)
";
        assert_eq!(dump_graph(&graph), expected);
    }
}
