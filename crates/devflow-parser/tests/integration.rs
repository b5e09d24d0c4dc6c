//! Integration tests for the textual IR parser.

use devflow_ir::{Device, NodeKind, Type, dump_graph, validate_graph};
use devflow_parser::{ParseError, parse};

#[test]
fn parse_branches_model() {
    let source = include_str!("../../../models/branches.ir");
    let graph = parse(source).expect("branches.ir should parse");

    assert_eq!(graph.inputs().len(), 3);
    assert_eq!(graph.outputs().len(), 2);
    assert!(validate_graph(&graph).is_empty());

    let root = &graph.blocks[graph.root()];
    let branch = root
        .nodes
        .iter()
        .copied()
        .find(|&n| graph.nodes[n].kind == NodeKind::If)
        .expect("model has a prim::If");
    assert_eq!(graph.nodes[branch].blocks.len(), 2);
    for &block in &graph.nodes[branch].blocks {
        assert_eq!(graph.blocks[block].nodes.len(), 1);
        assert_eq!(graph.blocks[block].outputs.len(), 1);
    }

    // Annotations are taken verbatim from the source.
    assert_eq!(graph.device(graph.inputs()[0]), Some(Device::cuda(0)));
    assert_eq!(graph.device(graph.inputs()[1]), Some(Device::CPU));
    assert_eq!(graph.device(graph.outputs()[0]), None);
}

#[test]
fn dump_reparses_to_the_same_text() {
    for source in [
        include_str!("../../../models/branches.ir"),
        include_str!("../../../models/mixed.ir"),
    ] {
        let first = dump_graph(&parse(source).unwrap());
        let second = dump_graph(&parse(&first).unwrap());
        assert_eq!(first, second);
    }
}

#[test]
fn dump_of_parsed_text_is_canonical() {
    let source = "\
graph(%x : Tensor(shape=[2, ?], device=cuda:1), %n : int):
  %c : float = prim::Constant[value=-1.5]()
  %l : List[Tensor] = prim::ListConstruct(%x, %x)
  %a : Tensor, %b : Tensor = prim::ListUnpack(%l)
  %o : Tensor = prim::Loop(%n)
    block0(%i : int, %acc : Tensor):
      -> (%acc)
  return (%o)
";
    assert_eq!(dump_graph(&parse(source).unwrap()), source);
}

#[test]
fn nested_blocks_see_outer_values() {
    let source = "\
graph(%x : Tensor, %p : bool, %q : bool):
  %o : Tensor = prim::If(%p)
    block0():
      %i : Tensor = prim::If(%q)
        block0():
          %r : Tensor = aten::relu(%x)
          -> (%r)
        block1():
          -> (%x)
      -> (%i)
    block1():
      -> (%x)
  return (%o)
";
    let graph = parse(source).unwrap();
    assert_eq!(graph.blocks.len(), 5);
    assert!(validate_graph(&graph).is_empty());
    assert_eq!(dump_graph(&graph), source);
}

#[test]
fn block_values_stay_defined_after_the_block() {
    // One scope for the whole graph: a value defined inside a block
    // cannot be redefined later.
    let source = "\
graph(%x : Tensor, %p : bool):
  %o : Tensor = prim::If(%p)
    block0():
      %r : Tensor = aten::relu(%x)
      -> (%r)
    block1():
      %r : Tensor = aten::neg(%x)
      -> (%r)
  return (%o)
";
    assert_eq!(
        parse(source).unwrap_err(),
        ParseError::Redefinition {
            line: 7,
            name: "r".into()
        }
    );
}

#[test]
fn conditional_result_is_not_visible_in_its_branches() {
    let source = "\
graph(%x : Tensor, %p : bool):
  %o : Tensor = prim::If(%p)
    block0():
      %r : Tensor = aten::relu(%o)
      -> (%r)
    block1():
      -> (%x)
  return (%o)
";
    assert_eq!(
        parse(source).unwrap_err(),
        ParseError::UndefinedValue {
            line: 4,
            name: "o".into()
        }
    );
}

#[test]
fn malformed_input_reports_line() {
    let cases = [
        ("graph(%x : Tensor):\n  %y : Tensor = aten::relu(%x\n  return (%y)\n", 2),
        ("graph(%x : Tensor):\n  %y : Wat = aten::relu(%x)\n  return (%y)\n", 2),
        ("graph(%x : Tensor)\n  return (%x)\n", 1),
        ("graph(%x : Tensor):\n  %y : Tensor = aten::relu(%x)\n  -> (%y)\n", 3),
        ("graph(%x : Tensor(shape=[-1])):\n  return (%x)\n", 1),
    ];
    for (source, line) in cases {
        let err = parse(source).unwrap_err();
        assert!(
            matches!(err, ParseError::Syntax { .. }),
            "expected a syntax error, got {err:?}"
        );
        assert_eq!(err.line(), Some(line), "{source}");
    }
}

#[test]
fn error_messages_name_the_problem() {
    let err = parse("graph(%x : Tensor):\n  return (%nope)\n").unwrap_err();
    assert_eq!(err.to_string(), "line 2: use of undefined value '%nope'");

    let err = parse("graph(%x : Tensor):\n  %y : Tensor = aten::relu(%x]\n  return (%y)\n")
        .unwrap_err();
    assert_eq!(err.to_string(), "line 2: expected ',', found ']'");
}

#[test]
fn types_round_trip() {
    let source = "graph(%a : Union[Tensor, str], %b : Device?, %c : List[List[int]], %d : number, %e : None):\n  return (%a)\n";
    let graph = parse(source).unwrap();
    let types: Vec<_> = graph
        .inputs()
        .iter()
        .map(|&v| graph.values[v].ty.clone())
        .collect();
    assert_eq!(
        types,
        vec![
            Type::Union(vec![Type::tensor(), Type::Str]),
            Type::optional(Type::Device),
            Type::list(Type::list(Type::Int)),
            Type::Number,
            Type::NoneType,
        ]
    );
    assert_eq!(dump_graph(&graph), source);
}
