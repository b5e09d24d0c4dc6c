#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };
    // The parser should never panic on any input.
    let Ok(mut graph) = devflow_parser::parse(source) else {
        return;
    };
    let dump = devflow_ir::dump_graph(&graph);
    let reparsed = devflow_parser::parse(&dump).expect("dump should reparse");
    assert_eq!(devflow_ir::dump_graph(&reparsed), dump);

    // Well-formed graphs never trip the propagation asserts, and a second
    // run changes nothing.
    if devflow_ir::validate_graph(&graph).is_empty() {
        let registry = devflow_ir::SchemaRegistry::with_builtins();
        devflow_opt::propagate_devices(&mut graph, &registry);
        assert!(!devflow_opt::propagate_devices(&mut graph, &registry));
    }
});
