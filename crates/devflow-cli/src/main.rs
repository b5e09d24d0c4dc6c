use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::{Context, IntoDiagnostic};

use devflow_opt::{OptLevel, PassManager};

/// devflow: annotate tensors in a graph IR with the device they live on
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Input graph in textual IR form
    input: PathBuf,

    /// Output path (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Optimization level: 0, 1, or 2
    #[arg(long, default_value = "1", value_parser = parse_opt_level)]
    opt_level: OptLevel,

    /// Dump the parsed IR to stderr before running passes
    #[arg(long)]
    emit_ir: bool,

    /// Validate and run passes without producing output
    #[arg(long)]
    dry_run: bool,
}

fn parse_opt_level(s: &str) -> Result<OptLevel, String> {
    match s {
        "0" => Ok(OptLevel::O0),
        "1" => Ok(OptLevel::O1),
        "2" => Ok(OptLevel::O2),
        _ => Err(format!(
            "invalid optimization level '{s}', expected 0, 1, or 2"
        )),
    }
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    // 1. Read source file.
    let source = std::fs::read_to_string(&cli.input)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", cli.input.display()))?;

    // 2. Parse textual IR.
    let mut graph = devflow_parser::parse(&source)
        .map_err(|e| miette::miette!("{e}"))
        .wrap_err_with(|| format!("failed to parse {}", cli.input.display()))?;

    // 3. Optionally dump IR to stderr.
    if cli.emit_ir {
        eprintln!("{}", devflow_ir::dump_graph(&graph));
    }

    // 4. Reject malformed graphs before any pass asserts on them.
    let problems = devflow_ir::validate_graph(&graph);
    if !problems.is_empty() {
        let list: Vec<_> = problems.iter().map(|p| format!("  {p}")).collect();
        return Err(miette::miette!(
            "graph is malformed ({} problem(s)):\n{}",
            problems.len(),
            list.join("\n")
        ));
    }

    // 5. Run the pass pipeline.
    let pm = PassManager::for_level(cli.opt_level);
    log::info!("running passes: [{}]", pm.pass_names().join(", "));
    let changed = pm.run(&mut graph);
    log::info!(
        "{}",
        if changed {
            "device annotations updated"
        } else {
            "no annotation changed"
        }
    );

    // 6. Dry-run: stop here.
    if cli.dry_run {
        return Ok(());
    }

    // 7. Write the annotated graph.
    let text = devflow_ir::dump_graph(&graph);
    match &cli.output {
        Some(path) => std::fs::write(path, text)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to write {}", path.display()))?,
        None => print!("{text}"),
    }

    Ok(())
}
