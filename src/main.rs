//! ember CLI entry point.

mod cli;

use std::path::{Path, PathBuf};

use clap::Parser;
use cli::{Cli, Command};
use ember::config::PipelineConfig;
use ember::driver::Compiler;
use ember_ir::validation::verify;
use ember_ir::{Graph, parse_methods, print_graph_annotated};
use ember_opt::{OptimizationConfig, PassId};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Opt {
            file,
            config,
            disable,
            no_verify,
            nullability,
            stats,
            jobs,
        } => {
            let options = OptOptions {
                config,
                disable,
                no_verify,
                nullability,
                stats,
                jobs,
            };
            optimize_file(&file, options);
        }
        Command::Check { file } => check_file(&file),
    }
}

struct OptOptions {
    config: Option<PathBuf>,
    disable: Vec<PassId>,
    no_verify: bool,
    nullability: bool,
    stats: bool,
    jobs: Option<usize>,
}

fn optimize_file(path: &Path, options: OptOptions) {
    let pipeline = match &options.config {
        Some(config_path) => PipelineConfig::load(config_path).unwrap_or_else(|e| fail(e)),
        None => PipelineConfig::default(),
    };
    let mut config: OptimizationConfig = pipeline.into();
    for id in options.disable {
        config.disabled |= id.flag();
    }
    if options.no_verify {
        config.verify = false;
    }

    let graphs = read_methods(path);
    let mut compiler = Compiler::new(config);
    if let Some(jobs) = options.jobs {
        compiler = compiler.with_jobs(jobs);
    }
    let report = compiler.compile_all(graphs).unwrap_or_else(|e| fail(e));

    let printed: Vec<String> = report
        .methods
        .iter()
        .map(|method| {
            let graph = method.graph();
            let map = method.nullability().filter(|_| options.nullability);
            print_graph_annotated(graph, |inst| {
                let map = map?;
                graph
                    .ty(inst)
                    .is_reference()
                    .then(|| map.nullability(inst).to_string())
            })
        })
        .collect();
    print!("{}", printed.join("\n"));

    if options.stats {
        eprint!("{}", report.stats);
    }
}

fn check_file(path: &Path) {
    let graphs = read_methods(path);
    let mut failed = false;
    for graph in &graphs {
        let result = verify(graph);
        if result.is_ok() {
            println!("@{}: ok", graph.name());
        } else {
            failed = true;
            print!("@{}: {result}", graph.name());
        }
    }
    if failed {
        std::process::exit(1);
    }
}

fn read_methods(path: &Path) -> Vec<Graph> {
    let source = std::fs::read_to_string(path)
        .unwrap_or_else(|e| fail(format!("cannot read {}: {e}", path.display())));
    parse_methods(&source).unwrap_or_else(|e| fail(format!("{}: {e}", path.display())))
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("error: {message}");
    std::process::exit(1);
}
