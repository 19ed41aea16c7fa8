//! Command-line interface for the ember optimizer.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ember_opt::PassId;

#[derive(Parser)]
#[command(name = "ember")]
#[command(about = "SSA optimizer for textual method graphs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Optimize every method in an IR file and print the result
    Opt {
        /// IR file to optimize
        file: PathBuf,

        /// Pipeline configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Skip a pass; may be given more than once
        #[arg(long, value_name = "PASS", value_parser = parse_pass_id)]
        disable: Vec<PassId>,

        /// Do not check graph invariants between passes
        #[arg(long)]
        no_verify: bool,

        /// Annotate reference values with their nullability
        #[arg(long)]
        nullability: bool,

        /// Print optimization counters to stderr
        #[arg(long)]
        stats: bool,

        /// Number of worker threads
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// Parse an IR file and check graph invariants
    Check {
        /// IR file to check
        file: PathBuf,
    },
}

fn parse_pass_id(name: &str) -> Result<PassId, String> {
    PassId::from_name(name).ok_or_else(|| {
        let known: Vec<&str> = PassId::ALL.iter().map(|id| id.name()).collect();
        format!("unknown pass '{name}' (expected one of: {})", known.join(", "))
    })
}
