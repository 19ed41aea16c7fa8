//! Driver for the ember SSA optimizer.
//!
//! Loads pipeline configuration and compiles many methods in parallel,
//! falling back to the unoptimized graph for any method whose
//! optimization fails.

pub mod config;
pub mod driver;

pub use config::{ConfigError, PipelineConfig};
pub use driver::{CompilationReport, CompileError, CompiledMethod, Compiler};
