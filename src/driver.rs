//! Compiles many methods in parallel.
//!
//! Each method is owned by exactly one worker from start to finish, so
//! passes never share mutable state. A method whose optimization fails is
//! kept unoptimized; other methods are not affected.

use derive_more::{Display, Error, From};
use ember_ir::Graph;
use ember_opt::{
    MethodStats, NullabilityMap, OptError, OptimizationConfig, OptimizedMethod, Stat,
    optimize_method,
};
use rayon::prelude::*;
use tracing::{info, warn};

#[derive(Debug, Display, Error, From)]
pub enum CompileError {
    #[display("cannot build worker pool: {_0}")]
    ThreadPool(rayon::ThreadPoolBuildError),
}

#[derive(Debug)]
pub enum CompiledMethod {
    Optimized(OptimizedMethod),
    /// The input graph, untouched, and why it could not be optimized.
    Fallback { graph: Graph, reason: OptError },
}

impl CompiledMethod {
    pub fn graph(&self) -> &Graph {
        match self {
            CompiledMethod::Optimized(method) => &method.graph,
            CompiledMethod::Fallback { graph, .. } => graph,
        }
    }

    pub fn is_optimized(&self) -> bool {
        matches!(self, CompiledMethod::Optimized(_))
    }

    pub fn nullability(&self) -> Option<&NullabilityMap> {
        match self {
            CompiledMethod::Optimized(method) => method.nullability.as_ref(),
            CompiledMethod::Fallback { .. } => None,
        }
    }
}

#[derive(Debug)]
pub struct CompilationReport {
    /// One entry per input method, in input order.
    pub methods: Vec<CompiledMethod>,
    /// Counters merged over all methods.
    pub stats: MethodStats,
}

pub struct Compiler {
    config: OptimizationConfig,
    jobs: Option<usize>,
}

impl Compiler {
    pub fn new(config: OptimizationConfig) -> Self {
        Self { config, jobs: None }
    }

    /// Use a dedicated pool of `jobs` workers instead of the global one.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    pub fn compile_method(&self, graph: Graph) -> (CompiledMethod, MethodStats) {
        let mut stats = MethodStats::default();
        stats.record(Stat::AttemptedCompilation, 1);

        let unoptimized = graph.clone();
        match optimize_method(graph, &self.config) {
            Ok(optimized) => {
                stats.merge(&optimized.stats);
                stats.record(Stat::CompiledOptimized, 1);
                (CompiledMethod::Optimized(optimized), stats)
            }
            Err(reason) => {
                warn!(method = unoptimized.name(), %reason, "keeping unoptimized graph");
                stats.record(Stat::FallbackUnoptimized, 1);
                let method = CompiledMethod::Fallback {
                    graph: unoptimized,
                    reason,
                };
                (method, stats)
            }
        }
    }

    pub fn compile_all(&self, graphs: Vec<Graph>) -> Result<CompilationReport, CompileError> {
        let count = graphs.len();
        let compile = || {
            graphs
                .into_par_iter()
                .map(|graph| self.compile_method(graph))
                .collect::<Vec<_>>()
        };
        let results = match self.jobs {
            Some(jobs) => rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build()?
                .install(compile),
            None => compile(),
        };

        let mut stats = MethodStats::default();
        let methods = results
            .into_iter()
            .map(|(method, method_stats)| {
                stats.merge(&method_stats);
                method
            })
            .collect();
        info!(
            methods = count,
            fallbacks = stats.get(Stat::FallbackUnoptimized),
            "compilation finished"
        );
        Ok(CompilationReport { methods, stats })
    }
}
