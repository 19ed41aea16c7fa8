//! Ember optimization passes.
//!
//! A [`PassManager`] runs a sequence of passes over one method's graph,
//! owned by a [`CompilationUnit`] together with cached analyses and
//! statistics. [`optimize_method`] builds the configured pipeline and runs
//! it after checking the input graph.

// === Framework ===
pub mod error;
pub mod pass;
pub mod pipeline;
pub mod stats;

// === Analyses ===
pub mod escape;
pub mod null_propagation;
pub mod side_effects;

// === Transformations ===
pub mod dce;
pub mod lse;
pub mod null_check_elimination;

pub use dce::{DceConfig, DceResult, DeadCodeElimination, eliminate_dead_code};
pub use error::OptError;
pub use escape::{EscapeInfo, calculate_escape};
pub use lse::{HeapLocation, LoadStoreElimination};
pub use null_check_elimination::NullCheckElimination;
pub use null_propagation::{NullPropagation, Nullability, NullabilityMap};
pub use pass::{
    AnalysisSet, Analyses, BlockOrder, BlockPass, CompilationUnit, GraphPass, Pass, PassManager,
    PipelinePass,
};
pub use pipeline::{OptimizationConfig, OptimizedMethod, PassId, PassSet, Pipeline, optimize_method};
pub use side_effects::{HeapCategory, SideEffects, SideEffectsAnalysis, effects_of};
pub use stats::{MethodStats, Stat};
