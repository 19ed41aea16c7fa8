//! The optimization pipeline for one method.

use bitflags::bitflags;
use ember_ir::Graph;
use ember_ir::validation::verify;
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use crate::dce::{DceConfig, DeadCodeElimination};
use crate::error::OptError;
use crate::lse::LoadStoreElimination;
use crate::null_check_elimination::NullCheckElimination;
use crate::null_propagation::{NullPropagation, NullabilityMap};
use crate::pass::{CompilationUnit, PassManager};
use crate::side_effects::SideEffectsAnalysis;
use crate::stats::MethodStats;

/// Names a pass in configuration files and on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassId {
    SideEffects,
    LoadStoreElimination,
    NullPropagation,
    NullCheckElimination,
    DeadCodeElimination,
}

impl PassId {
    /// Every pass, in default pipeline order.
    pub const ALL: [PassId; 5] = [
        PassId::SideEffects,
        PassId::LoadStoreElimination,
        PassId::NullPropagation,
        PassId::NullCheckElimination,
        PassId::DeadCodeElimination,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PassId::SideEffects => "side_effects",
            PassId::LoadStoreElimination => "load_store_elimination",
            PassId::NullPropagation => "null_propagation",
            PassId::NullCheckElimination => "null_check_elimination",
            PassId::DeadCodeElimination => "dead_code_elimination",
        }
    }

    pub fn from_name(name: &str) -> Option<PassId> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }

    pub fn flag(self) -> PassSet {
        match self {
            PassId::SideEffects => PassSet::SIDE_EFFECTS,
            PassId::LoadStoreElimination => PassSet::LOAD_STORE_ELIMINATION,
            PassId::NullPropagation => PassSet::NULL_PROPAGATION,
            PassId::NullCheckElimination => PassSet::NULL_CHECK_ELIMINATION,
            PassId::DeadCodeElimination => PassSet::DEAD_CODE_ELIMINATION,
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct PassSet: u8 {
        const SIDE_EFFECTS = 1 << 0;
        const LOAD_STORE_ELIMINATION = 1 << 1;
        const NULL_PROPAGATION = 1 << 2;
        const NULL_CHECK_ELIMINATION = 1 << 3;
        const DEAD_CODE_ELIMINATION = 1 << 4;
    }
}

impl FromIterator<PassId> for PassSet {
    fn from_iter<I: IntoIterator<Item = PassId>>(iter: I) -> Self {
        iter.into_iter()
            .fold(PassSet::empty(), |set, id| set | id.flag())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptimizationConfig {
    /// Passes in execution order.
    pub passes: Vec<PassId>,
    /// Passes skipped even though they are listed.
    pub disabled: PassSet,
    /// Run the graph checker after every pass that changed the graph.
    pub verify: bool,
    pub dce: DceConfig,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            passes: PassId::ALL.to_vec(),
            disabled: PassSet::empty(),
            verify: true,
            dce: DceConfig::default(),
        }
    }
}

impl OptimizationConfig {
    pub fn is_enabled(&self, id: PassId) -> bool {
        self.passes.contains(&id) && !self.disabled.contains(id.flag())
    }
}

pub struct Pipeline;

impl Pipeline {
    /// Fresh pass instances for one method, in configured order.
    pub fn from_config(config: &OptimizationConfig) -> PassManager {
        let mut manager = PassManager::new(config.verify);
        for &id in &config.passes {
            if config.disabled.contains(id.flag()) {
                debug!(pass = id.name(), "disabled by configuration");
                continue;
            }
            match id {
                PassId::SideEffects => manager.add_block_pass(SideEffectsAnalysis::new()),
                PassId::LoadStoreElimination => manager.add_block_pass(LoadStoreElimination::new()),
                PassId::NullPropagation => manager.add_graph_pass(NullPropagation),
                PassId::NullCheckElimination => manager.add_graph_pass(NullCheckElimination),
                PassId::DeadCodeElimination => manager.add_graph_pass(DeadCodeElimination),
            };
        }
        manager
    }
}

/// A method after a successful pipeline run.
#[derive(Debug)]
pub struct OptimizedMethod {
    pub graph: Graph,
    pub stats: MethodStats,
    /// The last nullability facts still valid for `graph`, if any.
    pub nullability: Option<NullabilityMap>,
}

/// Check `graph`, then run the configured pipeline over it.
pub fn optimize_method(graph: Graph, config: &OptimizationConfig) -> Result<OptimizedMethod, OptError> {
    let _span = info_span!("method", name = graph.name()).entered();

    verify(&graph)
        .into_result()
        .map_err(|violations| OptError::InvariantViolation {
            pass: "input",
            violations,
        })?;

    let mut unit = CompilationUnit::new(graph, config.clone());
    Pipeline::from_config(config).run(&mut unit)?;

    Ok(OptimizedMethod {
        nullability: unit.analyses.take_nullability(),
        graph: unit.graph,
        stats: unit.stats,
    })
}
