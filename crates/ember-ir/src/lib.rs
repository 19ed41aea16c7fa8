//! Ember IR crate.
//!
//! A per-method SSA control-flow graph stored in arenas, together with the
//! structural analyses every optimization needs (dominance, natural loops),
//! a graph checker and a textual format for tests and tooling.

// === Graph model ===
pub mod builder;
pub mod graph;
pub mod inst;
pub mod refs;
pub mod types;

// === Structural analyses ===
pub mod dominance;
pub mod loops;
pub mod validation;

// === Text format ===
pub mod parser;
pub mod printer;

pub use builder::GraphBuilder;
pub use dominance::DominatorTree;
pub use graph::{BlockData, Graph};
pub use inst::{BinaryOp, CondOp, InstData, InstKind, InvokeKind};
pub use loops::{LoopData, LoopForest};
pub use parser::{ParseError, parse_method, parse_methods, parse_test_method};
pub use printer::{print_graph, print_graph_annotated, print_methods};
pub use refs::{BlockRef, FieldRef, InstRef, LoopRef, Use};
pub use types::{FieldData, Type};
pub use validation::{InvariantViolation, ValidationResult};

// Re-export for analyses that keep dense side tables keyed by graph refs.
pub use cranelift_entity;
