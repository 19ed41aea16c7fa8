//! Entity references for the method graph.
//!
//! Each ref type is a thin `u32` wrapper providing type-safe indexing
//! into `PrimaryMap` storage in [`Graph`](crate::Graph). An SSA value is
//! identified by the instruction that defines it, so [`InstRef`] doubles
//! as the per-method value id used by analysis side tables.

use cranelift_entity::entity_impl;

/// Reference to an instruction (and the SSA value it defines).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstRef(u32);
entity_impl!(InstRef, "%");

/// Reference to a basic block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRef(u32);
entity_impl!(BlockRef, "^bb");

/// Reference to a resolved field in the method's field table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef(u32);
entity_impl!(FieldRef, "field");

/// Reference to a natural loop in a [`LoopForest`](crate::loops::LoopForest).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopRef(u32);
entity_impl!(LoopRef, "loop");

/// A single use of a value: which instruction uses it, at which input index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Use {
    pub user: InstRef,
    pub index: u32,
}
