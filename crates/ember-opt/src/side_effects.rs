//! Side-effects analysis.
//!
//! Memory is partitioned into categories: instance fields, static fields and
//! array elements, each split by value type, plus an `Unknown` category for
//! memory the method cannot name. Two accesses in different categories
//! never touch the same memory. Touching `Unknown` counts as touching every
//! category.

use std::fmt;

use ember_ir::cranelift_entity::SecondaryMap;
use ember_ir::{BlockRef, Graph, InstKind, InstRef, LoopForest, Type};
use tracing::trace;

use crate::error::OptError;
use crate::pass::{AnalysisSet, BlockOrder, BlockPass, CompilationUnit, Pass};

const TYPE_COUNT: u32 = Type::VALUE_TYPES.len() as u32;
const INSTANCE_FIELD_BASE: u32 = 0;
const STATIC_FIELD_BASE: u32 = TYPE_COUNT;
const ARRAY_ELEMENT_BASE: u32 = 2 * TYPE_COUNT;
const UNKNOWN_BIT: u32 = 3 * TYPE_COUNT;
const READ_SHIFT: u32 = 32;
const HALF_MASK: u64 = (1 << (UNKNOWN_BIT + 1)) - 1;

/// A partition of the heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HeapCategory {
    InstanceField(Type),
    StaticField(Type),
    ArrayElement(Type),
    Unknown,
}

impl HeapCategory {
    fn bit(self) -> u32 {
        let (base, ty) = match self {
            HeapCategory::InstanceField(ty) => (INSTANCE_FIELD_BASE, ty),
            HeapCategory::StaticField(ty) => (STATIC_FIELD_BASE, ty),
            HeapCategory::ArrayElement(ty) => (ARRAY_ELEMENT_BASE, ty),
            HeapCategory::Unknown => return UNKNOWN_BIT,
        };
        match ty.value_index() {
            Some(index) => base + index,
            None => UNKNOWN_BIT,
        }
    }
}

/// Read and write sets over heap categories.
///
/// The low half holds writes, the high half reads.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SideEffects(u64);

impl SideEffects {
    pub const fn none() -> Self {
        SideEffects(0)
    }

    /// Reads and writes everything.
    pub const fn all() -> Self {
        SideEffects(HALF_MASK | (HALF_MASK << READ_SHIFT))
    }

    pub fn read(category: HeapCategory) -> Self {
        SideEffects(1 << (category.bit() + READ_SHIFT))
    }

    pub fn write(category: HeapCategory) -> Self {
        SideEffects(1 << category.bit())
    }

    pub fn field_read(ty: Type, is_static: bool) -> Self {
        Self::read(field_category(ty, is_static))
    }

    pub fn field_write(ty: Type, is_static: bool) -> Self {
        Self::write(field_category(ty, is_static))
    }

    pub fn array_read(component: Type) -> Self {
        Self::read(HeapCategory::ArrayElement(component))
    }

    pub fn array_write(component: Type) -> Self {
        Self::write(HeapCategory::ArrayElement(component))
    }

    #[must_use]
    pub fn union(self, other: SideEffects) -> Self {
        SideEffects(self.0 | other.0)
    }

    fn writes(self) -> u64 {
        self.0 & HALF_MASK
    }

    fn reads(self) -> u64 {
        (self.0 >> READ_SHIFT) & HALF_MASK
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn does_any_write(self) -> bool {
        self.writes() != 0
    }

    pub fn does_any_read(self) -> bool {
        self.reads() != 0
    }

    /// Whether memory in `category` may be written. Asking about `Unknown`
    /// asks whether anything is written at all.
    pub fn may_write(self, category: HeapCategory) -> bool {
        may_touch(self.writes(), category)
    }

    pub fn may_read(self, category: HeapCategory) -> bool {
        may_touch(self.reads(), category)
    }

    /// Whether `self` may read memory that `other` writes.
    pub fn may_depend_on(self, other: SideEffects) -> bool {
        let reads = self.reads();
        let writes = other.writes();
        let unknown = 1 << UNKNOWN_BIT;
        if (reads & unknown != 0 && writes != 0) || (writes & unknown != 0 && reads != 0) {
            return true;
        }
        reads & writes != 0
    }

    /// Whether every effect of `other` is also in `self`.
    pub fn includes(self, other: SideEffects) -> bool {
        self.0 & other.0 == other.0
    }
}

fn field_category(ty: Type, is_static: bool) -> HeapCategory {
    if is_static {
        HeapCategory::StaticField(ty)
    } else {
        HeapCategory::InstanceField(ty)
    }
}

fn may_touch(half: u64, category: HeapCategory) -> bool {
    if category == HeapCategory::Unknown {
        return half != 0;
    }
    half & (1 << category.bit() | 1 << UNKNOWN_BIT) != 0
}

impl std::ops::BitOr for SideEffects {
    type Output = SideEffects;

    fn bitor(self, rhs: SideEffects) -> SideEffects {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for SideEffects {
    fn bitor_assign(&mut self, rhs: SideEffects) {
        *self = self.union(rhs);
    }
}

impl fmt::Debug for SideEffects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SideEffects(w={:#x}, r={:#x})", self.writes(), self.reads())
    }
}

/// Effects of a single instruction.
pub fn effects_of(graph: &Graph, inst: InstRef) -> SideEffects {
    match graph.kind(inst) {
        InstKind::InstanceFieldGet { field } | InstKind::StaticFieldGet { field } => {
            let data = graph.field(*field);
            if data.is_volatile {
                SideEffects::all()
            } else {
                SideEffects::field_read(data.ty, data.is_static)
            }
        }
        InstKind::InstanceFieldSet { field } | InstKind::StaticFieldSet { field } => {
            let data = graph.field(*field);
            if data.is_volatile {
                SideEffects::all()
            } else {
                SideEffects::field_write(data.ty, data.is_static)
            }
        }
        InstKind::ArrayGet => SideEffects::array_read(graph.ty(inst)),
        InstKind::ArraySet => SideEffects::array_write(graph.ty(graph.input(inst, 2))),
        InstKind::Invoke { .. }
        | InstKind::MonitorEnter
        | InstKind::MonitorExit
        | InstKind::Opaque { .. } => SideEffects::all(),
        InstKind::Parameter { .. }
        | InstKind::Constant(_)
        | InstKind::NullConstant
        | InstKind::Phi
        | InstKind::Binary(_)
        | InstKind::Compare(_)
        | InstKind::NewInstance { .. }
        | InstKind::NewArray { .. }
        | InstKind::ArrayLength
        | InstKind::NullCheck
        | InstKind::Goto
        | InstKind::If
        | InstKind::Return
        | InstKind::ReturnVoid
        | InstKind::Throw => SideEffects::none(),
    }
}

/// Per-instruction, per-block and per-loop side effects of a method.
///
/// Block sets are the union of their instructions' sets, and a loop's set
/// is the union of the sets of all its blocks, nested loops included.
#[derive(Clone, Debug, Default)]
pub struct SideEffectsAnalysis {
    instruction_effects: SecondaryMap<InstRef, SideEffects>,
    block_effects: SecondaryMap<BlockRef, SideEffects>,
    loop_effects: SecondaryMap<BlockRef, SideEffects>,
    loops: LoopForest,
    has_run: bool,
}

impl SideEffectsAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instruction_effects(&self, inst: InstRef) -> SideEffects {
        self.instruction_effects[inst]
    }

    pub fn block_effects(&self, block: BlockRef) -> SideEffects {
        self.block_effects[block]
    }

    /// Effects of the loop headed by `header`; none if it heads no loop.
    pub fn loop_effects(&self, header: BlockRef) -> SideEffects {
        self.loop_effects[header]
    }

    pub fn loops(&self) -> &LoopForest {
        &self.loops
    }

    pub fn has_run(&self) -> bool {
        self.has_run
    }
}

impl Pass for SideEffectsAnalysis {
    fn name(&self) -> &'static str {
        "side_effects"
    }

    fn start(&mut self, unit: &mut CompilationUnit) -> Result<(), OptError> {
        let graph = &unit.graph;
        self.instruction_effects = SecondaryMap::with_capacity(graph.inst_capacity());
        self.block_effects = SecondaryMap::with_capacity(graph.block_count());
        self.loop_effects = SecondaryMap::with_capacity(graph.block_count());
        self.loops = unit.analyses.ensure_loops(graph).clone();
        self.has_run = false;
        Ok(())
    }

    fn end(&mut self, unit: &mut CompilationUnit) -> Result<bool, OptError> {
        for block in unit.graph.blocks() {
            let effects = self.block_effects[block];
            if effects.is_none() {
                continue;
            }
            for lp in self.loops.enclosing_loops(block) {
                let header = self.loops.loop_data(lp).header;
                self.loop_effects[header] |= effects;
            }
        }
        self.has_run = true;
        unit.analyses.set_side_effects(std::mem::take(self));
        Ok(false)
    }

    fn preserved_analyses(&self) -> AnalysisSet {
        AnalysisSet::all()
    }
}

impl BlockPass for SideEffectsAnalysis {
    fn order(&self) -> BlockOrder {
        BlockOrder::ReversePostOrder
    }

    fn worker(&mut self, unit: &mut CompilationUnit, block: BlockRef) -> Result<bool, OptError> {
        let graph = &unit.graph;
        let mut block_effects = SideEffects::none();
        for inst in graph.block_insts(block) {
            let effects = effects_of(graph, inst);
            self.instruction_effects[inst] = effects;
            block_effects |= effects;
        }
        trace!(%block, effects = ?block_effects, "block side effects");
        self.block_effects[block] = block_effects;
        Ok(false)
    }
}
