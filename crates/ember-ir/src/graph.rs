//! Graph: arena-based storage for one method's SSA control-flow graph.
//!
//! All entities (instructions, blocks, fields) live in `PrimaryMap`s owned
//! by [`Graph`]. Use-chains are maintained on every mutation, which makes
//! "replace all uses with" and "is this value dead" O(uses).

use std::collections::HashMap;

use cranelift_entity::{PrimaryMap, SecondaryMap};
use smallvec::SmallVec;

use crate::inst::{InstData, InstKind};
use crate::refs::{BlockRef, FieldRef, InstRef, Use};
use crate::types::{FieldData, Type};

// ============================================================================
// Entity data types
// ============================================================================

/// Data for a basic block.
#[derive(Clone, Debug, Default)]
pub struct BlockData {
    /// Phi nodes at block entry.
    pub phis: SmallVec<[InstRef; 2]>,
    /// Instructions in order; the last one is the block's terminator.
    pub insts: Vec<InstRef>,
    /// Predecessors in edge-insertion order. Phi inputs follow this order.
    pub preds: SmallVec<[BlockRef; 2]>,
    pub succs: SmallVec<[BlockRef; 2]>,
}

// ============================================================================
// Graph
// ============================================================================

/// The SSA control-flow graph of a single method.
///
/// Owns all IR entities of the method and provides methods for creating,
/// querying and mutating them. The entry block is created together with
/// the graph.
#[derive(Clone)]
pub struct Graph {
    name: String,
    is_static: bool,
    is_synchronized: bool,

    insts: PrimaryMap<InstRef, InstData>,
    blocks: PrimaryMap<BlockRef, BlockData>,
    fields: PrimaryMap<FieldRef, FieldData>,
    field_ids: HashMap<(String, u32, bool), FieldRef>,

    /// Use-chain: for each value, the instructions that use it.
    uses: SecondaryMap<InstRef, SmallVec<[Use; 2]>>,
    /// Tombstones for removed instructions.
    removed: SecondaryMap<InstRef, bool>,

    entry: BlockRef,
}

impl Graph {
    /// Create a graph containing only an empty entry block.
    pub fn new(name: impl Into<String>) -> Self {
        let mut blocks = PrimaryMap::new();
        let entry = blocks.push(BlockData::default());
        Self {
            name: name.into(),
            is_static: false,
            is_synchronized: false,
            insts: PrimaryMap::new(),
            blocks,
            fields: PrimaryMap::new(),
            field_ids: HashMap::new(),
            uses: SecondaryMap::new(),
            removed: SecondaryMap::new(),
            entry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Static methods have no receiver parameter.
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn set_static(&mut self, is_static: bool) {
        self.is_static = is_static;
    }

    /// Synchronized methods hold the receiver's (or class's) monitor for
    /// their whole body.
    pub fn is_synchronized(&self) -> bool {
        self.is_synchronized
    }

    pub fn set_synchronized(&mut self, is_synchronized: bool) {
        self.is_synchronized = is_synchronized;
    }

    // ========================================================================
    // Block
    // ========================================================================

    pub fn entry(&self) -> BlockRef {
        self.entry
    }

    /// Make another block the entry. The entry block must have no predecessors.
    pub fn set_entry(&mut self, block: BlockRef) {
        self.entry = block;
    }

    pub fn create_block(&mut self) -> BlockRef {
        self.blocks.push(BlockData::default())
    }

    pub fn block(&self, b: BlockRef) -> &BlockData {
        &self.blocks[b]
    }

    /// All blocks in layout (creation) order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockRef> + '_ {
        self.blocks.keys()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn preds(&self, b: BlockRef) -> &[BlockRef] {
        &self.blocks[b].preds
    }

    pub fn succs(&self, b: BlockRef) -> &[BlockRef] {
        &self.blocks[b].succs
    }

    /// Add a control-flow edge. The new predecessor is appended, so phis in
    /// `to` must receive their matching input afterwards.
    pub fn add_edge(&mut self, from: BlockRef, to: BlockRef) {
        self.blocks[from].succs.push(to);
        self.blocks[to].preds.push(from);
    }

    /// Index of `pred` in the predecessor list of `block`.
    pub fn pred_index(&self, block: BlockRef, pred: BlockRef) -> Option<usize> {
        self.blocks[block].preds.iter().position(|&p| p == pred)
    }

    pub fn phis(&self, b: BlockRef) -> &[InstRef] {
        &self.blocks[b].phis
    }

    /// Non-phi instructions of a block, terminator last.
    pub fn insts(&self, b: BlockRef) -> &[InstRef] {
        &self.blocks[b].insts
    }

    /// Phis followed by the instructions of a block.
    pub fn block_insts(&self, b: BlockRef) -> impl Iterator<Item = InstRef> + '_ {
        let data = &self.blocks[b];
        data.phis.iter().chain(data.insts.iter()).copied()
    }

    /// Index of an instruction within its block, counting phis first.
    pub fn position_in_block(&self, i: InstRef) -> Option<usize> {
        let block = self.insts[i].block?;
        self.block_insts(block).position(|other| other == i)
    }

    /// The block's terminator, if its last instruction is one.
    pub fn terminator(&self, b: BlockRef) -> Option<InstRef> {
        self.blocks[b]
            .insts
            .last()
            .copied()
            .filter(|&i| self.insts[i].kind.is_terminator())
    }

    // ========================================================================
    // Field
    // ========================================================================

    /// Register a field, returning the existing ref if one with the same
    /// identity (class, offset, static-ness) is already known.
    pub fn intern_field(&mut self, data: FieldData) -> FieldRef {
        let key = (data.class.clone(), data.offset, data.is_static);
        if let Some(&existing) = self.field_ids.get(&key) {
            return existing;
        }
        let field = self.fields.push(data);
        self.field_ids.insert(key, field);
        field
    }

    pub fn field(&self, f: FieldRef) -> &FieldData {
        &self.fields[f]
    }

    pub fn fields(&self) -> impl Iterator<Item = (FieldRef, &FieldData)> + '_ {
        self.fields.iter()
    }

    // ========================================================================
    // Instruction
    // ========================================================================

    /// Create a detached instruction and register its input uses.
    pub fn create_inst(
        &mut self,
        kind: InstKind,
        ty: Type,
        inputs: impl IntoIterator<Item = InstRef>,
    ) -> InstRef {
        let inputs: SmallVec<[InstRef; 3]> = inputs.into_iter().collect();
        for &input in &inputs {
            assert!(
                !self.removed[input],
                "create_inst: input {input} has been removed from the graph"
            );
        }
        let inst = self.insts.push(InstData {
            kind,
            ty,
            inputs: inputs.clone(),
            block: None,
        });
        for (idx, &input) in inputs.iter().enumerate() {
            self.uses[input].push(Use {
                user: inst,
                index: idx as u32,
            });
        }
        inst
    }

    pub fn inst(&self, i: InstRef) -> &InstData {
        &self.insts[i]
    }

    pub fn kind(&self, i: InstRef) -> &InstKind {
        &self.insts[i].kind
    }

    pub fn ty(&self, i: InstRef) -> Type {
        self.insts[i].ty
    }

    pub fn inputs(&self, i: InstRef) -> &[InstRef] {
        &self.insts[i].inputs
    }

    pub fn input(&self, i: InstRef, index: usize) -> InstRef {
        self.insts[i].inputs[index]
    }

    pub fn block_of(&self, i: InstRef) -> Option<BlockRef> {
        self.insts[i].block
    }

    pub fn is_removed(&self, i: InstRef) -> bool {
        self.removed[i]
    }

    /// Number of instructions ever created, including removed ones. Side
    /// tables sized by this cover every `InstRef` of the graph.
    pub fn inst_capacity(&self) -> usize {
        self.insts.len()
    }

    /// All live instructions in block layout order, phis first per block.
    pub fn all_insts(&self) -> impl Iterator<Item = InstRef> + '_ {
        self.blocks().flat_map(move |b| self.block_insts(b))
    }

    /// Parameter instructions of the entry block, by parameter index.
    pub fn parameters(&self) -> Vec<InstRef> {
        let mut params: Vec<(u32, InstRef)> = self
            .insts(self.entry)
            .iter()
            .filter_map(|&i| match self.insts[i].kind {
                InstKind::Parameter { index } => Some((index, i)),
                _ => None,
            })
            .collect();
        params.sort_by_key(|&(index, _)| index);
        params.into_iter().map(|(_, i)| i).collect()
    }

    /// Whether any instruction enters or exits a monitor.
    pub fn has_monitor_operations(&self) -> bool {
        self.all_insts().any(|i| {
            matches!(
                self.insts[i].kind,
                InstKind::MonitorEnter | InstKind::MonitorExit
            )
        })
    }

    /// Append an instruction to the end of a block.
    ///
    /// # Panics
    ///
    /// Panics if the instruction is a phi or already belongs to a block.
    pub fn append_inst(&mut self, block: BlockRef, inst: InstRef) {
        self.check_detached("append_inst", inst);
        assert!(
            !self.insts[inst].kind.is_phi(),
            "append_inst: {inst} is a phi; use append_phi"
        );
        self.insts[inst].block = Some(block);
        self.blocks[block].insts.push(inst);
    }

    /// Append a phi to the phi list of a block.
    ///
    /// # Panics
    ///
    /// Panics if the instruction is not a phi or already belongs to a block.
    pub fn append_phi(&mut self, block: BlockRef, phi: InstRef) {
        self.check_detached("append_phi", phi);
        assert!(
            self.insts[phi].kind.is_phi(),
            "append_phi: {phi} is not a phi"
        );
        self.insts[phi].block = Some(block);
        self.blocks[block].phis.push(phi);
    }

    /// Insert an instruction right before `before` in `before`'s block.
    ///
    /// # Panics
    ///
    /// Panics if `inst` is attached, or if `before` is not attached.
    pub fn insert_before(&mut self, before: InstRef, inst: InstRef) {
        self.check_detached("insert_before", inst);
        let block = self.insts[before]
            .block
            .unwrap_or_else(|| panic!("insert_before: anchor {before} is not in a block"));
        let insts = &mut self.blocks[block].insts;
        let pos = insts
            .iter()
            .position(|&i| i == before)
            .unwrap_or_else(|| panic!("insert_before: anchor {before} not found in {block}"));
        insts.insert(pos, inst);
        self.insts[inst].block = Some(block);
    }

    /// Append one more input to an instruction (used to fill phis).
    pub fn push_input(&mut self, inst: InstRef, value: InstRef) {
        let index = self.insts[inst].inputs.len() as u32;
        self.insts[inst].inputs.push(value);
        self.uses[value].push(Use { user: inst, index });
    }

    /// Detach an instruction from its block and drop it from the use-chains
    /// of its inputs. The arena slot stays allocated as a tombstone.
    ///
    /// # Panics
    ///
    /// Panics if the instruction's value still has uses, as that would leave
    /// dangling references.
    pub fn remove_inst(&mut self, inst: InstRef) {
        assert!(
            self.uses[inst].is_empty(),
            "remove_inst: {inst} still has {} use(s); replace all uses before removing it",
            self.uses[inst].len()
        );
        if let Some(block) = self.insts[inst].block.take() {
            let data = &mut self.blocks[block];
            data.phis.retain(|i| *i != inst);
            data.insts.retain(|i| *i != inst);
        }
        let inputs = std::mem::take(&mut self.insts[inst].inputs);
        for (idx, &input) in inputs.iter().enumerate() {
            self.uses[input].retain(|u| !(u.user == inst && u.index == idx as u32));
        }
        self.removed[inst] = true;
    }

    fn check_detached(&self, what: &str, inst: InstRef) {
        assert!(
            !self.removed[inst],
            "{what}: {inst} has been removed from the graph"
        );
        if let Some(block) = self.insts[inst].block {
            panic!("{what}: {inst} already belongs to {block}; remove it first");
        }
    }

    // ========================================================================
    // Use-chain
    // ========================================================================

    pub fn uses(&self, i: InstRef) -> &[Use] {
        &self.uses[i]
    }

    pub fn has_uses(&self, i: InstRef) -> bool {
        !self.uses[i].is_empty()
    }

    /// Replace all uses of `old` with `new`, updating inputs and use-chains.
    pub fn replace_all_uses(&mut self, old: InstRef, new: InstRef) {
        if old == new {
            return;
        }
        let old_uses = std::mem::take(&mut self.uses[old]);
        for u in &old_uses {
            let slot = &mut self.insts[u.user].inputs[u.index as usize];
            debug_assert_eq!(*slot, old);
            *slot = new;
            self.uses[new].push(*u);
        }
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("blocks", &self.blocks.len())
            .field("insts", &self.insts.len())
            .finish_non_exhaustive()
    }
}
