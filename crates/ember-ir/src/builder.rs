//! Positional builder for method graphs.
//!
//! Instructions are appended at the end of the current block. Terminator
//! helpers also add the matching control-flow edges, so phis in a target
//! block must be given their inputs after all edges into it exist.

use crate::graph::Graph;
use crate::inst::{BinaryOp, CondOp, InstKind, InvokeKind};
use crate::refs::{BlockRef, FieldRef, InstRef};
use crate::types::{FieldData, Type};

pub struct GraphBuilder<'g> {
    graph: &'g mut Graph,
    block: BlockRef,
    param_count: u32,
}

impl<'g> GraphBuilder<'g> {
    /// Start building at the graph's entry block.
    pub fn new(graph: &'g mut Graph) -> Self {
        let block = graph.entry();
        let param_count = graph.parameters().len() as u32;
        Self {
            graph,
            block,
            param_count,
        }
    }

    pub fn graph(&mut self) -> &mut Graph {
        self.graph
    }

    pub fn current_block(&self) -> BlockRef {
        self.block
    }

    pub fn create_block(&mut self) -> BlockRef {
        self.graph.create_block()
    }

    pub fn switch_to_block(&mut self, block: BlockRef) {
        self.block = block;
    }

    pub fn field(&mut self, data: FieldData) -> FieldRef {
        self.graph.intern_field(data)
    }

    /// Append an arbitrary instruction to the current block.
    pub fn push(
        &mut self,
        kind: InstKind,
        ty: Type,
        inputs: impl IntoIterator<Item = InstRef>,
    ) -> InstRef {
        let inst = self.graph.create_inst(kind, ty, inputs);
        self.graph.append_inst(self.block, inst);
        inst
    }

    /// Append the next method parameter. Parameters always go to the entry
    /// block regardless of the current position.
    pub fn param(&mut self, ty: Type) -> InstRef {
        let index = self.param_count;
        self.param_count += 1;
        let inst = self
            .graph
            .create_inst(InstKind::Parameter { index }, ty, []);
        let entry = self.graph.entry();
        let first_non_param = self
            .graph
            .insts(entry)
            .iter()
            .copied()
            .find(|&i| !matches!(self.graph.kind(i), InstKind::Parameter { .. }));
        match first_non_param {
            Some(anchor) => self.graph.insert_before(anchor, inst),
            None => self.graph.append_inst(entry, inst),
        }
        inst
    }

    pub fn constant(&mut self, value: i64, ty: Type) -> InstRef {
        self.push(InstKind::Constant(value), ty, [])
    }

    pub fn null(&mut self) -> InstRef {
        self.push(InstKind::NullConstant, Type::Reference, [])
    }

    /// Add a phi to `block` with the given inputs, in predecessor order.
    /// Pass an empty slice and use [`Graph::push_input`] when inputs are
    /// not yet defined.
    pub fn phi(&mut self, block: BlockRef, ty: Type, inputs: &[InstRef]) -> InstRef {
        let phi = self
            .graph
            .create_inst(InstKind::Phi, ty, inputs.iter().copied());
        self.graph.append_phi(block, phi);
        phi
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: InstRef, rhs: InstRef) -> InstRef {
        let ty = self.graph.ty(lhs);
        self.push(InstKind::Binary(op), ty, [lhs, rhs])
    }

    pub fn compare(&mut self, cond: CondOp, lhs: InstRef, rhs: InstRef) -> InstRef {
        self.push(InstKind::Compare(cond), Type::Bool, [lhs, rhs])
    }

    pub fn new_instance(&mut self, class: impl Into<String>) -> InstRef {
        self.push(
            InstKind::NewInstance {
                class: class.into(),
            },
            Type::Reference,
            [],
        )
    }

    pub fn new_array(&mut self, component: Type, length: InstRef) -> InstRef {
        self.push(InstKind::NewArray { component }, Type::Reference, [length])
    }

    pub fn instance_get(&mut self, object: InstRef, field: FieldRef) -> InstRef {
        let ty = self.graph.field(field).ty;
        self.push(InstKind::InstanceFieldGet { field }, ty, [object])
    }

    pub fn instance_set(&mut self, object: InstRef, field: FieldRef, value: InstRef) -> InstRef {
        self.push(
            InstKind::InstanceFieldSet { field },
            Type::Void,
            [object, value],
        )
    }

    pub fn static_get(&mut self, field: FieldRef) -> InstRef {
        let ty = self.graph.field(field).ty;
        self.push(InstKind::StaticFieldGet { field }, ty, [])
    }

    pub fn static_set(&mut self, field: FieldRef, value: InstRef) -> InstRef {
        self.push(InstKind::StaticFieldSet { field }, Type::Void, [value])
    }

    pub fn array_get(&mut self, array: InstRef, index: InstRef, component: Type) -> InstRef {
        self.push(InstKind::ArrayGet, component, [array, index])
    }

    pub fn array_set(&mut self, array: InstRef, index: InstRef, value: InstRef) -> InstRef {
        self.push(InstKind::ArraySet, Type::Void, [array, index, value])
    }

    pub fn array_length(&mut self, array: InstRef) -> InstRef {
        self.push(InstKind::ArrayLength, Type::Int, [array])
    }

    pub fn null_check(&mut self, object: InstRef) -> InstRef {
        self.push(InstKind::NullCheck, Type::Reference, [object])
    }

    /// Append an invoke. For non-static kinds the receiver is `args[0]`.
    pub fn invoke(
        &mut self,
        kind: InvokeKind,
        method: impl Into<String>,
        args: &[InstRef],
        ret: Type,
    ) -> InstRef {
        assert!(
            !kind.has_receiver() || !args.is_empty(),
            "invoke: {} requires a receiver argument",
            kind.mnemonic()
        );
        self.push(
            InstKind::Invoke {
                kind,
                method: method.into(),
            },
            ret,
            args.iter().copied(),
        )
    }

    pub fn monitor_enter(&mut self, object: InstRef) -> InstRef {
        self.push(InstKind::MonitorEnter, Type::Void, [object])
    }

    pub fn monitor_exit(&mut self, object: InstRef) -> InstRef {
        self.push(InstKind::MonitorExit, Type::Void, [object])
    }

    pub fn opaque(&mut self, name: impl Into<String>, args: &[InstRef], ty: Type) -> InstRef {
        self.push(InstKind::Opaque { name: name.into() }, ty, args.iter().copied())
    }

    pub fn goto(&mut self, target: BlockRef) -> InstRef {
        let inst = self.push(InstKind::Goto, Type::Void, []);
        self.graph.add_edge(self.block, target);
        inst
    }

    pub fn if_(&mut self, cond: InstRef, then_block: BlockRef, else_block: BlockRef) -> InstRef {
        let inst = self.push(InstKind::If, Type::Void, [cond]);
        self.graph.add_edge(self.block, then_block);
        self.graph.add_edge(self.block, else_block);
        inst
    }

    pub fn ret(&mut self, value: InstRef) -> InstRef {
        self.push(InstKind::Return, Type::Void, [value])
    }

    pub fn ret_void(&mut self) -> InstRef {
        self.push(InstKind::ReturnVoid, Type::Void, [])
    }

    pub fn throw(&mut self, exception: InstRef) -> InstRef {
        self.push(InstKind::Throw, Type::Void, [exception])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_land_in_entry_block() {
        let mut graph = Graph::new("f");
        let mut b = GraphBuilder::new(&mut graph);
        let other = b.create_block();
        b.goto(other);
        b.switch_to_block(other);
        let p = b.param(Type::Int);
        b.ret(p);

        assert_eq!(graph.block_of(p), Some(graph.entry()));
        assert_eq!(graph.parameters(), vec![p]);
        assert_eq!(graph.insts(graph.entry())[0], p);
    }

    #[test]
    fn terminators_add_edges() {
        let mut graph = Graph::new("f");
        let mut b = GraphBuilder::new(&mut graph);
        let c = b.constant(1, Type::Bool);
        let then_block = b.create_block();
        let else_block = b.create_block();
        b.if_(c, then_block, else_block);
        let entry = graph.entry();

        assert_eq!(graph.succs(entry), &[then_block, else_block]);
        assert_eq!(graph.preds(then_block), &[entry]);
        assert!(graph.terminator(entry).is_some());
    }

    #[test]
    fn field_accessors_take_field_type() {
        let mut graph = Graph::new("f");
        let mut b = GraphBuilder::new(&mut graph);
        let obj = b.new_instance("Obj");
        let f = b.field(FieldData::instance("Obj", "count", Type::Long, 8));
        let x = b.instance_get(obj, f);
        b.ret(x);

        assert_eq!(graph.ty(x), Type::Long);
    }
}
