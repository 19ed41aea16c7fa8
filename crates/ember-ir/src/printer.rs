//! Text format printer for method graphs.
//!
//! ```text
//! method @get(%0: ref) {
//!   field @Obj.f : int {offset = 8}
//! ^bb0:
//!   %1 = instance_get %0 {field = @Obj.f} : int
//!   return %1
//! }
//! ```
//!
//! Values and blocks are renumbered in print order, so removed
//! instructions leave no gaps in the output.

use std::collections::HashMap;
use std::fmt::{self, Write};

use crate::graph::Graph;
use crate::inst::InstKind;
use crate::refs::{BlockRef, InstRef};
use crate::types::FieldData;

struct PrintState<'a> {
    graph: &'a Graph,
    value_names: HashMap<InstRef, String>,
    block_labels: HashMap<BlockRef, String>,
    next_value_num: usize,
}

impl<'a> PrintState<'a> {
    fn new(graph: &'a Graph) -> Self {
        let block_labels = graph
            .blocks()
            .enumerate()
            .map(|(i, b)| (b, format!("^bb{i}")))
            .collect();
        Self {
            graph,
            value_names: HashMap::new(),
            block_labels,
            next_value_num: 0,
        }
    }

    fn assign_value_name(&mut self, v: InstRef) -> String {
        let name = format!("%{}", self.next_value_num);
        self.next_value_num += 1;
        self.value_names.insert(v, name.clone());
        name
    }

    /// Name of a value; pre-assigned for every value the printer will see,
    /// so phis may refer to values printed later.
    fn value_name(&self, v: InstRef) -> &str {
        self.value_names.get(&v).map(|s| s.as_str()).unwrap_or("%?")
    }

    fn block_label(&self, b: BlockRef) -> &str {
        self.block_labels
            .get(&b)
            .map(|s| s.as_str())
            .unwrap_or("^bb?")
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Print a method graph as IR text.
pub fn print_graph(graph: &Graph) -> String {
    print_graph_annotated(graph, |_| None)
}

/// Print a method graph, appending `  // text` to every instruction for
/// which `annotate` returns a note.
pub fn print_graph_annotated(
    graph: &Graph,
    annotate: impl Fn(InstRef) -> Option<String>,
) -> String {
    let mut out = String::new();
    write_graph(&mut out, graph, &annotate).expect("fmt::Write to String never fails");
    out
}

/// Print several methods separated by blank lines.
pub fn print_methods(graphs: &[Graph]) -> String {
    graphs
        .iter()
        .map(print_graph)
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Method printing
// ============================================================================

fn write_graph(
    f: &mut impl Write,
    graph: &Graph,
    annotate: &dyn Fn(InstRef) -> Option<String>,
) -> fmt::Result {
    let mut state = PrintState::new(graph);

    let params = graph.parameters();
    for &p in &params {
        state.assign_value_name(p);
    }
    for block in graph.blocks() {
        for inst in graph.block_insts(block) {
            if !params.contains(&inst) && !graph.ty(inst).is_void() {
                state.assign_value_name(inst);
            }
        }
    }

    write!(f, "method @{}(", graph.name())?;
    for (i, &p) in params.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}: {}", state.value_name(p), graph.ty(p))?;
    }
    f.write_char(')')?;
    if graph.is_static() {
        f.write_str(" static")?;
    }
    if graph.is_synchronized() {
        f.write_str(" synchronized")?;
    }
    f.write_str(" {\n")?;

    for (_, field) in graph.fields() {
        write_field(f, field)?;
    }

    for block in graph.blocks() {
        writeln!(f, "{}:", state.block_label(block))?;
        for inst in graph.block_insts(block) {
            if params.contains(&inst) {
                continue;
            }
            f.write_str("  ")?;
            write_inst(&state, f, inst)?;
            if let Some(note) = annotate(inst) {
                write!(f, "  // {note}")?;
            }
            f.write_char('\n')?;
        }
    }
    f.write_str("}\n")
}

fn write_field(f: &mut impl Write, field: &FieldData) -> fmt::Result {
    write!(
        f,
        "  field @{} : {} {{offset = {}",
        field.qualified_name(),
        field.ty,
        field.offset
    )?;
    if field.is_static {
        f.write_str(", static = true")?;
    }
    if field.is_volatile {
        f.write_str(", volatile = true")?;
    }
    f.write_str("}\n")
}

// ============================================================================
// Instruction printing
// ============================================================================

fn write_inst(state: &PrintState<'_>, f: &mut impl Write, inst: InstRef) -> fmt::Result {
    let graph = state.graph;
    let kind = graph.kind(inst);
    let ty = graph.ty(inst);

    if !ty.is_void() {
        write!(f, "{} = ", state.value_name(inst))?;
    }
    f.write_str(kind.mnemonic())?;

    if kind.is_phi() {
        f.write_str(" [")?;
        let block = graph.block_of(inst);
        let preds = block.map(|b| graph.preds(b)).unwrap_or(&[]);
        for (i, &v) in graph.inputs(inst).iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let label = preds.get(i).map(|&p| state.block_label(p)).unwrap_or("^bb?");
            write!(f, "{label}: {}", state.value_name(v))?;
        }
        f.write_char(']')?;
    } else {
        for (i, &v) in graph.inputs(inst).iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            f.write_str(state.value_name(v))?;
        }
    }

    if matches!(kind, InstKind::Goto | InstKind::If) {
        let succs = graph
            .block_of(inst)
            .map(|b| graph.succs(b))
            .unwrap_or(&[]);
        f.write_str(" [")?;
        for (i, &s) in succs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(state.block_label(s))?;
        }
        f.write_char(']')?;
    }

    match kind {
        InstKind::Constant(value) => write!(f, " {{value = {value}}}")?,
        InstKind::NewInstance { class } => write!(f, " {{class = @{class}}}")?,
        InstKind::NewArray { component } => write!(f, " {{component = {component}}}")?,
        InstKind::InstanceFieldGet { field }
        | InstKind::InstanceFieldSet { field }
        | InstKind::StaticFieldGet { field }
        | InstKind::StaticFieldSet { field } => {
            write!(f, " {{field = @{}}}", graph.field(*field).qualified_name())?
        }
        InstKind::Invoke { method, .. } => write!(f, " {{method = @{method}}}")?,
        _ => {}
    }

    if !ty.is_void() {
        write!(f, " : {ty}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::inst::{CondOp, InvokeKind};
    use crate::types::Type;
    use insta::assert_snapshot;

    #[test]
    fn prints_fields_and_accesses() {
        let mut graph = Graph::new("store_then_load");
        let mut b = GraphBuilder::new(&mut graph);
        let f = b.field(FieldData::instance("Obj", "f", Type::Int, 8));
        let obj = b.new_instance("Obj");
        let five = b.constant(5, Type::Int);
        b.instance_set(obj, f, five);
        let x = b.instance_get(obj, f);
        b.ret(x);

        assert_snapshot!(print_graph(&graph), @r"
        method @store_then_load() {
          field @Obj.f : int {offset = 8}
        ^bb0:
          %0 = new_instance {class = @Obj} : ref
          %1 = const {value = 5} : int
          instance_set %0, %1 {field = @Obj.f}
          %2 = instance_get %0 {field = @Obj.f} : int
          return %2
        }
        ");
    }

    #[test]
    fn prints_control_flow_and_phis() {
        let mut graph = Graph::new("pick");
        graph.set_static(true);
        let mut b = GraphBuilder::new(&mut graph);
        let p = b.param(Type::Reference);
        let q = b.param(Type::Int);
        let then_block = b.create_block();
        let join = b.create_block();
        let zero = b.constant(0, Type::Int);
        let c = b.compare(CondOp::Lt, q, zero);
        b.if_(c, then_block, join);
        b.switch_to_block(then_block);
        let len = b.invoke(InvokeKind::Virtual, "Obj.size", &[p], Type::Int);
        b.goto(join);
        b.switch_to_block(join);
        let m = b.phi(join, Type::Int, &[zero, len]);
        b.ret(m);

        assert_snapshot!(print_graph(&graph), @r"
        method @pick(%0: ref, %1: int) static {
        ^bb0:
          %2 = const {value = 0} : int
          %3 = lt %1, %2 : bool
          if %3 [^bb1, ^bb2]
        ^bb1:
          %4 = invoke_virtual %0 {method = @Obj.size} : int
          goto [^bb2]
        ^bb2:
          %5 = phi [^bb0: %2, ^bb1: %4] : int
          return %5
        }
        ");
    }

    #[test]
    fn annotations_and_renumbering_after_removal() {
        let mut graph = Graph::new("f");
        let mut b = GraphBuilder::new(&mut graph);
        let dead = b.constant(1, Type::Int);
        let live = b.constant(2, Type::Int);
        b.ret(live);
        graph.remove_inst(dead);

        let out = print_graph_annotated(&graph, |i| (i == live).then(|| "kept".to_owned()));
        assert_snapshot!(out, @r"
        method @f() {
        ^bb0:
          %0 = const {value = 2} : int  // kept
          return %0
        }
        ");
    }
}
