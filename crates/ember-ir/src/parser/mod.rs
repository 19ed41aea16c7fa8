//! Method text format parser.
//!
//! Parses the textual format produced by [`crate::printer`] into method
//! graphs.
//!
//! # Two-stage parsing
//!
//! 1. **Raw parse**: winnow combinators in [`raw`] parse text into `Raw*`
//!    structures.
//! 2. **Graph build**: `MethodBuilder` resolves names and converts `Raw*`
//!    into a [`Graph`].

pub(crate) mod raw;

use std::collections::HashMap;

use derive_more::{Display, Error};
use winnow::prelude::*;

use crate::graph::Graph;
use crate::inst::{BinaryOp, CondOp, InstKind, InvokeKind};
use crate::refs::{BlockRef, FieldRef, InstRef};
use crate::types::{FieldData, Type};
use raw::{RawAttr, RawBlock, RawField, RawInst, RawMethod};

/// Parse error for the method text format.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("parse error at offset {offset}: {message}")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

impl ParseError {
    fn semantic(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            offset: 0,
        }
    }
}

// ============================================================================
// MethodBuilder (Raw -> Graph)
// ============================================================================

struct MethodBuilder<'r> {
    graph: Graph,
    /// Maps value name (without %) -> InstRef
    value_map: HashMap<&'r str, InstRef>,
    /// Maps block label (without ^) -> BlockRef
    block_map: HashMap<&'r str, BlockRef>,
    /// Maps `Class.name` -> FieldRef
    field_map: HashMap<&'r str, FieldRef>,
    /// Phis whose inputs are filled once every edge exists.
    pending_phis: Vec<(InstRef, BlockRef, &'r RawInst<'r>)>,
}

impl<'r> MethodBuilder<'r> {
    fn build(raw: &'r RawMethod<'r>) -> Result<Graph, ParseError> {
        let mut graph = Graph::new(raw.name);
        graph.set_static(raw.is_static);
        graph.set_synchronized(raw.is_synchronized);
        let mut builder = Self {
            graph,
            value_map: HashMap::new(),
            block_map: HashMap::new(),
            field_map: HashMap::new(),
            pending_phis: Vec::new(),
        };

        for field in &raw.fields {
            builder.declare_field(field)?;
        }
        builder.create_blocks(&raw.blocks)?;

        let entry = builder.graph.entry();
        for (index, &(name, ty)) in raw.params.iter().enumerate() {
            let ty = parse_type(ty)?;
            let param = builder.graph.create_inst(
                InstKind::Parameter {
                    index: index as u32,
                },
                ty,
                [],
            );
            builder.graph.append_inst(entry, param);
            builder.define(name, param)?;
        }

        for raw_block in &raw.blocks {
            let block = builder.block_map[raw_block.label];
            for inst in &raw_block.insts {
                builder.build_inst(block, inst)?;
            }
        }
        builder.fill_phis()?;
        Ok(builder.graph)
    }

    fn declare_field(&mut self, raw: &'r RawField<'r>) -> Result<(), ParseError> {
        let (class, name) = raw.qualified.rsplit_once('.').ok_or_else(|| {
            ParseError::semantic(format!(
                "field '@{}' must be written as @Class.name",
                raw.qualified
            ))
        })?;
        let ty = parse_type(raw.ty)?;
        let mut offset = None;
        let mut is_static = false;
        let mut is_volatile = false;
        for (key, value) in &raw.attrs {
            match (*key, value) {
                ("offset", RawAttr::Int(n)) => {
                    offset = Some(u32::try_from(*n).map_err(|_| {
                        ParseError::semantic(format!("field offset {n} out of range"))
                    })?)
                }
                ("static", RawAttr::Bool(b)) => is_static = *b,
                ("volatile", RawAttr::Bool(b)) => is_volatile = *b,
                _ => {
                    return Err(ParseError::semantic(format!(
                        "unexpected attribute '{key}' on field '@{}'",
                        raw.qualified
                    )));
                }
            }
        }
        let offset = offset.ok_or_else(|| {
            ParseError::semantic(format!("field '@{}' has no offset", raw.qualified))
        })?;
        let data = FieldData {
            class: class.to_owned(),
            name: name.to_owned(),
            ty,
            offset,
            is_static,
            is_volatile,
        };
        let field = self.graph.intern_field(data);
        if self.field_map.insert(raw.qualified, field).is_some() {
            return Err(ParseError::semantic(format!(
                "duplicate field declaration '@{}'",
                raw.qualified
            )));
        }
        Ok(())
    }

    /// Pre-create all blocks so terminators can refer forward. The first
    /// block becomes the entry.
    fn create_blocks(&mut self, blocks: &'r [RawBlock<'r>]) -> Result<(), ParseError> {
        if blocks.is_empty() {
            return Err(ParseError::semantic(format!(
                "method '@{}' has no blocks",
                self.graph.name()
            )));
        }
        for (i, raw_block) in blocks.iter().enumerate() {
            let block = if i == 0 {
                self.graph.entry()
            } else {
                self.graph.create_block()
            };
            if self.block_map.insert(raw_block.label, block).is_some() {
                return Err(ParseError::semantic(format!(
                    "duplicate block label '^{}'",
                    raw_block.label
                )));
            }
        }
        Ok(())
    }

    fn define(&mut self, name: &'r str, inst: InstRef) -> Result<(), ParseError> {
        if self.value_map.insert(name, inst).is_some() {
            return Err(ParseError::semantic(format!(
                "value '%{name}' is defined more than once"
            )));
        }
        Ok(())
    }

    fn resolve_value(&self, name: &str) -> Result<InstRef, ParseError> {
        self.value_map
            .get(name)
            .copied()
            .ok_or_else(|| ParseError::semantic(format!("use of undefined value '%{name}'")))
    }

    fn resolve_block(&self, label: &str) -> Result<BlockRef, ParseError> {
        self.block_map
            .get(label)
            .copied()
            .ok_or_else(|| ParseError::semantic(format!("unknown block '^{label}'")))
    }

    fn resolve_field(&self, raw: &RawInst<'_>) -> Result<FieldRef, ParseError> {
        let name = symbol_attr(raw, "field")?;
        self.field_map
            .get(name)
            .copied()
            .ok_or_else(|| ParseError::semantic(format!("undeclared field '@{name}'")))
    }

    fn build_inst(&mut self, block: BlockRef, raw: &'r RawInst<'r>) -> Result<(), ParseError> {
        let ty = match (raw.result, raw.ty) {
            (Some(_), Some(ty)) => parse_type(ty)?,
            (Some(name), None) => {
                return Err(ParseError::semantic(format!(
                    "value '%{name}' has no type annotation"
                )));
            }
            (None, _) => Type::Void,
        };

        if raw.op == "phi" {
            let phi = self.graph.create_inst(InstKind::Phi, ty, []);
            self.graph.append_phi(block, phi);
            self.pending_phis.push((phi, block, raw));
            if let Some(name) = raw.result {
                self.define(name, phi)?;
            }
            return Ok(());
        }

        let kind = self.build_kind(raw)?;
        let inputs = raw
            .operands
            .iter()
            .map(|name| self.resolve_value(name))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(expected) = kind.successor_count()
            && expected != raw.successors.len()
        {
            return Err(ParseError::semantic(format!(
                "'{}' expects {expected} successor(s), found {}",
                raw.op,
                raw.successors.len()
            )));
        }

        let inst = self.graph.create_inst(kind, ty, inputs);
        self.graph.append_inst(block, inst);
        for label in &raw.successors {
            let target = self.resolve_block(label)?;
            self.graph.add_edge(block, target);
        }
        if let Some(name) = raw.result {
            self.define(name, inst)?;
        }
        Ok(())
    }

    fn build_kind(&self, raw: &RawInst<'_>) -> Result<InstKind, ParseError> {
        if let Some(op) = BinaryOp::ALL.iter().find(|op| op.mnemonic() == raw.op) {
            return Ok(InstKind::Binary(*op));
        }
        if let Some(cond) = CondOp::ALL.iter().find(|c| c.mnemonic() == raw.op) {
            return Ok(InstKind::Compare(*cond));
        }
        let kind = match raw.op {
            "param" => {
                return Err(ParseError::semantic(
                    "parameters are declared in the method signature",
                ));
            }
            "const" => match attr(raw, "value") {
                Some(RawAttr::Int(v)) => InstKind::Constant(*v),
                Some(RawAttr::Bool(b)) => InstKind::Constant(i64::from(*b)),
                _ => return Err(ParseError::semantic("'const' requires {value = <int>}")),
            },
            "null" => InstKind::NullConstant,
            "new_instance" => InstKind::NewInstance {
                class: symbol_attr(raw, "class")?.to_owned(),
            },
            "new_array" => match attr(raw, "component") {
                Some(RawAttr::Ident(name)) => InstKind::NewArray {
                    component: parse_type(name)?,
                },
                _ => {
                    return Err(ParseError::semantic(
                        "'new_array' requires {component = <type>}",
                    ));
                }
            },
            "instance_get" => InstKind::InstanceFieldGet {
                field: self.resolve_field(raw)?,
            },
            "instance_set" => InstKind::InstanceFieldSet {
                field: self.resolve_field(raw)?,
            },
            "static_get" => InstKind::StaticFieldGet {
                field: self.resolve_field(raw)?,
            },
            "static_set" => InstKind::StaticFieldSet {
                field: self.resolve_field(raw)?,
            },
            "array_get" => InstKind::ArrayGet,
            "array_set" => InstKind::ArraySet,
            "array_length" => InstKind::ArrayLength,
            "null_check" => InstKind::NullCheck,
            "invoke_static" | "invoke_direct" | "invoke_virtual" | "invoke_interface" => {
                let kind = match raw.op {
                    "invoke_static" => InvokeKind::Static,
                    "invoke_direct" => InvokeKind::Direct,
                    "invoke_virtual" => InvokeKind::Virtual,
                    _ => InvokeKind::Interface,
                };
                if kind.has_receiver() && raw.operands.is_empty() {
                    return Err(ParseError::semantic(format!(
                        "'{}' requires a receiver operand",
                        raw.op
                    )));
                }
                InstKind::Invoke {
                    kind,
                    method: symbol_attr(raw, "method")?.to_owned(),
                }
            }
            "monitor_enter" => InstKind::MonitorEnter,
            "monitor_exit" => InstKind::MonitorExit,
            "goto" => InstKind::Goto,
            "if" => InstKind::If,
            "return" if raw.operands.is_empty() => InstKind::ReturnVoid,
            "return" => InstKind::Return,
            "throw" => InstKind::Throw,
            other => InstKind::Opaque {
                name: other.to_owned(),
            },
        };
        Ok(kind)
    }

    /// Give every phi one input per predecessor, matched by label.
    fn fill_phis(&mut self) -> Result<(), ParseError> {
        let pending = std::mem::take(&mut self.pending_phis);
        for (phi, block, raw) in pending {
            let preds = self.graph.preds(block).to_vec();
            if preds.len() != raw.phi_entries.len() {
                return Err(ParseError::semantic(format!(
                    "phi '%{}' has {} input(s) but its block has {} predecessor(s)",
                    raw.result.unwrap_or("?"),
                    raw.phi_entries.len(),
                    preds.len()
                )));
            }
            let mut used = vec![false; raw.phi_entries.len()];
            for pred in preds {
                let slot = raw
                    .phi_entries
                    .iter()
                    .enumerate()
                    .position(|(i, (label, _))| {
                        !used[i] && self.block_map.get(label) == Some(&pred)
                    })
                    .ok_or_else(|| {
                        ParseError::semantic(format!(
                            "phi '%{}' has no input for predecessor {pred}",
                            raw.result.unwrap_or("?")
                        ))
                    })?;
                used[slot] = true;
                let value = self.resolve_value(raw.phi_entries[slot].1)?;
                self.graph.push_input(phi, value);
            }
        }
        Ok(())
    }
}

fn parse_type(name: &str) -> Result<Type, ParseError> {
    Type::from_name(name).ok_or_else(|| ParseError::semantic(format!("unknown type '{name}'")))
}

fn attr<'a, 'r>(raw: &'a RawInst<'r>, key: &str) -> Option<&'a RawAttr<'r>> {
    raw.attrs.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
}

fn symbol_attr<'r>(raw: &RawInst<'r>, key: &str) -> Result<&'r str, ParseError> {
    match attr(raw, key) {
        Some(RawAttr::Symbol(s)) => Ok(*s),
        _ => Err(ParseError::semantic(format!(
            "'{}' requires {{{key} = @symbol}}",
            raw.op
        ))),
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Parse every method in `input`.
pub fn parse_methods(input: &str) -> Result<Vec<Graph>, ParseError> {
    let mut remaining = input;
    let mut raws = Vec::new();
    loop {
        raw::ws.parse_next(&mut remaining).map_err(|e| ParseError {
            message: format!("lexer error: {e}"),
            offset: input.len() - remaining.len(),
        })?;
        if remaining.is_empty() {
            break;
        }
        let method = raw::raw_method
            .parse_next(&mut remaining)
            .map_err(|e| ParseError {
                message: format!("parse error: {e}"),
                offset: input.len() - remaining.len(),
            })?;
        raws.push(method);
    }

    raws.iter().map(|raw| MethodBuilder::build(raw)).collect()
}

/// Parse exactly one method.
pub fn parse_method(input: &str) -> Result<Graph, ParseError> {
    let mut methods = parse_methods(input)?;
    if methods.len() != 1 {
        return Err(ParseError::semantic(format!(
            "expected exactly one method, found {}",
            methods.len()
        )));
    }
    Ok(methods.remove(0))
}

/// Parse a single method, panicking on failure.
///
/// Convenience wrapper around [`parse_method`] for tests.
pub fn parse_test_method(input: &str) -> Graph {
    parse_method(input).unwrap_or_else(|e| {
        panic!(
            "Failed to parse test IR at offset {}:\n  {}\n\nInput:\n{}",
            e.offset, e.message, input
        );
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::print_graph;
    use crate::validation;

    fn assert_roundtrip(input: &str) {
        let graph = parse_test_method(input);
        let printed = print_graph(&graph);
        let reparsed = parse_method(&printed).unwrap_or_else(|e| {
            panic!(
                "Round-trip parse failed at offset {}:\n  {}\n\nPrinted IR:\n{}",
                e.offset, e.message, printed
            );
        });
        assert_eq!(printed, print_graph(&reparsed), "Round-trip mismatch");
    }

    const LOOP: &str = r#"
method @sum(%arr: ref, %n: int) static {
^entry:
  %zero = const {value = 0} : int
  goto [^head]
^head:
  %i = phi [^entry: %zero, ^body: %next] : int
  %acc = phi [^entry: %zero, ^body: %acc2] : int
  %c = lt %i, %n : bool
  if %c [^body, ^exit]
^body:
  %x = array_get %arr, %i : int
  %acc2 = add %acc, %x : int
  %one = const {value = 1} : int
  %next = add %i, %one : int
  goto [^head]
^exit:
  return %acc
}
"#;

    #[test]
    fn parses_loop_with_forward_phi_inputs() {
        let graph = parse_test_method(LOOP);
        assert!(graph.is_static());
        assert_eq!(graph.block_count(), 4);
        let head = graph.blocks().nth(1).unwrap();
        assert_eq!(graph.phis(head).len(), 2);
        for &phi in graph.phis(head) {
            assert_eq!(graph.inputs(phi).len(), 2);
        }
        let result = validation::verify(&graph);
        assert!(result.is_ok(), "{result}");
    }

    #[test]
    fn roundtrip_loop() {
        assert_roundtrip(LOOP);
    }

    #[test]
    fn roundtrip_fields_and_invokes() {
        assert_roundtrip(
            r#"
method @update(%this: ref, %v: int) synchronized {
  field @Obj.f : int {offset = 8}
  field @Obj.count : long {offset = 16, static = true, volatile = true}
^bb0:
  instance_set %this, %v {field = @Obj.f}
  %old = static_get {field = @Obj.count} : long
  %r = invoke_virtual %this, %v {method = @Obj.compute} : ref
  %checked = null_check %r : ref
  monitor_enter %checked
  %h = hash_code %checked : int
  monitor_exit %checked
  return
}
"#,
        );
    }

    #[test]
    fn unknown_ops_become_opaque() {
        let graph = parse_test_method(
            r#"
method @f(%a: ref) {
^bb0:
  %t = instance_of %a {class = @Obj} : bool
  return %t
}
"#,
        );
        let entry = graph.entry();
        let t = graph.insts(entry)[1];
        assert_eq!(
            graph.kind(t),
            &InstKind::Opaque {
                name: "instance_of".to_owned()
            }
        );
    }

    #[test]
    fn undefined_value_is_an_error() {
        let err = parse_method(
            r#"
method @f() {
^bb0:
  return %missing
}
"#,
        )
        .unwrap_err();
        assert!(err.message.contains("undefined value '%missing'"), "{err}");
    }

    #[test]
    fn syntax_error_reports_offset() {
        let input = "method @f() {\n^bb0:\n  return\n";
        let err = parse_methods(input).unwrap_err();
        assert!(err.offset > 0, "{err}");
    }

    #[test]
    fn parses_several_methods() {
        let methods = parse_methods(
            r#"
method @a() static {
^bb0:
  return
}

// second method
method @b() static {
^bb0:
  return
}
"#,
        )
        .unwrap();
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[1].name(), "b");
    }
}
