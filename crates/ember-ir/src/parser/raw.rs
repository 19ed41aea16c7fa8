//! Raw (unresolved) parse structures and winnow combinators for the method
//! text format.
//!
//! This is the "stage 1" parser: text → `Raw*` structs. Names stay as
//! borrowed strings; resolving them into graph entities is left to the
//! builder in the parent module.

use winnow::ascii;
use winnow::combinator::{alt, delimited, opt, preceded, repeat, separated};
use winnow::prelude::*;
use winnow::token::{one_of, take_till, take_while};

#[derive(Debug, Clone)]
pub(crate) struct RawMethod<'a> {
    pub name: &'a str,
    pub params: Vec<(&'a str, &'a str)>,
    pub is_static: bool,
    pub is_synchronized: bool,
    pub fields: Vec<RawField<'a>>,
    pub blocks: Vec<RawBlock<'a>>,
}

#[derive(Debug, Clone)]
pub(crate) struct RawField<'a> {
    /// `Class.name`
    pub qualified: &'a str,
    pub ty: &'a str,
    pub attrs: Vec<(&'a str, RawAttr<'a>)>,
}

#[derive(Debug, Clone)]
pub(crate) struct RawBlock<'a> {
    pub label: &'a str,
    pub insts: Vec<RawInst<'a>>,
}

#[derive(Debug, Clone)]
pub(crate) struct RawInst<'a> {
    pub result: Option<&'a str>,
    pub op: &'a str,
    pub operands: Vec<&'a str>,
    /// `[^bb0: %a, ^bb1: %b]`, phis only.
    pub phi_entries: Vec<(&'a str, &'a str)>,
    pub successors: Vec<&'a str>,
    pub attrs: Vec<(&'a str, RawAttr<'a>)>,
    pub ty: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawAttr<'a> {
    Bool(bool),
    Int(i64),
    Symbol(&'a str),
    Ident(&'a str),
}

// ============================================================================
// Lexical helpers
// ============================================================================

fn line_comment(input: &mut &str) -> ModalResult<()> {
    ("//", take_till(0.., '\n')).void().parse_next(input)
}

/// Skip whitespace and `//` comments.
pub(crate) fn ws(input: &mut &str) -> ModalResult<()> {
    repeat(
        0..,
        alt((
            take_while(1.., |c: char| c.is_ascii_whitespace()).void(),
            line_comment,
        )),
    )
    .parse_next(input)
}

/// Skip spaces and tabs only, staying on the current line.
fn hws(input: &mut &str) -> ModalResult<()> {
    take_while(0.., [' ', '\t']).void().parse_next(input)
}

/// Parse an identifier: [a-zA-Z_][a-zA-Z0-9_.]*
pub(crate) fn ident<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.'),
    )
        .take()
        .parse_next(input)
}

/// Parse a value reference: %name or %number
pub(crate) fn value_ref<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    preceded(
        '%',
        take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
    .parse_next(input)
}

/// Parse a symbol reference: @Class.member
pub(crate) fn symbol_ref<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    preceded(
        '@',
        take_while(1.., |c: char| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | '<' | '>')
        }),
    )
    .parse_next(input)
}

/// Parse a block label: ^bbN or ^name
pub(crate) fn block_label<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    preceded(
        '^',
        take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
    .parse_next(input)
}

fn attr_value<'a>(input: &mut &'a str) -> ModalResult<RawAttr<'a>> {
    alt((
        "true".value(RawAttr::Bool(true)),
        "false".value(RawAttr::Bool(false)),
        symbol_ref.map(RawAttr::Symbol),
        ascii::dec_int::<_, i64, _>.map(RawAttr::Int),
        ident.map(RawAttr::Ident),
    ))
    .parse_next(input)
}

/// Parse an attribute dict: {key = value, ...}
fn attr_dict<'a>(input: &mut &'a str) -> ModalResult<Vec<(&'a str, RawAttr<'a>)>> {
    delimited(
        ('{', ws),
        separated(
            0..,
            (ws, ident, ws, '=', ws, attr_value, ws).map(|(_, k, _, _, _, v, _)| (k, v)),
            ',',
        ),
        (ws, '}'),
    )
    .parse_next(input)
}

/// Parse operand list: %a, %b, ...
fn operand_list<'a>(input: &mut &'a str) -> ModalResult<Vec<&'a str>> {
    separated(1.., (hws, value_ref, hws).map(|(_, v, _)| v), ',').parse_next(input)
}

/// Parse a successor list: [^bb0, ^bb1]
fn successor_list<'a>(input: &mut &'a str) -> ModalResult<Vec<&'a str>> {
    delimited(
        ('[', ws),
        separated(1.., (ws, block_label, ws).map(|(_, l, _)| l), ','),
        (ws, ']'),
    )
    .parse_next(input)
}

/// Parse phi entries: [^bb0: %a, ^bb1: %b]
fn phi_entry_list<'a>(input: &mut &'a str) -> ModalResult<Vec<(&'a str, &'a str)>> {
    delimited(
        ('[', ws),
        separated(
            0..,
            (ws, block_label, ws, ':', ws, value_ref, ws).map(|(_, l, _, _, _, v, _)| (l, v)),
            ',',
        ),
        (ws, ']'),
    )
    .parse_next(input)
}

/// Parse type annotation: `: type`
fn type_annotation<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    preceded((hws, ':', hws), ident).parse_next(input)
}

// ============================================================================
// Structure
// ============================================================================

/// Parse a single instruction line.
///
/// Grammar:
/// ```text
/// [%result =] op [operands | phi-entries] [[successors]] [{attrs}] [: type]
/// ```
pub(crate) fn raw_inst<'a>(input: &mut &'a str) -> ModalResult<RawInst<'a>> {
    let result = opt((value_ref, ws, '=', ws).map(|(v, _, _, _)| v)).parse_next(input)?;
    let op = ident.parse_next(input)?;
    hws.parse_next(input)?;

    let mut operands = Vec::new();
    let mut phi_entries = Vec::new();
    if op == "phi" {
        phi_entries = phi_entry_list.parse_next(input)?;
    } else if input.starts_with('%') {
        operands = operand_list.parse_next(input)?;
    }

    let successors = opt(preceded(hws, successor_list))
        .parse_next(input)?
        .unwrap_or_default();
    let attrs = opt(preceded(hws, attr_dict))
        .parse_next(input)?
        .unwrap_or_default();
    let ty = opt(type_annotation).parse_next(input)?;

    Ok(RawInst {
        result,
        op,
        operands,
        phi_entries,
        successors,
        attrs,
        ty,
    })
}

/// Parse a block: ^label: insts...
pub(crate) fn raw_block<'a>(input: &mut &'a str) -> ModalResult<RawBlock<'a>> {
    let label = block_label.parse_next(input)?;
    (ws, ':').void().parse_next(input)?;
    let mut insts = Vec::new();
    loop {
        ws.parse_next(input)?;
        if input.is_empty() || input.starts_with('^') || input.starts_with('}') {
            break;
        }
        insts.push(raw_inst.parse_next(input)?);
    }
    Ok(RawBlock { label, insts })
}

/// Parse a field declaration: field @Class.name : type {attrs}
fn raw_field<'a>(input: &mut &'a str) -> ModalResult<RawField<'a>> {
    "field".parse_next(input)?;
    ws.parse_next(input)?;
    let qualified = symbol_ref.parse_next(input)?;
    (ws, ':', ws).void().parse_next(input)?;
    let ty = ident.parse_next(input)?;
    ws.parse_next(input)?;
    let attrs = attr_dict.parse_next(input)?;
    Ok(RawField {
        qualified,
        ty,
        attrs,
    })
}

/// Parse method parameters: (%name: type, ...)
fn method_params<'a>(input: &mut &'a str) -> ModalResult<Vec<(&'a str, &'a str)>> {
    delimited(
        ('(', ws),
        separated(
            0..,
            (ws, value_ref, ws, ':', ws, ident, ws).map(|(_, name, _, _, _, ty, _)| (name, ty)),
            ',',
        ),
        (ws, ')'),
    )
    .parse_next(input)
}

/// Parse a whole method.
///
/// Grammar:
/// ```text
/// method @name(params) [static] [synchronized] { field* block* }
/// ```
pub(crate) fn raw_method<'a>(input: &mut &'a str) -> ModalResult<RawMethod<'a>> {
    "method".parse_next(input)?;
    ws.parse_next(input)?;
    let name = symbol_ref.parse_next(input)?;
    ws.parse_next(input)?;
    let params = method_params.parse_next(input)?;

    let flags: Vec<&str> =
        repeat(0.., preceded(ws, alt(("static", "synchronized")))).parse_next(input)?;
    (ws, '{').void().parse_next(input)?;

    let mut fields = Vec::new();
    loop {
        ws.parse_next(input)?;
        if !input.starts_with("field") {
            break;
        }
        fields.push(raw_field.parse_next(input)?);
    }

    let mut blocks = Vec::new();
    loop {
        ws.parse_next(input)?;
        if !input.starts_with('^') {
            break;
        }
        blocks.push(raw_block.parse_next(input)?);
    }
    (ws, '}').void().parse_next(input)?;

    Ok(RawMethod {
        name,
        params,
        is_static: flags.contains(&"static"),
        is_synchronized: flags.contains(&"synchronized"),
        fields,
        blocks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_with_everything() {
        let mut input = "%3 = instance_get %0 {field = @Obj.f} : int";
        let inst = raw_inst(&mut input).unwrap();
        assert_eq!(inst.result, Some("3"));
        assert_eq!(inst.op, "instance_get");
        assert_eq!(inst.operands, vec!["0"]);
        assert_eq!(inst.attrs, vec![("field", RawAttr::Symbol("Obj.f"))]);
        assert_eq!(inst.ty, Some("int"));
        assert!(input.is_empty());
    }

    #[test]
    fn operands_stop_at_end_of_line() {
        let mut input = "return\n  %4 = const {value = -2} : int";
        let inst = raw_inst(&mut input).unwrap();
        assert_eq!(inst.op, "return");
        assert!(inst.operands.is_empty());

        ws(&mut input).unwrap();
        let next = raw_inst(&mut input).unwrap();
        assert_eq!(next.attrs, vec![("value", RawAttr::Int(-2))]);
    }

    #[test]
    fn phi_entries_and_successors() {
        let mut input = "%m = phi [^bb0: %x, ^bb3: %y] : int";
        let phi = raw_inst(&mut input).unwrap();
        assert_eq!(phi.phi_entries, vec![("bb0", "x"), ("bb3", "y")]);

        let mut input = "if %c [^then, ^else]";
        let br = raw_inst(&mut input).unwrap();
        assert_eq!(br.operands, vec!["c"]);
        assert_eq!(br.successors, vec!["then", "else"]);
    }

    #[test]
    fn comments_are_whitespace() {
        let mut input = "  // leading\n  // another\n^bb0";
        ws(&mut input).unwrap();
        assert_eq!(input, "^bb0");
    }
}
