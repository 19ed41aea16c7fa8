//! Instruction kinds.
//!
//! Instruction kinds form a closed set: analyses dispatch on [`InstKind`]
//! with exhaustive `match`es instead of visitor callbacks, so adding a kind
//! forces every analysis to decide how it treats it.

use smallvec::SmallVec;

use crate::refs::{BlockRef, FieldRef, InstRef};
use crate::types::Type;

/// How an invoke selects its callee.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    /// No receiver.
    Static,
    /// Receiver present, callee bound statically (constructors, private methods).
    Direct,
    Virtual,
    Interface,
}

impl InvokeKind {
    pub fn has_receiver(self) -> bool {
        self != InvokeKind::Static
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            InvokeKind::Static => "invoke_static",
            InvokeKind::Direct => "invoke_direct",
            InvokeKind::Virtual => "invoke_virtual",
            InvokeKind::Interface => "invoke_interface",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 10] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Rem,
        BinaryOp::And,
        BinaryOp::Or,
        BinaryOp::Xor,
        BinaryOp::Shl,
        BinaryOp::Shr,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Rem => "rem",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::Shr => "shr",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CondOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CondOp {
    pub const ALL: [CondOp; 6] = [
        CondOp::Eq,
        CondOp::Ne,
        CondOp::Lt,
        CondOp::Le,
        CondOp::Gt,
        CondOp::Ge,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            CondOp::Eq => "eq",
            CondOp::Ne => "ne",
            CondOp::Lt => "lt",
            CondOp::Le => "le",
            CondOp::Gt => "gt",
            CondOp::Ge => "ge",
        }
    }
}

/// The operation an instruction performs.
///
/// Input layout per kind:
///
/// | kind | inputs |
/// |---|---|
/// | `Phi` | one per predecessor, in predecessor order |
/// | `Binary`, `Compare` | lhs, rhs |
/// | `NewArray` | length |
/// | `InstanceFieldGet` | object |
/// | `InstanceFieldSet` | object, value |
/// | `StaticFieldSet` | value |
/// | `ArrayGet` | array, index |
/// | `ArraySet` | array, index, value |
/// | `ArrayLength`, `NullCheck`, `MonitorEnter`, `MonitorExit` | object |
/// | `Invoke` | receiver (unless static), arguments |
/// | `If` | condition |
/// | `Return`, `Throw` | value |
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstKind {
    Parameter { index: u32 },
    Constant(i64),
    NullConstant,
    Phi,
    Binary(BinaryOp),
    Compare(CondOp),
    NewInstance { class: String },
    NewArray { component: Type },
    InstanceFieldGet { field: FieldRef },
    InstanceFieldSet { field: FieldRef },
    StaticFieldGet { field: FieldRef },
    StaticFieldSet { field: FieldRef },
    ArrayGet,
    ArraySet,
    ArrayLength,
    NullCheck,
    Invoke { kind: InvokeKind, method: String },
    MonitorEnter,
    MonitorExit,
    /// An operation this crate does not model. Analyses must treat it as
    /// reading and writing everything.
    Opaque { name: String },
    Goto,
    If,
    Return,
    ReturnVoid,
    Throw,
}

impl InstKind {
    /// Mnemonic used by the text format.
    pub fn mnemonic(&self) -> &str {
        match self {
            InstKind::Parameter { .. } => "param",
            InstKind::Constant(_) => "const",
            InstKind::NullConstant => "null",
            InstKind::Phi => "phi",
            InstKind::Binary(op) => op.mnemonic(),
            InstKind::Compare(cond) => cond.mnemonic(),
            InstKind::NewInstance { .. } => "new_instance",
            InstKind::NewArray { .. } => "new_array",
            InstKind::InstanceFieldGet { .. } => "instance_get",
            InstKind::InstanceFieldSet { .. } => "instance_set",
            InstKind::StaticFieldGet { .. } => "static_get",
            InstKind::StaticFieldSet { .. } => "static_set",
            InstKind::ArrayGet => "array_get",
            InstKind::ArraySet => "array_set",
            InstKind::ArrayLength => "array_length",
            InstKind::NullCheck => "null_check",
            InstKind::Invoke { kind, .. } => kind.mnemonic(),
            InstKind::MonitorEnter => "monitor_enter",
            InstKind::MonitorExit => "monitor_exit",
            InstKind::Opaque { name } => name,
            InstKind::Goto => "goto",
            InstKind::If => "if",
            InstKind::Return | InstKind::ReturnVoid => "return",
            InstKind::Throw => "throw",
        }
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, InstKind::Phi)
    }

    /// Control-transfer instructions. Exactly one ends every block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Goto | InstKind::If | InstKind::Return | InstKind::ReturnVoid | InstKind::Throw
        )
    }

    /// Instructions that leave the method.
    pub fn is_exit(&self) -> bool {
        matches!(
            self,
            InstKind::Return | InstKind::ReturnVoid | InstKind::Throw
        )
    }

    /// Number of successors a terminator requires, `None` for non-terminators.
    pub fn successor_count(&self) -> Option<usize> {
        match self {
            InstKind::Goto => Some(1),
            InstKind::If => Some(2),
            InstKind::Return | InstKind::ReturnVoid | InstKind::Throw => Some(0),
            _ => None,
        }
    }

    pub fn is_allocation(&self) -> bool {
        matches!(self, InstKind::NewInstance { .. } | InstKind::NewArray { .. })
    }

    pub fn is_invoke(&self) -> bool {
        matches!(self, InstKind::Invoke { .. })
    }

    /// Whether executing the instruction may raise an exception.
    pub fn can_throw(&self) -> bool {
        match self {
            InstKind::Binary(op) => matches!(op, BinaryOp::Div | BinaryOp::Rem),
            InstKind::NewInstance { .. }
            | InstKind::NewArray { .. }
            | InstKind::InstanceFieldGet { .. }
            | InstKind::InstanceFieldSet { .. }
            | InstKind::ArrayGet
            | InstKind::ArraySet
            | InstKind::ArrayLength
            | InstKind::NullCheck
            | InstKind::Invoke { .. }
            | InstKind::MonitorEnter
            | InstKind::MonitorExit
            | InstKind::Opaque { .. }
            | InstKind::Throw => true,
            InstKind::Parameter { .. }
            | InstKind::Constant(_)
            | InstKind::NullConstant
            | InstKind::Phi
            | InstKind::Compare(_)
            | InstKind::StaticFieldGet { .. }
            | InstKind::StaticFieldSet { .. }
            | InstKind::Goto
            | InstKind::If
            | InstKind::Return
            | InstKind::ReturnVoid => false,
        }
    }

    /// Index of the input that is dereferenced (and faults when null), if any.
    pub fn dereferenced_input(&self) -> Option<usize> {
        match self {
            InstKind::InstanceFieldGet { .. }
            | InstKind::InstanceFieldSet { .. }
            | InstKind::ArrayGet
            | InstKind::ArraySet
            | InstKind::ArrayLength
            | InstKind::NullCheck
            | InstKind::MonitorEnter
            | InstKind::MonitorExit => Some(0),
            InstKind::Invoke { kind, .. } if kind.has_receiver() => Some(0),
            _ => None,
        }
    }

    /// Whether input 0 is an invoke receiver.
    pub fn invoke_receiver(&self) -> bool {
        matches!(self, InstKind::Invoke { kind, .. } if kind.has_receiver())
    }

    pub fn field(&self) -> Option<FieldRef> {
        match self {
            InstKind::InstanceFieldGet { field }
            | InstKind::InstanceFieldSet { field }
            | InstKind::StaticFieldGet { field }
            | InstKind::StaticFieldSet { field } => Some(*field),
            _ => None,
        }
    }
}

/// Data for a single instruction in the arena.
#[derive(Clone, Debug)]
pub struct InstData {
    pub kind: InstKind,
    pub ty: Type,
    pub inputs: SmallVec<[InstRef; 3]>,
    /// Owning block, `None` while detached or after removal.
    pub block: Option<BlockRef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminators_declare_successor_counts() {
        assert_eq!(InstKind::Goto.successor_count(), Some(1));
        assert_eq!(InstKind::If.successor_count(), Some(2));
        assert_eq!(InstKind::Return.successor_count(), Some(0));
        assert_eq!(InstKind::ArrayLength.successor_count(), None);
        assert!(InstKind::Throw.is_exit());
        assert!(!InstKind::Goto.is_exit());
    }

    #[test]
    fn only_receiver_invokes_dereference_input() {
        let virt = InstKind::Invoke {
            kind: InvokeKind::Virtual,
            method: "Obj.get".to_owned(),
        };
        let stat = InstKind::Invoke {
            kind: InvokeKind::Static,
            method: "Util.make".to_owned(),
        };
        assert_eq!(virt.dereferenced_input(), Some(0));
        assert_eq!(stat.dereferenced_input(), None);
    }
}
