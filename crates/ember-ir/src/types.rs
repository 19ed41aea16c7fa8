//! Value types and resolved field metadata.

use std::fmt;

/// The type of an SSA value. `Void` means the instruction defines no value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    Bool,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Reference,
    Void,
}

impl Type {
    /// Every type that can be held in a heap slot, in category order.
    pub const VALUE_TYPES: [Type; 9] = [
        Type::Bool,
        Type::Byte,
        Type::Char,
        Type::Short,
        Type::Int,
        Type::Long,
        Type::Float,
        Type::Double,
        Type::Reference,
    ];

    pub fn is_reference(self) -> bool {
        self == Type::Reference
    }

    pub fn is_void(self) -> bool {
        self == Type::Void
    }

    /// Dense index of a value type, `None` for `Void`.
    pub fn value_index(self) -> Option<u32> {
        Self::VALUE_TYPES
            .iter()
            .position(|&t| t == self)
            .map(|i| i as u32)
    }

    pub fn name(self) -> &'static str {
        match self {
            Type::Bool => "bool",
            Type::Byte => "byte",
            Type::Char => "char",
            Type::Short => "short",
            Type::Int => "int",
            Type::Long => "long",
            Type::Float => "float",
            Type::Double => "double",
            Type::Reference => "ref",
            Type::Void => "void",
        }
    }

    pub fn from_name(name: &str) -> Option<Type> {
        let ty = match name {
            "bool" => Type::Bool,
            "byte" => Type::Byte,
            "char" => Type::Char,
            "short" => Type::Short,
            "int" => Type::Int,
            "long" => Type::Long,
            "float" => Type::Float,
            "double" => Type::Double,
            "ref" => Type::Reference,
            "void" => Type::Void,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved field metadata. Read-only once the graph is built.
///
/// A field's identity is its declaring class, offset and static-ness:
/// [`Graph::intern_field`](crate::Graph::intern_field) returns the same
/// [`FieldRef`](crate::FieldRef) for two declarations with the same identity,
/// so distinct refs always denote distinct memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldData {
    pub class: String,
    pub name: String,
    pub ty: Type,
    pub offset: u32,
    pub is_static: bool,
    pub is_volatile: bool,
}

impl FieldData {
    pub fn instance(class: impl Into<String>, name: impl Into<String>, ty: Type, offset: u32) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            ty,
            offset,
            is_static: false,
            is_volatile: false,
        }
    }

    pub fn static_field(
        class: impl Into<String>,
        name: impl Into<String>,
        ty: Type,
        offset: u32,
    ) -> Self {
        Self {
            is_static: true,
            ..Self::instance(class, name, ty, offset)
        }
    }

    pub fn volatile(mut self) -> Self {
        self.is_volatile = true;
        self
    }

    /// `Class.name`, as written in textual IR.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.class, self.name)
    }
}
