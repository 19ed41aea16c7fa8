//! Flow-insensitive escape analysis for allocations.
//!
//! A *singleton* is an allocation that is the only name for its object in
//! the method: no other SSA value, heap slot or callee can refer to it. Two
//! different references can then never alias if one of them is a singleton.
//! A singleton that is returned or thrown is still a singleton inside the
//! method, but its object outlives it and may be observed afterwards.

use ember_ir::{Graph, InstKind, InstRef};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EscapeInfo {
    pub is_singleton: bool,
    pub is_singleton_and_non_escaping: bool,
}

impl EscapeInfo {
    const NONE: EscapeInfo = EscapeInfo {
        is_singleton: false,
        is_singleton_and_non_escaping: false,
    };
}

pub fn calculate_escape(graph: &Graph, reference: InstRef) -> EscapeInfo {
    if !graph.kind(reference).is_allocation() {
        return EscapeInfo::NONE;
    }

    let mut escapes = false;
    for u in graph.uses(reference) {
        let index = u.index as usize;
        match graph.kind(u.user) {
            // Aliased by another value, or handed to code we cannot see.
            InstKind::Phi
            | InstKind::NullCheck
            | InstKind::Invoke { .. }
            | InstKind::Opaque { .. }
            | InstKind::MonitorEnter
            | InstKind::MonitorExit => return EscapeInfo::NONE,
            // Stored to the heap as a value.
            InstKind::InstanceFieldSet { .. } if index == 1 => return EscapeInfo::NONE,
            InstKind::StaticFieldSet { .. } => return EscapeInfo::NONE,
            InstKind::ArraySet if index == 2 => return EscapeInfo::NONE,
            InstKind::Return | InstKind::Throw => escapes = true,
            _ => {}
        }
    }

    EscapeInfo {
        is_singleton: true,
        is_singleton_and_non_escaping: !escapes,
    }
}
