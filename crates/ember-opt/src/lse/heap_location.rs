//! Heap locations tracked by load/store elimination.

use ember_ir::{FieldRef, Graph, InstKind, InstRef, Type};

use crate::side_effects::HeapCategory;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LocationKind {
    InstanceField(FieldRef),
    StaticField(FieldRef),
    ArrayElement { index: InstRef, component: Type },
}

/// An abstract memory slot: a field of an object, a static field, or an
/// element of an array at a given index value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeapLocation {
    /// The object or array, with null checks stripped. `None` for statics.
    pub reference: Option<InstRef>,
    pub kind: LocationKind,
}

impl HeapLocation {
    /// The location a non-volatile heap access reads or writes.
    pub fn of(graph: &Graph, inst: InstRef) -> Option<HeapLocation> {
        let (reference, kind) = match graph.kind(inst) {
            InstKind::InstanceFieldGet { field } | InstKind::InstanceFieldSet { field } => {
                if graph.field(*field).is_volatile {
                    return None;
                }
                let object = original_reference(graph, graph.input(inst, 0));
                (Some(object), LocationKind::InstanceField(*field))
            }
            InstKind::StaticFieldGet { field } | InstKind::StaticFieldSet { field } => {
                if graph.field(*field).is_volatile {
                    return None;
                }
                (None, LocationKind::StaticField(*field))
            }
            InstKind::ArrayGet | InstKind::ArraySet => {
                let component = match graph.kind(inst) {
                    InstKind::ArrayGet => graph.ty(inst),
                    _ => graph.ty(graph.input(inst, 2)),
                };
                let array = original_reference(graph, graph.input(inst, 0));
                let kind = LocationKind::ArrayElement {
                    index: graph.input(inst, 1),
                    component,
                };
                (Some(array), kind)
            }
            _ => return None,
        };
        Some(HeapLocation { reference, kind })
    }

    pub fn category(&self, graph: &Graph) -> HeapCategory {
        match self.kind {
            LocationKind::InstanceField(field) => HeapCategory::InstanceField(graph.field(field).ty),
            LocationKind::StaticField(field) => HeapCategory::StaticField(graph.field(field).ty),
            LocationKind::ArrayElement { component, .. } => HeapCategory::ArrayElement(component),
        }
    }

    /// Whether the two locations may denote the same memory. `is_singleton`
    /// tells whether a reference is the only name for its object.
    pub fn may_alias(
        &self,
        other: &HeapLocation,
        graph: &Graph,
        is_singleton: impl Fn(InstRef) -> bool,
    ) -> bool {
        let same_slot = match (self.kind, other.kind) {
            (LocationKind::StaticField(a), LocationKind::StaticField(b)) => return a == b,
            (LocationKind::InstanceField(a), LocationKind::InstanceField(b)) => a == b,
            (
                LocationKind::ArrayElement {
                    index: i,
                    component: a,
                },
                LocationKind::ArrayElement {
                    index: j,
                    component: b,
                },
            ) => a == b && !distinct_constants(graph, i, j),
            _ => false,
        };
        if !same_slot {
            return false;
        }
        match (self.reference, other.reference) {
            (Some(a), Some(b)) if a == b => true,
            (Some(a), Some(b)) => !is_singleton(a) && !is_singleton(b),
            _ => false,
        }
    }
}

/// Follow null checks back to the reference they check.
pub fn original_reference(graph: &Graph, mut reference: InstRef) -> InstRef {
    while matches!(graph.kind(reference), InstKind::NullCheck) {
        reference = graph.input(reference, 0);
    }
    reference
}

fn distinct_constants(graph: &Graph, a: InstRef, b: InstRef) -> bool {
    match (graph.kind(a), graph.kind(b)) {
        (InstKind::Constant(x), InstKind::Constant(y)) => x != y,
        _ => false,
    }
}
