//! Errors that abort the optimization of a single method.

use derive_more::{Display, Error};
use ember_ir::InvariantViolation;

/// Why a method could not be optimized. The driver answers every variant
/// the same way: it keeps the unoptimized graph for that method.
#[derive(Debug, Display, Error)]
pub enum OptError {
    /// The graph checker found broken invariants before or after `pass`.
    #[display("{pass}: {}", summarize(violations))]
    InvariantViolation {
        pass: &'static str,
        violations: Vec<InvariantViolation>,
    },
    /// A pass ran without an analysis its gate should have required.
    #[display("{pass}: required analysis `{analysis}` is not available")]
    MissingAnalysis {
        pass: &'static str,
        analysis: &'static str,
    },
    #[display("{pass}: no fixed point after {iterations} iteration(s)")]
    FixpointNotReached { pass: &'static str, iterations: usize },
}

fn summarize(violations: &[InvariantViolation]) -> String {
    match violations {
        [] => "graph invariants violated".to_owned(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_ir::BlockRef;
    use ember_ir::cranelift_entity::EntityRef;

    #[test]
    fn display_summarizes_violations() {
        let block = BlockRef::new(1);
        let err = OptError::InvariantViolation {
            pass: "load_store_elimination",
            violations: vec![
                InvariantViolation::MissingTerminator { block },
                InvariantViolation::EntryHasPredecessors { block },
            ],
        };
        assert_eq!(
            err.to_string(),
            "load_store_elimination: ^bb1 does not end with a terminator (and 1 more)"
        );

        let err = OptError::FixpointNotReached {
            pass: "null_propagation",
            iterations: 4,
        };
        assert_eq!(
            err.to_string(),
            "null_propagation: no fixed point after 4 iteration(s)"
        );
    }
}
