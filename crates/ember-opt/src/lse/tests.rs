use super::*;
use crate::pass::PassManager;
use crate::pipeline::OptimizationConfig;
use crate::stats::MethodStats;
use ember_ir::{parse_test_method, print_graph};
use insta::assert_snapshot;

fn run_lse(src: &str) -> (String, MethodStats) {
    let graph = parse_test_method(src);
    let mut unit = CompilationUnit::new(graph, OptimizationConfig::default());
    let mut manager = PassManager::new(true);
    manager
        .add_block_pass(SideEffectsAnalysis::new())
        .add_block_pass(LoadStoreElimination::new());
    manager.run(&mut unit).unwrap();
    (print_graph(&unit.graph), unit.stats)
}

/// Runs the pass and asserts that the method is printed back unchanged.
fn assert_unchanged(src: &str) {
    let before = print_graph(&parse_test_method(src));
    let (after, stats) = run_lse(src);
    assert_eq!(after, before);
    assert_eq!(stats.get(Stat::RemovedLoad), 0);
    assert_eq!(stats.get(Stat::RemovedStore), 0);
}

// ========================================================================
// Straight-line code
// ========================================================================

#[test]
fn private_object_store_and_load_vanish() {
    let (out, stats) = run_lse(
        r#"
        method @f() {
          field @Obj.f : int {offset = 8}
        ^bb0:
          %0 = new_instance {class = @Obj} : ref
          %1 = const {value = 5} : int
          instance_set %0, %1 {field = @Obj.f}
          %2 = instance_get %0 {field = @Obj.f} : int
          return %2
        }
        "#,
    );
    assert_snapshot!(out, @r"
    method @f() {
      field @Obj.f : int {offset = 8}
    ^bb0:
      %0 = new_instance {class = @Obj} : ref
      %1 = const {value = 5} : int
      return %1
    }
    ");
    assert_eq!(stats.get(Stat::RemovedLoad), 1);
    assert_eq!(stats.get(Stat::RemovedStore), 1);
}

#[test]
fn load_after_store_reuses_stored_value() {
    let (out, stats) = run_lse(
        r#"
        method @g(%0: ref, %1: int) {
          field @Obj.f : int {offset = 8}
        ^bb0:
          instance_set %0, %1 {field = @Obj.f}
          %2 = instance_get %0 {field = @Obj.f} : int
          return %2
        }
        "#,
    );
    assert_snapshot!(out, @r"
    method @g(%0: ref, %1: int) {
      field @Obj.f : int {offset = 8}
    ^bb0:
      instance_set %0, %1 {field = @Obj.f}
      return %1
    }
    ");
    assert_eq!(stats.get(Stat::RemovedLoad), 1);
    assert_eq!(stats.get(Stat::RemovedStore), 0);
}

#[test]
fn overwritten_store_is_dead() {
    let (out, stats) = run_lse(
        r#"
        method @h(%0: ref, %1: int, %2: int) {
          field @Obj.f : int {offset = 8}
        ^bb0:
          instance_set %0, %1 {field = @Obj.f}
          instance_set %0, %2 {field = @Obj.f}
          return %2
        }
        "#,
    );
    assert_snapshot!(out, @r"
    method @h(%0: ref, %1: int, %2: int) {
      field @Obj.f : int {offset = 8}
    ^bb0:
      instance_set %0, %2 {field = @Obj.f}
      return %2
    }
    ");
    assert_eq!(stats.get(Stat::RemovedStore), 1);
}

#[test]
fn storing_loaded_value_back_is_redundant() {
    let (out, stats) = run_lse(
        r#"
        method @copy(%0: ref) {
          field @Obj.f : int {offset = 8}
        ^bb0:
          %1 = instance_get %0 {field = @Obj.f} : int
          instance_set %0, %1 {field = @Obj.f}
          return %1
        }
        "#,
    );
    assert_snapshot!(out, @r"
    method @copy(%0: ref) {
      field @Obj.f : int {offset = 8}
    ^bb0:
      %1 = instance_get %0 {field = @Obj.f} : int
      return %1
    }
    ");
    assert_eq!(stats.get(Stat::RemovedStore), 1);
}

#[test]
fn may_alias_store_invalidates_known_value() {
    assert_unchanged(
        r#"
        method @alias(%0: ref, %1: ref, %2: int, %3: int) {
          field @Obj.f : int {offset = 8}
        ^bb0:
          instance_set %0, %2 {field = @Obj.f}
          instance_set %1, %3 {field = @Obj.f}
          %4 = instance_get %0 {field = @Obj.f} : int
          return %4
        }
        "#,
    );
}

#[test]
fn distinct_fields_do_not_alias() {
    let (out, _) = run_lse(
        r#"
        method @fields(%0: ref, %1: ref, %2: int, %3: int) {
          field @Obj.f : int {offset = 8}
          field @Obj.g : int {offset = 12}
        ^bb0:
          instance_set %0, %2 {field = @Obj.f}
          instance_set %1, %3 {field = @Obj.g}
          %4 = instance_get %0 {field = @Obj.f} : int
          return %4
        }
        "#,
    );
    assert_snapshot!(out, @r"
    method @fields(%0: ref, %1: ref, %2: int, %3: int) {
      field @Obj.f : int {offset = 8}
      field @Obj.g : int {offset = 12}
    ^bb0:
      instance_set %0, %2 {field = @Obj.f}
      instance_set %1, %3 {field = @Obj.g}
      return %2
    }
    ");
}

#[test]
fn call_invalidates_escaping_locations() {
    assert_unchanged(
        r#"
        method @call(%0: ref, %1: int) {
          field @Obj.f : int {offset = 8}
        ^bb0:
          instance_set %0, %1 {field = @Obj.f}
          invoke_virtual %0 {method = @Obj.touch}
          %2 = instance_get %0 {field = @Obj.f} : int
          return %2
        }
        "#,
    );
}

#[test]
fn private_object_survives_unrelated_call() {
    let (out, stats) = run_lse(
        r#"
        method @private(%0: ref) {
          field @Obj.f : int {offset = 8}
        ^bb0:
          %1 = new_instance {class = @Obj} : ref
          %2 = const {value = 1} : int
          instance_set %1, %2 {field = @Obj.f}
          invoke_virtual %0 {method = @Obj.touch}
          %3 = instance_get %1 {field = @Obj.f} : int
          return %3
        }
        "#,
    );
    assert_snapshot!(out, @r"
    method @private(%0: ref) {
      field @Obj.f : int {offset = 8}
    ^bb0:
      %1 = new_instance {class = @Obj} : ref
      %2 = const {value = 1} : int
      invoke_virtual %0 {method = @Obj.touch}
      return %2
    }
    ");
    assert_eq!(stats.get(Stat::RemovedLoad), 1);
    assert_eq!(stats.get(Stat::RemovedStore), 1);
}

#[test]
fn array_elements_at_distinct_constant_indices() {
    let (out, stats) = run_lse(
        r#"
        method @arrays(%0: ref, %1: int) {
        ^bb0:
          %2 = const {value = 0} : int
          %3 = const {value = 1} : int
          array_set %0, %2, %1
          array_set %0, %3, %2
          %4 = array_get %0, %2 : int
          return %4
        }
        "#,
    );
    assert_snapshot!(out, @r"
    method @arrays(%0: ref, %1: int) {
    ^bb0:
      %2 = const {value = 0} : int
      %3 = const {value = 1} : int
      array_set %0, %2, %1
      array_set %0, %3, %2
      return %1
    }
    ");
    assert_eq!(stats.get(Stat::RemovedLoad), 1);
    assert_eq!(stats.get(Stat::RemovedStore), 0);
}

#[test]
fn volatile_load_is_a_barrier() {
    assert_unchanged(
        r#"
        method @volatile(%0: ref, %1: int) {
          field @Obj.f : int {offset = 8}
          field @Obj.v : int {offset = 12, volatile = true}
        ^bb0:
          instance_set %0, %1 {field = @Obj.f}
          %2 = instance_get %0 {field = @Obj.v} : int
          %3 = instance_get %0 {field = @Obj.f} : int
          %4 = add %2, %3 : int
          return %4
        }
        "#,
    );
}

// ========================================================================
// Exceptions
// ========================================================================

#[test]
fn first_store_through_maybe_null_reference_is_kept() {
    // The first store is the null check for %0: removing it would let the
    // static store happen before the fault.
    assert_unchanged(
        r#"
        method @f(%0: ref, %1: int) static {
          field @Obj.f : int {offset = 8}
          field @G.s : int {offset = 0, static = true}
        ^bb0:
          %2 = const {value = 7} : int
          instance_set %0, %2 {field = @Obj.f}
          static_set %1 {field = @G.s}
          instance_set %0, %1 {field = @Obj.f}
          return
        }
        "#,
    );
}

#[test]
fn division_keeps_pending_store() {
    assert_unchanged(
        r#"
        method @divide(%0: ref, %1: int, %2: int) {
          field @Obj.f : int {offset = 8}
        ^bb0:
          instance_set %0, %1 {field = @Obj.f}
          %3 = div %1, %2 : int
          instance_set %0, %3 {field = @Obj.f}
          return
        }
        "#,
    );
}

#[test]
fn access_through_unchecked_reference_keeps_pending_store() {
    assert_unchanged(
        r#"
        method @other(%0: ref, %1: ref, %2: int) {
          field @Obj.f : int {offset = 8}
          field @Obj.g : int {offset = 12}
        ^bb0:
          instance_set %0, %2 {field = @Obj.f}
          %3 = instance_get %1 {field = @Obj.g} : int
          instance_set %0, %3 {field = @Obj.f}
          return
        }
        "#,
    );
}

#[test]
fn store_after_earlier_dereference_can_die() {
    let (out, stats) = run_lse(
        r#"
        method @deref(%0: ref, %1: int) static {
          field @Obj.f : int {offset = 8}
          field @Obj.g : int {offset = 12}
          field @G.s : int {offset = 0, static = true}
        ^bb0:
          %2 = instance_get %0 {field = @Obj.g} : int
          instance_set %0, %1 {field = @Obj.f}
          static_set %2 {field = @G.s}
          instance_set %0, %2 {field = @Obj.f}
          return
        }
        "#,
    );
    assert_snapshot!(out, @r"
    method @deref(%0: ref, %1: int) static {
      field @Obj.f : int {offset = 8}
      field @Obj.g : int {offset = 12}
      field @G.s : int {offset = 0, static = true}
    ^bb0:
      %2 = instance_get %0 {field = @Obj.g} : int
      static_set %2 {field = @G.s}
      instance_set %0, %2 {field = @Obj.f}
      return
    }
    ");
    assert_eq!(stats.get(Stat::RemovedStore), 1);
}

#[test]
fn store_to_fresh_escaping_object_can_die() {
    let (out, stats) = run_lse(
        r#"
        method @fresh(%0: int, %1: int) static {
          field @Obj.f : int {offset = 8}
          field @G.s : int {offset = 0, static = true}
        ^bb0:
          %2 = new_instance {class = @Obj} : ref
          instance_set %2, %0 {field = @Obj.f}
          static_set %1 {field = @G.s}
          instance_set %2, %1 {field = @Obj.f}
          return %2
        }
        "#,
    );
    assert_snapshot!(out, @r"
    method @fresh(%0: int, %1: int) static {
      field @Obj.f : int {offset = 8}
      field @G.s : int {offset = 0, static = true}
    ^bb0:
      %2 = new_instance {class = @Obj} : ref
      static_set %1 {field = @G.s}
      instance_set %2, %1 {field = @Obj.f}
      return %2
    }
    ");
    assert_eq!(stats.get(Stat::RemovedStore), 1);
}

#[test]
fn repeated_array_store_at_same_index_is_redundant() {
    let (out, stats) = run_lse(
        r#"
        method @again(%0: ref, %1: int, %2: int) static {
        ^bb0:
          array_set %0, %1, %2
          array_set %0, %1, %2
          return
        }
        "#,
    );
    assert_snapshot!(out, @r"
    method @again(%0: ref, %1: int, %2: int) static {
    ^bb0:
      array_set %0, %1, %2
      return
    }
    ");
    assert_eq!(stats.get(Stat::RemovedStore), 1);
}

// ========================================================================
// Control flow
// ========================================================================

#[test]
fn agreeing_predecessors_keep_known_value() {
    let (out, _) = run_lse(
        r#"
        method @diamond(%0: ref, %1: bool, %2: int) {
          field @Obj.f : int {offset = 8}
        ^bb0:
          instance_set %0, %2 {field = @Obj.f}
          if %1 [^bb1, ^bb2]
        ^bb1:
          goto [^bb3]
        ^bb2:
          goto [^bb3]
        ^bb3:
          %3 = instance_get %0 {field = @Obj.f} : int
          return %3
        }
        "#,
    );
    assert_snapshot!(out, @r"
    method @diamond(%0: ref, %1: bool, %2: int) {
      field @Obj.f : int {offset = 8}
    ^bb0:
      instance_set %0, %2 {field = @Obj.f}
      if %1 [^bb1, ^bb2]
    ^bb1:
      goto [^bb3]
    ^bb2:
      goto [^bb3]
    ^bb3:
      return %2
    }
    ");
}

#[test]
fn disagreeing_predecessors_keep_stores_and_load() {
    assert_unchanged(
        r#"
        method @diamond(%0: ref, %1: bool, %2: int, %3: int) {
          field @Obj.f : int {offset = 8}
        ^bb0:
          if %1 [^bb1, ^bb2]
        ^bb1:
          instance_set %0, %2 {field = @Obj.f}
          goto [^bb3]
        ^bb2:
          instance_set %0, %3 {field = @Obj.f}
          goto [^bb3]
        ^bb3:
          %4 = instance_get %0 {field = @Obj.f} : int
          return %4
        }
        "#,
    );
}

#[test]
fn loop_without_conflicting_writes_keeps_value() {
    let (out, stats) = run_lse(
        r#"
        method @loop(%0: ref, %1: int, %2: bool) {
          field @Obj.f : int {offset = 8}
          field @G.s : int {offset = 0, static = true}
        ^bb0:
          instance_set %0, %1 {field = @Obj.f}
          goto [^bb1]
        ^bb1:
          if %2 [^bb2, ^bb3]
        ^bb2:
          %3 = instance_get %0 {field = @Obj.f} : int
          static_set %3 {field = @G.s}
          goto [^bb1]
        ^bb3:
          return %1
        }
        "#,
    );
    assert_snapshot!(out, @r"
    method @loop(%0: ref, %1: int, %2: bool) {
      field @Obj.f : int {offset = 8}
      field @G.s : int {offset = 0, static = true}
    ^bb0:
      instance_set %0, %1 {field = @Obj.f}
      goto [^bb1]
    ^bb1:
      if %2 [^bb2, ^bb3]
    ^bb2:
      static_set %1 {field = @G.s}
      goto [^bb1]
    ^bb3:
      return %1
    }
    ");
    assert_eq!(stats.get(Stat::RemovedLoad), 1);
    assert_eq!(stats.get(Stat::RemovedStore), 0);
}

#[test]
fn loop_writing_location_forgets_value() {
    assert_unchanged(
        r#"
        method @loop_write(%0: ref, %1: int, %2: bool) {
          field @Obj.f : int {offset = 8}
        ^bb0:
          instance_set %0, %1 {field = @Obj.f}
          goto [^bb1]
        ^bb1:
          %3 = instance_get %0 {field = @Obj.f} : int
          if %2 [^bb2, ^bb3]
        ^bb2:
          %4 = add %3, %1 : int
          instance_set %0, %4 {field = @Obj.f}
          goto [^bb1]
        ^bb3:
          return %3
        }
        "#,
    );
}

// ========================================================================
// Monitors and gating
// ========================================================================

#[test]
fn store_before_monitor_exit_is_kept() {
    assert_unchanged(
        r#"
        method @locked(%0: ref) {
          field @Obj.f : int {offset = 8}
        ^bb0:
          monitor_enter %0
          %1 = instance_get %0 {field = @Obj.f} : int
          instance_set %0, %1 {field = @Obj.f}
          monitor_exit %0
          return %1
        }
        "#,
    );
}

#[test]
fn closed_gate_without_side_effects() {
    let src = r#"
        method @g(%0: ref, %1: int) {
          field @Obj.f : int {offset = 8}
        ^bb0:
          instance_set %0, %1 {field = @Obj.f}
          %2 = instance_get %0 {field = @Obj.f} : int
          return %2
        }
        "#;
    let mut unit = CompilationUnit::new(parse_test_method(src), OptimizationConfig::default());
    let before = print_graph(&unit.graph);
    let mut manager = PassManager::new(true);
    manager.add_block_pass(LoadStoreElimination::new());
    manager.run(&mut unit).unwrap();

    assert_eq!(print_graph(&unit.graph), before);
    assert!(unit.stats.is_empty());
}
