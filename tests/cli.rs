//! Tests for the `ember` command-line tool.

mod common;

use common::{run_ember, stderr, stdout, temp_file};
use insta::assert_snapshot;

const METHOD: &str = r#"
method @get(%0: ref, %1: int) {
  field @Obj.f : int {offset = 8}
^bb0:
  instance_set %0, %1 {field = @Obj.f}
  %2 = instance_get %0 {field = @Obj.f} : int
  %3 = null_check %0 : ref
  return %2
}
"#;

#[test]
fn opt_prints_optimized_methods() {
    let input = temp_file(METHOD, ".ir");
    let output = run_ember(["opt".as_ref(), input.path().as_os_str()]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert_snapshot!(stdout(&output), @r"
    method @get(%0: ref, %1: int) {
      field @Obj.f : int {offset = 8}
    ^bb0:
      instance_set %0, %1 {field = @Obj.f}
      return %1
    }
    ");
}

#[test]
fn opt_with_nullability_and_stats() {
    let input = temp_file(METHOD, ".ir");
    let config = temp_file("passes = [\"side_effects\", \"null_propagation\"]\n", ".toml");
    let output = run_ember([
        "opt".as_ref(),
        input.path().as_os_str(),
        "--config".as_ref(),
        config.path().as_os_str(),
        "--nullability".as_ref(),
        "--stats".as_ref(),
    ]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert_snapshot!(stdout(&output), @r"
    method @get(%0: ref, %1: int) {
      field @Obj.f : int {offset = 8}
    ^bb0:
      instance_set %0, %1 {field = @Obj.f}
      %2 = instance_get %0 {field = @Obj.f} : int
      %3 = null_check %0 : ref  // not null
      return %2
    }
    ");
    assert_eq!(
        stderr(&output),
        "attempted_compilation: 1\ncompiled_optimized: 1\n"
    );
}

#[test]
fn unknown_pass_is_a_usage_error() {
    let input = temp_file(METHOD, ".ir");
    let output = run_ember([
        "opt".as_ref(),
        input.path().as_os_str(),
        "--disable".as_ref(),
        "inline".as_ref(),
    ]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("unknown pass 'inline'"));
}

#[test]
fn check_reports_violations() {
    let input = temp_file(
        r#"
        method @fine() {
        ^bb0:
          return
        }

        method @open() {
        ^bb0:
          %0 = const {value = 1} : int
        }
        "#,
        ".ir",
    );
    let output = run_ember(["check".as_ref(), input.path().as_os_str()]);

    assert!(!output.status.success());
    assert_snapshot!(stdout(&output), @r"
    @fine: ok
    @open: 1 invariant violation(s) found:
      - ^bb0 does not end with a terminator
    ");
}

#[test]
fn parse_errors_are_reported() {
    let input = temp_file("method @broken(", ".ir");
    let output = run_ember(["check".as_ref(), input.path().as_os_str()]);

    assert!(!output.status.success());
    assert!(stderr(&output).starts_with("error: "));
}
