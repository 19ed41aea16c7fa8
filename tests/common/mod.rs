//! Common test utilities for CLI tests.

use std::io::Write;
use std::process::{Command, Output};
use tempfile::NamedTempFile;

/// Write `contents` to a temporary file with the given suffix.
pub fn temp_file(contents: &str, suffix: &str) -> NamedTempFile {
    let mut file = NamedTempFile::with_suffix(suffix).expect("Failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("Failed to write temp file");
    file
}

/// Run the `ember` binary with the given arguments.
pub fn run_ember<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_ember"))
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to execute ember")
}

#[allow(dead_code)]
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[allow(dead_code)]
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
