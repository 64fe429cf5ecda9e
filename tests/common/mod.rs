// tests/common/mod.rs
// Shared test utilities for integration tests
#![allow(dead_code)]

use std::io::Write;
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;

const BINARY_PATH: &str = env!("CARGO_BIN_EXE_fpmap");

/// Helper function to run fpmap with given arguments and input via stdin
pub fn run_fpmap_with_input(args: &[&str], input: &str) -> (String, String, i32) {
    let mut cmd = Command::new(BINARY_PATH)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to start fpmap");

    // Write input to stdin, then close it so fpmap sees EOF. fpmap may exit
    // before reading (usage errors), so a broken pipe here is expected.
    if let Some(mut stdin) = cmd.stdin.take() {
        if let Err(e) = stdin.write_all(input.as_bytes()) {
            assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe, "Failed to write to stdin");
        }
    }

    let output = cmd.wait_with_output().expect("Failed to read output");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}

/// Helper function to run fpmap with a temporary file
pub fn run_fpmap_with_file(args: &[&str], file_content: &str) -> (String, String, i32) {
    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    temp_file
        .write_all(file_content.as_bytes())
        .expect("Failed to write to temp file");

    let mut full_args = args.to_vec();
    full_args.push(temp_file.path().to_str().unwrap());

    run_fpmap_with_files(&full_args, &[])
}

/// Helper function to run fpmap with multiple files
pub fn run_fpmap_with_files(args: &[&str], files: &[&str]) -> (String, String, i32) {
    let mut full_args = args.to_vec();
    full_args.extend(files);

    let output = Command::new(BINARY_PATH)
        .args(&full_args)
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute fpmap");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}

/// Numbered input lines "line 0\nline 1\n..."
pub fn numbered_lines(count: usize) -> String {
    (0..count).map(|i| format!("line {}\n", i)).collect()
}
