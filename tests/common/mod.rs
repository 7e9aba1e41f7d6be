//! Common test utilities for end-to-end tests.

use cxx2c::{CompilerDatabaseImpl, SourceFile, compile_with_diagnostics};
use salsa::Database;
use std::io::Write;
use std::process::Command;
use tempfile::TempDir;

/// Transpile a C++ source string, panicking on any diagnostic error.
pub fn transpile(source: &str) -> String {
    CompilerDatabaseImpl::default().attach(|db| {
        let file = SourceFile::from_text(db, "input.cpp", source.to_string());
        let result = compile_with_diagnostics(db, file);
        assert!(
            !result.has_errors(),
            "unexpected diagnostics: {:?}",
            result.diagnostics
        );
        result.c_source.expect("C output for a clean unit")
    })
}

/// Compile generated C with the system C compiler and run it, returning the
/// program's stdout. Returns None (and logs) when no C compiler is
/// available, so behavior tests degrade to transpile-only coverage there.
#[allow(dead_code)]
pub fn compile_and_run_c(c_source: &str) -> Option<String> {
    let cc = std::env::var("CC").unwrap_or_else(|_| "cc".to_string());
    let dir = TempDir::new().expect("Failed to create temp dir");
    let c_path = dir.path().join("out.c");
    let bin_path = dir.path().join("out");

    let mut c_file = std::fs::File::create(&c_path).expect("Failed to create C file");
    c_file
        .write_all(c_source.as_bytes())
        .expect("Failed to write C source");
    drop(c_file);

    let compile = match Command::new(&cc).arg(&c_path).arg("-o").arg(&bin_path).output() {
        Ok(output) => output,
        Err(err) => {
            eprintln!("skipping execution: C compiler `{cc}` unavailable ({err})");
            return None;
        }
    };
    if !compile.status.success() {
        let stderr = String::from_utf8_lossy(&compile.stderr);
        panic!("generated C failed to compile:\n{stderr}\n---\n{c_source}");
    }

    let run = Command::new(&bin_path)
        .output()
        .expect("Failed to execute generated binary");
    if !run.status.success() {
        panic!(
            "generated binary exited with {:?}; stderr: {}",
            run.status.code(),
            String::from_utf8_lossy(&run.stderr)
        );
    }
    Some(String::from_utf8_lossy(&run.stdout).into_owned())
}

/// Transpile, compile, and run in one step.
#[allow(dead_code)]
pub fn transpile_and_run(source: &str) -> Option<String> {
    let c_source = transpile(source);
    compile_and_run_c(&c_source)
}
