//! cxx2c CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, Command};
use cxx2c::{CompilerDatabaseImpl, Db, compile_with_diagnostics};
use salsa::Database;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ok = match cli.command {
        Command::Build {
            files,
            out_dir,
            jobs,
        } => run_batch(&files, Some(out_dir.as_deref()), jobs.max(1)),
        Command::Check { files } => run_batch(&files, None, 4),
    };
    if !ok {
        std::process::exit(1);
    }
}

/// Compile files in parallel, one worker and one database per file — units
/// share no state, so no synchronization is needed between them.
fn run_batch(files: &[PathBuf], out_dir: Option<Option<&Path>>, jobs: usize) -> bool {
    let mut all_ok = true;
    for chunk in files.chunks(jobs) {
        let results: Vec<bool> = std::thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|file| scope.spawn(move || compile_file(file, out_dir)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or(false))
                .collect()
        });
        all_ok &= results.iter().all(|ok| *ok);
    }
    all_ok
}

/// Transpile one file. `out_dir` is None for check-only mode; Some(None)
/// writes next to the input.
fn compile_file(path: &Path, out_dir: Option<Option<&Path>>) -> bool {
    let db = CompilerDatabaseImpl::default();
    let source = match db.input(path.to_path_buf()) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: cannot read `{}`: {err}", path.display());
            return false;
        }
    };

    db.attach(|db| {
        let result = compile_with_diagnostics(db, source);
        let text = source.text(db);
        let display_path = path.display().to_string();
        for diagnostic in &result.diagnostics {
            eprintln!("{}", diagnostic.render(&display_path, text));
        }

        let Some(c_source) = result.c_source else {
            return false;
        };
        let Some(out_dir) = out_dir else {
            // Check-only mode.
            return true;
        };

        let out_path = match out_dir {
            Some(dir) => {
                let stem = path.file_stem().unwrap_or_default();
                dir.join(stem).with_extension("c")
            }
            None => path.with_extension("c"),
        };
        if let Some(parent) = out_path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(err) = std::fs::create_dir_all(parent) {
                    eprintln!("error: cannot create `{}`: {err}", parent.display());
                    return false;
                }
            }
        }
        match std::fs::write(&out_path, c_source) {
            Ok(()) => {
                println!("{} -> {}", path.display(), out_path.display());
                true
            }
            Err(err) => {
                eprintln!("error: cannot write `{}`: {err}", out_path.display());
                false
            }
        }
    })
}
