//! Pipeline-level tests: determinism, incremental recompilation, error
//! gating, and a small emitted-C golden.

mod common;

use common::transpile;
use cxx2c::{CompilerDatabaseImpl, DiagnosticKind, SourceFile, compile_with_diagnostics};
use salsa::{Database, Setter};

#[test]
fn transpiling_the_same_input_twice_is_byte_identical() {
    let source = include_str!("../cpp-examples/linked_list.cpp");
    assert_eq!(transpile(source), transpile(source));
}

#[test]
fn all_fixtures_transpile_cleanly() {
    for fixture in [
        include_str!("../cpp-examples/hello_world.cpp"),
        include_str!("../cpp-examples/fibonacci.cpp"),
        include_str!("../cpp-examples/linked_list.cpp"),
    ] {
        let text = transpile(fixture);
        assert!(text.contains("int main(void)"));
    }
}

#[test]
fn small_program_golden() {
    let text = transpile(
        "int square(int x) {\n    return x * x;\n}\n\nint main() {\n    std::cout << square(6) << std::endl;\n    return 0;\n}\n",
    );
    insta::assert_snapshot!(text, @r###"
    #include <stdbool.h>
    #include <stddef.h>
    #include <stdio.h>
    #include <stdlib.h>
    #include <string.h>

    int square(int x);

    int square(int x) {
        return x * x;
    }

    int main(void) {
        printf("%d\n", square(6));
        return 0;
    }
    "###);
}

#[test]
fn editing_the_source_recompiles() {
    let mut db = CompilerDatabaseImpl::default();
    let file = SourceFile::from_text(
        &db,
        "edit.cpp",
        "int main() {\n    return 1;\n}\n".to_string(),
    );
    let first = db.attach(|db| compile_with_diagnostics(db, file).c_source);
    assert!(first.expect("first compile").contains("return 1;"));

    file.set_text(&mut db)
        .to("int main() {\n    return 2;\n}\n".to_string());
    let second = db.attach(|db| compile_with_diagnostics(db, file).c_source);
    assert!(second.expect("second compile").contains("return 2;"));
}

#[test]
fn multiple_resolution_errors_are_collected_in_one_pass() {
    let source = "int main() {\n    int a = missing_one;\n    int b = missing_two;\n    return 0;\n}\n";
    CompilerDatabaseImpl::default().attach(|db| {
        let file = SourceFile::from_text(db, "multi.cpp", source.to_string());
        let result = compile_with_diagnostics(db, file);
        assert!(result.c_source.is_none());
        let unresolved = result
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::UnresolvedName)
            .count();
        assert_eq!(unresolved, 2, "got {:?}", result.diagnostics);
    });
}

#[test]
fn parse_errors_abort_the_unit_with_one_diagnostic() {
    CompilerDatabaseImpl::default().attach(|db| {
        let file = SourceFile::from_text(
            db,
            "bad.cpp",
            "int main() {\n    return 0\n}\n".to_string(),
        );
        let result = compile_with_diagnostics(db, file);
        assert!(result.c_source.is_none());
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::SyntaxError);
    });
}

#[test]
fn independent_units_compile_on_independent_databases() {
    let sources = [
        "int main() {\n    return 0;\n}\n",
        "int main() {\n    return 1;\n}\n",
        "int main() {\n    return 2;\n}\n",
    ];
    let outputs: Vec<Option<String>> = std::thread::scope(|scope| {
        let handles: Vec<_> = sources
            .iter()
            .map(|source| {
                scope.spawn(move || {
                    CompilerDatabaseImpl::default().attach(|db| {
                        let file =
                            SourceFile::from_text(db, "unit.cpp", source.to_string());
                        compile_with_diagnostics(db, file).c_source
                    })
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker"))
            .collect()
    });
    for (i, output) in outputs.iter().enumerate() {
        let text = output.as_ref().expect("output");
        assert!(text.contains(&format!("return {i};")));
    }
}
