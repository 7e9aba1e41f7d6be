//! Salsa queries for C generation.

use crate::lower::lower_program;
use crate::ownership::insert_cleanups;
use cxx2c_core::{
    CompilationPhase, Diagnostic, DiagnosticKind, DiagnosticSeverity, SourceFile, Span,
};
use cxx2c_hir::lower_to_hir;
use salsa::Accumulator;

/// Transpile a source file to C text. Diagnostics from every pipeline stage
/// are accumulated; None is returned when any stage failed.
#[salsa::tracked]
pub fn emit_unit(db: &dyn salsa::Database, source: SourceFile) -> Option<String> {
    let hir = lower_to_hir(db, source)?;
    let program = hir.program(db);

    let (c_program, diagnostics) = lower_program(program);
    let failed = diagnostics
        .iter()
        .any(|d| d.severity == DiagnosticSeverity::Error);
    for diagnostic in diagnostics {
        diagnostic.accumulate(db);
    }
    if failed {
        return None;
    }

    let cleaned = insert_cleanups(&c_program);
    match crate::emit::emit_program(&cleaned) {
        Ok(text) => Some(text),
        Err(err) => {
            Diagnostic::error(
                DiagnosticKind::UnsupportedConstruct,
                CompilationPhase::Emission,
                Span::new(0, 0),
                err.to_string(),
            )
            .accumulate(db);
            None
        }
    }
}

/// Every diagnostic produced while transpiling a source file, across all
/// stages.
#[salsa::tracked]
pub fn unit_diagnostics(db: &dyn salsa::Database, source: SourceFile) -> Vec<Diagnostic> {
    let _ = emit_unit(db, source);
    emit_unit::accumulated::<Diagnostic>(db, source)
        .into_iter()
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cxx2c_core::CompilerDatabaseImpl;
    use salsa::Database;

    fn transpile(source: &str) -> (Option<String>, Vec<Diagnostic>) {
        CompilerDatabaseImpl::default().attach(|db| {
            let file = SourceFile::from_text(db, "test.cpp", source.to_string());
            (emit_unit(db, file), unit_diagnostics(db, file))
        })
    }

    const GREETER: &str = r#"
#include <iostream>
#include <string>

class Greeter {
private:
    std::string name;

public:
    Greeter(const std::string& n) : name(n) {
        std::cout << "Greeter created for " << name << std::endl;
    }

    ~Greeter() {
        std::cout << "Greeter destroyed for " << name << std::endl;
    }

    void greet() const {
        std::cout << "Hello, " << name << "!" << std::endl;
    }

    void farewell(const std::string& message = "Goodbye") const {
        std::cout << message << ", " << name << "!" << std::endl;
    }
};

int main() {
    Greeter greeter("World");
    greeter.greet();
    greeter.farewell();
    greeter.farewell("See you later");

    return 0;
}
"#;

    #[test]
    fn greeter_lowers_to_lifecycle_functions() {
        let (text, diagnostics) = transpile(GREETER);
        let text = text.unwrap_or_else(|| panic!("no output; diagnostics: {diagnostics:?}"));
        assert!(text.contains("void Greeter_init(Greeter* self, const char* n)"));
        assert!(text.contains("void Greeter_destroy(Greeter* self)"));
        assert!(text.contains("void Greeter_greet(const Greeter* self)"));
        assert!(text.contains("self->name = cxx_strdup(n);"));
        // Defaulted argument expanded at the call-site.
        assert!(text.contains("Greeter_farewell(&greeter, \"Goodbye\");"));
        assert!(text.contains("Greeter_farewell(&greeter, \"See you later\");"));
        // Cleanup precedes the return.
        let destroy_at = text.find("Greeter_destroy(&greeter);").expect("cleanup");
        let return_at = text.rfind("return 0;").expect("return");
        assert!(destroy_at < return_at);
    }

    #[test]
    fn transpiling_twice_is_byte_identical() {
        let (first, _) = transpile(GREETER);
        let (second, _) = transpile(GREETER);
        assert_eq!(first, second);
        assert!(first.is_some());
    }

    #[test]
    fn use_after_move_is_reported() {
        let source = r#"
#include <memory>

struct Box {
    int value;

    Box(int v) : value(v) {}
};

int main() {
    auto a = std::make_unique<Box>(1);
    auto b = std::move(a);
    return a->value;
}
"#;
        let (text, diagnostics) = transpile(source);
        assert!(text.is_none());
        assert!(
            diagnostics
                .iter()
                .any(|d| d.kind == DiagnosticKind::UseAfterMove),
            "got {diagnostics:?}"
        );
    }

    #[test]
    fn moved_from_local_is_not_freed() {
        let source = r#"
#include <memory>

struct Node {
    int value;

    Node(int v) : value(v) {}
};

struct Holder {
    std::unique_ptr<Node> slot;

    Holder() : slot(nullptr) {}

    void put(int v) {
        auto node = std::make_unique<Node>(v);
        slot = std::move(node);
    }
};

int main() {
    Holder holder;
    holder.put(7);
    return 0;
}
"#;
        let (text, diagnostics) = transpile(source);
        let text = text.unwrap_or_else(|| panic!("no output; diagnostics: {diagnostics:?}"));
        // The move lowers to a copy plus an explicit empty sentinel.
        assert!(text.contains("self->slot = node;"));
        assert!(text.contains("node = NULL;"));
        // `put` must not free the moved-from local: the only free in `put`
        // would double-free the node now owned by the holder.
        let put_body = text
            .split("void Holder_put(")
            .nth(1)
            .expect("put function emitted");
        let put_body = put_body.split("\n}").next().expect("body");
        assert!(
            !put_body.contains("free(node)"),
            "moved-from local must not be freed:\n{put_body}"
        );
    }

    #[test]
    fn no_output_for_units_with_errors() {
        let (text, diagnostics) = transpile("int main() {\n    return missing;\n}\n");
        assert!(text.is_none());
        assert!(!diagnostics.is_empty());
    }
}
