//! Salsa queries wrapping AST → HIR lowering.

use crate::hir::HirUnit;
use cxx2c_ast::parse_translation_unit;
use cxx2c_core::{Diagnostic, SourceFile};
use salsa::Accumulator;

/// Lower a source file to HIR. Diagnostics are accumulated; None is
/// returned when any error was reported during lowering.
#[salsa::tracked]
pub fn lower_to_hir<'db>(
    db: &'db dyn salsa::Database,
    source: SourceFile,
) -> Option<HirUnit<'db>> {
    let unit = parse_translation_unit(db, source);
    let (program, diagnostics) = crate::lower::lower_unit(db, unit);
    for diagnostic in diagnostics {
        diagnostic.accumulate(db);
    }
    program.map(|program| HirUnit::new(db, program))
}

/// All diagnostics produced while lowering a source file.
#[salsa::tracked]
pub fn hir_diagnostics(db: &dyn salsa::Database, source: SourceFile) -> Vec<Diagnostic> {
    let _ = lower_to_hir(db, source);
    lower_to_hir::accumulated::<Diagnostic>(db, source)
        .into_iter()
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::{HirInit, HirStmt};
    use crate::types::Ty;
    use cxx2c_core::{CompilerDatabaseImpl, DiagnosticKind, DiagnosticSeverity};
    use salsa::Database;

    fn with_hir<R>(
        source: &str,
        f: impl FnOnce(&crate::hir::HirProgram, Vec<Diagnostic>) -> R,
    ) -> R {
        CompilerDatabaseImpl::default().attach(|db| {
            let file = SourceFile::from_text(db, "test.cpp", source.to_string());
            let diagnostics = hir_diagnostics(db, file);
            let unit = lower_to_hir(db, file);
            match unit {
                Some(unit) => f(unit.program(db), diagnostics),
                None => f(&Default::default(), diagnostics),
            }
        })
    }

    fn errors(source: &str) -> Vec<Diagnostic> {
        CompilerDatabaseImpl::default().attach(|db| {
            let file = SourceFile::from_text(db, "test.cpp", source.to_string());
            hir_diagnostics(db, file)
                .into_iter()
                .filter(|d| d.severity == DiagnosticSeverity::Error)
                .collect()
        })
    }

    const FIB_EXAMPLE: &str = r#"
template<typename T>
constexpr T fibonacci(T n) {
    if (n <= 1) return n;
    return fibonacci(n - 1) + fibonacci(n - 2);
}

constexpr std::array<int, 10> generateFibSequence() {
    std::array<int, 10> result{};
    for (int i = 0; i < 10; ++i) {
        result[i] = fibonacci(i);
    }
    return result;
}

int main() {
    constexpr auto fibSeq = generateFibSequence();
    for (const auto& num : fibSeq) {
        std::cout << num << " ";
    }
    std::cout << std::endl;
    return 0;
}
"#;

    #[test]
    fn constexpr_variable_folds_to_aggregate() {
        with_hir(FIB_EXAMPLE, |program, diagnostics| {
            assert!(
                diagnostics
                    .iter()
                    .all(|d| d.severity != DiagnosticSeverity::Error),
                "unexpected errors: {diagnostics:?}"
            );
            let main = program.get_function("main").expect("main");
            let HirStmt::Local { ty, init, .. } = &main.body[0] else {
                panic!("expected constexpr local first");
            };
            assert_eq!(
                *ty,
                Ty::Array {
                    elem: Box::new(Ty::Int),
                    len: 10
                }
            );
            let HirInit::Const(crate::consteval::ConstValue::Aggregate(values)) = init else {
                panic!("expected folded aggregate, got {init:?}");
            };
            let ints: Vec<i64> = values
                .iter()
                .map(|v| match v {
                    crate::consteval::ConstValue::Int(i) => *i,
                    other => panic!("expected int, got {other:?}"),
                })
                .collect();
            assert_eq!(ints, vec![0, 1, 1, 2, 3, 5, 8, 13, 21, 34]);
        });
    }

    #[test]
    fn constexpr_only_functions_are_not_emitted() {
        with_hir(FIB_EXAMPLE, |program, _| {
            assert!(program.get_function("generateFibSequence").is_none());
            assert!(program.get_function("main").is_some());
        });
    }

    #[test]
    fn template_instantiations_are_deduplicated() {
        let source = r#"
template<typename T>
T identity(T x) {
    return x;
}

int main() {
    int a = identity(1);
    int b = identity(2);
    int c = identity(3);
    return 0;
}
"#;
        with_hir(source, |program, diagnostics| {
            assert!(
                diagnostics
                    .iter()
                    .all(|d| d.severity != DiagnosticSeverity::Error),
                "unexpected errors: {diagnostics:?}"
            );
            let instantiations = program
                .functions
                .iter()
                .filter(|f| f.name == "identity_int")
                .count();
            assert_eq!(instantiations, 1, "exactly one body per instantiation key");
        });
    }

    #[test]
    fn class_template_instantiates_with_value_argument() {
        let source = r#"
template<typename T, size_t N>
class Holder {
private:
    std::array<T, N> values;

public:
    constexpr Holder() : values{} {}

    size_t capacity() const {
        return N;
    }
};

int main() {
    Holder<int, 15> holder;
    std::cout << holder.capacity() << std::endl;
    return 0;
}
"#;
        with_hir(source, |program, diagnostics| {
            assert!(
                diagnostics
                    .iter()
                    .all(|d| d.severity != DiagnosticSeverity::Error),
                "unexpected errors: {diagnostics:?}"
            );
            let holder = program.get_struct("Holder_int_15").expect("instantiation");
            assert_eq!(
                holder.fields[0].ty,
                Ty::Array {
                    elem: Box::new(Ty::Int),
                    len: 15
                }
            );
            assert_eq!(holder.methods[0].name, "Holder_int_15_capacity");
        });
    }

    #[test]
    fn unresolved_name_is_reported() {
        let errs = errors("int main() {\n    return missing;\n}\n");
        assert!(
            errs.iter()
                .any(|d| d.kind == DiagnosticKind::UnresolvedName && d.message.contains("missing")),
            "got {errs:?}"
        );
    }

    #[test]
    fn duplicate_local_is_reported() {
        let errs = errors("int main() {\n    int x = 1;\n    int x = 2;\n    return 0;\n}\n");
        assert!(
            errs.iter()
                .any(|d| d.kind == DiagnosticKind::DuplicateDeclaration),
            "got {errs:?}"
        );
    }

    #[test]
    fn redefined_function_is_reported() {
        let errs = errors(
            "int twice(int x) {\n    return x + x;\n}\n\nint twice(int x) {\n    return 2 * x;\n}\n\nint main() {\n    return twice(1);\n}\n",
        );
        assert!(
            errs.iter()
                .any(|d| d.kind == DiagnosticKind::DuplicateDeclaration),
            "got {errs:?}"
        );
    }

    #[test]
    fn shadowing_in_nested_scope_is_allowed() {
        let errs = errors(
            "int main() {\n    int x = 1;\n    {\n        int x = 2;\n        x = x + 1;\n    }\n    return x;\n}\n",
        );
        assert!(errs.is_empty(), "got {errs:?}");
    }

    #[test]
    fn ambiguous_overload_is_reported() {
        let source = r#"
int pick(int a) { return a; }
int pick(size_t a) { return 1; }

int main() {
    bool flag = true;
    return pick(flag);
}
"#;
        let errs = errors(source);
        assert!(
            errs.iter().any(|d| d.kind == DiagnosticKind::AmbiguousCall),
            "got {errs:?}"
        );
    }

    #[test]
    fn missing_template_argument_kind_is_reported() {
        let source = r#"
template<typename T, size_t N>
class Holder {
private:
    std::array<T, N> values;

public:
    constexpr Holder() : values{} {}
};

int main() {
    Holder<int> holder;
    return 0;
}
"#;
        let errs = errors(source);
        assert!(
            errs.iter()
                .any(|d| d.kind == DiagnosticKind::TemplateArgument),
            "got {errs:?}"
        );
    }

    #[test]
    fn no_hir_is_produced_for_failed_units() {
        CompilerDatabaseImpl::default().attach(|db| {
            let file = SourceFile::from_text(
                db,
                "bad.cpp",
                "int main() {\n    return missing;\n}\n".to_string(),
            );
            assert!(lower_to_hir(db, file).is_none());
        });
    }
}
