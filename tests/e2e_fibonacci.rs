//! End-to-end tests for the constexpr/template Fibonacci fixture.

mod common;

use common::{transpile, transpile_and_run};

const FIBONACCI: &str = include_str!("../cpp-examples/fibonacci.cpp");

#[test]
fn fibonacci_prints_both_sequences() {
    let Some(output) = transpile_and_run(FIBONACCI) else {
        return;
    };
    assert_eq!(
        output,
        "First 10 Fibonacci numbers: 0 1 1 2 3 5 8 13 21 34 \n\
         Fibonacci sequence: 0 1 1 2 3 5 8 13 21 34 55 89 144 233 377 \n"
    );
}

#[test]
fn constexpr_sequence_is_folded_into_a_static_array() {
    let text = transpile(FIBONACCI);
    assert!(
        text.contains("static const int fibSeq[10] = {0, 1, 1, 2, 3, 5, 8, 13, 21, 34};"),
        "expected folded constant array in:\n{text}"
    );
    // The compile-time-only builder never reaches the C output.
    assert!(!text.contains("generateFibSequence"));
}

#[test]
fn class_template_instantiates_once_under_its_key() {
    let text = transpile(FIBONACCI);
    assert_eq!(
        text.matches("struct FibonacciSequence_int_15 {").count(),
        1
    );
    assert!(text.contains("void FibonacciSequence_int_15_print(const FibonacciSequence_int_15* self)"));
    assert!(text.contains("int fibonacci_int(int n)"));
}

#[test]
fn repeated_instantiation_emits_one_body() {
    let source = r#"
template<typename T>
T identity(T x) {
    return x;
}

int main() {
    int a = identity(1);
    int b = identity(2);
    int c = identity(a + b);
    std::cout << c << std::endl;
    return 0;
}
"#;
    let text = transpile(source);
    assert_eq!(
        text.matches("int identity_int(int x) {").count(),
        1,
        "exactly one instantiation body in:\n{text}"
    );
    let Some(output) = common::compile_and_run_c(&text) else {
        return;
    };
    assert_eq!(output, "3\n");
}
