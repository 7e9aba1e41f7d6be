//! End-to-end tests for the RAII Greeter fixture: construction output first,
//! destruction output last, reverse destruction order for co-scoped objects.

mod common;

use common::{transpile, transpile_and_run};

const GREETER: &str = include_str!("../cpp-examples/hello_world.cpp");

#[test]
fn greeter_prints_exact_transcript() {
    let Some(output) = transpile_and_run(GREETER) else {
        return;
    };
    assert_eq!(
        output,
        "Greeter created for World\n\
         Hello, World!\n\
         Goodbye, World!\n\
         See you later, World!\n\
         Greeter destroyed for World\n"
    );
}

#[test]
fn co_scoped_greeters_destroy_in_reverse_order() {
    let source = r#"
#include <iostream>
#include <string>

class Greeter {
private:
    std::string name;

public:
    Greeter(const std::string& n) : name(n) {
        std::cout << "ctor " << name << std::endl;
    }

    ~Greeter() {
        std::cout << "dtor " << name << std::endl;
    }
};

int main() {
    Greeter first("a");
    Greeter second("b");
    Greeter third("c");
    return 0;
}
"#;
    let Some(output) = transpile_and_run(source) else {
        return;
    };
    assert_eq!(output, "ctor a\nctor b\nctor c\ndtor c\ndtor b\ndtor a\n");
}

#[test]
fn inner_scope_destroys_before_outer_continues() {
    let source = r#"
#include <iostream>
#include <string>

class Greeter {
private:
    std::string name;

public:
    Greeter(const std::string& n) : name(n) {
        std::cout << "ctor " << name << std::endl;
    }

    ~Greeter() {
        std::cout << "dtor " << name << std::endl;
    }
};

int main() {
    Greeter outer("outer");
    {
        Greeter inner("inner");
    }
    std::cout << "after block" << std::endl;
    return 0;
}
"#;
    let Some(output) = transpile_and_run(source) else {
        return;
    };
    assert_eq!(
        output,
        "ctor outer\nctor inner\ndtor inner\nafter block\ndtor outer\n"
    );
}

#[test]
fn early_return_destroys_only_constructed_objects() {
    let source = r#"
#include <iostream>
#include <string>

class Greeter {
private:
    std::string name;

public:
    Greeter(const std::string& n) : name(n) {
        std::cout << "ctor " << name << std::endl;
    }

    ~Greeter() {
        std::cout << "dtor " << name << std::endl;
    }
};

int main() {
    Greeter first("a");
    if (true) {
        return 0;
    }
    Greeter second("b");
    return 0;
}
"#;
    let Some(output) = transpile_and_run(source) else {
        return;
    };
    assert_eq!(output, "ctor a\ndtor a\n");
}

#[test]
fn generated_c_contains_lifecycle_functions() {
    let text = transpile(GREETER);
    assert!(text.contains("void Greeter_init(Greeter* self, const char* n)"));
    assert!(text.contains("void Greeter_destroy(Greeter* self)"));
    assert!(text.contains("Greeter_destroy(&greeter);"));
}
