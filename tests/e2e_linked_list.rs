//! End-to-end tests for the unique_ptr linked-list fixture: move lowering,
//! null-guarded cleanup, and single-free behavior per node.

mod common;

use common::{transpile, transpile_and_run};

const LINKED_LIST: &str = include_str!("../cpp-examples/linked_list.cpp");

#[test]
fn linked_list_prints_contents_and_size() {
    let Some(output) = transpile_and_run(LINKED_LIST) else {
        return;
    };
    assert_eq!(
        output,
        "LinkedList [4 elements]: Zero -> First -> Second -> Third -> null\n\
         Total size: 4\n"
    );
}

#[test]
fn moves_lower_to_copy_plus_empty_sentinel() {
    let text = transpile(LINKED_LIST);
    // `newNode->next = std::move(head); head = std::move(newNode);`
    assert!(text.contains("newNode->next = self->head;"));
    assert!(text.contains("self->head = NULL;"));
    assert!(text.contains("self->head = newNode;"));
    assert!(text.contains("newNode = NULL;"));
}

#[test]
fn push_functions_do_not_free_their_moved_locals() {
    let text = transpile(LINKED_LIST);
    for name in ["LinkedList_string_pushFront", "LinkedList_string_pushBack"] {
        let body = text
            .split(&format!("void {name}("))
            .nth(1)
            .unwrap_or_else(|| panic!("missing {name} in:\n{text}"))
            .split("\n}")
            .next()
            .expect("function body");
        assert!(
            !body.contains("free(newNode)"),
            "{name} must not free a node it handed over:\n{body}"
        );
    }
}

#[test]
fn list_destruction_walks_the_chain() {
    let text = transpile(LINKED_LIST);
    assert!(text.contains("void LinkedList_string_destroy(LinkedList_string* self)"));
    assert!(text.contains("void Node_string_destroy(Node_string* self)"));
    // The node destructor releases its string and its successor.
    let node_destroy = text
        .split("void Node_string_destroy(Node_string* self) {")
        .nth(1)
        .expect("node destroy body")
        .split("\n}")
        .next()
        .expect("body");
    assert!(node_destroy.contains("free(self->data);"));
    assert!(node_destroy.contains("Node_string_destroy(self->next);"));
    assert!(node_destroy.contains("free(self->next);"));
}

#[test]
fn observer_pointers_get_no_cleanup() {
    let text = transpile(LINKED_LIST);
    let print_body = text
        .split("void LinkedList_string_print(const LinkedList_string* self) {")
        .nth(1)
        .expect("print body")
        .split("\n}")
        .next()
        .expect("body");
    assert!(
        !print_body.contains("free("),
        "borrowed traversal must not free anything:\n{print_body}"
    );
}
