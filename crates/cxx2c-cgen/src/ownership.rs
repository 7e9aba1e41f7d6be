//! Scope-exit cleanup insertion.
//!
//! Consumes the `OwnedDecl` markers left by HIR lowering and inserts the
//! destroy sequences every exit edge needs: the natural fall-through end of
//! each scope, and each early `return`/`break`/`continue`. Cleanups run in
//! reverse declaration order, and a variable declared after an exit point is
//! never destroyed on that path.
//!
//! Moved-from unique pointers are recognized by the `x = NULL;` statements
//! move lowering produces: a variable that is definitely empty at an exit is
//! skipped outright, while one that is only empty on some paths keeps its
//! null-guarded destroy (which makes the destroy a no-op at runtime).
//!
//! The pass is idempotent: it replaces every `OwnedDecl` with a plain
//! declaration, so a second run finds nothing to track and changes nothing.

use crate::c_ast::*;
use std::collections::HashMap;
use tracing::trace;

pub fn insert_cleanups(program: &CProgram) -> CProgram {
    let mut out = program.clone();
    for function in &mut out.functions {
        let mut walker = Walker {
            ret: function.ret.clone(),
            temp_counter: 0,
        };
        let body = std::mem::take(&mut function.body);
        let mut scopes = Vec::new();
        let mut states = States::default();
        function.body = walker.process_block(body, &mut scopes, &mut states, false);
    }
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PtrState {
    Owned,
    Moved,
    /// Moved on some paths; the null guard handles the rest.
    Maybe,
}

#[derive(Clone, Default)]
struct States {
    vars: HashMap<String, PtrState>,
}

impl States {
    fn merge(&mut self, a: &States, b: &States) {
        for (name, slot) in self.vars.iter_mut() {
            let sa = a.vars.get(name).copied().unwrap_or(*slot);
            let sb = b.vars.get(name).copied().unwrap_or(*slot);
            *slot = match (sa, sb) {
                (PtrState::Owned, PtrState::Owned) => PtrState::Owned,
                (PtrState::Moved, PtrState::Moved) => PtrState::Moved,
                _ => PtrState::Maybe,
            };
        }
    }
}

struct Scope {
    cleanups: Vec<(String, Cleanup)>,
    is_loop_body: bool,
}

struct Walker {
    ret: CType,
    temp_counter: usize,
}

impl Walker {
    fn process_block(
        &mut self,
        stmts: Vec<CStmt>,
        scopes: &mut Vec<Scope>,
        states: &mut States,
        is_loop_body: bool,
    ) -> Vec<CStmt> {
        scopes.push(Scope {
            cleanups: Vec::new(),
            is_loop_body,
        });
        let mut out = Vec::new();
        let mut terminated = false;
        for stmt in stmts {
            if terminated {
                // Unreachable code after a jump still sheds its ownership
                // markers; nothing there ever runs, so no cleanup is owed.
                out.push(strip_owned(stmt));
                continue;
            }
            terminated = matches!(stmt, CStmt::Return(_) | CStmt::Break | CStmt::Continue);
            self.process_stmt(stmt, &mut out, scopes, states);
        }
        if !terminated {
            let scope = scopes.last().expect("scope pushed above");
            out.extend(cleanup_stmts(&scope.cleanups, states, None));
        }
        let scope = scopes.pop().expect("scope pushed above");
        for (name, _) in &scope.cleanups {
            states.vars.remove(name);
        }
        out
    }

    fn process_stmt(
        &mut self,
        stmt: CStmt,
        out: &mut Vec<CStmt>,
        scopes: &mut Vec<Scope>,
        states: &mut States,
    ) {
        match stmt {
            CStmt::OwnedDecl {
                name,
                ty,
                init,
                cleanup,
            } => {
                if matches!(cleanup, Cleanup::FreeOwnedPtr { .. }) {
                    let state = match &init {
                        Some(CExpr::Null) | None => PtrState::Maybe,
                        _ => PtrState::Owned,
                    };
                    states.vars.insert(name.clone(), state);
                }
                trace!("tracking owned local {name}");
                scopes
                    .last_mut()
                    .expect("inside a scope")
                    .cleanups
                    .push((name.clone(), cleanup));
                out.push(CStmt::Decl {
                    name,
                    ty,
                    init,
                    storage: Storage::Auto,
                });
            }
            CStmt::Expr(expr) => {
                note_assignment(&expr, states);
                out.push(CStmt::Expr(expr));
            }
            CStmt::Return(value) => {
                let all: Vec<&Scope> = scopes.iter().collect();
                match value {
                    None => {
                        out.extend(exit_cleanups(&all, states, None));
                        out.push(CStmt::Return(None));
                    }
                    Some(expr) if is_trivial(&expr) => {
                        // Returning an owned local hands it to the caller;
                        // its own cleanup must not run on this path.
                        let exclude = match &expr {
                            CExpr::Var(name) => Some(name.clone()),
                            _ => None,
                        };
                        out.extend(exit_cleanups(&all, states, exclude.as_deref()));
                        out.push(CStmt::Return(Some(expr)));
                    }
                    Some(expr) => {
                        if all.iter().all(|s| s.cleanups.is_empty()) {
                            out.push(CStmt::Return(Some(expr)));
                        } else {
                            // Evaluate before tearing anything down.
                            let temp = self.fresh_temp();
                            out.push(CStmt::Decl {
                                name: temp.clone(),
                                ty: self.ret.clone(),
                                init: Some(expr),
                                storage: Storage::Auto,
                            });
                            out.extend(exit_cleanups(&all, states, None));
                            out.push(CStmt::Return(Some(CExpr::Var(temp))));
                        }
                    }
                }
            }
            CStmt::Break => {
                out.extend(loop_exit_cleanups(scopes, states));
                out.push(CStmt::Break);
            }
            CStmt::Continue => {
                out.extend(loop_exit_cleanups(scopes, states));
                out.push(CStmt::Continue);
            }
            CStmt::If {
                cond,
                then_block,
                else_block,
            } => {
                let mut then_states = states.clone();
                let then_block = self.process_block(then_block, scopes, &mut then_states, false);
                let mut else_states = states.clone();
                let else_block = self.process_block(else_block, scopes, &mut else_states, false);
                states.merge(&then_states, &else_states);
                out.push(CStmt::If {
                    cond,
                    then_block,
                    else_block,
                });
            }
            CStmt::While { cond, body } => {
                let mut body_states = states.clone();
                let body = self.process_block(body, scopes, &mut body_states, true);
                let snapshot = states.clone();
                states.merge(&snapshot, &body_states);
                out.push(CStmt::While { cond, body });
            }
            CStmt::For {
                init,
                cond,
                step,
                body,
            } => {
                // Loop-header declarations are scalars in the accepted
                // subset; they carry no cleanup.
                if let Some(init) = &init {
                    note_assignment_stmt(init, states);
                }
                let mut body_states = states.clone();
                let body = self.process_block(body, scopes, &mut body_states, true);
                let snapshot = states.clone();
                states.merge(&snapshot, &body_states);
                out.push(CStmt::For {
                    init,
                    cond,
                    step,
                    body,
                });
            }
            CStmt::Block(stmts) => {
                let block = self.process_block(stmts, scopes, states, false);
                out.push(CStmt::Block(block));
            }
            other @ CStmt::Decl { .. } => out.push(other),
        }
    }

    fn fresh_temp(&mut self) -> String {
        let name = if self.temp_counter == 0 {
            "_ret".to_string()
        } else {
            format!("_ret{}", self.temp_counter)
        };
        self.temp_counter += 1;
        name
    }
}

/// Track the `x = NULL;` convention move lowering uses, plus re-arming
/// assignments.
fn note_assignment(expr: &CExpr, states: &mut States) {
    if let CExpr::Assign {
        op: "=",
        target,
        value,
    } = expr
    {
        if let CExpr::Var(name) = &**target {
            if states.vars.contains_key(name) {
                let state = if matches!(**value, CExpr::Null) {
                    PtrState::Moved
                } else {
                    PtrState::Owned
                };
                states.vars.insert(name.clone(), state);
            }
        }
    }
}

fn note_assignment_stmt(stmt: &CStmt, states: &mut States) {
    if let CStmt::Expr(expr) = stmt {
        note_assignment(expr, states);
    }
}

/// Demote ownership markers in unreachable code to plain declarations.
fn strip_owned(stmt: CStmt) -> CStmt {
    match stmt {
        CStmt::OwnedDecl { name, ty, init, .. } => CStmt::Decl {
            name,
            ty,
            init,
            storage: Storage::Auto,
        },
        CStmt::If {
            cond,
            then_block,
            else_block,
        } => CStmt::If {
            cond,
            then_block: then_block.into_iter().map(strip_owned).collect(),
            else_block: else_block.into_iter().map(strip_owned).collect(),
        },
        CStmt::While { cond, body } => CStmt::While {
            cond,
            body: body.into_iter().map(strip_owned).collect(),
        },
        CStmt::For {
            init,
            cond,
            step,
            body,
        } => CStmt::For {
            init: init.map(|s| Box::new(strip_owned(*s))),
            cond,
            step,
            body: body.into_iter().map(strip_owned).collect(),
        },
        CStmt::Block(stmts) => CStmt::Block(stmts.into_iter().map(strip_owned).collect()),
        other => other,
    }
}

fn is_trivial(expr: &CExpr) -> bool {
    matches!(
        expr,
        CExpr::Int(_) | CExpr::Bool(_) | CExpr::Str(_) | CExpr::Null | CExpr::Var(_)
    )
}

/// Cleanups for one scope, innermost declaration last destroyed first.
fn cleanup_stmts(
    cleanups: &[(String, Cleanup)],
    states: &States,
    exclude: Option<&str>,
) -> Vec<CStmt> {
    let mut out = Vec::new();
    for (name, cleanup) in cleanups.iter().rev() {
        if exclude == Some(name.as_str()) {
            continue;
        }
        match cleanup {
            Cleanup::DestroyValue { destroy } => {
                out.push(CStmt::Expr(CExpr::call(
                    destroy.clone(),
                    vec![CExpr::addr_of(CExpr::var(name.clone()))],
                )));
            }
            Cleanup::FreeStr => {
                out.push(CStmt::Expr(CExpr::call("free", vec![CExpr::var(name.clone())])));
            }
            Cleanup::FreeOwnedPtr { destroy } => {
                // Definitely moved-from: ownership left, nothing to do.
                if states.vars.get(name) == Some(&PtrState::Moved) {
                    continue;
                }
                let mut body = Vec::new();
                if let Some(destroy) = destroy {
                    body.push(CStmt::Expr(CExpr::call(
                        destroy.clone(),
                        vec![CExpr::var(name.clone())],
                    )));
                }
                body.push(CStmt::Expr(CExpr::call("free", vec![CExpr::var(name.clone())])));
                out.push(CStmt::If {
                    cond: CExpr::var(name.clone()),
                    then_block: body,
                    else_block: Vec::new(),
                });
            }
        }
    }
    out
}

/// Cleanups for a `return`: every open scope unwinds, innermost first.
fn exit_cleanups(scopes: &[&Scope], states: &States, exclude: Option<&str>) -> Vec<CStmt> {
    let mut out = Vec::new();
    for scope in scopes.iter().rev() {
        out.extend(cleanup_stmts(&scope.cleanups, states, exclude));
    }
    out
}

/// Cleanups for `break`/`continue`: scopes up to and including the loop body.
fn loop_exit_cleanups(scopes: &[Scope], states: &States) -> Vec<CStmt> {
    let mut out = Vec::new();
    for scope in scopes.iter().rev() {
        out.extend(cleanup_stmts(&scope.cleanups, states, None));
        if scope.is_loop_body {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned_value(name: &str) -> CStmt {
        CStmt::OwnedDecl {
            name: name.to_string(),
            ty: CType::Struct("Greeter".to_string()),
            init: None,
            cleanup: Cleanup::DestroyValue {
                destroy: "Greeter_destroy".to_string(),
            },
        }
    }

    fn program_with_body(body: Vec<CStmt>) -> CProgram {
        CProgram {
            structs: vec![],
            functions: vec![CFunction {
                name: "main".to_string(),
                ret: CType::Int,
                params: vec![],
                body,
            }],
            uses_strings: false,
        }
    }

    #[test]
    fn inserts_reverse_order_cleanups_at_fall_through() {
        let program = program_with_body(vec![owned_value("a"), owned_value("b")]);
        let lowered = insert_cleanups(&program);
        let body = &lowered.functions[0].body;
        assert_eq!(body.len(), 4);
        let CStmt::Expr(CExpr::Call { args, .. }) = &body[2] else {
            panic!("expected destroy call, got {:?}", body[2]);
        };
        assert_eq!(args[0], CExpr::addr_of(CExpr::var("b")));
        let CStmt::Expr(CExpr::Call { args, .. }) = &body[3] else {
            panic!("expected destroy call, got {:?}", body[3]);
        };
        assert_eq!(args[0], CExpr::addr_of(CExpr::var("a")));
    }

    #[test]
    fn return_paths_get_their_own_cleanups() {
        let program = program_with_body(vec![
            owned_value("a"),
            CStmt::Return(Some(CExpr::Int(0))),
        ]);
        let lowered = insert_cleanups(&program);
        let body = &lowered.functions[0].body;
        assert!(matches!(&body[1], CStmt::Expr(CExpr::Call { func, .. }) if func == "Greeter_destroy"));
        assert!(matches!(&body[2], CStmt::Return(Some(CExpr::Int(0)))));
    }

    #[test]
    fn variable_declared_after_return_is_not_cleaned_on_that_path() {
        let program = program_with_body(vec![
            owned_value("a"),
            CStmt::If {
                cond: CExpr::Bool(true),
                then_block: vec![CStmt::Return(Some(CExpr::Int(1)))],
                else_block: vec![],
            },
            owned_value("b"),
            CStmt::Return(Some(CExpr::Int(0))),
        ]);
        let lowered = insert_cleanups(&program);
        let body = &lowered.functions[0].body;
        let CStmt::If { then_block, .. } = &body[1] else {
            panic!("expected if, got {:?}", body[1]);
        };
        // Only `a` is destroyed on the early return.
        assert_eq!(then_block.len(), 2);
        assert!(
            matches!(&then_block[0], CStmt::Expr(CExpr::Call { args, .. }) if args[0] == CExpr::addr_of(CExpr::var("a")))
        );
    }

    #[test]
    fn moved_out_pointer_is_not_destroyed() {
        let program = program_with_body(vec![
            CStmt::OwnedDecl {
                name: "node".to_string(),
                ty: CType::ptr(CType::Struct("Node".to_string())),
                init: Some(CExpr::call("malloc", vec![CExpr::Int(8)])),
                cleanup: Cleanup::FreeOwnedPtr {
                    destroy: Some("Node_destroy".to_string()),
                },
            },
            CStmt::Expr(CExpr::assign(
                CExpr::self_field("head"),
                CExpr::var("node"),
            )),
            CStmt::Expr(CExpr::assign(CExpr::var("node"), CExpr::Null)),
        ]);
        let lowered = insert_cleanups(&program);
        let body = &lowered.functions[0].body;
        assert_eq!(body.len(), 3, "no cleanup for a definitely-moved pointer");
    }

    #[test]
    fn conditionally_moved_pointer_keeps_null_guarded_destroy() {
        let program = program_with_body(vec![
            CStmt::OwnedDecl {
                name: "node".to_string(),
                ty: CType::ptr(CType::Struct("Node".to_string())),
                init: Some(CExpr::call("malloc", vec![CExpr::Int(8)])),
                cleanup: Cleanup::FreeOwnedPtr { destroy: None },
            },
            CStmt::If {
                cond: CExpr::Bool(true),
                then_block: vec![CStmt::Expr(CExpr::assign(CExpr::var("node"), CExpr::Null))],
                else_block: vec![],
            },
        ]);
        let lowered = insert_cleanups(&program);
        let body = &lowered.functions[0].body;
        let CStmt::If { cond, .. } = &body[2] else {
            panic!("expected guarded free, got {:?}", body[2]);
        };
        assert_eq!(*cond, CExpr::var("node"));
    }

    #[test]
    fn break_unwinds_only_loop_scopes() {
        let program = program_with_body(vec![
            owned_value("outer"),
            CStmt::While {
                cond: CExpr::Bool(true),
                body: vec![owned_value("inner"), CStmt::Break],
            },
        ]);
        let lowered = insert_cleanups(&program);
        let body = &lowered.functions[0].body;
        let CStmt::While { body: loop_body, .. } = &body[1] else {
            panic!("expected while, got {:?}", body[1]);
        };
        // inner destroy, then break; outer is untouched inside the loop.
        assert_eq!(loop_body.len(), 3);
        assert!(
            matches!(&loop_body[1], CStmt::Expr(CExpr::Call { args, .. }) if args[0] == CExpr::addr_of(CExpr::var("inner")))
        );
        assert!(matches!(&loop_body[2], CStmt::Break));
    }

    #[test]
    fn running_the_pass_twice_is_a_no_op() {
        let program = program_with_body(vec![
            owned_value("a"),
            CStmt::If {
                cond: CExpr::Bool(true),
                then_block: vec![CStmt::Return(Some(CExpr::Int(1)))],
                else_block: vec![],
            },
        ]);
        let once = insert_cleanups(&program);
        let twice = insert_cleanups(&once);
        assert_eq!(once, twice);
    }
}
