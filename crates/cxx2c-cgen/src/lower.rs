//! HIR → C lowering.
//!
//! Classes flatten into plain structs plus free `_init`/`_destroy`/method
//! functions with an explicit receiver. Ownership transfers become a pointer
//! copy followed by nulling the source. RAII locals are emitted as
//! [`CStmt::OwnedDecl`] markers; the ownership pass turns those into
//! scope-exit destroy sequences.
//!
//! Use of a variable whose ownership has definitely been transferred is
//! reported here, from static ownership-state tracking; it never becomes a
//! runtime check.

use crate::c_ast::*;
use cxx2c_core::{CompilationPhase, Diagnostic, DiagnosticKind, Span};
use cxx2c_hir::ConstValue;
use cxx2c_hir::hir::*;
use cxx2c_hir::types::Ty;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Lower a whole HIR program. Diagnostics may include user-facing
/// use-after-move errors and internal unsupported-construct errors.
pub fn lower_program(program: &HirProgram) -> (CProgram, Vec<Diagnostic>) {
    let mut meta = BTreeMap::new();
    for s in &program.structs {
        let needs_destroy = compute_needs_destroy(program, &s.name);
        meta.insert(
            s.name.clone(),
            StructMeta {
                needs_destroy,
                default_ctor: s
                    .ctors
                    .iter()
                    .find(|c| c.params.is_empty())
                    .map(|c| c.name.clone()),
            },
        );
    }

    let mut cg = Cgen {
        meta,
        diagnostics: Vec::new(),
        uses_strings: false,
    };

    let mut out = CProgram::default();
    for s in &program.structs {
        cg.lower_struct(s, &mut out);
    }
    for f in &program.functions {
        let function = cg.lower_fn_like(&f.name, &f.ret, None, &f.params, &f.body);
        out.functions.push(function);
    }
    out.uses_strings = cg.uses_strings;
    debug!(
        structs = out.structs.len(),
        functions = out.functions.len(),
        "lowered to C"
    );
    (out, cg.diagnostics)
}

struct StructMeta {
    needs_destroy: bool,
    default_ctor: Option<String>,
}

fn compute_needs_destroy(program: &HirProgram, name: &str) -> bool {
    let Some(s) = program.get_struct(name) else {
        return false;
    };
    if s.dtor.is_some() {
        return true;
    }
    s.fields
        .iter()
        .any(|f| match &f.ty {
            // Value-struct fields cannot form cycles, so this terminates.
            Ty::Class(inner) => compute_needs_destroy(program, inner),
            other => matches!(other, Ty::Str | Ty::UniquePtr(_)),
        })
}

fn destroy_symbol(struct_name: &str) -> String {
    format!("{struct_name}_destroy")
}

/// Definite ownership state of a unique-pointer local during lowering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Own {
    Owned,
    Moved,
    /// Moved on some paths only; destroys stay null-guarded.
    Maybe,
}

#[derive(Clone, Default)]
struct OwnStates {
    scopes: Vec<HashMap<String, Own>>,
}

impl OwnStates {
    fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), Own::Owned);
        }
    }

    fn get(&self, name: &str) -> Option<Own> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .copied()
    }

    fn set(&mut self, name: &str, state: Own) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(name) {
                *slot = state;
                return;
            }
        }
    }

    /// Merge two branch outcomes back into this state.
    fn merge(&mut self, a: &OwnStates, b: &OwnStates) {
        for (depth, scope) in self.scopes.iter_mut().enumerate() {
            for (name, slot) in scope.iter_mut() {
                let sa = a.scopes.get(depth).and_then(|s| s.get(name)).copied();
                let sb = b.scopes.get(depth).and_then(|s| s.get(name)).copied();
                *slot = match (sa.unwrap_or(*slot), sb.unwrap_or(*slot)) {
                    (Own::Owned, Own::Owned) => Own::Owned,
                    (Own::Moved, Own::Moved) => Own::Moved,
                    _ => Own::Maybe,
                };
            }
        }
    }
}

struct Cgen {
    meta: BTreeMap<String, StructMeta>,
    diagnostics: Vec<Diagnostic>,
    uses_strings: bool,
}

impl Cgen {
    fn internal(&mut self, span: Span, message: String) {
        self.diagnostics.push(Diagnostic::error(
            DiagnosticKind::UnsupportedConstruct,
            CompilationPhase::OwnershipLowering,
            span,
            message,
        ));
    }

    fn use_after_move(&mut self, span: Span, name: &str) {
        self.diagnostics.push(Diagnostic::error(
            DiagnosticKind::UseAfterMove,
            CompilationPhase::OwnershipLowering,
            span,
            format!("`{name}` is used after its contents were moved"),
        ));
    }

    fn ctype(&mut self, ty: &Ty) -> CType {
        match ty {
            Ty::Void => CType::Void,
            Ty::Bool => CType::Bool,
            Ty::Int => CType::Int,
            Ty::SizeT => CType::SizeT,
            Ty::Str => {
                self.uses_strings = true;
                CType::CharPtr
            }
            Ty::Array { elem, len } => CType::Array(Box::new(self.ctype(elem)), *len),
            Ty::UniquePtr(inner) | Ty::Ptr(inner) => CType::ptr(self.ctype(inner)),
            Ty::Class(name) => CType::Struct(name.clone()),
            Ty::Error => {
                self.internal(Span::new(0, 0), "error type survived to lowering".to_string());
                CType::Int
            }
        }
    }

    fn param_ctype(&mut self, param: &HirParam) -> CType {
        match (&param.ty, param.mode) {
            // Strings are always passed as borrowed data.
            (Ty::Str, _) => {
                self.uses_strings = true;
                CType::ConstCharPtr
            }
            (Ty::Class(name), ParamMode::ConstRef) => {
                CType::const_ptr(CType::Struct(name.clone()))
            }
            (ty, _) => self.ctype(ty),
        }
    }

    // ---------------------------------------------------------------------
    // Structs
    // ---------------------------------------------------------------------

    fn lower_struct(&mut self, s: &HirStruct, out: &mut CProgram) {
        let fields = s
            .fields
            .iter()
            .map(|f| (f.name.clone(), self.ctype(&f.ty)))
            .collect();
        out.structs.push(CStruct {
            name: s.name.clone(),
            fields,
        });

        for ctor in &s.ctors {
            let mut body = Vec::new();
            for init in &ctor.inits {
                let field = s
                    .fields
                    .iter()
                    .find(|f| f.name == init.field)
                    .expect("ctor inits cover declared fields");
                let mut states = OwnStates::default();
                states.push();
                self.lower_field_init(field, &init.init, &mut body, &mut states);
            }
            let mut ctor_states = OwnStates::default();
            ctor_states.push();
            let mut fn_body = self.lower_body(&ctor.body, &mut ctor_states);
            body.append(&mut fn_body);
            let mut params = vec![("self".to_string(), CType::ptr(CType::Struct(s.name.clone())))];
            for param in &ctor.params {
                params.push((param.name.clone(), self.param_ctype(param)));
            }
            out.functions.push(CFunction {
                name: ctor.name.clone(),
                ret: CType::Void,
                params,
                body,
            });
        }

        if self
            .meta
            .get(&s.name)
            .map(|m| m.needs_destroy)
            .unwrap_or(false)
        {
            let mut body = match &s.dtor {
                Some(stmts) => {
                    let mut dtor_states = OwnStates::default();
                    dtor_states.push();
                    self.lower_body(stmts, &mut dtor_states)
                }
                None => Vec::new(),
            };
            // Members are destroyed in reverse declaration order, after the
            // user destructor body runs.
            for field in s.fields.iter().rev() {
                self.lower_field_cleanup(field, &mut body);
            }
            out.functions.push(CFunction {
                name: destroy_symbol(&s.name),
                ret: CType::Void,
                params: vec![("self".to_string(), CType::ptr(CType::Struct(s.name.clone())))],
                body,
            });
        }

        for method in &s.methods {
            let self_ty = if method.is_const {
                CType::const_ptr(CType::Struct(s.name.clone()))
            } else {
                CType::ptr(CType::Struct(s.name.clone()))
            };
            let function = self.lower_fn_like(
                &method.name,
                &method.ret,
                Some(("self".to_string(), self_ty)),
                &method.params,
                &method.body,
            );
            out.functions.push(function);
        }
    }

    fn lower_field_init(
        &mut self,
        field: &HirField,
        init: &HirInit,
        body: &mut Vec<CStmt>,
        states: &mut OwnStates,
    ) {
        let target = CExpr::self_field(&field.name);
        match init {
            HirInit::Default => self.default_init(&field.ty, target, body, Span::new(0, 0)),
            HirInit::Expr(value) => match (&field.ty, &value.kind) {
                (Ty::Str, _) => {
                    self.uses_strings = true;
                    let value = self.lower_expr(value, states);
                    body.push(CStmt::Expr(CExpr::assign(
                        target,
                        CExpr::call("cxx_strdup", vec![value]),
                    )));
                }
                (_, HirExprKind::Move(inner)) => {
                    let span = value.span;
                    let stmts = self.lower_move_into(target, inner, span, states);
                    body.extend(stmts);
                }
                (_, HirExprKind::Null) => {
                    body.push(CStmt::Expr(CExpr::assign(target, CExpr::Null)));
                }
                _ => {
                    let value = self.lower_expr(value, states);
                    body.push(CStmt::Expr(CExpr::assign(target, value)));
                }
            },
            HirInit::Construct { ctor, args } => {
                let mut call_args = vec![CExpr::addr_of(target)];
                for arg in args {
                    call_args.push(self.lower_expr(arg, states));
                }
                body.push(CStmt::Expr(CExpr::call(ctor.clone(), call_args)));
            }
            HirInit::Const(value) => match const_scalar(value) {
                Some(expr) => body.push(CStmt::Expr(CExpr::assign(target, expr))),
                None => self.internal(
                    Span::new(0, 0),
                    "aggregate constant in member initializer".to_string(),
                ),
            },
        }
    }

    fn default_init(&mut self, ty: &Ty, target: CExpr, body: &mut Vec<CStmt>, span: Span) {
        match ty {
            Ty::UniquePtr(_) | Ty::Ptr(_) => {
                body.push(CStmt::Expr(CExpr::assign(target, CExpr::Null)));
            }
            Ty::Str => {
                self.uses_strings = true;
                body.push(CStmt::Expr(CExpr::assign(
                    target,
                    CExpr::call("cxx_strdup", vec![CExpr::Str(String::new())]),
                )));
            }
            Ty::Int | Ty::SizeT => {
                body.push(CStmt::Expr(CExpr::assign(target, CExpr::Int(0))));
            }
            Ty::Bool => {
                body.push(CStmt::Expr(CExpr::assign(target, CExpr::Bool(false))));
            }
            Ty::Array { elem, len } => {
                let elem_ty = self.ctype(elem);
                body.push(CStmt::Expr(CExpr::call(
                    "memset",
                    vec![
                        target,
                        CExpr::Int(0),
                        CExpr::Binary {
                            op: "*",
                            lhs: Box::new(CExpr::Sizeof(elem_ty)),
                            rhs: Box::new(CExpr::Int(*len as i64)),
                        },
                    ],
                )));
            }
            Ty::Class(name) => {
                match self.meta.get(name).and_then(|m| m.default_ctor.clone()) {
                    Some(ctor) => {
                        body.push(CStmt::Expr(CExpr::call(
                            ctor,
                            vec![CExpr::addr_of(target)],
                        )));
                    }
                    None => self.internal(
                        span,
                        format!("`{name}` member requires a default constructor"),
                    ),
                }
            }
            Ty::Void | Ty::Error => {
                self.internal(span, format!("cannot default-initialize `{ty}`"));
            }
        }
    }

    fn lower_field_cleanup(&mut self, field: &HirField, body: &mut Vec<CStmt>) {
        let target = CExpr::self_field(&field.name);
        match &field.ty {
            Ty::Str => {
                self.uses_strings = true;
                body.push(CStmt::Expr(CExpr::call("free", vec![target])));
            }
            Ty::UniquePtr(inner) => {
                let mut cleanup = Vec::new();
                if let Ty::Class(name) = &**inner {
                    if self.meta.get(name).map(|m| m.needs_destroy).unwrap_or(false) {
                        cleanup.push(CStmt::Expr(CExpr::call(
                            destroy_symbol(name),
                            vec![target.clone()],
                        )));
                    }
                }
                cleanup.push(CStmt::Expr(CExpr::call("free", vec![target.clone()])));
                body.push(CStmt::If {
                    cond: target,
                    then_block: cleanup,
                    else_block: Vec::new(),
                });
            }
            Ty::Class(name) => {
                if self.meta.get(name).map(|m| m.needs_destroy).unwrap_or(false) {
                    body.push(CStmt::Expr(CExpr::call(
                        destroy_symbol(name),
                        vec![CExpr::addr_of(target)],
                    )));
                }
            }
            Ty::Array { elem, .. } => {
                if matches!(&**elem, Ty::Str | Ty::UniquePtr(_) | Ty::Class(_)) {
                    self.internal(
                        Span::new(0, 0),
                        "arrays of owning elements are not supported".to_string(),
                    );
                }
            }
            _ => {}
        }
    }

    // ---------------------------------------------------------------------
    // Function bodies
    // ---------------------------------------------------------------------

    fn lower_fn_like(
        &mut self,
        name: &str,
        ret: &Ty,
        self_param: Option<(String, CType)>,
        params: &[HirParam],
        body: &[HirStmt],
    ) -> CFunction {
        let mut c_params = Vec::new();
        if let Some(p) = self_param {
            c_params.push(p);
        }
        for param in params {
            c_params.push((param.name.clone(), self.param_ctype(param)));
        }
        let mut states = OwnStates::default();
        states.push();
        // Unique-pointer parameters would be pass-by-move; the subset has
        // none, so only locals are tracked.
        let body = self.lower_body(body, &mut states);
        CFunction {
            name: name.to_string(),
            ret: self.ctype(ret),
            params: c_params,
            body,
        }
    }

    fn lower_body(&mut self, stmts: &[HirStmt], states: &mut OwnStates) -> Vec<CStmt> {
        let mut out = Vec::new();
        for stmt in stmts {
            self.lower_stmt(stmt, &mut out, states);
        }
        out
    }

    fn lower_scoped_body(&mut self, stmts: &[HirStmt], states: &mut OwnStates) -> Vec<CStmt> {
        states.push();
        let out = self.lower_body(stmts, states);
        states.pop();
        out
    }

    fn lower_stmt(&mut self, stmt: &HirStmt, out: &mut Vec<CStmt>, states: &mut OwnStates) {
        match stmt {
            HirStmt::Local { name, ty, init } => self.lower_local(name, ty, init, out, states),
            HirStmt::Expr(expr) => self.lower_expr_stmt(expr, out, states),
            HirStmt::Print(parts) => out.push(self.lower_print(parts, states)),
            HirStmt::If {
                cond,
                then_block,
                else_block,
            } => {
                let cond = self.lower_expr(cond, states);
                let mut then_states = states.clone();
                let then_block = self.lower_scoped_body(then_block, &mut then_states);
                let mut else_states = states.clone();
                let else_block = self.lower_scoped_body(else_block, &mut else_states);
                states.merge(&then_states, &else_states);
                out.push(CStmt::If {
                    cond,
                    then_block,
                    else_block,
                });
            }
            HirStmt::While { cond, body } => {
                let cond = self.lower_expr(cond, states);
                let mut body_states = states.clone();
                let body = self.lower_scoped_body(body, &mut body_states);
                let snapshot = states.clone();
                states.merge(&snapshot, &body_states);
                out.push(CStmt::While { cond, body });
            }
            HirStmt::For {
                init,
                cond,
                step,
                body,
            } => {
                states.push();
                let init = init.as_ref().map(|stmt| {
                    let mut init_out = Vec::new();
                    self.lower_stmt(stmt, &mut init_out, states);
                    if init_out.len() != 1 {
                        self.internal(
                            Span::new(0, 0),
                            "loop initializer lowered to multiple statements".to_string(),
                        );
                    }
                    Box::new(init_out.into_iter().next().unwrap_or(CStmt::Block(vec![])))
                });
                let cond = cond.as_ref().map(|c| self.lower_expr(c, states));
                let step = step.as_ref().map(|s| self.lower_expr(s, states));
                let mut body_states = states.clone();
                let body = self.lower_scoped_body(body, &mut body_states);
                let snapshot = states.clone();
                states.merge(&snapshot, &body_states);
                states.pop();
                out.push(CStmt::For {
                    init,
                    cond,
                    step,
                    body,
                });
            }
            HirStmt::Return(value) => {
                let value = value.as_ref().map(|v| self.lower_expr(v, states));
                out.push(CStmt::Return(value));
            }
            HirStmt::Break => out.push(CStmt::Break),
            HirStmt::Continue => out.push(CStmt::Continue),
            HirStmt::Block(stmts) => {
                let block = self.lower_scoped_body(stmts, states);
                out.push(CStmt::Block(block));
            }
        }
    }

    fn lower_local(
        &mut self,
        name: &str,
        ty: &Ty,
        init: &HirInit,
        out: &mut Vec<CStmt>,
        states: &mut OwnStates,
    ) {
        match (ty, init) {
            (Ty::UniquePtr(inner), init) => {
                let pointee = self.ctype(inner);
                let cleanup = Cleanup::FreeOwnedPtr {
                    destroy: match &**inner {
                        Ty::Class(class)
                            if self
                                .meta
                                .get(class)
                                .map(|m| m.needs_destroy)
                                .unwrap_or(false) =>
                        {
                            Some(destroy_symbol(class))
                        }
                        _ => None,
                    },
                };
                match init {
                    HirInit::Expr(value) => match &value.kind {
                        HirExprKind::MakeUnique {
                            struct_name,
                            ctor,
                            args,
                        } => {
                            let malloc = CExpr::Cast {
                                ty: CType::ptr(CType::Struct(struct_name.clone())),
                                expr: Box::new(CExpr::call(
                                    "malloc",
                                    vec![CExpr::Sizeof(CType::Struct(struct_name.clone()))],
                                )),
                            };
                            out.push(CStmt::OwnedDecl {
                                name: name.to_string(),
                                ty: CType::ptr(pointee),
                                init: Some(malloc),
                                cleanup,
                            });
                            let mut call_args = vec![CExpr::var(name)];
                            for arg in args {
                                call_args.push(self.lower_expr(arg, states));
                            }
                            out.push(CStmt::Expr(CExpr::call(ctor.clone(), call_args)));
                        }
                        HirExprKind::Move(inner_expr) => {
                            let source = self.lower_expr(inner_expr, states);
                            out.push(CStmt::OwnedDecl {
                                name: name.to_string(),
                                ty: CType::ptr(pointee),
                                init: Some(source.clone()),
                                cleanup,
                            });
                            out.push(CStmt::Expr(CExpr::assign(source, CExpr::Null)));
                            self.mark_moved(inner_expr, states);
                        }
                        HirExprKind::Null => {
                            out.push(CStmt::OwnedDecl {
                                name: name.to_string(),
                                ty: CType::ptr(pointee),
                                init: Some(CExpr::Null),
                                cleanup,
                            });
                        }
                        _ => {
                            self.internal(
                                value.span,
                                "unsupported unique_ptr initializer".to_string(),
                            );
                        }
                    },
                    HirInit::Default => {
                        out.push(CStmt::OwnedDecl {
                            name: name.to_string(),
                            ty: CType::ptr(pointee),
                            init: Some(CExpr::Null),
                            cleanup,
                        });
                    }
                    _ => {
                        self.internal(
                            Span::new(0, 0),
                            "unsupported unique_ptr initializer".to_string(),
                        );
                    }
                }
                states.declare(name);
            }
            (Ty::Str, init) => {
                self.uses_strings = true;
                let value = match init {
                    HirInit::Expr(value) => {
                        let lowered = self.lower_expr(value, states);
                        CExpr::call("cxx_strdup", vec![lowered])
                    }
                    HirInit::Default => {
                        CExpr::call("cxx_strdup", vec![CExpr::Str(String::new())])
                    }
                    HirInit::Const(ConstValue::Str(text)) => {
                        CExpr::call("cxx_strdup", vec![CExpr::Str(text.clone())])
                    }
                    _ => {
                        self.internal(Span::new(0, 0), "unsupported string initializer".to_string());
                        CExpr::Null
                    }
                };
                out.push(CStmt::OwnedDecl {
                    name: name.to_string(),
                    ty: CType::CharPtr,
                    init: Some(value),
                    cleanup: Cleanup::FreeStr,
                });
            }
            (Ty::Class(struct_name), HirInit::Construct { ctor, args }) => {
                let needs_destroy = self
                    .meta
                    .get(struct_name)
                    .map(|m| m.needs_destroy)
                    .unwrap_or(false);
                if needs_destroy {
                    out.push(CStmt::OwnedDecl {
                        name: name.to_string(),
                        ty: CType::Struct(struct_name.clone()),
                        init: None,
                        cleanup: Cleanup::DestroyValue {
                            destroy: destroy_symbol(struct_name),
                        },
                    });
                } else {
                    out.push(CStmt::Decl {
                        name: name.to_string(),
                        ty: CType::Struct(struct_name.clone()),
                        init: None,
                        storage: Storage::Auto,
                    });
                }
                let mut call_args = vec![CExpr::addr_of(CExpr::var(name))];
                for arg in args {
                    call_args.push(self.lower_expr(arg, states));
                }
                out.push(CStmt::Expr(CExpr::call(ctor.clone(), call_args)));
            }
            (_, HirInit::Const(value)) => {
                self.lower_const_local(name, ty, value, out);
            }
            (Ty::Array { elem, len }, HirInit::Default) => {
                let elem_ty = self.ctype(elem);
                out.push(CStmt::Decl {
                    name: name.to_string(),
                    ty: CType::Array(Box::new(elem_ty.clone()), *len),
                    init: None,
                    storage: Storage::Auto,
                });
                out.push(CStmt::Expr(CExpr::call(
                    "memset",
                    vec![
                        CExpr::var(name),
                        CExpr::Int(0),
                        CExpr::Binary {
                            op: "*",
                            lhs: Box::new(CExpr::Sizeof(elem_ty)),
                            rhs: Box::new(CExpr::Int(*len as i64)),
                        },
                    ],
                )));
            }
            (Ty::Class(struct_name), HirInit::Expr(value)) => {
                if self
                    .meta
                    .get(struct_name)
                    .map(|m| m.needs_destroy)
                    .unwrap_or(false)
                {
                    self.internal(
                        value.span,
                        format!("copying a value of class `{struct_name}` is not supported"),
                    );
                    return;
                }
                let lowered = self.lower_expr(value, states);
                out.push(CStmt::Decl {
                    name: name.to_string(),
                    ty: CType::Struct(struct_name.clone()),
                    init: Some(lowered),
                    storage: Storage::Auto,
                });
            }
            (_, HirInit::Expr(value)) => {
                let lowered = self.lower_expr(value, states);
                let ty = self.ctype(ty);
                out.push(CStmt::Decl {
                    name: name.to_string(),
                    ty,
                    init: Some(lowered),
                    storage: Storage::Auto,
                });
            }
            (_, HirInit::Default) => {
                let ty = self.ctype(ty);
                out.push(CStmt::Decl {
                    name: name.to_string(),
                    ty,
                    init: None,
                    storage: Storage::Auto,
                });
            }
            (_, HirInit::Construct { .. }) => {
                self.internal(
                    Span::new(0, 0),
                    format!("constructor call on non-class type `{ty}`"),
                );
            }
        }
    }

    fn lower_const_local(&mut self, name: &str, ty: &Ty, value: &ConstValue, out: &mut Vec<CStmt>) {
        match value {
            ConstValue::Aggregate(values) => {
                let mut items = Vec::with_capacity(values.len());
                for v in values {
                    match const_scalar(v) {
                        Some(expr) => items.push(expr),
                        None => {
                            self.internal(
                                Span::new(0, 0),
                                "nested aggregate constants are not supported".to_string(),
                            );
                            return;
                        }
                    }
                }
                out.push(CStmt::Decl {
                    name: name.to_string(),
                    ty: self.ctype(ty),
                    init: Some(CExpr::InitList(items)),
                    storage: Storage::StaticConst,
                });
            }
            scalar => {
                let Some(expr) = const_scalar(scalar) else {
                    self.internal(Span::new(0, 0), "unsupported constant shape".to_string());
                    return;
                };
                out.push(CStmt::Decl {
                    name: name.to_string(),
                    ty: self.ctype(ty),
                    init: Some(expr),
                    storage: Storage::Auto,
                });
            }
        }
    }

    fn lower_expr_stmt(&mut self, expr: &HirExpr, out: &mut Vec<CStmt>, states: &mut OwnStates) {
        if let HirExprKind::Assign { op, target, value } = &expr.kind {
            if let HirExprKind::Move(source) = &value.kind {
                if *op != AssignOp::Assign {
                    self.internal(expr.span, "compound assignment of a move".to_string());
                    return;
                }
                let target_c = self.lower_assign_target(target, states);
                let stmts = self.lower_move_into(target_c, source, value.span, states);
                out.extend(stmts);
                // A whole-variable overwrite re-arms the target.
                if let HirExprKind::Var(name) = &target.kind {
                    states.set(name, Own::Owned);
                }
                return;
            }
            if matches!(target.ty, Ty::Str) {
                self.internal(expr.span, "string reassignment is not supported".to_string());
                return;
            }
            let target_c = self.lower_assign_target(target, states);
            let value_c = self.lower_expr(value, states);
            if let (HirExprKind::Var(name), Ty::UniquePtr(_)) = (&target.kind, &target.ty) {
                states.set(name, Own::Owned);
            }
            out.push(CStmt::Expr(CExpr::Assign {
                op: assign_token(*op),
                target: Box::new(target_c),
                value: Box::new(value_c),
            }));
            return;
        }
        let lowered = self.lower_expr(expr, states);
        out.push(CStmt::Expr(lowered));
    }

    /// `dst = src; src = NULL;` — the moved-from variable keeps an explicit
    /// empty sentinel so any later destroy is a no-op.
    fn lower_move_into(
        &mut self,
        target: CExpr,
        source: &HirExpr,
        span: Span,
        states: &mut OwnStates,
    ) -> Vec<CStmt> {
        let source_c = self.lower_expr(source, states);
        if !is_lvalue(&source_c) {
            self.internal(span, "move from a non-lvalue".to_string());
            return Vec::new();
        }
        let stmts = vec![
            CStmt::Expr(CExpr::assign(target, source_c.clone())),
            CStmt::Expr(CExpr::assign(source_c, CExpr::Null)),
        ];
        self.mark_moved(source, states);
        stmts
    }

    fn mark_moved(&mut self, source: &HirExpr, states: &mut OwnStates) {
        if let HirExprKind::Var(name) = &source.kind {
            states.set(name, Own::Moved);
        }
    }

    /// Lower an assignment target without flagging a moved-from read: an
    /// overwrite of a whole variable is a re-initialization, not a use.
    fn lower_assign_target(&mut self, target: &HirExpr, states: &mut OwnStates) -> CExpr {
        if let HirExprKind::Var(name) = &target.kind {
            return CExpr::var(name.clone());
        }
        self.lower_expr(target, states)
    }

    fn lower_print(&mut self, parts: &[PrintPart], states: &mut OwnStates) -> CStmt {
        let mut format = String::new();
        let mut args = Vec::new();
        for part in parts {
            match part {
                PrintPart::Text(text) => {
                    // A literal percent must not start a conversion.
                    format.push_str(&text.replace('%', "%%"));
                }
                PrintPart::Value(value) => {
                    match value.ty.printf_format() {
                        Some(spec) => format.push_str(spec),
                        None => {
                            self.internal(
                                value.span,
                                format!("no printf conversion for `{}`", value.ty),
                            );
                            format.push_str("%d");
                        }
                    }
                    args.push(self.lower_expr(value, states));
                }
            }
        }
        let mut call_args = vec![CExpr::Str(format)];
        call_args.extend(args);
        CStmt::Expr(CExpr::call("printf", call_args))
    }

    fn lower_expr(&mut self, expr: &HirExpr, states: &mut OwnStates) -> CExpr {
        match &expr.kind {
            HirExprKind::Int(value) => CExpr::Int(*value),
            HirExprKind::Bool(value) => CExpr::Bool(*value),
            HirExprKind::Str(value) => CExpr::Str(value.clone()),
            HirExprKind::Null => CExpr::Null,
            HirExprKind::Var(name) => {
                if states.get(name) == Some(Own::Moved) {
                    self.use_after_move(expr.span, name);
                }
                CExpr::var(name.clone())
            }
            HirExprKind::SelfRef => CExpr::var("self"),
            HirExprKind::Member {
                obj,
                field,
                through_ptr,
            } => {
                let obj = self.lower_expr(obj, states);
                CExpr::Member {
                    obj: Box::new(obj),
                    field: field.clone(),
                    arrow: *through_ptr,
                }
            }
            HirExprKind::Unary { op, expr: inner } => {
                let inner = self.lower_expr(inner, states);
                CExpr::Unary {
                    op: unary_token(*op),
                    expr: Box::new(inner),
                }
            }
            HirExprKind::IncDec {
                op,
                prefix,
                expr: inner,
            } => {
                let inner = self.lower_expr(inner, states);
                CExpr::IncDec {
                    op: match op {
                        IncDecOp::Inc => "++",
                        IncDecOp::Dec => "--",
                    },
                    prefix: *prefix,
                    expr: Box::new(inner),
                }
            }
            HirExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.lower_expr(lhs, states);
                let rhs = self.lower_expr(rhs, states);
                CExpr::Binary {
                    op: binary_token(*op),
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                }
            }
            HirExprKind::Assign { op, target, value } => {
                // Nested assignments with moves were handled at statement
                // level; anything else lowers structurally.
                if matches!(value.kind, HirExprKind::Move(_)) {
                    self.internal(
                        expr.span,
                        "move in a nested expression position".to_string(),
                    );
                }
                let target = self.lower_assign_target(target, states);
                let value = self.lower_expr(value, states);
                CExpr::Assign {
                    op: assign_token(*op),
                    target: Box::new(target),
                    value: Box::new(value),
                }
            }
            HirExprKind::Call { func, args } => {
                let args = args.iter().map(|a| self.lower_expr(a, states)).collect();
                CExpr::Call {
                    func: func.clone(),
                    args,
                }
            }
            HirExprKind::MethodCall {
                method,
                recv,
                args,
                recv_addr,
            } => {
                let recv_c = self.lower_expr(recv, states);
                let recv_c = if *recv_addr {
                    CExpr::addr_of(recv_c)
                } else {
                    recv_c
                };
                let mut call_args = vec![recv_c];
                for arg in args {
                    call_args.push(self.lower_expr(arg, states));
                }
                CExpr::Call {
                    func: method.clone(),
                    args: call_args,
                }
            }
            HirExprKind::Index { obj, index } => {
                let obj = self.lower_expr(obj, states);
                let index = self.lower_expr(index, states);
                CExpr::Index {
                    obj: Box::new(obj),
                    index: Box::new(index),
                }
            }
            HirExprKind::Cast(inner) => {
                let target = self.ctype(&expr.ty);
                let inner = self.lower_expr(inner, states);
                CExpr::Cast {
                    ty: target,
                    expr: Box::new(inner),
                }
            }
            // A unique pointer is already a raw pointer in C.
            HirExprKind::GetRaw(inner) => self.lower_expr(inner, states),
            HirExprKind::Move(_) => {
                self.internal(
                    expr.span,
                    "move outside an assignment or initializer".to_string(),
                );
                CExpr::Null
            }
            HirExprKind::MakeUnique { .. } => {
                self.internal(
                    expr.span,
                    "std::make_unique outside a declaration initializer".to_string(),
                );
                CExpr::Null
            }
        }
    }
}

fn const_scalar(value: &ConstValue) -> Option<CExpr> {
    match value {
        ConstValue::Int(v) => Some(CExpr::Int(*v)),
        ConstValue::Bool(v) => Some(CExpr::Bool(*v)),
        ConstValue::Str(v) => Some(CExpr::Str(v.clone())),
        ConstValue::Aggregate(_) => None,
    }
}

fn is_lvalue(expr: &CExpr) -> bool {
    matches!(
        expr,
        CExpr::Var(_)
            | CExpr::Member { .. }
            | CExpr::Index { .. }
            | CExpr::Unary { op: "*", .. }
    )
}

fn unary_token(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Neg => "-",
        UnaryOp::Not => "!",
        UnaryOp::Deref => "*",
        UnaryOp::AddrOf => "&",
    }
}

fn binary_token(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Rem => "%",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::And => "&&",
        BinOp::Or => "||",
        BinOp::Shl => "<<",
    }
}

fn assign_token(op: AssignOp) -> &'static str {
    match op {
        AssignOp::Assign => "=",
        AssignOp::AddAssign => "+=",
        AssignOp::SubAssign => "-=",
    }
}
