//! AST → HIR lowering.
//!
//! This pass resolves names, checks types, folds `constexpr` initializers,
//! expands defaulted arguments at call-sites, rewrites output-stream chains,
//! and drives template monomorphization. The result is a template-free,
//! overload-free program in which every expression is typed.

use crate::consteval::{ConstEvaluator, ConstValue, EvalError};
use crate::hir::*;
use crate::mono::{InstantiationQueue, PendingInst, build_subst, deduce};
use crate::symbols::{OverloadCandidate, OverloadError, ProgramIndex, ScopeChain, select_overload};
use crate::types::{Subst, Ty, TyArg, compatible, mangle_instantiation};
use cxx2c_ast::{
    self as ast, ClassDef, Expr, ExprKind, FunctionDef, Item, Param, Stmt, TemplateArg,
    TemplateParam, TemplateParamKind, TranslationUnit, TypeExpr, VarInit,
};
use cxx2c_core::{CompilationPhase, Diagnostic, DiagnosticKind, DiagnosticSeverity, Span};
use std::collections::BTreeMap;
use tracing::debug;

/// Lower a parsed unit. Returns the program (None if any error was
/// reported) together with every diagnostic produced along the way.
pub fn lower_unit<'db>(
    db: &'db dyn salsa::Database,
    unit: TranslationUnit<'db>,
) -> (Option<HirProgram>, Vec<Diagnostic>) {
    let items = unit.items(db);
    let (index, diagnostics) = ProgramIndex::build(items);
    let mut lowering = Lowering {
        index,
        eval: ConstEvaluator::new(),
        queue: InstantiationQueue::new(),
        struct_defs: BTreeMap::new(),
        struct_fields: BTreeMap::new(),
        structs: Vec::new(),
        functions: Vec::new(),
        diagnostics,
    };

    // Non-template classes and runtime functions are lowered eagerly in
    // declaration order; templates and constexpr functions only on demand.
    for item in items {
        match item {
            Item::Class(class) if class.template_params.is_empty() => {
                lowering.instantiate_class(class, Vec::new());
            }
            Item::Function(func)
                if func.template_params.is_empty() && !func.is_constexpr =>
            {
                let symbol = plain_symbol(&lowering.index, func);
                lowering.queue.request_plain_function(func, symbol);
            }
            _ => {}
        }
    }

    while let Some(pending) = lowering.queue.pop() {
        match pending {
            PendingInst::Class { def, subst, name } => {
                lowering.lower_class_body(def, subst, name);
            }
            PendingInst::Function { def, subst, name } => {
                lowering.lower_function(def, subst, name);
            }
        }
    }

    let has_errors = lowering
        .diagnostics
        .iter()
        .any(|d| d.severity == DiagnosticSeverity::Error);
    let main = lowering
        .functions
        .iter()
        .find(|f| f.name == "main")
        .map(|f| f.name.clone());
    debug!(
        structs = lowering.structs.len(),
        functions = lowering.functions.len(),
        "lowered unit"
    );
    let program = HirProgram {
        structs: lowering.structs,
        functions: lowering.functions,
        main,
    };
    if has_errors {
        (None, lowering.diagnostics)
    } else {
        (Some(program), lowering.diagnostics)
    }
}

struct StructDef<'a> {
    ast: &'a ClassDef,
    subst: Subst,
}

struct Lowering<'a> {
    index: ProgramIndex<'a>,
    eval: ConstEvaluator,
    queue: InstantiationQueue<'a>,
    struct_defs: BTreeMap<String, StructDef<'a>>,
    struct_fields: BTreeMap<String, Vec<HirField>>,
    structs: Vec<HirStruct>,
    functions: Vec<HirFunction>,
    diagnostics: Vec<Diagnostic>,
}

struct FnCtx<'a> {
    scopes: ScopeChain,
    subst: Subst,
    template_params: &'a [TemplateParam],
    /// Mangled name of the enclosing struct inside member functions.
    self_class: Option<String>,
    ret: Ty,
    /// Counter for compiler-introduced loop variables.
    fresh: usize,
}

impl FnCtx<'_> {
    fn fresh_name(&mut self) -> String {
        let name = format!("_i{}", self.fresh);
        self.fresh += 1;
        name
    }
}

fn poison(span: Span) -> HirExpr {
    HirExpr::new(HirExprKind::Int(0), Ty::Error, span)
}

impl<'a> Lowering<'a> {
    fn error(&mut self, kind: DiagnosticKind, phase: CompilationPhase, span: Span, message: String) {
        self.diagnostics
            .push(Diagnostic::error(kind, phase, span, message));
    }

    fn eval_error(&mut self, err: EvalError, phase: CompilationPhase) {
        self.error(err.kind, phase, err.span, err.message);
    }

    // ---------------------------------------------------------------------
    // Instantiation
    // ---------------------------------------------------------------------

    /// Ensure a class instantiation exists: registers its definition,
    /// resolves its fields eagerly (so other bodies can use them before this
    /// one is lowered), and queues the body. Returns the mangled name.
    fn instantiate_class(&mut self, def: &'a ClassDef, args: Vec<TyArg>) -> String {
        let name = mangle_instantiation(&def.name, &args);
        if self.struct_defs.contains_key(&name) {
            return name;
        }
        let subst = build_subst(&def.template_params, &args);
        self.struct_defs.insert(
            name.clone(),
            StructDef {
                ast: def,
                subst: subst.clone(),
            },
        );
        self.queue.request_class(def, &args);
        let fields: Vec<HirField> = def
            .fields
            .iter()
            .map(|field| HirField {
                name: field.name.clone(),
                ty: self.resolve_ty(&field.ty, &subst, true, field.span),
            })
            .collect();
        self.struct_fields.insert(name.clone(), fields);
        name
    }

    // ---------------------------------------------------------------------
    // Types
    // ---------------------------------------------------------------------

    /// Resolve a written type under a substitution. With `demand` set, class
    /// instantiations encountered here are queued for lowering; without it,
    /// resolution is side-effect-free (used while weighing overload
    /// candidates that may lose).
    fn resolve_ty(&mut self, ty: &TypeExpr, subst: &Subst, demand: bool, span: Span) -> Ty {
        match ty {
            TypeExpr::Void => Ty::Void,
            TypeExpr::Bool => Ty::Bool,
            TypeExpr::Int => Ty::Int,
            TypeExpr::SizeT => Ty::SizeT,
            TypeExpr::StdString => Ty::Str,
            TypeExpr::Auto => {
                self.error(
                    DiagnosticKind::UnsupportedConstruct,
                    CompilationPhase::NameResolution,
                    span,
                    "`auto` reached type resolution without an initializer".to_string(),
                );
                Ty::Error
            }
            TypeExpr::Ptr(inner) => Ty::ptr(self.resolve_ty(inner, subst, demand, span)),
            TypeExpr::UniquePtr(inner) => {
                Ty::unique_ptr(self.resolve_ty(inner, subst, demand, span))
            }
            TypeExpr::Ref(_) | TypeExpr::ConstRef(_) => {
                self.error(
                    DiagnosticKind::SyntaxError,
                    CompilationPhase::NameResolution,
                    span,
                    "references are only supported in parameter position".to_string(),
                );
                Ty::Error
            }
            TypeExpr::StdArray(elem, len) => {
                let elem = self.resolve_ty(elem, subst, demand, span);
                match self.eval.eval_extent(&self.index, len, subst) {
                    Ok(len) => Ty::Array {
                        elem: Box::new(elem),
                        len,
                    },
                    Err(err) => {
                        self.error(
                            DiagnosticKind::TemplateArgument,
                            CompilationPhase::Monomorphization,
                            err.span,
                            format!("array extent is not a compile-time constant: {}", err.message),
                        );
                        Ty::Error
                    }
                }
            }
            TypeExpr::Named(name) => {
                if let Some(arg) = subst.get(name) {
                    return match arg {
                        TyArg::Ty(ty) => ty.clone(),
                        TyArg::Value(_) => {
                            self.error(
                                DiagnosticKind::TemplateArgument,
                                CompilationPhase::Monomorphization,
                                span,
                                format!("non-type parameter `{name}` used as a type"),
                            );
                            Ty::Error
                        }
                    };
                }
                if let Some(def) = self.index.classes.get(name.as_str()).copied() {
                    if demand {
                        self.instantiate_class(def, Vec::new());
                    }
                    return Ty::Class(name.clone());
                }
                if self.index.class_templates.contains_key(name.as_str()) {
                    self.error(
                        DiagnosticKind::TemplateArgument,
                        CompilationPhase::Monomorphization,
                        span,
                        format!("class template `{name}` used without template arguments"),
                    );
                    return Ty::Error;
                }
                self.error(
                    DiagnosticKind::UnresolvedName,
                    CompilationPhase::NameResolution,
                    span,
                    format!("unknown type `{name}`"),
                );
                Ty::Error
            }
            TypeExpr::Instantiation(name, args) => {
                let Some(def) = self.index.class_templates.get(name.as_str()).copied() else {
                    self.error(
                        DiagnosticKind::UnresolvedName,
                        CompilationPhase::NameResolution,
                        span,
                        format!("unknown class template `{name}`"),
                    );
                    return Ty::Error;
                };
                let Some(ty_args) = self.resolve_template_args(def, args, subst, demand, span)
                else {
                    return Ty::Error;
                };
                let mangled = if demand {
                    self.instantiate_class(def, ty_args)
                } else {
                    mangle_instantiation(&def.name, &ty_args)
                };
                Ty::Class(mangled)
            }
        }
    }

    /// Resolve and validate explicit template arguments against a class
    /// template's formal parameters.
    fn resolve_template_args(
        &mut self,
        def: &'a ClassDef,
        args: &[TemplateArg],
        subst: &Subst,
        demand: bool,
        span: Span,
    ) -> Option<Vec<TyArg>> {
        if args.len() != def.template_params.len() {
            self.error(
                DiagnosticKind::TemplateArgument,
                CompilationPhase::Monomorphization,
                span,
                format!(
                    "`{}` expects {} template argument(s), got {}",
                    def.name,
                    def.template_params.len(),
                    args.len()
                ),
            );
            return None;
        }
        let mut out = Vec::with_capacity(args.len());
        for (formal, actual) in def.template_params.iter().zip(args) {
            match (&formal.kind, actual) {
                (TemplateParamKind::Type, TemplateArg::Type(ty)) => {
                    let resolved = self.resolve_ty(ty, subst, demand, span);
                    if resolved == Ty::Error {
                        return None;
                    }
                    out.push(TyArg::Ty(resolved));
                }
                (TemplateParamKind::Value(_), TemplateArg::Value(expr)) => {
                    match self.eval.eval_extent(&self.index, expr, subst) {
                        Ok(value) => out.push(TyArg::Value(value)),
                        Err(err) => {
                            self.error(
                                DiagnosticKind::TemplateArgument,
                                CompilationPhase::Monomorphization,
                                err.span,
                                format!(
                                    "non-type template argument is not a compile-time constant: {}",
                                    err.message
                                ),
                            );
                            return None;
                        }
                    }
                }
                // `Name<N>` where N names a value parameter of the enclosing
                // template parses as a type argument; re-classify it here.
                (TemplateParamKind::Value(_), TemplateArg::Type(TypeExpr::Named(name)))
                    if matches!(subst.get(name), Some(TyArg::Value(_))) =>
                {
                    let Some(TyArg::Value(value)) = subst.get(name) else {
                        unreachable!("checked by guard");
                    };
                    out.push(TyArg::Value(*value));
                }
                _ => {
                    self.error(
                        DiagnosticKind::TemplateArgument,
                        CompilationPhase::Monomorphization,
                        span,
                        format!(
                            "template argument {} of `{}` has the wrong kind",
                            out.len() + 1,
                            def.name
                        ),
                    );
                    return None;
                }
            }
        }
        Some(out)
    }

    fn resolve_param(&mut self, param: &Param, subst: &Subst) -> HirParam {
        let (ty, mode) = match &param.ty {
            TypeExpr::ConstRef(inner) => {
                (self.resolve_ty(inner, subst, true, param.span), ParamMode::ConstRef)
            }
            TypeExpr::Ref(_) => {
                self.error(
                    DiagnosticKind::SyntaxError,
                    CompilationPhase::NameResolution,
                    param.span,
                    "non-const reference parameters are not supported".to_string(),
                );
                (Ty::Error, ParamMode::Value)
            }
            other => (self.resolve_ty(other, subst, true, param.span), ParamMode::Value),
        };
        HirParam {
            name: param.name.clone(),
            ty,
            mode,
        }
    }

    /// Parameter value type for overload ranking, without instantiation
    /// side effects.
    fn peek_param_ty(&mut self, param: &Param, subst: &Subst, span: Span) -> Ty {
        match &param.ty {
            TypeExpr::ConstRef(inner) | TypeExpr::Ref(inner) => {
                self.resolve_ty_quiet(inner, subst, span)
            }
            other => self.resolve_ty_quiet(other, subst, span),
        }
    }

    /// Resolution that neither demands instantiations nor reports errors;
    /// used for candidates that may not be selected.
    fn resolve_ty_quiet(&mut self, ty: &TypeExpr, subst: &Subst, span: Span) -> Ty {
        let before = self.diagnostics.len();
        let resolved = self.resolve_ty(ty, subst, false, span);
        self.diagnostics.truncate(before);
        resolved
    }

    // ---------------------------------------------------------------------
    // Functions and classes
    // ---------------------------------------------------------------------

    fn lower_function(&mut self, def: &'a FunctionDef, subst: Subst, name: String) {
        let ret = self.resolve_ty(&def.ret, &subst, true, def.span);
        let params: Vec<HirParam> = def
            .params
            .iter()
            .map(|p| self.resolve_param(p, &subst))
            .collect();
        let mut ctx = FnCtx {
            scopes: ScopeChain::new(),
            subst,
            template_params: &def.template_params,
            self_class: None,
            ret: ret.clone(),
            fresh: 0,
        };
        for param in &params {
            ctx.scopes.declare(&param.name, param.ty.clone());
        }
        let body = self.lower_stmts(&def.body.stmts, &mut ctx);
        self.functions.push(HirFunction {
            name,
            params,
            ret,
            body,
        });
    }

    fn lower_class_body(&mut self, def: &'a ClassDef, subst: Subst, name: String) {
        let fields = self
            .struct_fields
            .get(&name)
            .cloned()
            .unwrap_or_default();

        let mut ctors = Vec::new();
        if def.ctors.is_empty() {
            // Implicit default constructor: every field default-initialized.
            ctors.push(HirCtor {
                name: ctor_symbol(&name, 0),
                params: Vec::new(),
                inits: fields
                    .iter()
                    .map(|f| HirFieldInit {
                        field: f.name.clone(),
                        init: HirInit::Default,
                    })
                    .collect(),
                body: Vec::new(),
            });
        }
        for (i, ctor) in def.ctors.iter().enumerate() {
            let params: Vec<HirParam> = ctor
                .params
                .iter()
                .map(|p| self.resolve_param(p, &subst))
                .collect();
            let mut ctx = FnCtx {
                scopes: ScopeChain::new(),
                subst: subst.clone(),
                template_params: &def.template_params,
                self_class: Some(name.clone()),
                ret: Ty::Void,
                fresh: 0,
            };
            for param in &params {
                ctx.scopes.declare(&param.name, param.ty.clone());
            }

            // Members initialize in field declaration order, whatever the
            // init list order was.
            let mut inits = Vec::new();
            for field in &fields {
                let user = ctor.inits.iter().find(|init| init.member == field.name);
                let init = match user {
                    None => HirInit::Default,
                    Some(user) if user.args.is_empty() => HirInit::Default,
                    Some(user) if user.args.len() == 1 => {
                        let value = self.lower_expr(&user.args[0], &mut ctx);
                        if !compatible(&value.ty, &field.ty) {
                            self.error(
                                DiagnosticKind::UnresolvedName,
                                CompilationPhase::NameResolution,
                                user.span,
                                format!(
                                    "cannot initialize member `{}` of type `{}` from `{}`",
                                    field.name, field.ty, value.ty
                                ),
                            );
                        }
                        HirInit::Expr(value)
                    }
                    Some(user) => {
                        self.error(
                            DiagnosticKind::SyntaxError,
                            CompilationPhase::NameResolution,
                            user.span,
                            "multi-argument member initializers are not supported".to_string(),
                        );
                        HirInit::Default
                    }
                };
                inits.push(HirFieldInit {
                    field: field.name.clone(),
                    init,
                });
            }
            for user in &ctor.inits {
                if !fields.iter().any(|f| f.name == user.member) {
                    self.error(
                        DiagnosticKind::UnresolvedName,
                        CompilationPhase::NameResolution,
                        user.span,
                        format!("`{}` is not a member of `{}`", user.member, def.name),
                    );
                }
            }

            let body = self.lower_stmts(&ctor.body.stmts, &mut ctx);
            ctors.push(HirCtor {
                name: ctor_symbol(&name, i),
                params,
                inits,
                body,
            });
        }

        let dtor = def.dtor.as_ref().map(|dtor| {
            let mut ctx = FnCtx {
                scopes: ScopeChain::new(),
                subst: subst.clone(),
                template_params: &def.template_params,
                self_class: Some(name.clone()),
                ret: Ty::Void,
                fresh: 0,
            };
            self.lower_stmts(&dtor.body.stmts, &mut ctx)
        });

        let mut methods = Vec::new();
        for (i, method) in def.methods.iter().enumerate() {
            let ret = self.resolve_ty(&method.ret, &subst, true, method.span);
            let params: Vec<HirParam> = method
                .params
                .iter()
                .map(|p| self.resolve_param(p, &subst))
                .collect();
            let mut ctx = FnCtx {
                scopes: ScopeChain::new(),
                subst: subst.clone(),
                template_params: &def.template_params,
                self_class: Some(name.clone()),
                ret: ret.clone(),
                fresh: 0,
            };
            for param in &params {
                ctx.scopes.declare(&param.name, param.ty.clone());
            }
            let body = self.lower_stmts(&method.body.stmts, &mut ctx);
            methods.push(HirMethod {
                name: method_symbol(&name, def, i),
                is_const: method.is_const,
                ret,
                params,
                body,
            });
        }

        self.structs.push(HirStruct {
            name,
            fields,
            ctors,
            dtor,
            methods,
        });
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    fn lower_stmts(&mut self, stmts: &[Stmt], ctx: &mut FnCtx<'a>) -> Vec<HirStmt> {
        stmts
            .iter()
            .map(|stmt| self.lower_stmt(stmt, ctx))
            .collect()
    }

    fn lower_block(&mut self, block: &ast::Block, ctx: &mut FnCtx<'a>) -> Vec<HirStmt> {
        ctx.scopes.push();
        let lowered = self.lower_stmts(&block.stmts, ctx);
        ctx.scopes.pop();
        lowered
    }

    fn lower_stmt(&mut self, stmt: &Stmt, ctx: &mut FnCtx<'a>) -> HirStmt {
        match stmt {
            Stmt::Decl(decl) => self.lower_decl(decl, ctx),
            Stmt::Expr(expr) => {
                if let Some(print) = self.try_lower_print(expr, ctx) {
                    return print;
                }
                HirStmt::Expr(self.lower_expr(expr, ctx))
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
                ..
            } => {
                let cond = self.lower_condition(cond, ctx);
                let then_block = self.lower_block(then_block, ctx);
                let else_block = else_block
                    .as_ref()
                    .map(|b| self.lower_block(b, ctx))
                    .unwrap_or_default();
                HirStmt::If {
                    cond,
                    then_block,
                    else_block,
                }
            }
            Stmt::While { cond, body, .. } => {
                let cond = self.lower_condition(cond, ctx);
                let body = self.lower_block(body, ctx);
                HirStmt::While { cond, body }
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
                ..
            } => {
                ctx.scopes.push();
                let init = init
                    .as_ref()
                    .map(|stmt| Box::new(self.lower_stmt(stmt, ctx)));
                let cond = cond.as_ref().map(|c| self.lower_condition(c, ctx));
                let step = step.as_ref().map(|s| self.lower_expr(s, ctx));
                let body = self.lower_block(body, ctx);
                ctx.scopes.pop();
                HirStmt::For {
                    init,
                    cond,
                    step,
                    body,
                }
            }
            Stmt::RangeFor {
                var,
                iterable,
                body,
                span,
            } => self.lower_range_for(var, iterable, body, *span, ctx),
            Stmt::Return(value, span) => {
                let value = value.as_ref().map(|v| self.lower_expr(v, ctx));
                if let Some(value) = &value {
                    if !compatible(&value.ty, &ctx.ret) {
                        self.error(
                            DiagnosticKind::UnresolvedName,
                            CompilationPhase::NameResolution,
                            *span,
                            format!("cannot return `{}` from a function returning `{}`", value.ty, ctx.ret),
                        );
                    }
                }
                HirStmt::Return(value)
            }
            Stmt::Break(_) => HirStmt::Break,
            Stmt::Continue(_) => HirStmt::Continue,
            Stmt::Block(block) => HirStmt::Block(self.lower_block(block, ctx)),
        }
    }

    fn lower_decl(&mut self, decl: &ast::VarDecl, ctx: &mut FnCtx<'a>) -> HirStmt {
        let (ty, init) = if decl.is_constexpr {
            self.lower_constexpr_decl(decl, ctx)
        } else {
            match &decl.init {
                VarInit::Assign(expr) => {
                    let value = self.lower_expr(expr, ctx);
                    let ty = if matches!(decl.ty, TypeExpr::Auto) {
                        value.ty.clone()
                    } else {
                        let declared = self.resolve_ty(&decl.ty, &ctx.subst, true, decl.span);
                        if !compatible(&value.ty, &declared) {
                            self.error(
                                DiagnosticKind::UnresolvedName,
                                CompilationPhase::NameResolution,
                                decl.span,
                                format!(
                                    "cannot initialize `{}` of type `{}` from `{}`",
                                    decl.name, declared, value.ty
                                ),
                            );
                        }
                        declared
                    };
                    (ty, HirInit::Expr(value))
                }
                VarInit::Construct(args) => {
                    let ty = self.resolve_ty(&decl.ty, &ctx.subst, true, decl.span);
                    let init = self.lower_construct_init(&ty, args, decl.span, ctx);
                    (ty, init)
                }
                VarInit::None => {
                    let ty = self.resolve_ty(&decl.ty, &ctx.subst, true, decl.span);
                    let init = match &ty {
                        Ty::Class(_) => {
                            self.lower_construct_init(&ty, &[], decl.span, ctx)
                        }
                        _ => HirInit::Default,
                    };
                    (ty, init)
                }
                VarInit::Brace(args) if args.is_empty() => {
                    let ty = self.resolve_ty(&decl.ty, &ctx.subst, true, decl.span);
                    (ty, HirInit::Default)
                }
                VarInit::Brace(_) => {
                    self.error(
                        DiagnosticKind::SyntaxError,
                        CompilationPhase::NameResolution,
                        decl.span,
                        "brace initializers with arguments are not supported".to_string(),
                    );
                    (Ty::Error, HirInit::Default)
                }
            }
        };

        if !ctx.scopes.declare(&decl.name, ty.clone()) {
            self.error(
                DiagnosticKind::DuplicateDeclaration,
                CompilationPhase::NameResolution,
                decl.span,
                format!("`{}` is already declared in this scope", decl.name),
            );
        }
        HirStmt::Local {
            name: decl.name.clone(),
            ty,
            init,
        }
    }

    fn lower_constexpr_decl(&mut self, decl: &ast::VarDecl, ctx: &mut FnCtx<'a>) -> (Ty, HirInit) {
        let VarInit::Assign(expr) = &decl.init else {
            self.error(
                DiagnosticKind::NonConstantEvaluation,
                CompilationPhase::ConstEvaluation,
                decl.span,
                "constexpr variables require an initializer expression".to_string(),
            );
            return (Ty::Error, HirInit::Default);
        };
        match self.eval.eval_expr_at(&self.index, expr, &ctx.subst) {
            Ok(value) => {
                let ty = if matches!(decl.ty, TypeExpr::Auto) {
                    match value.type_of() {
                        Some(ty) => ty,
                        None => {
                            self.error(
                                DiagnosticKind::NonConstantEvaluation,
                                CompilationPhase::ConstEvaluation,
                                decl.span,
                                "cannot deduce the type of this constant".to_string(),
                            );
                            Ty::Error
                        }
                    }
                } else {
                    self.resolve_ty(&decl.ty, &ctx.subst, true, decl.span)
                };
                (ty, HirInit::Const(value))
            }
            Err(err) => {
                self.eval_error(err, CompilationPhase::ConstEvaluation);
                (Ty::Error, HirInit::Default)
            }
        }
    }

    fn lower_construct_init(
        &mut self,
        ty: &Ty,
        args: &[Expr],
        span: Span,
        ctx: &mut FnCtx<'a>,
    ) -> HirInit {
        let Ty::Class(struct_name) = ty else {
            if !args.is_empty() {
                self.error(
                    DiagnosticKind::SyntaxError,
                    CompilationPhase::NameResolution,
                    span,
                    format!("type `{ty}` has no constructor"),
                );
            }
            return HirInit::Default;
        };
        let lowered: Vec<HirExpr> = args.iter().map(|a| self.lower_expr(a, ctx)).collect();
        match self.resolve_ctor(struct_name, lowered, span) {
            Some((ctor, args)) => HirInit::Construct { ctor, args },
            None => HirInit::Default,
        }
    }

    fn lower_range_for(
        &mut self,
        var: &str,
        iterable: &Expr,
        body: &ast::Block,
        span: Span,
        ctx: &mut FnCtx<'a>,
    ) -> HirStmt {
        let iterable = self.lower_expr(iterable, ctx);
        let (elem, len) = match &iterable.ty {
            Ty::Array { elem, len } => ((**elem).clone(), *len),
            Ty::Error => (Ty::Error, 0),
            other => {
                self.error(
                    DiagnosticKind::SyntaxError,
                    CompilationPhase::NameResolution,
                    span,
                    format!("range-for requires an array, found `{other}`"),
                );
                (Ty::Error, 0)
            }
        };

        let idx = ctx.fresh_name();
        ctx.scopes.push();
        ctx.scopes.declare(&idx, Ty::SizeT);
        ctx.scopes.declare(var, elem.clone());

        let idx_var = HirExpr::new(HirExprKind::Var(idx.clone()), Ty::SizeT, span);
        let init = HirStmt::Local {
            name: idx.clone(),
            ty: Ty::SizeT,
            init: HirInit::Expr(HirExpr::new(HirExprKind::Int(0), Ty::SizeT, span)),
        };
        let cond = HirExpr::new(
            HirExprKind::Binary {
                op: BinOp::Lt,
                lhs: Box::new(idx_var.clone()),
                rhs: Box::new(HirExpr::new(HirExprKind::Int(len as i64), Ty::SizeT, span)),
            },
            Ty::Bool,
            span,
        );
        let step = HirExpr::new(
            HirExprKind::IncDec {
                op: IncDecOp::Inc,
                prefix: true,
                expr: Box::new(idx_var.clone()),
            },
            Ty::SizeT,
            span,
        );

        let mut lowered_body = vec![HirStmt::Local {
            name: var.to_string(),
            ty: elem.clone(),
            init: HirInit::Expr(HirExpr::new(
                HirExprKind::Index {
                    obj: Box::new(iterable),
                    index: Box::new(idx_var),
                },
                elem,
                span,
            )),
        }];
        lowered_body.extend(self.lower_stmts(&body.stmts, ctx));
        ctx.scopes.pop();

        HirStmt::For {
            init: Some(Box::new(init)),
            cond: Some(cond),
            step: Some(step),
            body: lowered_body,
        }
    }

    fn lower_condition(&mut self, expr: &Expr, ctx: &mut FnCtx<'a>) -> HirExpr {
        let cond = self.lower_expr(expr, ctx);
        if !cond.ty.is_truthy() {
            self.error(
                DiagnosticKind::UnresolvedName,
                CompilationPhase::NameResolution,
                expr.span,
                format!("`{}` is not usable as a condition", cond.ty),
            );
        }
        cond
    }

    // ---------------------------------------------------------------------
    // Output streams
    // ---------------------------------------------------------------------

    /// Recognize `std::cout << a << b << ...;` and lower it to a single
    /// print statement. Returns None when the statement is not a stream
    /// chain.
    fn try_lower_print(&mut self, expr: &Expr, ctx: &mut FnCtx<'a>) -> Option<HirStmt> {
        fn leftmost(expr: &Expr) -> &Expr {
            match &expr.kind {
                ExprKind::Binary {
                    op: ast::BinOp::Shl,
                    lhs,
                    ..
                } => leftmost(lhs),
                _ => expr,
            }
        }
        if !matches!(&leftmost(expr).kind, ExprKind::Ident(name) if name == "std::cout") {
            return None;
        }

        let mut operands = Vec::new();
        fn flatten<'e>(expr: &'e Expr, operands: &mut Vec<&'e Expr>) {
            match &expr.kind {
                ExprKind::Binary {
                    op: ast::BinOp::Shl,
                    lhs,
                    rhs,
                } => {
                    flatten(lhs, operands);
                    operands.push(rhs);
                }
                _ => {}
            }
        }
        flatten(expr, &mut operands);

        let mut parts = Vec::new();
        for operand in operands {
            match &operand.kind {
                ExprKind::StrLit(text) => parts.push(PrintPart::Text(text.clone())),
                ExprKind::Ident(name) if name == "std::endl" => {
                    parts.push(PrintPart::Text("\n".to_string()));
                }
                _ => {
                    let value = self.lower_expr(operand, ctx);
                    if value.ty.printf_format().is_none() && value.ty != Ty::Error {
                        self.error(
                            DiagnosticKind::SyntaxError,
                            CompilationPhase::NameResolution,
                            operand.span,
                            format!("cannot print a value of type `{}`", value.ty),
                        );
                    }
                    parts.push(PrintPart::Value(value));
                }
            }
        }
        Some(HirStmt::Print(parts))
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    fn lower_expr(&mut self, expr: &Expr, ctx: &mut FnCtx<'a>) -> HirExpr {
        match &expr.kind {
            ExprKind::IntLit(value) => HirExpr::new(HirExprKind::Int(*value), Ty::Int, expr.span),
            ExprKind::BoolLit(value) => {
                HirExpr::new(HirExprKind::Bool(*value), Ty::Bool, expr.span)
            }
            ExprKind::StrLit(value) => {
                HirExpr::new(HirExprKind::Str(value.clone()), Ty::Str, expr.span)
            }
            ExprKind::NullPtr => HirExpr::new(HirExprKind::Null, Ty::ptr(Ty::Void), expr.span),
            ExprKind::Ident(name) => self.lower_ident(name, expr.span, ctx),
            ExprKind::Unary { op, expr: inner } => self.lower_unary(*op, inner, expr.span, ctx),
            ExprKind::IncDec {
                op,
                prefix,
                expr: inner,
            } => {
                let value = self.lower_expr(inner, ctx);
                if !value.ty.is_numeric() && value.ty != Ty::Error {
                    self.error(
                        DiagnosticKind::UnresolvedName,
                        CompilationPhase::NameResolution,
                        expr.span,
                        format!("cannot increment or decrement `{}`", value.ty),
                    );
                }
                let ty = value.ty.clone();
                HirExpr::new(
                    HirExprKind::IncDec {
                        op: *op,
                        prefix: *prefix,
                        expr: Box::new(value),
                    },
                    ty,
                    expr.span,
                )
            }
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs, expr.span, ctx),
            ExprKind::Assign { op, target, value } => {
                self.lower_assign(*op, target, value, expr.span, ctx)
            }
            ExprKind::Call {
                callee,
                template_args,
                args,
            } => self.lower_call(callee, template_args, args, expr.span, ctx),
            ExprKind::MethodCall {
                recv,
                method,
                args,
                arrow,
            } => self.lower_method_call(recv, method, args, *arrow, expr.span, ctx),
            ExprKind::Member { obj, field, arrow } => {
                self.lower_member(obj, field, *arrow, expr.span, ctx)
            }
            ExprKind::Index { obj, index } => {
                let obj = self.lower_expr(obj, ctx);
                let index = self.lower_expr(index, ctx);
                let elem = match &obj.ty {
                    Ty::Array { elem, .. } => (**elem).clone(),
                    Ty::Error => Ty::Error,
                    other => {
                        self.error(
                            DiagnosticKind::UnresolvedName,
                            CompilationPhase::NameResolution,
                            expr.span,
                            format!("cannot index a value of type `{other}`"),
                        );
                        Ty::Error
                    }
                };
                HirExpr::new(
                    HirExprKind::Index {
                        obj: Box::new(obj),
                        index: Box::new(index),
                    },
                    elem,
                    expr.span,
                )
            }
            ExprKind::StaticCast { ty, expr: inner } => {
                let value = self.lower_expr(inner, ctx);
                let target = self.resolve_ty(ty, &ctx.subst, true, expr.span);
                if !(target.is_numeric() || target == Ty::Error)
                    || !(value.ty.is_numeric() || value.ty == Ty::Error)
                {
                    self.error(
                        DiagnosticKind::SyntaxError,
                        CompilationPhase::NameResolution,
                        expr.span,
                        format!("unsupported cast from `{}` to `{target}`", value.ty),
                    );
                }
                HirExpr::new(HirExprKind::Cast(Box::new(value)), target, expr.span)
            }
            ExprKind::Move(inner) => {
                let value = self.lower_expr(inner, ctx);
                if !matches!(value.ty, Ty::UniquePtr(_) | Ty::Error) {
                    self.error(
                        DiagnosticKind::SyntaxError,
                        CompilationPhase::NameResolution,
                        expr.span,
                        format!(
                            "only unique-ownership values can be moved, found `{}`",
                            value.ty
                        ),
                    );
                }
                let ty = value.ty.clone();
                HirExpr::new(HirExprKind::Move(Box::new(value)), ty, expr.span)
            }
            ExprKind::MakeUnique { ty, args } => {
                let pointee = self.resolve_ty(ty, &ctx.subst, true, expr.span);
                let Ty::Class(struct_name) = pointee.clone() else {
                    if pointee != Ty::Error {
                        self.error(
                            DiagnosticKind::SyntaxError,
                            CompilationPhase::NameResolution,
                            expr.span,
                            format!("std::make_unique requires a class type, found `{pointee}`"),
                        );
                    }
                    return poison(expr.span);
                };
                let lowered: Vec<HirExpr> =
                    args.iter().map(|a| self.lower_expr(a, ctx)).collect();
                match self.resolve_ctor(&struct_name, lowered, expr.span) {
                    Some((ctor, args)) => HirExpr::new(
                        HirExprKind::MakeUnique {
                            struct_name,
                            ctor,
                            args,
                        },
                        Ty::unique_ptr(pointee),
                        expr.span,
                    ),
                    None => poison(expr.span),
                }
            }
        }
    }

    fn lower_ident(&mut self, name: &str, span: Span, ctx: &mut FnCtx<'a>) -> HirExpr {
        if name == "std::cout" || name == "std::endl" {
            self.error(
                DiagnosticKind::SyntaxError,
                CompilationPhase::NameResolution,
                span,
                format!("`{name}` is only usable in an output statement"),
            );
            return poison(span);
        }
        if let Some(ty) = ctx.scopes.resolve(name) {
            return HirExpr::new(HirExprKind::Var(name.to_string()), ty.clone(), span);
        }
        // Inside member functions, unqualified names may be fields.
        if let Some(self_class) = &ctx.self_class {
            if let Some(field) = self
                .struct_fields
                .get(self_class)
                .and_then(|fields| fields.iter().find(|f| f.name == name))
            {
                let self_ty = Ty::ptr(Ty::Class(self_class.clone()));
                return HirExpr::new(
                    HirExprKind::Member {
                        obj: Box::new(HirExpr::new(HirExprKind::SelfRef, self_ty, span)),
                        field: name.to_string(),
                        through_ptr: true,
                    },
                    field.ty.clone(),
                    span,
                );
            }
        }
        // Template value parameters fold to literals.
        if let Some(TyArg::Value(value)) = ctx.subst.get(name) {
            let ty = ctx
                .template_params
                .iter()
                .find(|p| p.name == name)
                .and_then(|p| match &p.kind {
                    TemplateParamKind::Value(ty) => Some(ty.clone()),
                    TemplateParamKind::Type => None,
                })
                .map(|ty| self.resolve_ty(&ty, &Subst::new(), false, span))
                .unwrap_or(Ty::SizeT);
            return HirExpr::new(HirExprKind::Int(*value as i64), ty, span);
        }
        self.error(
            DiagnosticKind::UnresolvedName,
            CompilationPhase::NameResolution,
            span,
            format!("`{name}` was not declared in this scope"),
        );
        poison(span)
    }

    fn lower_unary(
        &mut self,
        op: UnaryOp,
        inner: &Expr,
        span: Span,
        ctx: &mut FnCtx<'a>,
    ) -> HirExpr {
        let value = self.lower_expr(inner, ctx);
        let ty = match op {
            UnaryOp::Neg => {
                if !value.ty.is_numeric() && value.ty != Ty::Error {
                    self.error(
                        DiagnosticKind::UnresolvedName,
                        CompilationPhase::NameResolution,
                        span,
                        format!("cannot negate `{}`", value.ty),
                    );
                }
                value.ty.clone()
            }
            UnaryOp::Not => {
                if !value.ty.is_truthy() {
                    self.error(
                        DiagnosticKind::UnresolvedName,
                        CompilationPhase::NameResolution,
                        span,
                        format!("`{}` is not usable as a condition", value.ty),
                    );
                }
                Ty::Bool
            }
            UnaryOp::Deref => match &value.ty {
                Ty::Ptr(inner) | Ty::UniquePtr(inner) => (**inner).clone(),
                Ty::Error => Ty::Error,
                other => {
                    self.error(
                        DiagnosticKind::UnresolvedName,
                        CompilationPhase::NameResolution,
                        span,
                        format!("cannot dereference `{other}`"),
                    );
                    Ty::Error
                }
            },
            UnaryOp::AddrOf => Ty::ptr(value.ty.clone()),
        };
        HirExpr::new(
            HirExprKind::Unary {
                op,
                expr: Box::new(value),
            },
            ty,
            span,
        )
    }

    fn lower_binary(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        span: Span,
        ctx: &mut FnCtx<'a>,
    ) -> HirExpr {
        if op == BinOp::Shl {
            self.error(
                DiagnosticKind::SyntaxError,
                CompilationPhase::NameResolution,
                span,
                "`<<` outside an output stream chain is not supported".to_string(),
            );
            return poison(span);
        }
        let lhs = self.lower_expr(lhs, ctx);
        let rhs = self.lower_expr(rhs, ctx);
        let ty = match op {
            BinOp::And | BinOp::Or => {
                if !lhs.ty.is_truthy() || !rhs.ty.is_truthy() {
                    self.error(
                        DiagnosticKind::UnresolvedName,
                        CompilationPhase::NameResolution,
                        span,
                        format!("invalid operands to logical operator (`{}`, `{}`)", lhs.ty, rhs.ty),
                    );
                }
                Ty::Bool
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne => {
                let pointers = matches!(lhs.ty, Ty::Ptr(_) | Ty::UniquePtr(_))
                    && matches!(rhs.ty, Ty::Ptr(_) | Ty::UniquePtr(_))
                    && matches!(op, BinOp::Eq | BinOp::Ne);
                let numeric = compatible(&lhs.ty, &rhs.ty)
                    && (lhs.ty.is_numeric() || lhs.ty == Ty::Error || rhs.ty == Ty::Error);
                let null_cmp = matches!(op, BinOp::Eq | BinOp::Ne)
                    && (lhs.ty == Ty::ptr(Ty::Void) || rhs.ty == Ty::ptr(Ty::Void));
                if !(pointers || numeric || null_cmp) {
                    self.error(
                        DiagnosticKind::UnresolvedName,
                        CompilationPhase::NameResolution,
                        span,
                        format!("invalid comparison between `{}` and `{}`", lhs.ty, rhs.ty),
                    );
                }
                Ty::Bool
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => {
                if !(lhs.ty.is_numeric() || lhs.ty == Ty::Error)
                    || !(rhs.ty.is_numeric() || rhs.ty == Ty::Error)
                {
                    self.error(
                        DiagnosticKind::UnresolvedName,
                        CompilationPhase::NameResolution,
                        span,
                        format!("invalid operands to arithmetic (`{}`, `{}`)", lhs.ty, rhs.ty),
                    );
                    Ty::Error
                } else if lhs.ty == Ty::SizeT || rhs.ty == Ty::SizeT {
                    Ty::SizeT
                } else {
                    Ty::Int
                }
            }
            BinOp::Shl => unreachable!("handled above"),
        };
        HirExpr::new(
            HirExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty,
            span,
        )
    }

    fn lower_assign(
        &mut self,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
        span: Span,
        ctx: &mut FnCtx<'a>,
    ) -> HirExpr {
        let target = self.lower_expr(target, ctx);
        if !matches!(
            target.kind,
            HirExprKind::Var(_)
                | HirExprKind::Member { .. }
                | HirExprKind::Index { .. }
                | HirExprKind::Unary {
                    op: UnaryOp::Deref,
                    ..
                }
        ) && target.ty != Ty::Error
        {
            self.error(
                DiagnosticKind::SyntaxError,
                CompilationPhase::NameResolution,
                span,
                "left operand of assignment is not assignable".to_string(),
            );
        }
        let value = self.lower_expr(value, ctx);
        if !compatible(&value.ty, &target.ty) {
            self.error(
                DiagnosticKind::UnresolvedName,
                CompilationPhase::NameResolution,
                span,
                format!("cannot assign `{}` to `{}`", value.ty, target.ty),
            );
        }
        if matches!(op, AssignOp::AddAssign | AssignOp::SubAssign)
            && !(target.ty.is_numeric() || target.ty == Ty::Error)
        {
            self.error(
                DiagnosticKind::SyntaxError,
                CompilationPhase::NameResolution,
                span,
                format!("compound assignment requires a numeric target, found `{}`", target.ty),
            );
        }
        let ty = target.ty.clone();
        HirExpr::new(
            HirExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            ty,
            span,
        )
    }

    fn lower_call(
        &mut self,
        callee: &str,
        template_args: &[TemplateArg],
        args: &[Expr],
        span: Span,
        ctx: &mut FnCtx<'a>,
    ) -> HirExpr {
        let lowered: Vec<HirExpr> = args.iter().map(|a| self.lower_expr(a, ctx)).collect();
        let arg_tys: Vec<Ty> = lowered.iter().map(|a| a.ty.clone()).collect();

        let explicit = match self.resolve_explicit_fn_args(template_args, ctx, span) {
            Some(explicit) => explicit,
            None => return poison(span),
        };

        enum Picked<'f> {
            Plain(&'f FunctionDef),
            Template(&'f FunctionDef, Vec<TyArg>, Subst),
        }

        let plain: Vec<&'a FunctionDef> = self
            .index
            .functions
            .get(callee)
            .map(|defs| defs.clone())
            .unwrap_or_default();
        let templated: Vec<&'a FunctionDef> = self
            .index
            .fn_templates
            .get(callee)
            .map(|defs| defs.clone())
            .unwrap_or_default();

        let mut candidates: Vec<OverloadCandidate<Picked<'a>>> = Vec::new();
        if explicit.is_empty() {
            for &def in &plain {
                let params: Vec<Ty> = def
                    .params
                    .iter()
                    .map(|p| self.peek_param_ty(p, &Subst::new(), span))
                    .collect();
                candidates.push(OverloadCandidate {
                    label: signature_label(def),
                    params,
                    required: def.params.iter().filter(|p| p.default.is_none()).count(),
                    payload: Picked::Plain(def),
                });
            }
        }
        for &def in &templated {
            let Some((key, subst)) = deduce(def, &arg_tys, &explicit) else {
                continue;
            };
            let params: Vec<Ty> = def
                .params
                .iter()
                .map(|p| self.peek_param_ty(p, &subst, span))
                .collect();
            candidates.push(OverloadCandidate {
                label: signature_label(def),
                params,
                required: def.params.iter().filter(|p| p.default.is_none()).count(),
                payload: Picked::Template(def, key, subst),
            });
        }

        if plain.is_empty() && templated.is_empty() {
            self.error(
                DiagnosticKind::UnresolvedName,
                CompilationPhase::NameResolution,
                span,
                format!("call to undeclared function `{callee}`"),
            );
            return poison(span);
        }

        let picked = match select_overload(candidates, &arg_tys) {
            Ok(picked) => picked,
            Err(OverloadError::NoMatch { candidates }) => {
                self.error(
                    DiagnosticKind::UnresolvedName,
                    CompilationPhase::NameResolution,
                    span,
                    format!(
                        "no matching function for call to `{callee}`; candidates are: {}",
                        candidates.join(", ")
                    ),
                );
                return poison(span);
            }
            Err(OverloadError::Ambiguous { candidates }) => {
                self.error(
                    DiagnosticKind::AmbiguousCall,
                    CompilationPhase::NameResolution,
                    span,
                    format!(
                        "call to `{callee}` is ambiguous; candidates are: {}",
                        candidates.join(", ")
                    ),
                );
                return poison(span);
            }
        };

        let (def, symbol, subst) = match picked.payload {
            Picked::Plain(def) => {
                let symbol = plain_symbol(&self.index, def);
                let symbol = if def.is_constexpr {
                    self.queue.request_plain_function(def, symbol)
                } else {
                    // Runtime functions were queued eagerly.
                    symbol
                };
                (def, symbol, Subst::new())
            }
            Picked::Template(def, key, subst) => {
                let symbol = self.queue.request_function(def, &key);
                (def, symbol, subst)
            }
        };

        let args = self.expand_default_args(def, lowered, &subst, span);
        let ret = self.resolve_ty(&def.ret, &subst, true, span);
        if matches!(ret, Ty::Array { .. }) {
            self.error(
                DiagnosticKind::SyntaxError,
                CompilationPhase::NameResolution,
                span,
                format!("`{callee}` returns an array by value, which is only supported in constant expressions"),
            );
            return poison(span);
        }
        HirExpr::new(HirExprKind::Call { func: symbol, args }, ret, span)
    }

    fn resolve_explicit_fn_args(
        &mut self,
        template_args: &[TemplateArg],
        ctx: &mut FnCtx<'a>,
        span: Span,
    ) -> Option<Vec<TyArg>> {
        let mut explicit = Vec::with_capacity(template_args.len());
        for arg in template_args {
            match arg {
                TemplateArg::Type(ty) => {
                    let resolved = self.resolve_ty(ty, &ctx.subst, true, span);
                    if resolved == Ty::Error {
                        return None;
                    }
                    explicit.push(TyArg::Ty(resolved));
                }
                TemplateArg::Value(expr) => {
                    match self.eval.eval_extent(&self.index, expr, &ctx.subst) {
                        Ok(value) => explicit.push(TyArg::Value(value)),
                        Err(err) => {
                            self.error(
                                DiagnosticKind::TemplateArgument,
                                CompilationPhase::Monomorphization,
                                err.span,
                                format!(
                                    "non-type template argument is not a compile-time constant: {}",
                                    err.message
                                ),
                            );
                            return None;
                        }
                    }
                }
            }
        }
        Some(explicit)
    }

    /// Expand missing trailing arguments from parameter defaults. Defaults
    /// in the subset are constant expressions; they are folded and spliced
    /// in as literals at each call-site.
    fn expand_default_args(
        &mut self,
        def: &FunctionDef,
        mut args: Vec<HirExpr>,
        subst: &Subst,
        span: Span,
    ) -> Vec<HirExpr> {
        if args.len() >= def.params.len() {
            return args;
        }
        for param in &def.params[args.len()..] {
            let Some(default) = &param.default else {
                // Arity was validated during overload selection.
                break;
            };
            match self.eval.eval_expr_at(&self.index, default, subst) {
                Ok(value) => args.push(const_to_expr(value, span)),
                Err(err) => {
                    self.error(
                        DiagnosticKind::NonConstantEvaluation,
                        CompilationPhase::ConstEvaluation,
                        span,
                        format!(
                            "default argument for `{}` is not a constant: {}",
                            param.name, err.message
                        ),
                    );
                    args.push(poison(span));
                }
            }
        }
        args
    }

    fn lower_method_call(
        &mut self,
        recv: &Expr,
        method: &str,
        args: &[Expr],
        arrow: bool,
        span: Span,
        ctx: &mut FnCtx<'a>,
    ) -> HirExpr {
        let recv = self.lower_expr(recv, ctx);
        let lowered: Vec<HirExpr> = args.iter().map(|a| self.lower_expr(a, ctx)).collect();

        match recv.ty.clone() {
            Ty::UniquePtr(inner) => {
                if method == "get" && lowered.is_empty() && !arrow {
                    return HirExpr::new(HirExprKind::GetRaw(Box::new(recv)), Ty::Ptr(inner), span);
                }
                self.error(
                    DiagnosticKind::UnresolvedName,
                    CompilationPhase::NameResolution,
                    span,
                    format!("`std::unique_ptr` has no supported member `{method}` here"),
                );
                poison(span)
            }
            Ty::Class(struct_name) => {
                if arrow {
                    self.error(
                        DiagnosticKind::SyntaxError,
                        CompilationPhase::NameResolution,
                        span,
                        "`->` used on a non-pointer receiver".to_string(),
                    );
                    return poison(span);
                }
                self.dispatch_method(&struct_name, method, recv, lowered, true, span)
            }
            Ty::Ptr(inner) => {
                let Ty::Class(struct_name) = *inner else {
                    self.error(
                        DiagnosticKind::UnresolvedName,
                        CompilationPhase::NameResolution,
                        span,
                        "method call on a non-class pointer".to_string(),
                    );
                    return poison(span);
                };
                if !arrow {
                    self.error(
                        DiagnosticKind::SyntaxError,
                        CompilationPhase::NameResolution,
                        span,
                        "`.` used on a pointer receiver".to_string(),
                    );
                    return poison(span);
                }
                self.dispatch_method(&struct_name, method, recv, lowered, false, span)
            }
            Ty::Error => poison(span),
            other => {
                self.error(
                    DiagnosticKind::UnresolvedName,
                    CompilationPhase::NameResolution,
                    span,
                    format!("`{other}` has no member functions"),
                );
                poison(span)
            }
        }
    }

    fn dispatch_method(
        &mut self,
        struct_name: &str,
        method: &str,
        recv: HirExpr,
        args: Vec<HirExpr>,
        recv_addr: bool,
        span: Span,
    ) -> HirExpr {
        let Some((def, subst)) = self
            .struct_defs
            .get(struct_name)
            .map(|d| (d.ast, d.subst.clone()))
        else {
            self.error(
                DiagnosticKind::UnresolvedName,
                CompilationPhase::NameResolution,
                span,
                format!("unknown class `{struct_name}`"),
            );
            return poison(span);
        };

        let arg_tys: Vec<Ty> = args.iter().map(|a| a.ty.clone()).collect();
        let mut candidates = Vec::new();
        for (i, m) in def.methods.iter().enumerate() {
            if m.name != method {
                continue;
            }
            let params: Vec<Ty> = m
                .params
                .iter()
                .map(|p| self.peek_param_ty(p, &subst, span))
                .collect();
            candidates.push(OverloadCandidate {
                label: format!("{}::{}", def.name, m.name),
                params,
                required: m.params.iter().filter(|p| p.default.is_none()).count(),
                payload: i,
            });
        }
        if candidates.is_empty() {
            self.error(
                DiagnosticKind::UnresolvedName,
                CompilationPhase::NameResolution,
                span,
                format!("`{}` has no member function `{method}`", def.name),
            );
            return poison(span);
        }
        let picked = match select_overload(candidates, &arg_tys) {
            Ok(picked) => picked,
            Err(OverloadError::NoMatch { candidates }) => {
                self.error(
                    DiagnosticKind::UnresolvedName,
                    CompilationPhase::NameResolution,
                    span,
                    format!(
                        "no matching member function for call to `{method}`; candidates are: {}",
                        candidates.join(", ")
                    ),
                );
                return poison(span);
            }
            Err(OverloadError::Ambiguous { candidates }) => {
                self.error(
                    DiagnosticKind::AmbiguousCall,
                    CompilationPhase::NameResolution,
                    span,
                    format!(
                        "call to `{method}` is ambiguous; candidates are: {}",
                        candidates.join(", ")
                    ),
                );
                return poison(span);
            }
        };

        let method_def = &def.methods[picked.payload];
        let symbol = method_symbol(struct_name, def, picked.payload);
        let fn_like = method_as_function(method_def, def);
        let args = self.expand_default_args(&fn_like, args, &subst, span);
        let ret = self.resolve_ty(&method_def.ret, &subst, true, span);
        HirExpr::new(
            HirExprKind::MethodCall {
                method: symbol,
                recv: Box::new(recv),
                args,
                recv_addr,
            },
            ret,
            span,
        )
    }

    fn lower_member(
        &mut self,
        obj: &Expr,
        field: &str,
        arrow: bool,
        span: Span,
        ctx: &mut FnCtx<'a>,
    ) -> HirExpr {
        let obj = self.lower_expr(obj, ctx);
        let (struct_name, through_ptr) = match &obj.ty {
            Ty::Class(name) => {
                if arrow {
                    self.error(
                        DiagnosticKind::SyntaxError,
                        CompilationPhase::NameResolution,
                        span,
                        "`->` used on a non-pointer value".to_string(),
                    );
                }
                (name.clone(), false)
            }
            Ty::Ptr(inner) | Ty::UniquePtr(inner) => match &**inner {
                Ty::Class(name) => {
                    if !arrow {
                        self.error(
                            DiagnosticKind::SyntaxError,
                            CompilationPhase::NameResolution,
                            span,
                            "`.` used on a pointer value".to_string(),
                        );
                    }
                    (name.clone(), true)
                }
                _ => {
                    self.error(
                        DiagnosticKind::UnresolvedName,
                        CompilationPhase::NameResolution,
                        span,
                        format!("`{}` has no members", obj.ty),
                    );
                    return poison(span);
                }
            },
            Ty::Error => return poison(span),
            other => {
                self.error(
                    DiagnosticKind::UnresolvedName,
                    CompilationPhase::NameResolution,
                    span,
                    format!("`{other}` has no members"),
                );
                return poison(span);
            }
        };

        let Some(field_def) = self
            .struct_fields
            .get(&struct_name)
            .and_then(|fields| fields.iter().find(|f| f.name == field))
        else {
            self.error(
                DiagnosticKind::UnresolvedName,
                CompilationPhase::NameResolution,
                span,
                format!("`{struct_name}` has no field `{field}`"),
            );
            return poison(span);
        };
        let ty = field_def.ty.clone();
        HirExpr::new(
            HirExprKind::Member {
                obj: Box::new(obj),
                field: field.to_string(),
                through_ptr,
            },
            ty,
            span,
        )
    }

    fn resolve_ctor(
        &mut self,
        struct_name: &str,
        args: Vec<HirExpr>,
        span: Span,
    ) -> Option<(String, Vec<HirExpr>)> {
        let Some((def, subst)) = self
            .struct_defs
            .get(struct_name)
            .map(|d| (d.ast, d.subst.clone()))
        else {
            self.error(
                DiagnosticKind::UnresolvedName,
                CompilationPhase::NameResolution,
                span,
                format!("unknown class `{struct_name}`"),
            );
            return None;
        };

        if def.ctors.is_empty() {
            if args.is_empty() {
                return Some((ctor_symbol(struct_name, 0), args));
            }
            self.error(
                DiagnosticKind::UnresolvedName,
                CompilationPhase::NameResolution,
                span,
                format!("`{}` has no constructor taking arguments", def.name),
            );
            return None;
        }

        let arg_tys: Vec<Ty> = args.iter().map(|a| a.ty.clone()).collect();
        let mut candidates = Vec::new();
        for (i, ctor) in def.ctors.iter().enumerate() {
            let params: Vec<Ty> = ctor
                .params
                .iter()
                .map(|p| self.peek_param_ty(p, &subst, span))
                .collect();
            candidates.push(OverloadCandidate {
                label: format!("{}::{}", def.name, def.name),
                params,
                required: ctor.params.iter().filter(|p| p.default.is_none()).count(),
                payload: i,
            });
        }
        let picked = match select_overload(candidates, &arg_tys) {
            Ok(picked) => picked,
            Err(OverloadError::NoMatch { .. }) => {
                self.error(
                    DiagnosticKind::UnresolvedName,
                    CompilationPhase::NameResolution,
                    span,
                    format!("no matching constructor for `{}`", def.name),
                );
                return None;
            }
            Err(OverloadError::Ambiguous { candidates }) => {
                self.error(
                    DiagnosticKind::AmbiguousCall,
                    CompilationPhase::NameResolution,
                    span,
                    format!(
                        "constructor call for `{}` is ambiguous; candidates are: {}",
                        def.name,
                        candidates.join(", ")
                    ),
                );
                return None;
            }
        };

        let ctor = &def.ctors[picked.payload];
        let fn_like = ctor_as_function(ctor, def);
        let args = self.expand_default_args(&fn_like, args, &subst, span);
        Some((ctor_symbol(struct_name, picked.payload), args))
    }
}

fn ctor_symbol(struct_name: &str, index: usize) -> String {
    if index == 0 {
        format!("{struct_name}_init")
    } else {
        format!("{struct_name}_init{}", index + 1)
    }
}

/// Deterministic symbol for the i-th method of a class. Same-name overloads
/// get positional suffixes; names that would collide with the generated
/// lifecycle functions are kept distinct.
fn method_symbol(struct_name: &str, def: &ClassDef, index: usize) -> String {
    let method = &def.methods[index];
    let mut base = format!("{struct_name}_{}", method.name);
    if method.name == "init" || method.name == "destroy" {
        base.push_str("_fn");
    }
    let earlier_same_name = def.methods[..index]
        .iter()
        .filter(|m| m.name == method.name)
        .count();
    if earlier_same_name > 0 {
        base.push_str(&format!("_{}", earlier_same_name + 1));
    }
    base
}

/// Symbol for a non-template function: overloads after the first get a
/// positional suffix so the generated C never collides.
fn plain_symbol(index: &ProgramIndex<'_>, def: &FunctionDef) -> String {
    let position = index
        .functions
        .get(def.name.as_str())
        .and_then(|defs| defs.iter().position(|d| std::ptr::eq(*d, def)))
        .unwrap_or(0);
    if position == 0 {
        def.name.clone()
    } else {
        format!("{}_{}", def.name, position + 1)
    }
}

fn signature_label(def: &FunctionDef) -> String {
    if def.template_params.is_empty() {
        format!("{}({} argument(s))", def.name, def.params.len())
    } else {
        format!(
            "{}<{} parameter(s)>({} argument(s))",
            def.name,
            def.template_params.len(),
            def.params.len()
        )
    }
}

/// View a method as a `FunctionDef` so default-argument expansion can be
/// shared between free functions, methods, and constructors.
fn method_as_function(method: &ast::Method, class: &ClassDef) -> FunctionDef {
    FunctionDef {
        name: method.name.clone(),
        template_params: class.template_params.clone(),
        is_constexpr: method.is_constexpr,
        ret: method.ret.clone(),
        params: method.params.clone(),
        body: method.body.clone(),
        span: method.span,
    }
}

fn ctor_as_function(ctor: &ast::Ctor, class: &ClassDef) -> FunctionDef {
    FunctionDef {
        name: class.name.clone(),
        template_params: class.template_params.clone(),
        is_constexpr: ctor.is_constexpr,
        ret: TypeExpr::Void,
        params: ctor.params.clone(),
        body: ctor.body.clone(),
        span: ctor.span,
    }
}

fn const_to_expr(value: ConstValue, span: Span) -> HirExpr {
    match value {
        ConstValue::Int(v) => HirExpr::new(HirExprKind::Int(v), Ty::Int, span),
        ConstValue::Bool(v) => HirExpr::new(HirExprKind::Bool(v), Ty::Bool, span),
        ConstValue::Str(v) => HirExpr::new(HirExprKind::Str(v), Ty::Str, span),
        ConstValue::Aggregate(_) => poison(span),
    }
}
