//! Compile-time interpreter for `constexpr` code.
//!
//! A small tree-walking evaluator over the parsed AST with a bounded call
//! depth and a bounded step count, so evaluation always terminates. Results
//! are memoized per (function instantiation, argument values) within one
//! compilation, which is what keeps the recursive-Fibonacci-in-a-loop
//! pattern from going exponential.

use crate::mono::deduce;
use crate::symbols::{OverloadCandidate, OverloadError, ProgramIndex, select_overload};
use crate::types::{Subst, Ty, TyArg, mangle_instantiation};
use cxx2c_ast::{
    AssignOp, BinOp, Block, Expr, ExprKind, FunctionDef, IncDecOp, Stmt, TemplateArg, TypeExpr,
    UnaryOp, VarInit,
};
use cxx2c_core::{DiagnosticKind, Span};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MAX_CALL_DEPTH: usize = 256;
pub const MAX_STEPS: usize = 1 << 20;

/// A fully-evaluated compile-time value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub enum ConstValue {
    Int(i64),
    Bool(bool),
    Str(String),
    Aggregate(Vec<ConstValue>),
}

impl ConstValue {
    /// The resolved type of this value, if it has a scalar-or-array shape.
    pub fn type_of(&self) -> Option<Ty> {
        match self {
            ConstValue::Int(_) => Some(Ty::Int),
            ConstValue::Bool(_) => Some(Ty::Bool),
            ConstValue::Str(_) => Some(Ty::Str),
            ConstValue::Aggregate(values) => {
                let elem = values.first()?.type_of()?;
                Some(Ty::Array {
                    elem: Box::new(elem),
                    len: values.len() as u64,
                })
            }
        }
    }

    fn truthy(&self, span: Span) -> EvalResult<bool> {
        match self {
            ConstValue::Bool(b) => Ok(*b),
            ConstValue::Int(i) => Ok(*i != 0),
            _ => Err(EvalError::non_constant(
                "value is not usable as a condition",
                span,
            )),
        }
    }

    fn as_int(&self, span: Span) -> EvalResult<i64> {
        match self {
            ConstValue::Int(i) => Ok(*i),
            ConstValue::Bool(b) => Ok(*b as i64),
            _ => Err(EvalError::non_constant("expected an integer value", span)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Span,
}

impl EvalError {
    fn non_constant(message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: DiagnosticKind::NonConstantEvaluation,
            message: message.into(),
            span,
        }
    }

    fn limit(message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: DiagnosticKind::EvaluationLimitExceeded,
            message: message.into(),
            span,
        }
    }
}

pub type EvalResult<T> = Result<T, EvalError>;

enum Flow {
    Normal,
    Break,
    Continue,
    Return(ConstValue),
}

struct Frame {
    scopes: Vec<HashMap<String, ConstValue>>,
    subst: Subst,
}

impl Frame {
    fn new(subst: Subst) -> Self {
        Self {
            scopes: vec![HashMap::new()],
            subst,
        }
    }

    fn declare(&mut self, name: &str, value: ConstValue) {
        self.scopes
            .last_mut()
            .expect("frame always has a scope")
            .insert(name.to_string(), value);
    }

    fn get(&self, name: &str) -> Option<&ConstValue> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut ConstValue> {
        self.scopes.iter_mut().rev().find_map(|s| s.get_mut(name))
    }
}

/// The memoizing evaluator. One instance lives for the whole compilation of
/// a unit, so repeated constant calls are computed once.
#[derive(Default)]
pub struct ConstEvaluator {
    memo: HashMap<(String, Vec<ConstValue>), ConstValue>,
    steps: usize,
}

impl ConstEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate an expression in a constant context. `subst` provides the
    /// template parameters of the enclosing instantiation, if any.
    pub fn eval_expr_at(
        &mut self,
        index: &ProgramIndex<'_>,
        expr: &Expr,
        subst: &Subst,
    ) -> EvalResult<ConstValue> {
        self.steps = 0;
        let mut frame = Frame::new(subst.clone());
        self.eval_expr(index, expr, &mut frame, 0)
    }

    /// Evaluate an array extent or non-type template argument: must be a
    /// non-negative integer constant.
    pub fn eval_extent(
        &mut self,
        index: &ProgramIndex<'_>,
        expr: &Expr,
        subst: &Subst,
    ) -> EvalResult<u64> {
        self.steps = 0;
        self.eval_extent_inner(index, expr, subst)
    }

    /// As [`Self::eval_extent`], but without resetting the step count —
    /// used for extents encountered mid-evaluation so loops cannot dodge
    /// the limit by declaring arrays.
    fn eval_extent_inner(
        &mut self,
        index: &ProgramIndex<'_>,
        expr: &Expr,
        subst: &Subst,
    ) -> EvalResult<u64> {
        let mut frame = Frame::new(subst.clone());
        let value = self.eval_expr(index, expr, &mut frame, 0)?;
        let int = value.as_int(expr.span)?;
        u64::try_from(int).map_err(|_| {
            EvalError::non_constant(format!("array extent `{int}` is negative"), expr.span)
        })
    }

    fn tick(&mut self, span: Span) -> EvalResult<()> {
        self.steps += 1;
        if self.steps > MAX_STEPS {
            return Err(EvalError::limit(
                format!("constant evaluation exceeded {MAX_STEPS} steps"),
                span,
            ));
        }
        Ok(())
    }

    fn eval_expr(
        &mut self,
        index: &ProgramIndex<'_>,
        expr: &Expr,
        frame: &mut Frame,
        depth: usize,
    ) -> EvalResult<ConstValue> {
        self.tick(expr.span)?;
        match &expr.kind {
            ExprKind::IntLit(value) => Ok(ConstValue::Int(*value)),
            ExprKind::BoolLit(value) => Ok(ConstValue::Bool(*value)),
            ExprKind::StrLit(value) => Ok(ConstValue::Str(value.clone())),
            ExprKind::NullPtr => Err(EvalError::non_constant(
                "`nullptr` is not usable in this constant expression",
                expr.span,
            )),
            ExprKind::Ident(name) => {
                if let Some(value) = frame.get(name) {
                    return Ok(value.clone());
                }
                if let Some(TyArg::Value(value)) = frame.subst.get(name) {
                    return Ok(ConstValue::Int(*value as i64));
                }
                Err(EvalError::non_constant(
                    format!("`{name}` is not a constant"),
                    expr.span,
                ))
            }
            ExprKind::Unary { op, expr: inner } => {
                let value = self.eval_expr(index, inner, frame, depth)?;
                match op {
                    UnaryOp::Neg => {
                        let int = value.as_int(expr.span)?;
                        int.checked_neg()
                            .map(ConstValue::Int)
                            .ok_or_else(|| EvalError::non_constant("integer overflow", expr.span))
                    }
                    UnaryOp::Not => Ok(ConstValue::Bool(!value.truthy(expr.span)?)),
                    UnaryOp::Deref | UnaryOp::AddrOf => Err(EvalError::non_constant(
                        "pointers are not usable in constant expressions",
                        expr.span,
                    )),
                }
            }
            ExprKind::IncDec { op, prefix, expr: inner } => {
                let place = self.place(index, inner, frame, depth)?;
                let old = place.as_int(inner.span)?;
                let new = match op {
                    IncDecOp::Inc => old.checked_add(1),
                    IncDecOp::Dec => old.checked_sub(1),
                }
                .ok_or_else(|| EvalError::non_constant("integer overflow", expr.span))?;
                *place = ConstValue::Int(new);
                Ok(ConstValue::Int(if *prefix { new } else { old }))
            }
            ExprKind::Binary { op, lhs, rhs } => {
                if matches!(op, BinOp::And | BinOp::Or) {
                    let left = self.eval_expr(index, lhs, frame, depth)?.truthy(lhs.span)?;
                    return match (op, left) {
                        (BinOp::And, false) => Ok(ConstValue::Bool(false)),
                        (BinOp::Or, true) => Ok(ConstValue::Bool(true)),
                        _ => {
                            let right =
                                self.eval_expr(index, rhs, frame, depth)?.truthy(rhs.span)?;
                            Ok(ConstValue::Bool(right))
                        }
                    };
                }
                let left = self.eval_expr(index, lhs, frame, depth)?;
                let right = self.eval_expr(index, rhs, frame, depth)?;
                binary_op(*op, &left, &right, expr.span)
            }
            ExprKind::Assign { op, target, value } => {
                let new_value = self.eval_expr(index, value, frame, depth)?;
                let place = self.place(index, target, frame, depth)?;
                let result = match op {
                    AssignOp::Assign => new_value,
                    AssignOp::AddAssign => {
                        binary_op(BinOp::Add, place, &new_value, expr.span)?
                    }
                    AssignOp::SubAssign => {
                        binary_op(BinOp::Sub, place, &new_value, expr.span)?
                    }
                };
                *place = result.clone();
                Ok(result)
            }
            ExprKind::Index { obj, index: idx } => {
                let i = self.eval_expr(index, idx, frame, depth)?.as_int(idx.span)?;
                let base = self.eval_expr(index, obj, frame, depth)?;
                match base {
                    ConstValue::Aggregate(values) => {
                        values.get(i as usize).cloned().ok_or_else(|| {
                            EvalError::non_constant(
                                format!("array index {i} out of bounds"),
                                expr.span,
                            )
                        })
                    }
                    _ => Err(EvalError::non_constant(
                        "subscript on a non-array value",
                        expr.span,
                    )),
                }
            }
            ExprKind::Call {
                callee,
                template_args,
                args,
            } => {
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(self.eval_expr(index, arg, frame, depth)?);
                }
                self.resolve_and_call(index, callee, template_args, arg_values, frame, depth, expr.span)
            }
            ExprKind::StaticCast { ty, expr: inner } => {
                let value = self.eval_expr(index, inner, frame, depth)?;
                let target = self.resolve_value_ty(index, ty, &frame.subst).ok_or_else(|| {
                    EvalError::non_constant("unsupported cast target", expr.span)
                })?;
                match target {
                    Ty::Int | Ty::SizeT => Ok(ConstValue::Int(value.as_int(expr.span)?)),
                    Ty::Bool => Ok(ConstValue::Bool(value.truthy(expr.span)?)),
                    _ => Err(EvalError::non_constant(
                        "only numeric casts are usable in constant expressions",
                        expr.span,
                    )),
                }
            }
            ExprKind::MethodCall { .. }
            | ExprKind::Member { .. }
            | ExprKind::Move(_)
            | ExprKind::MakeUnique { .. } => Err(EvalError::non_constant(
                "expression is not usable in a constant expression",
                expr.span,
            )),
        }
    }

    /// Resolve an lvalue path to its storage slot. The index expression is
    /// evaluated before the base is borrowed mutably.
    fn place<'f>(
        &mut self,
        index: &ProgramIndex<'_>,
        expr: &Expr,
        frame: &'f mut Frame,
        depth: usize,
    ) -> EvalResult<&'f mut ConstValue> {
        match &expr.kind {
            ExprKind::Ident(name) => {
                if frame.get(name).is_none() {
                    return Err(EvalError::non_constant(
                        format!("`{name}` is not a mutable constant-evaluation local"),
                        expr.span,
                    ));
                }
                Ok(frame.get_mut(name).expect("checked above"))
            }
            ExprKind::Index { obj, index: idx } => {
                let i = self.eval_expr(index, idx, frame, depth)?.as_int(idx.span)? as usize;
                let base = self.place(index, obj, frame, depth)?;
                match base {
                    ConstValue::Aggregate(values) => values.get_mut(i).ok_or_else(|| {
                        EvalError::non_constant(
                            format!("array index {i} out of bounds"),
                            expr.span,
                        )
                    }),
                    _ => Err(EvalError::non_constant(
                        "subscript on a non-array value",
                        expr.span,
                    )),
                }
            }
            _ => Err(EvalError::non_constant(
                "expression is not assignable in a constant expression",
                expr.span,
            )),
        }
    }

    fn resolve_and_call(
        &mut self,
        index: &ProgramIndex<'_>,
        callee: &str,
        template_args: &[TemplateArg],
        args: Vec<ConstValue>,
        frame: &mut Frame,
        depth: usize,
        span: Span,
    ) -> EvalResult<ConstValue> {
        let mut arg_tys = Vec::with_capacity(args.len());
        for value in &args {
            arg_tys.push(value.type_of().ok_or_else(|| {
                EvalError::non_constant("aggregate arguments are not supported", span)
            })?);
        }

        let explicit = self.resolve_explicit_args(index, template_args, frame, span)?;

        struct Picked<'a> {
            def: &'a FunctionDef,
            subst: Subst,
            key: Vec<TyArg>,
        }

        let mut candidates: Vec<OverloadCandidate<Picked<'_>>> = Vec::new();
        if let Some(defs) = index.functions.get(callee) {
            for &def in defs {
                let mut params = Vec::new();
                let mut ok = true;
                for param in &def.params {
                    match self.resolve_value_ty(index, &param.ty, &Subst::new()) {
                        Some(ty) => params.push(ty),
                        None => {
                            ok = false;
                            break;
                        }
                    }
                }
                if !ok {
                    continue;
                }
                let required = def.params.iter().filter(|p| p.default.is_none()).count();
                candidates.push(OverloadCandidate {
                    label: format!("{}/{}", def.name, def.params.len()),
                    params,
                    required,
                    payload: Picked {
                        def,
                        subst: Subst::new(),
                        key: Vec::new(),
                    },
                });
            }
        }
        if let Some(defs) = index.fn_templates.get(callee) {
            for &def in defs {
                let Some((key, subst)) = deduce(def, &arg_tys, &explicit) else {
                    continue;
                };
                let mut params = Vec::new();
                let mut ok = true;
                for param in &def.params {
                    match self.resolve_value_ty(index, &param.ty, &subst) {
                        Some(ty) => params.push(ty),
                        None => {
                            ok = false;
                            break;
                        }
                    }
                }
                if !ok {
                    continue;
                }
                let required = def.params.iter().filter(|p| p.default.is_none()).count();
                candidates.push(OverloadCandidate {
                    label: format!("{}<{}>", def.name, key.len()),
                    params,
                    required,
                    payload: Picked { def, subst, key },
                });
            }
        }

        let picked = select_overload(candidates, &arg_tys).map_err(|err| match err {
            OverloadError::NoMatch { .. } => EvalError::non_constant(
                format!("no constant-evaluable function `{callee}` matches this call"),
                span,
            ),
            OverloadError::Ambiguous { candidates } => EvalError::non_constant(
                format!(
                    "ambiguous call to `{callee}`; candidates are: {}",
                    candidates.join(", ")
                ),
                span,
            ),
        })?;

        let Picked { def, subst, key } = picked.payload;
        if !def.is_constexpr {
            return Err(EvalError::non_constant(
                format!("call to non-constexpr function `{callee}`"),
                span,
            ));
        }
        let symbol = if key.is_empty() {
            def.name.clone()
        } else {
            mangle_instantiation(&def.name, &key)
        };
        self.call_function(index, def, subst, symbol, args, depth, span)
    }

    fn resolve_explicit_args(
        &mut self,
        index: &ProgramIndex<'_>,
        template_args: &[TemplateArg],
        frame: &mut Frame,
        span: Span,
    ) -> EvalResult<Vec<TyArg>> {
        let mut explicit = Vec::with_capacity(template_args.len());
        for arg in template_args {
            match arg {
                TemplateArg::Type(ty) => {
                    let resolved =
                        self.resolve_value_ty(index, ty, &frame.subst).ok_or_else(|| {
                            EvalError::non_constant("unsupported template argument", span)
                        })?;
                    explicit.push(TyArg::Ty(resolved));
                }
                TemplateArg::Value(expr) => {
                    let value = self.eval_expr(index, expr, frame, 0)?.as_int(expr.span)?;
                    let value = u64::try_from(value).map_err(|_| {
                        EvalError::non_constant("negative template argument", expr.span)
                    })?;
                    explicit.push(TyArg::Value(value));
                }
            }
        }
        Ok(explicit)
    }

    fn call_function(
        &mut self,
        index: &ProgramIndex<'_>,
        def: &FunctionDef,
        subst: Subst,
        symbol: String,
        mut args: Vec<ConstValue>,
        depth: usize,
        span: Span,
    ) -> EvalResult<ConstValue> {
        if depth >= MAX_CALL_DEPTH {
            return Err(EvalError::limit(
                format!("constant evaluation exceeded a call depth of {MAX_CALL_DEPTH}"),
                span,
            ));
        }

        let mut frame = Frame::new(subst);

        // Expand defaulted trailing arguments before building the memo key,
        // so `f()` and `f(default)` share an entry.
        if args.len() < def.params.len() {
            for param in &def.params[args.len()..] {
                let default = param.default.as_ref().ok_or_else(|| {
                    EvalError::non_constant(
                        format!("missing argument for parameter `{}`", param.name),
                        span,
                    )
                })?;
                let value = self.eval_expr(index, default, &mut frame, depth + 1)?;
                args.push(value);
            }
        }

        let memo_key = (symbol, args.clone());
        if let Some(hit) = self.memo.get(&memo_key) {
            return Ok(hit.clone());
        }

        for (param, value) in def.params.iter().zip(&args) {
            frame.declare(&param.name, value.clone());
        }

        let flow = self.eval_block(index, &def.body, &mut frame, depth + 1)?;
        let result = match flow {
            Flow::Return(value) => value,
            Flow::Normal => {
                return Err(EvalError::non_constant(
                    format!("constexpr function `{}` did not return a value", def.name),
                    def.span,
                ));
            }
            Flow::Break | Flow::Continue => {
                return Err(EvalError::non_constant(
                    "`break`/`continue` escaped a function body",
                    def.span,
                ));
            }
        };

        self.memo.insert(memo_key, result.clone());
        Ok(result)
    }

    fn eval_block(
        &mut self,
        index: &ProgramIndex<'_>,
        block: &Block,
        frame: &mut Frame,
        depth: usize,
    ) -> EvalResult<Flow> {
        frame.scopes.push(HashMap::new());
        let result = self.eval_stmts(index, &block.stmts, frame, depth);
        frame.scopes.pop();
        result
    }

    fn eval_stmts(
        &mut self,
        index: &ProgramIndex<'_>,
        stmts: &[Stmt],
        frame: &mut Frame,
        depth: usize,
    ) -> EvalResult<Flow> {
        for stmt in stmts {
            match self.eval_stmt(index, stmt, frame, depth)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn eval_stmt(
        &mut self,
        index: &ProgramIndex<'_>,
        stmt: &Stmt,
        frame: &mut Frame,
        depth: usize,
    ) -> EvalResult<Flow> {
        match stmt {
            Stmt::Decl(decl) => {
                self.tick(decl.span)?;
                let value = match &decl.init {
                    VarInit::Assign(expr) => self.eval_expr(index, expr, frame, depth)?,
                    VarInit::None | VarInit::Brace(..) => {
                        let init_args = match &decl.init {
                            VarInit::Brace(args) => args.as_slice(),
                            _ => &[],
                        };
                        if !init_args.is_empty() {
                            return Err(EvalError::non_constant(
                                "brace initializers with arguments are not supported here",
                                decl.span,
                            ));
                        }
                        let ty = self
                            .resolve_value_ty(index, &decl.ty, &frame.subst)
                            .ok_or_else(|| {
                                EvalError::non_constant(
                                    "cannot default-initialize this type at compile time",
                                    decl.span,
                                )
                            })?;
                        default_value(&ty, decl.span)?
                    }
                    VarInit::Construct(_) => {
                        return Err(EvalError::non_constant(
                            "constructor calls are not usable in constant expressions",
                            decl.span,
                        ));
                    }
                };
                frame.declare(&decl.name, value);
                Ok(Flow::Normal)
            }
            Stmt::Expr(expr) => {
                self.eval_expr(index, expr, frame, depth)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
                ..
            } => {
                let taken = self.eval_expr(index, cond, frame, depth)?.truthy(cond.span)?;
                if taken {
                    self.eval_block(index, then_block, frame, depth)
                } else if let Some(else_block) = else_block {
                    self.eval_block(index, else_block, frame, depth)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { cond, body, span } => {
                loop {
                    self.tick(*span)?;
                    if !self.eval_expr(index, cond, frame, depth)?.truthy(cond.span)? {
                        break;
                    }
                    match self.eval_block(index, body, frame, depth)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
                span,
            } => {
                frame.scopes.push(HashMap::new());
                let result = (|| {
                    if let Some(init) = init {
                        match self.eval_stmt(index, init, frame, depth)? {
                            Flow::Normal => {}
                            other => return Ok(other),
                        }
                    }
                    loop {
                        self.tick(*span)?;
                        if let Some(cond) = cond {
                            if !self.eval_expr(index, cond, frame, depth)?.truthy(cond.span)? {
                                break;
                            }
                        }
                        match self.eval_block(index, body, frame, depth)? {
                            Flow::Normal | Flow::Continue => {}
                            Flow::Break => break,
                            ret @ Flow::Return(_) => return Ok(ret),
                        }
                        if let Some(step) = step {
                            self.eval_expr(index, step, frame, depth)?;
                        }
                    }
                    Ok(Flow::Normal)
                })();
                frame.scopes.pop();
                result
            }
            Stmt::RangeFor {
                var,
                iterable,
                body,
                span,
            } => {
                let values = match self.eval_expr(index, iterable, frame, depth)? {
                    ConstValue::Aggregate(values) => values,
                    _ => {
                        return Err(EvalError::non_constant(
                            "range-for over a non-array value",
                            *span,
                        ));
                    }
                };
                for value in values {
                    self.tick(*span)?;
                    frame.scopes.push(HashMap::new());
                    frame.declare(var, value);
                    let flow = self.eval_stmts(index, &body.stmts, frame, depth);
                    frame.scopes.pop();
                    match flow? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(value, span) => {
                self.tick(*span)?;
                let value = match value {
                    Some(expr) => self.eval_expr(index, expr, frame, depth)?,
                    None => {
                        return Err(EvalError::non_constant(
                            "constexpr function returned no value",
                            *span,
                        ));
                    }
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break(_) => Ok(Flow::Break),
            Stmt::Continue(_) => Ok(Flow::Continue),
            Stmt::Block(block) => self.eval_block(index, block, frame, depth),
        }
    }

    /// Resolve a written type to a concrete value type inside the evaluator:
    /// template parameters come from `subst`, array extents are themselves
    /// constant-evaluated. Class types are not constant-evaluable and
    /// resolve to None.
    fn resolve_value_ty(
        &mut self,
        index: &ProgramIndex<'_>,
        ty: &TypeExpr,
        subst: &Subst,
    ) -> Option<Ty> {
        match ty {
            TypeExpr::Void => Some(Ty::Void),
            TypeExpr::Bool => Some(Ty::Bool),
            TypeExpr::Int => Some(Ty::Int),
            TypeExpr::SizeT => Some(Ty::SizeT),
            TypeExpr::StdString => Some(Ty::Str),
            TypeExpr::Auto => None,
            TypeExpr::Named(name) => match subst.get(name) {
                Some(TyArg::Ty(ty)) => Some(ty.clone()),
                _ => None,
            },
            TypeExpr::ConstRef(inner) | TypeExpr::Ref(inner) => {
                self.resolve_value_ty(index, inner, subst)
            }
            TypeExpr::StdArray(elem, len) => {
                let elem = self.resolve_value_ty(index, elem, subst)?;
                let len = self.eval_extent_inner(index, len, subst).ok()?;
                Some(Ty::Array {
                    elem: Box::new(elem),
                    len,
                })
            }
            TypeExpr::UniquePtr(_) | TypeExpr::Ptr(_) | TypeExpr::Instantiation(..) => None,
        }
    }
}

fn default_value(ty: &Ty, span: Span) -> EvalResult<ConstValue> {
    match ty {
        Ty::Int | Ty::SizeT => Ok(ConstValue::Int(0)),
        Ty::Bool => Ok(ConstValue::Bool(false)),
        Ty::Str => Ok(ConstValue::Str(String::new())),
        Ty::Array { elem, len } => {
            let elem_default = default_value(elem, span)?;
            Ok(ConstValue::Aggregate(vec![elem_default; *len as usize]))
        }
        _ => Err(EvalError::non_constant(
            "type has no compile-time default value",
            span,
        )),
    }
}

fn binary_op(op: BinOp, lhs: &ConstValue, rhs: &ConstValue, span: Span) -> EvalResult<ConstValue> {
    if let (ConstValue::Str(a), ConstValue::Str(b)) = (lhs, rhs) {
        return match op {
            BinOp::Eq => Ok(ConstValue::Bool(a == b)),
            BinOp::Ne => Ok(ConstValue::Bool(a != b)),
            _ => Err(EvalError::non_constant(
                "unsupported string operation in constant expression",
                span,
            )),
        };
    }
    let a = lhs.as_int(span)?;
    let b = rhs.as_int(span)?;
    let arith = |result: Option<i64>| {
        result
            .map(ConstValue::Int)
            .ok_or_else(|| EvalError::non_constant("integer overflow", span))
    };
    match op {
        BinOp::Add => arith(a.checked_add(b)),
        BinOp::Sub => arith(a.checked_sub(b)),
        BinOp::Mul => arith(a.checked_mul(b)),
        BinOp::Div => {
            if b == 0 {
                Err(EvalError::non_constant("division by zero", span))
            } else {
                arith(a.checked_div(b))
            }
        }
        BinOp::Rem => {
            if b == 0 {
                Err(EvalError::non_constant("remainder by zero", span))
            } else {
                arith(a.checked_rem(b))
            }
        }
        BinOp::Lt => Ok(ConstValue::Bool(a < b)),
        BinOp::Le => Ok(ConstValue::Bool(a <= b)),
        BinOp::Gt => Ok(ConstValue::Bool(a > b)),
        BinOp::Ge => Ok(ConstValue::Bool(a >= b)),
        BinOp::Eq => Ok(ConstValue::Bool(a == b)),
        BinOp::Ne => Ok(ConstValue::Bool(a != b)),
        BinOp::And | BinOp::Or => unreachable!("short-circuit operators handled by caller"),
        BinOp::Shl => Err(EvalError::non_constant(
            "`<<` is not usable in constant expressions",
            span,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cxx2c_ast::Parser;

    fn eval_main_call(source: &str, call: &str) -> EvalResult<ConstValue> {
        let (_, items) = Parser::parse_source(source).expect("parse");
        let (index, diags) = ProgramIndex::build(&items);
        assert!(diags.is_empty(), "index diagnostics: {diags:?}");
        let (_, call_items) =
            Parser::parse_source(&format!("constexpr int probe() {{ return {call}; }}\n"))
                .expect("parse probe");
        let cxx2c_ast::Item::Function(probe) = &call_items[0] else {
            panic!("expected probe function");
        };
        let cxx2c_ast::Stmt::Return(Some(expr), _) = &probe.body.stmts[0] else {
            panic!("expected return");
        };
        ConstEvaluator::new().eval_expr_at(&index, expr, &Subst::new())
    }

    const FIB: &str = "template<typename T>\nconstexpr T fibonacci(T n) {\n    if (n <= 1) return n;\n    return fibonacci(n - 1) + fibonacci(n - 2);\n}\n";

    #[test]
    fn fibonacci_sequence_matches_definition() {
        let expected = [0, 1, 1, 2, 3, 5, 8, 13, 21, 34];
        for (n, want) in expected.iter().enumerate() {
            let got = eval_main_call(FIB, &format!("fibonacci({n})")).expect("eval");
            assert_eq!(got, ConstValue::Int(*want), "fibonacci({n})");
        }
    }

    #[test]
    fn memoization_keeps_deep_fibonacci_cheap() {
        let got = eval_main_call(FIB, "fibonacci(40)").expect("eval");
        assert_eq!(got, ConstValue::Int(102_334_155));
    }

    #[test]
    fn loop_and_array_fill_evaluates() {
        let source = concat!(
            "template<typename T>\nconstexpr T fibonacci(T n) {\n    if (n <= 1) return n;\n    return fibonacci(n - 1) + fibonacci(n - 2);\n}\n",
            "constexpr std::array<int, 10> generateFibSequence() {\n",
            "    std::array<int, 10> result{};\n",
            "    for (int i = 0; i < 10; ++i) {\n",
            "        result[i] = fibonacci(i);\n",
            "    }\n",
            "    return result;\n",
            "}\n",
        );
        let got = eval_main_call(source, "generateFibSequence()[9]").expect("eval");
        assert_eq!(got, ConstValue::Int(34));
    }

    #[test]
    fn unbounded_recursion_hits_depth_limit() {
        let source = "constexpr int spin(int n) { return spin(n + 1); }\n";
        let err = eval_main_call(source, "spin(0)").unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::EvaluationLimitExceeded);
    }

    #[test]
    fn infinite_loop_hits_step_limit() {
        let source = "constexpr int hang() { while (true) { } return 0; }\n";
        let err = eval_main_call(source, "hang()").unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::EvaluationLimitExceeded);
    }

    #[test]
    fn non_constexpr_call_is_rejected() {
        let source = "int runtimeOnly(int n) { return n; }\n";
        let err = eval_main_call(source, "runtimeOnly(1)").unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::NonConstantEvaluation);
    }

    #[test]
    fn division_by_zero_is_not_constant() {
        let err = eval_main_call("", "1 / 0").unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::NonConstantEvaluation);
    }
}
