//! Template monomorphization: instantiation keys, the deduplicating work
//! queue, and template-argument deduction.
//!
//! Substitution is carried as an environment while a template body is
//! lowered, rather than by rewriting the AST; the queue only records which
//! (template, arguments) pairs still need a lowered body.

use crate::types::{Subst, Ty, TyArg, mangle_instantiation};
use cxx2c_ast::{ClassDef, FunctionDef, TemplateParam, TemplateParamKind, TypeExpr};
use std::collections::{BTreeSet, VecDeque};
use tracing::trace;

pub enum PendingInst<'a> {
    Class {
        def: &'a ClassDef,
        subst: Subst,
        name: String,
    },
    Function {
        def: &'a FunctionDef,
        subst: Subst,
        name: String,
    },
}

/// Deduplicating instantiation queue. At most one body is ever produced per
/// key; every call-site with the same key shares the generated symbol.
#[derive(Default)]
pub struct InstantiationQueue<'a> {
    pending: VecDeque<PendingInst<'a>>,
    seen: BTreeSet<String>,
}

impl<'a> InstantiationQueue<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a class instantiation, returning its symbol. Enqueues the
    /// body exactly once per key.
    pub fn request_class(&mut self, def: &'a ClassDef, args: &[TyArg]) -> String {
        let name = mangle_instantiation(&def.name, args);
        if self.seen.insert(name.clone()) {
            trace!("instantiating class {name}");
            self.pending.push_back(PendingInst::Class {
                def,
                subst: build_subst(&def.template_params, args),
                name: name.clone(),
            });
        }
        name
    }

    /// Request a function instantiation, returning its symbol.
    pub fn request_function(&mut self, def: &'a FunctionDef, args: &[TyArg]) -> String {
        let name = mangle_instantiation(&def.name, args);
        if self.seen.insert(name.clone()) {
            trace!("instantiating function {name}");
            self.pending.push_back(PendingInst::Function {
                def,
                subst: build_subst(&def.template_params, args),
                name: name.clone(),
            });
        }
        name
    }

    /// Request lowering of a non-template function under its final symbol.
    /// Used eagerly for runtime functions and on demand for constexpr
    /// functions reachable from runtime code.
    pub fn request_plain_function(&mut self, def: &'a FunctionDef, symbol: String) -> String {
        if self.seen.insert(symbol.clone()) {
            self.pending.push_back(PendingInst::Function {
                def,
                subst: Subst::new(),
                name: symbol.clone(),
            });
        }
        symbol
    }

    /// Mark an eagerly-lowered symbol so demand requests do not re-enqueue it.
    pub fn mark_done(&mut self, name: &str) {
        self.seen.insert(name.to_string());
    }

    pub fn pop(&mut self) -> Option<PendingInst<'a>> {
        self.pending.pop_front()
    }
}

pub fn build_subst(params: &[TemplateParam], args: &[TyArg]) -> Subst {
    params
        .iter()
        .zip(args)
        .map(|(param, arg)| (param.name.clone(), arg.clone()))
        .collect()
}

/// Deduce template arguments for a call `def(args...)`, optionally seeded
/// with explicit arguments. Returns the ordered argument list (the
/// instantiation key) and the substitution, or None if deduction fails.
pub fn deduce(def: &FunctionDef, arg_tys: &[Ty], explicit: &[TyArg]) -> Option<(Vec<TyArg>, Subst)> {
    if explicit.len() > def.template_params.len() {
        return None;
    }
    let mut bindings = Subst::new();
    for (param, arg) in def.template_params.iter().zip(explicit) {
        match (&param.kind, arg) {
            (TemplateParamKind::Type, TyArg::Ty(_)) => {
                bindings.insert(param.name.clone(), arg.clone());
            }
            (TemplateParamKind::Value(_), TyArg::Value(_)) => {
                bindings.insert(param.name.clone(), arg.clone());
            }
            _ => return None,
        }
    }

    for (param, arg_ty) in def.params.iter().zip(arg_tys) {
        if !unify(&param.ty, arg_ty, &def.template_params, &mut bindings) {
            return None;
        }
    }

    let mut ordered = Vec::with_capacity(def.template_params.len());
    for param in &def.template_params {
        ordered.push(bindings.get(&param.name)?.clone());
    }
    Some((ordered, bindings))
}

fn is_type_param(name: &str, params: &[TemplateParam]) -> bool {
    params
        .iter()
        .any(|p| p.name == name && matches!(p.kind, TemplateParamKind::Type))
}

fn is_value_param(name: &str, params: &[TemplateParam]) -> bool {
    params
        .iter()
        .any(|p| p.name == name && matches!(p.kind, TemplateParamKind::Value(_)))
}

/// First-order matching of a written parameter type against a concrete
/// argument type, binding template parameters as they are encountered.
fn unify(formal: &TypeExpr, actual: &Ty, params: &[TemplateParam], bindings: &mut Subst) -> bool {
    match formal {
        TypeExpr::Ref(inner) | TypeExpr::ConstRef(inner) => {
            unify(inner, actual, params, bindings)
        }
        TypeExpr::Named(name) if is_type_param(name, params) => match bindings.get(name) {
            Some(TyArg::Ty(bound)) => bound == actual,
            Some(TyArg::Value(_)) => false,
            None => {
                bindings.insert(name.clone(), TyArg::Ty(actual.clone()));
                true
            }
        },
        TypeExpr::Named(name) => matches!(actual, Ty::Class(class) if class == name),
        TypeExpr::Void => matches!(actual, Ty::Void),
        TypeExpr::Bool => actual.is_numeric(),
        TypeExpr::Int => actual.is_numeric(),
        TypeExpr::SizeT => actual.is_numeric(),
        TypeExpr::StdString => matches!(actual, Ty::Str),
        TypeExpr::Ptr(inner) => match actual {
            Ty::Ptr(actual_inner) => unify(inner, actual_inner, params, bindings),
            _ => false,
        },
        TypeExpr::UniquePtr(inner) => match actual {
            Ty::UniquePtr(actual_inner) => unify(inner, actual_inner, params, bindings),
            _ => false,
        },
        TypeExpr::StdArray(elem, len_expr) => match actual {
            Ty::Array { elem: actual_elem, len } => {
                if !unify(elem, actual_elem, params, bindings) {
                    return false;
                }
                match &len_expr.kind {
                    cxx2c_ast::ExprKind::IntLit(lit) => *lit >= 0 && *lit as u64 == *len,
                    cxx2c_ast::ExprKind::Ident(name) if is_value_param(name, params) => {
                        match bindings.get(name) {
                            Some(TyArg::Value(bound)) => bound == len,
                            Some(TyArg::Ty(_)) => false,
                            None => {
                                bindings.insert(name.clone(), TyArg::Value(*len));
                                true
                            }
                        }
                    }
                    _ => false,
                }
            }
            _ => false,
        },
        TypeExpr::Auto | TypeExpr::Instantiation(..) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cxx2c_ast::{Block, Param};
    use cxx2c_core::Span;

    fn span() -> Span {
        Span::new(0, 0)
    }

    fn template_fn(name: &str, param_ty: TypeExpr) -> FunctionDef {
        FunctionDef {
            name: name.to_string(),
            template_params: vec![TemplateParam {
                name: "T".to_string(),
                kind: TemplateParamKind::Type,
                span: span(),
            }],
            is_constexpr: true,
            ret: TypeExpr::Named("T".to_string()),
            params: vec![Param {
                name: "n".to_string(),
                ty: param_ty,
                default: None,
                span: span(),
            }],
            body: Block {
                stmts: vec![],
                span: span(),
            },
            span: span(),
        }
    }

    #[test]
    fn deduces_type_parameter_from_argument() {
        let def = template_fn("fibonacci", TypeExpr::Named("T".to_string()));
        let (key, subst) = deduce(&def, &[Ty::Int], &[]).expect("deduction");
        assert_eq!(key, vec![TyArg::Ty(Ty::Int)]);
        assert_eq!(subst.get("T"), Some(&TyArg::Ty(Ty::Int)));
    }

    #[test]
    fn deduces_through_const_ref() {
        let def = template_fn(
            "push",
            TypeExpr::ConstRef(Box::new(TypeExpr::Named("T".to_string()))),
        );
        let (key, _) = deduce(&def, &[Ty::Str], &[]).expect("deduction");
        assert_eq!(key, vec![TyArg::Ty(Ty::Str)]);
    }

    #[test]
    fn conflicting_bindings_fail() {
        let mut def = template_fn("f", TypeExpr::Named("T".to_string()));
        def.params.push(Param {
            name: "m".to_string(),
            ty: TypeExpr::Named("T".to_string()),
            default: None,
            span: span(),
        });
        assert!(deduce(&def, &[Ty::Int, Ty::Str], &[]).is_none());
    }

    #[test]
    fn queue_deduplicates_by_key() {
        let def = ClassDef {
            name: "Node".to_string(),
            template_params: vec![TemplateParam {
                name: "T".to_string(),
                kind: TemplateParamKind::Type,
                span: span(),
            }],
            fields: vec![],
            ctors: vec![],
            dtor: None,
            methods: vec![],
            span: span(),
        };
        let mut queue = InstantiationQueue::new();
        let first = queue.request_class(&def, &[TyArg::Ty(Ty::Str)]);
        let second = queue.request_class(&def, &[TyArg::Ty(Ty::Str)]);
        assert_eq!(first, "Node_string");
        assert_eq!(first, second);
        assert!(queue.pop().is_some());
        assert!(queue.pop().is_none(), "second request must not re-enqueue");
    }
}
