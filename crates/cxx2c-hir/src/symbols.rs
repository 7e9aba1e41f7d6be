//! Symbol and type tables: the per-unit item index, lexical scope chain,
//! and overload selection.

use crate::types::{Ty, compatible};
use cxx2c_ast::{ClassDef, FunctionDef, Item};
use cxx2c_core::{CompilationPhase, Diagnostic, DiagnosticKind};
use std::collections::{BTreeMap, HashMap};

/// Index of top-level declarations in one translation unit.
///
/// One-definition-per-scope is enforced here: a duplicated class name or a
/// function redefinition with an identical parameter list is reported, and
/// the first definition wins for the rest of the compilation.
#[derive(Default)]
pub struct ProgramIndex<'a> {
    pub classes: BTreeMap<&'a str, &'a ClassDef>,
    pub class_templates: BTreeMap<&'a str, &'a ClassDef>,
    pub functions: BTreeMap<&'a str, Vec<&'a FunctionDef>>,
    pub fn_templates: BTreeMap<&'a str, Vec<&'a FunctionDef>>,
}

impl<'a> ProgramIndex<'a> {
    pub fn build(items: &'a [Item]) -> (Self, Vec<Diagnostic>) {
        let mut index = ProgramIndex::default();
        let mut diagnostics = Vec::new();

        for item in items {
            match item {
                Item::Class(class) => {
                    let already_declared = index.classes.contains_key(class.name.as_str())
                        || index.class_templates.contains_key(class.name.as_str());
                    let table = if class.template_params.is_empty() {
                        &mut index.classes
                    } else {
                        &mut index.class_templates
                    };
                    if already_declared {
                        diagnostics.push(Diagnostic::error(
                            DiagnosticKind::DuplicateDeclaration,
                            CompilationPhase::NameResolution,
                            class.span,
                            format!("class `{}` is already defined", class.name),
                        ));
                    } else {
                        table.insert(class.name.as_str(), class);
                    }
                }
                Item::Function(func) => {
                    let table = if func.template_params.is_empty() {
                        &mut index.functions
                    } else {
                        &mut index.fn_templates
                    };
                    let overloads = table.entry(func.name.as_str()).or_default();
                    let redefined = overloads.iter().any(|existing| {
                        existing.params.len() == func.params.len()
                            && existing
                                .params
                                .iter()
                                .zip(&func.params)
                                .all(|(a, b)| a.ty == b.ty)
                    });
                    if redefined {
                        diagnostics.push(Diagnostic::error(
                            DiagnosticKind::DuplicateDeclaration,
                            CompilationPhase::NameResolution,
                            func.span,
                            format!("function `{}` is already defined", func.name),
                        ));
                    } else {
                        overloads.push(func);
                    }
                }
            }
        }
        (index, diagnostics)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name) || self.fn_templates.contains_key(name)
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.contains_key(name) || self.class_templates.contains_key(name)
    }
}

/// Lexical scope chain for locals. Shadowing across nested scopes is
/// permitted; redeclaration within one scope is not.
pub struct ScopeChain {
    scopes: Vec<HashMap<String, Ty>>,
}

impl ScopeChain {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    /// Declare a name in the innermost scope. Returns false if the name is
    /// already declared there.
    pub fn declare(&mut self, name: &str, ty: Ty) -> bool {
        let scope = self.scopes.last_mut().expect("scope chain is never empty");
        if scope.contains_key(name) {
            return false;
        }
        scope.insert(name.to_string(), ty);
        true
    }

    /// Resolve by the nearest-enclosing-scope rule.
    pub fn resolve(&self, name: &str) -> Option<&Ty> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }
}

impl Default for ScopeChain {
    fn default() -> Self {
        Self::new()
    }
}

/// One viable callee under consideration.
pub struct OverloadCandidate<T> {
    /// Signature text for "candidates are:" messages.
    pub label: String,
    /// Resolved parameter types.
    pub params: Vec<Ty>,
    /// Number of parameters without defaults.
    pub required: usize,
    pub payload: T,
}

pub enum OverloadError {
    NoMatch { candidates: Vec<String> },
    Ambiguous { candidates: Vec<String> },
}

/// Pick the unique best candidate for the given argument types: viable
/// candidates are ranked by the number of exact parameter matches, and a tie
/// at the top is ambiguous.
pub fn select_overload<T>(
    candidates: Vec<OverloadCandidate<T>>,
    args: &[Ty],
) -> Result<OverloadCandidate<T>, OverloadError> {
    let all_labels: Vec<String> = candidates.iter().map(|c| c.label.clone()).collect();
    let mut best: Vec<OverloadCandidate<T>> = Vec::new();
    let mut best_score = 0usize;

    for candidate in candidates {
        if args.len() < candidate.required || args.len() > candidate.params.len() {
            continue;
        }
        let viable = args
            .iter()
            .zip(&candidate.params)
            .all(|(arg, param)| compatible(arg, param));
        if !viable {
            continue;
        }
        let score = args
            .iter()
            .zip(&candidate.params)
            .filter(|(arg, param)| arg == param)
            .count();
        if score > best_score || best.is_empty() {
            best_score = score;
            best = vec![candidate];
        } else if score == best_score {
            best.push(candidate);
        }
    }

    match best.len() {
        0 => Err(OverloadError::NoMatch {
            candidates: all_labels,
        }),
        1 => Ok(best.into_iter().next().expect("one candidate")),
        _ => Err(OverloadError::Ambiguous {
            candidates: best.iter().map(|c| c.label.clone()).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_chain_shadows_across_scopes() {
        let mut scopes = ScopeChain::new();
        assert!(scopes.declare("x", Ty::Int));
        assert!(!scopes.declare("x", Ty::Bool));
        scopes.push();
        assert!(scopes.declare("x", Ty::Str));
        assert_eq!(scopes.resolve("x"), Some(&Ty::Str));
        scopes.pop();
        assert_eq!(scopes.resolve("x"), Some(&Ty::Int));
        assert_eq!(scopes.resolve("y"), None);
    }

    fn cand(label: &str, params: Vec<Ty>, required: usize) -> OverloadCandidate<usize> {
        OverloadCandidate {
            label: label.to_string(),
            params,
            required,
            payload: 0,
        }
    }

    #[test]
    fn overload_prefers_exact_match() {
        let picked = select_overload(
            vec![
                cand("f(int)", vec![Ty::Int], 1),
                cand("f(size_t)", vec![Ty::SizeT], 1),
            ],
            &[Ty::Int],
        );
        match picked {
            Ok(c) => assert_eq!(c.label, "f(int)"),
            Err(_) => panic!("expected a unique best candidate"),
        }
    }

    #[test]
    fn overload_reports_ambiguity() {
        let picked = select_overload(
            vec![
                cand("f(int)", vec![Ty::Int], 1),
                cand("f(size_t)", vec![Ty::SizeT], 1),
            ],
            &[Ty::Bool],
        );
        match picked {
            Err(OverloadError::Ambiguous { candidates }) => assert_eq!(candidates.len(), 2),
            _ => panic!("expected ambiguity"),
        }
    }

    #[test]
    fn overload_respects_defaulted_parameters() {
        let picked = select_overload(
            vec![cand("farewell(std::string)", vec![Ty::Str], 0)],
            &[],
        );
        assert!(picked.is_ok());
    }
}
