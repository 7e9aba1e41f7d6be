//! Rendering the lowered C AST as source text.
//!
//! Emission order is fixed — prelude, forward typedefs, struct definitions,
//! prototypes, bodies — and every name was fixed during lowering, so the
//! same input always produces byte-identical output.

use crate::c_ast::*;
use crate::error::{EmitError, Result};

const RUNTIME_H: &str = include_str!("runtime.h");

pub fn emit_program(program: &CProgram) -> Result<String> {
    let mut out = String::new();
    out.push_str("#include <stdbool.h>\n");
    out.push_str("#include <stddef.h>\n");
    out.push_str("#include <stdio.h>\n");
    out.push_str("#include <stdlib.h>\n");
    out.push_str("#include <string.h>\n");
    out.push('\n');
    if program.uses_strings {
        out.push_str(RUNTIME_H);
        out.push('\n');
    }

    for s in &program.structs {
        out.push_str(&format!("typedef struct {} {};\n", s.name, s.name));
    }
    if !program.structs.is_empty() {
        out.push('\n');
    }

    for s in &program.structs {
        out.push_str(&format!("struct {} {{\n", s.name));
        for (name, ty) in &s.fields {
            out.push_str("    ");
            out.push_str(&declare(ty, name)?);
            out.push_str(";\n");
        }
        out.push_str("};\n\n");
    }

    let mut emitted_protos = false;
    for f in &program.functions {
        if f.name == "main" {
            continue;
        }
        out.push_str(&signature(f)?);
        out.push_str(";\n");
        emitted_protos = true;
    }
    if emitted_protos {
        out.push('\n');
    }

    for (i, f) in program.functions.iter().enumerate() {
        out.push_str(&signature(f)?);
        out.push_str(" {\n");
        for stmt in &f.body {
            emit_stmt(stmt, &mut out, 1)?;
        }
        out.push_str("}\n");
        if i + 1 < program.functions.len() {
            out.push('\n');
        }
    }

    Ok(out)
}

fn signature(f: &CFunction) -> Result<String> {
    let mut sig = format!("{} {}(", render_type(&f.ret)?, f.name);
    if f.params.is_empty() {
        sig.push_str("void");
    } else {
        for (i, (name, ty)) in f.params.iter().enumerate() {
            if i > 0 {
                sig.push_str(", ");
            }
            sig.push_str(&declare(ty, name)?);
        }
    }
    sig.push(')');
    Ok(sig)
}

/// A declaration with its declarator, so array types come out as
/// `int name[15]` rather than a spelled-out array type.
fn declare(ty: &CType, name: &str) -> Result<String> {
    match ty {
        CType::Array(elem, len) => Ok(format!("{} {}[{}]", render_type(elem)?, name, len)),
        other => Ok(format!("{} {}", render_type(other)?, name)),
    }
}

fn render_type(ty: &CType) -> Result<String> {
    match ty {
        CType::Void => Ok("void".to_string()),
        CType::Bool => Ok("bool".to_string()),
        CType::Int => Ok("int".to_string()),
        CType::SizeT => Ok("size_t".to_string()),
        CType::CharPtr => Ok("char*".to_string()),
        CType::ConstCharPtr => Ok("const char*".to_string()),
        CType::Struct(name) => Ok(name.clone()),
        CType::Ptr(inner) => Ok(format!("{}*", render_type(inner)?)),
        CType::ConstPtr(inner) => Ok(format!("const {}*", render_type(inner)?)),
        CType::Array(..) => Err(EmitError::UnsupportedConstruct(
            "array type outside a declarator".to_string(),
        )),
    }
}

fn emit_stmt(stmt: &CStmt, out: &mut String, indent: usize) -> Result<()> {
    let pad = "    ".repeat(indent);
    match stmt {
        CStmt::OwnedDecl { name, .. } => {
            // Cleanup insertion consumes these; reaching the emitter means a
            // pass was skipped.
            return Err(EmitError::UnsupportedConstruct(format!(
                "owned declaration `{name}` was not lowered"
            )));
        }
        CStmt::Decl {
            name,
            ty,
            init,
            storage,
        } => {
            out.push_str(&pad);
            if *storage == Storage::StaticConst {
                out.push_str("static const ");
            }
            out.push_str(&declare(ty, name)?);
            if let Some(init) = init {
                out.push_str(" = ");
                out.push_str(&emit_expr(init)?);
            }
            out.push_str(";\n");
        }
        CStmt::Expr(expr) => {
            out.push_str(&pad);
            out.push_str(&emit_expr(expr)?);
            out.push_str(";\n");
        }
        CStmt::If {
            cond,
            then_block,
            else_block,
        } => {
            out.push_str(&pad);
            out.push_str(&format!("if ({}) {{\n", emit_expr(cond)?));
            for s in then_block {
                emit_stmt(s, out, indent + 1)?;
            }
            out.push_str(&pad);
            out.push('}');
            if else_block.is_empty() {
                out.push('\n');
            } else {
                out.push_str(" else {\n");
                for s in else_block {
                    emit_stmt(s, out, indent + 1)?;
                }
                out.push_str(&pad);
                out.push_str("}\n");
            }
        }
        CStmt::While { cond, body } => {
            out.push_str(&pad);
            out.push_str(&format!("while ({}) {{\n", emit_expr(cond)?));
            for s in body {
                emit_stmt(s, out, indent + 1)?;
            }
            out.push_str(&pad);
            out.push_str("}\n");
        }
        CStmt::For {
            init,
            cond,
            step,
            body,
        } => {
            out.push_str(&pad);
            out.push_str("for (");
            match init {
                Some(init) => out.push_str(&emit_for_init(init)?),
                None => out.push(';'),
            }
            out.push(' ');
            if let Some(cond) = cond {
                out.push_str(&emit_expr(cond)?);
            }
            out.push(';');
            if let Some(step) = step {
                out.push(' ');
                out.push_str(&emit_expr(step)?);
            }
            out.push_str(") {\n");
            for s in body {
                emit_stmt(s, out, indent + 1)?;
            }
            out.push_str(&pad);
            out.push_str("}\n");
        }
        CStmt::Return(value) => {
            out.push_str(&pad);
            match value {
                Some(value) => out.push_str(&format!("return {};\n", emit_expr(value)?)),
                None => out.push_str("return;\n"),
            }
        }
        CStmt::Break => {
            out.push_str(&pad);
            out.push_str("break;\n");
        }
        CStmt::Continue => {
            out.push_str(&pad);
            out.push_str("continue;\n");
        }
        CStmt::Block(stmts) => {
            out.push_str(&pad);
            out.push_str("{\n");
            for s in stmts {
                emit_stmt(s, out, indent + 1)?;
            }
            out.push_str(&pad);
            out.push_str("}\n");
        }
    }
    Ok(())
}

fn emit_for_init(stmt: &CStmt) -> Result<String> {
    match stmt {
        CStmt::Decl {
            name,
            ty,
            init,
            storage: Storage::Auto,
        } => {
            let mut text = declare(ty, name)?;
            if let Some(init) = init {
                text.push_str(" = ");
                text.push_str(&emit_expr(init)?);
            }
            text.push(';');
            Ok(text)
        }
        CStmt::Expr(expr) => Ok(format!("{};", emit_expr(expr)?)),
        other => Err(EmitError::UnsupportedConstruct(format!(
            "unsupported loop initializer: {other:?}"
        ))),
    }
}

fn emit_expr(expr: &CExpr) -> Result<String> {
    match expr {
        CExpr::Int(value) => Ok(value.to_string()),
        CExpr::Bool(value) => Ok(if *value { "true" } else { "false" }.to_string()),
        CExpr::Str(value) => Ok(format!("\"{}\"", escape_c_string(value))),
        CExpr::Null => Ok("NULL".to_string()),
        CExpr::Var(name) => Ok(name.clone()),
        CExpr::Member { obj, field, arrow } => {
            let sep = if *arrow { "->" } else { "." };
            Ok(format!("{}{}{}", emit_operand(obj)?, sep, field))
        }
        CExpr::Unary { op, expr } => Ok(format!("{}{}", op, emit_operand(expr)?)),
        CExpr::IncDec { op, prefix, expr } => {
            let operand = emit_operand(expr)?;
            if *prefix {
                Ok(format!("{op}{operand}"))
            } else {
                Ok(format!("{operand}{op}"))
            }
        }
        CExpr::Binary { op, lhs, rhs } => Ok(format!(
            "{} {} {}",
            emit_operand(lhs)?,
            op,
            emit_operand(rhs)?
        )),
        CExpr::Assign { op, target, value } => Ok(format!(
            "{} {} {}",
            emit_operand(target)?,
            op,
            emit_operand(value)?
        )),
        CExpr::Call { func, args } => {
            let args: Result<Vec<String>> = args.iter().map(emit_expr).collect();
            Ok(format!("{}({})", func, args?.join(", ")))
        }
        CExpr::Index { obj, index } => {
            Ok(format!("{}[{}]", emit_operand(obj)?, emit_expr(index)?))
        }
        CExpr::Cast { ty, expr } => {
            Ok(format!("({}){}", render_type(ty)?, emit_operand(expr)?))
        }
        CExpr::Sizeof(ty) => Ok(format!("sizeof({})", render_type(ty)?)),
        CExpr::InitList(items) => {
            let items: Result<Vec<String>> = items.iter().map(emit_expr).collect();
            Ok(format!("{{{}}}", items?.join(", ")))
        }
    }
}

/// Emit a subexpression, parenthesized when its printed form could rebind.
fn emit_operand(expr: &CExpr) -> Result<String> {
    let needs_parens = matches!(
        expr,
        CExpr::Binary { .. } | CExpr::Assign { .. } | CExpr::Cast { .. }
    );
    let text = emit_expr(expr)?;
    if needs_parens {
        Ok(format!("({text})"))
    } else {
        Ok(text)
    }
}

fn escape_c_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_struct_and_function() {
        let program = CProgram {
            structs: vec![CStruct {
                name: "Greeter".to_string(),
                fields: vec![("name".to_string(), CType::CharPtr)],
            }],
            functions: vec![CFunction {
                name: "Greeter_greet".to_string(),
                ret: CType::Void,
                params: vec![(
                    "self".to_string(),
                    CType::const_ptr(CType::Struct("Greeter".to_string())),
                )],
                body: vec![CStmt::Expr(CExpr::call(
                    "printf",
                    vec![
                        CExpr::Str("Hello, %s!\n".to_string()),
                        CExpr::self_field("name"),
                    ],
                ))],
            }],
            uses_strings: true,
        };
        let text = emit_program(&program).expect("emit");
        assert!(text.contains("typedef struct Greeter Greeter;"));
        assert!(text.contains("struct Greeter {\n    char* name;\n};"));
        assert!(text.contains("void Greeter_greet(const Greeter* self);"));
        assert!(text.contains("printf(\"Hello, %s!\\n\", self->name);"));
        assert!(text.contains("cxx_strdup"));
    }

    #[test]
    fn emits_array_declarator_and_init_list() {
        let mut out = String::new();
        emit_stmt(
            &CStmt::Decl {
                name: "fibSeq".to_string(),
                ty: CType::Array(Box::new(CType::Int), 4),
                init: Some(CExpr::InitList(vec![
                    CExpr::Int(0),
                    CExpr::Int(1),
                    CExpr::Int(1),
                    CExpr::Int(2),
                ])),
                storage: Storage::StaticConst,
            },
            &mut out,
            1,
        )
        .expect("emit");
        assert_eq!(out, "    static const int fibSeq[4] = {0, 1, 1, 2};\n");
    }

    #[test]
    fn emits_for_loop_with_inline_declaration() {
        let mut out = String::new();
        emit_stmt(
            &CStmt::For {
                init: Some(Box::new(CStmt::Decl {
                    name: "_i0".to_string(),
                    ty: CType::SizeT,
                    init: Some(CExpr::Int(0)),
                    storage: Storage::Auto,
                })),
                cond: Some(CExpr::Binary {
                    op: "<",
                    lhs: Box::new(CExpr::var("_i0")),
                    rhs: Box::new(CExpr::Int(10)),
                }),
                step: Some(CExpr::IncDec {
                    op: "++",
                    prefix: true,
                    expr: Box::new(CExpr::var("_i0")),
                }),
                body: vec![CStmt::Continue],
            },
            &mut out,
            0,
        )
        .expect("emit");
        assert_eq!(
            out,
            "for (size_t _i0 = 0; _i0 < 10; ++_i0) {\n    continue;\n}\n"
        );
    }

    #[test]
    fn owned_decl_is_an_internal_error() {
        let mut out = String::new();
        let err = emit_stmt(
            &CStmt::OwnedDecl {
                name: "g".to_string(),
                ty: CType::Struct("Greeter".to_string()),
                init: None,
                cleanup: Cleanup::DestroyValue {
                    destroy: "Greeter_destroy".to_string(),
                },
            },
            &mut out,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, EmitError::UnsupportedConstruct(_)));
    }

    #[test]
    fn nested_binary_operands_are_parenthesized_deterministically() {
        let expr = CExpr::Binary {
            op: "+",
            lhs: Box::new(CExpr::call("fibonacci_int", vec![CExpr::Binary {
                op: "-",
                lhs: Box::new(CExpr::var("n")),
                rhs: Box::new(CExpr::Int(1)),
            }])),
            rhs: Box::new(CExpr::call("fibonacci_int", vec![CExpr::Binary {
                op: "-",
                lhs: Box::new(CExpr::var("n")),
                rhs: Box::new(CExpr::Int(2)),
            }])),
        };
        assert_eq!(
            emit_expr(&expr).expect("emit"),
            "fibonacci_int(n - 1) + fibonacci_int(n - 2)"
        );
    }
}
