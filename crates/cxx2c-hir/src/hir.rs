//! Template-free, overload-free intermediate representation.
//!
//! Every expression carries its resolved type; no node reaches code
//! generation without one. Classes are still structured (fields, init
//! bodies, methods) — flattening them into plain structs and free functions
//! is the ownership-lowering pass's job.

use crate::consteval::ConstValue;
use crate::types::Ty;
use cxx2c_core::Span;
use serde::{Deserialize, Serialize};

pub use cxx2c_ast::{AssignOp, BinOp, IncDecOp, UnaryOp};

#[salsa::tracked(debug)]
pub struct HirUnit<'db> {
    #[tracked]
    #[returns(ref)]
    pub program: HirProgram,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update, Default)]
pub struct HirProgram {
    /// Structs in demand order: declared classes first, instantiations in
    /// the order they were first required.
    pub structs: Vec<HirStruct>,
    /// Free functions (including monomorphized templates) in demand order.
    pub functions: Vec<HirFunction>,
    pub main: Option<String>,
}

impl HirProgram {
    pub fn get_struct(&self, name: &str) -> Option<&HirStruct> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub fn get_function(&self, name: &str) -> Option<&HirFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct HirStruct {
    /// Concrete (mangled) name; doubles as the C struct tag.
    pub name: String,
    /// Fields in declaration order; destruction runs in reverse.
    pub fields: Vec<HirField>,
    pub ctors: Vec<HirCtor>,
    /// User destructor body, if the class declared one. Member cleanup is
    /// synthesized later regardless.
    pub dtor: Option<Vec<HirStmt>>,
    pub methods: Vec<HirMethod>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct HirField {
    pub name: String,
    pub ty: Ty,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct HirCtor {
    /// Generated init symbol, e.g. `Greeter_init`.
    pub name: String,
    pub params: Vec<HirParam>,
    /// One entry per field, in field declaration order — C++ initializes
    /// members in declaration order regardless of init-list order.
    pub inits: Vec<HirFieldInit>,
    pub body: Vec<HirStmt>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct HirFieldInit {
    pub field: String,
    pub init: HirInit,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct HirMethod {
    /// Full generated symbol, e.g. `LinkedList_string_pushBack`.
    pub name: String,
    pub is_const: bool,
    pub ret: Ty,
    pub params: Vec<HirParam>,
    pub body: Vec<HirStmt>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct HirFunction {
    /// Mangled unique symbol, e.g. `fibonacci_int`, or a plain name for
    /// non-template functions.
    pub name: String,
    pub params: Vec<HirParam>,
    pub ret: Ty,
    pub body: Vec<HirStmt>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct HirParam {
    pub name: String,
    pub ty: Ty,
    pub mode: ParamMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub enum ParamMode {
    Value,
    ConstRef,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub enum HirStmt {
    Local {
        name: String,
        ty: Ty,
        init: HirInit,
    },
    Expr(HirExpr),
    If {
        cond: HirExpr,
        then_block: Vec<HirStmt>,
        else_block: Vec<HirStmt>,
    },
    While {
        cond: HirExpr,
        body: Vec<HirStmt>,
    },
    For {
        init: Option<Box<HirStmt>>,
        cond: Option<HirExpr>,
        step: Option<HirExpr>,
        body: Vec<HirStmt>,
    },
    Return(Option<HirExpr>),
    Break,
    Continue,
    Block(Vec<HirStmt>),
    /// A lowered `std::cout` chain: one formatted-print statement.
    Print(Vec<PrintPart>),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub enum PrintPart {
    Text(String),
    Value(HirExpr),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub enum HirInit {
    /// Default-initialize by type: null pointer, zeroed array, empty string,
    /// or an uninitialized scalar.
    Default,
    Expr(HirExpr),
    /// Direct construction through a resolved init symbol, with defaulted
    /// arguments already expanded.
    Construct { ctor: String, args: Vec<HirExpr> },
    /// A compile-time value folded by the constexpr evaluator.
    Const(ConstValue),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct HirExpr {
    pub kind: HirExprKind,
    pub ty: Ty,
    pub span: Span,
}

impl HirExpr {
    pub fn new(kind: HirExprKind, ty: Ty, span: Span) -> Self {
        Self { kind, ty, span }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub enum HirExprKind {
    Int(i64),
    Bool(bool),
    Str(String),
    Null,
    /// A local variable or parameter.
    Var(String),
    /// The receiver inside a member function (typed as a pointer to the
    /// enclosing struct).
    SelfRef,
    Member {
        obj: Box<HirExpr>,
        field: String,
        through_ptr: bool,
    },
    Unary {
        op: UnaryOp,
        expr: Box<HirExpr>,
    },
    IncDec {
        op: IncDecOp,
        prefix: bool,
        expr: Box<HirExpr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<HirExpr>,
        rhs: Box<HirExpr>,
    },
    Assign {
        op: AssignOp,
        target: Box<HirExpr>,
        value: Box<HirExpr>,
    },
    Call {
        func: String,
        args: Vec<HirExpr>,
    },
    MethodCall {
        /// Resolved method symbol.
        method: String,
        recv: Box<HirExpr>,
        args: Vec<HirExpr>,
        /// Whether the receiver is a value whose address must be taken.
        recv_addr: bool,
    },
    Index {
        obj: Box<HirExpr>,
        index: Box<HirExpr>,
    },
    /// Numeric `static_cast`; the target type is the expression's type.
    Cast(Box<HirExpr>),
    /// Ownership transfer out of an lvalue.
    Move(Box<HirExpr>),
    /// `std::make_unique<T>(...)`: allocate and construct.
    MakeUnique {
        struct_name: String,
        ctor: String,
        args: Vec<HirExpr>,
    },
    /// `.get()` on a unique pointer.
    GetRaw(Box<HirExpr>),
}
