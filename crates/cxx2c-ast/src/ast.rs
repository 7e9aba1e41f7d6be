//! AST for the accepted C++ subset.
//!
//! The per-file [`TranslationUnit`] is the only Salsa-tracked type; everything
//! below it is a plain owned tree. Lowering passes build new trees rather than
//! mutating these nodes.

use cxx2c_core::Span;
use serde::{Deserialize, Serialize};

pub type Identifier = String;

#[salsa::tracked(debug)]
pub struct TranslationUnit<'db> {
    #[tracked]
    #[returns(ref)]
    pub includes: Vec<Include>,
    #[tracked]
    #[returns(ref)]
    pub items: Vec<Item>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct Include {
    pub header: String,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub enum Item {
    Function(FunctionDef),
    Class(ClassDef),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct FunctionDef {
    pub name: Identifier,
    pub template_params: Vec<TemplateParam>,
    pub is_constexpr: bool,
    pub ret: TypeExpr,
    pub params: Vec<Param>,
    pub body: Block,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct TemplateParam {
    pub name: Identifier,
    pub kind: TemplateParamKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub enum TemplateParamKind {
    /// `typename T`
    Type,
    /// A non-type parameter such as `size_t N`, with its declared type.
    Value(TypeExpr),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct Param {
    pub name: Identifier,
    pub ty: TypeExpr,
    pub default: Option<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct ClassDef {
    pub name: Identifier,
    pub template_params: Vec<TemplateParam>,
    /// Data members in declaration order; destruction runs in reverse.
    pub fields: Vec<Field>,
    pub ctors: Vec<Ctor>,
    pub dtor: Option<Dtor>,
    pub methods: Vec<Method>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct Field {
    pub name: Identifier,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct Ctor {
    pub is_constexpr: bool,
    pub params: Vec<Param>,
    pub inits: Vec<MemberInit>,
    pub body: Block,
    pub span: Span,
}

/// One entry of a constructor member-init list. An empty argument list means
/// value-initialization (`sequence{}`, `next(nullptr)` keeps its argument).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct MemberInit {
    pub member: Identifier,
    pub args: Vec<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct Dtor {
    pub body: Block,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct Method {
    pub name: Identifier,
    pub is_const: bool,
    pub is_constexpr: bool,
    pub ret: TypeExpr,
    pub params: Vec<Param>,
    pub body: Block,
    pub span: Span,
}

/// A type as written in source, before resolution.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub enum TypeExpr {
    Void,
    Bool,
    Int,
    SizeT,
    Auto,
    /// `std::string`
    StdString,
    /// `std::array<T, N>` where N is an arbitrary constant expression.
    StdArray(Box<TypeExpr>, Box<Expr>),
    /// `std::unique_ptr<T>`
    UniquePtr(Box<TypeExpr>),
    /// A class name or template parameter.
    Named(Identifier),
    /// `Name<args...>` instantiation of a user template.
    Instantiation(Identifier, Vec<TemplateArg>),
    /// `T&`
    Ref(Box<TypeExpr>),
    /// `const T&`
    ConstRef(Box<TypeExpr>),
    /// `T*`
    Ptr(Box<TypeExpr>),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub enum TemplateArg {
    Type(TypeExpr),
    Value(Expr),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub enum Stmt {
    Decl(VarDecl),
    Expr(Expr),
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Block,
        span: Span,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Block,
        span: Span,
    },
    /// `for (const auto& x : iterable) { ... }`
    RangeFor {
        var: Identifier,
        iterable: Expr,
        body: Block,
        span: Span,
    },
    Return(Option<Expr>, Span),
    Break(Span),
    Continue(Span),
    Block(Block),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct VarDecl {
    pub name: Identifier,
    pub ty: TypeExpr,
    pub is_constexpr: bool,
    pub init: VarInit,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub enum VarInit {
    /// `Greeter g;` — default construction.
    None,
    /// `auto x = expr;`
    Assign(Expr),
    /// `Greeter g("World");` — direct construction.
    Construct(Vec<Expr>),
    /// `std::array<int, 10> result{};` — value-initialization.
    Brace(Vec<Expr>),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub enum ExprKind {
    IntLit(i64),
    BoolLit(bool),
    StrLit(String),
    NullPtr,
    /// A possibly-qualified name (`x`, `std::cout`, `std::endl`).
    Ident(Identifier),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    /// Prefix or postfix `++`/`--`.
    IncDec {
        op: IncDecOp,
        prefix: bool,
        expr: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// Free-function call, possibly with explicit template arguments.
    Call {
        callee: Identifier,
        template_args: Vec<TemplateArg>,
        args: Vec<Expr>,
    },
    MethodCall {
        recv: Box<Expr>,
        method: Identifier,
        args: Vec<Expr>,
        arrow: bool,
    },
    Member {
        obj: Box<Expr>,
        field: Identifier,
        arrow: bool,
    },
    Index {
        obj: Box<Expr>,
        index: Box<Expr>,
    },
    /// `static_cast<T>(e)`
    StaticCast {
        ty: TypeExpr,
        expr: Box<Expr>,
    },
    /// `std::move(e)`
    Move(Box<Expr>),
    /// `std::make_unique<T>(args...)`
    MakeUnique {
        ty: TypeExpr,
        args: Vec<Expr>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub enum UnaryOp {
    Neg,
    Not,
    /// `*p`
    Deref,
    /// `&x`
    AddrOf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub enum IncDecOp {
    Inc,
    Dec,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    /// `<<` — only meaningful in output-stream chains; rejected elsewhere
    /// during lowering.
    Shl,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
}
