//! C-level AST: the fully-lowered form the emitter renders.
//!
//! The only construct with remaining high-level meaning is
//! [`CStmt::OwnedDecl`], a declaration of an automatic variable that still
//! owes a cleanup at scope exit. The ownership pass consumes these markers
//! while inserting the destroy sequences; one reaching the emitter is an
//! internal error.

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct CProgram {
    pub structs: Vec<CStruct>,
    pub functions: Vec<CFunction>,
    /// Whether the runtime string helper is referenced.
    pub uses_strings: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CStruct {
    pub name: String,
    pub fields: Vec<(String, CType)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CFunction {
    pub name: String,
    pub ret: CType,
    pub params: Vec<(String, CType)>,
    pub body: Vec<CStmt>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CType {
    Void,
    Bool,
    Int,
    SizeT,
    /// Owned NUL-terminated string.
    CharPtr,
    /// Borrowed string data.
    ConstCharPtr,
    /// A struct by value.
    Struct(String),
    Ptr(Box<CType>),
    ConstPtr(Box<CType>),
    Array(Box<CType>, u64),
}

impl CType {
    pub fn ptr(inner: CType) -> CType {
        CType::Ptr(Box::new(inner))
    }

    pub fn const_ptr(inner: CType) -> CType {
        CType::ConstPtr(Box::new(inner))
    }
}

/// How to clean up an automatic owning variable when it leaves scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cleanup {
    /// A struct held by value: `X_destroy(&name);`
    DestroyValue { destroy: String },
    /// A unique-ownership pointer: `if (name) { destroy(name); free(name); }`
    /// The null guard is what makes destroying a moved-from variable a no-op.
    FreeOwnedPtr { destroy: Option<String> },
    /// An owned string: `free(name);`
    FreeStr,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CStmt {
    Decl {
        name: String,
        ty: CType,
        init: Option<CExpr>,
        storage: Storage,
    },
    /// A declaration still owing scope-exit cleanup; consumed by the
    /// ownership pass.
    OwnedDecl {
        name: String,
        ty: CType,
        init: Option<CExpr>,
        cleanup: Cleanup,
    },
    Expr(CExpr),
    If {
        cond: CExpr,
        then_block: Vec<CStmt>,
        else_block: Vec<CStmt>,
    },
    While {
        cond: CExpr,
        body: Vec<CStmt>,
    },
    For {
        init: Option<Box<CStmt>>,
        cond: Option<CExpr>,
        step: Option<CExpr>,
        body: Vec<CStmt>,
    },
    Return(Option<CExpr>),
    Break,
    Continue,
    Block(Vec<CStmt>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Storage {
    Auto,
    /// `static const`, used for folded constexpr data.
    StaticConst,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CExpr {
    Int(i64),
    Bool(bool),
    Str(String),
    Null,
    Var(String),
    Member {
        obj: Box<CExpr>,
        field: String,
        arrow: bool,
    },
    Unary {
        op: &'static str,
        expr: Box<CExpr>,
    },
    IncDec {
        op: &'static str,
        prefix: bool,
        expr: Box<CExpr>,
    },
    Binary {
        op: &'static str,
        lhs: Box<CExpr>,
        rhs: Box<CExpr>,
    },
    Assign {
        op: &'static str,
        target: Box<CExpr>,
        value: Box<CExpr>,
    },
    Call {
        func: String,
        args: Vec<CExpr>,
    },
    Index {
        obj: Box<CExpr>,
        index: Box<CExpr>,
    },
    Cast {
        ty: CType,
        expr: Box<CExpr>,
    },
    Sizeof(CType),
    /// `{a, b, c}` aggregate initializer.
    InitList(Vec<CExpr>),
}

impl CExpr {
    pub fn var(name: impl Into<String>) -> CExpr {
        CExpr::Var(name.into())
    }

    pub fn call(func: impl Into<String>, args: Vec<CExpr>) -> CExpr {
        CExpr::Call {
            func: func.into(),
            args,
        }
    }

    pub fn addr_of(expr: CExpr) -> CExpr {
        CExpr::Unary {
            op: "&",
            expr: Box::new(expr),
        }
    }

    pub fn assign(target: CExpr, value: CExpr) -> CExpr {
        CExpr::Assign {
            op: "=",
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    /// `self->field`
    pub fn self_field(field: impl Into<String>) -> CExpr {
        CExpr::Member {
            obj: Box::new(CExpr::var("self")),
            field: field.into(),
            arrow: true,
        }
    }
}
