//! AST node types for the fiddle language.

/// Source span for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// A complete program: the body that runs once per pixel.
#[derive(Debug, Clone)]
pub struct Program {
    pub body: Vec<Stmt>,
}

/// `let`, `const` or `var`. All three are block scoped; only `const`
/// rejects reassignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Let,
    Const,
    Var,
}

/// Operator of an assignment statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`
    Set,
    /// `+=`
    Add,
    /// `-=`
    Sub,
    /// `*=`
    Mul,
    /// `/=`
    Div,
    /// `%=`
    Mod,
}

/// Statements.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// `let name = value`
    Decl {
        kind: DeclKind,
        name: String,
        value: Option<Expr>,
        span: Span,
    },
    /// `target = value`, `target += value`, ...
    Assign {
        target: Expr,
        op: AssignOp,
        value: Expr,
        span: Span,
    },
    /// `target++` / `--target`; `delta` is +1 or -1.
    Update {
        target: Expr,
        delta: f64,
        span: Span,
    },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    /// `for (init; condition; update) body`
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        update: Option<Box<Stmt>>,
        body: Box<Stmt>,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Block {
        stmts: Vec<Stmt>,
        span: Span,
    },
    Expr(Expr),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Decl { span, .. }
            | Stmt::Assign { span, .. }
            | Stmt::Update { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::For { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Block { span, .. } => *span,
            Stmt::Expr(e) => e.span,
        }
    }
}

/// Expressions.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    /// Number of nodes on the longest path from this node to a leaf.
    pub fn height(&self) -> usize {
        let below = match &self.kind {
            ExprKind::Number(_)
            | ExprKind::Bool(_)
            | ExprKind::Null
            | ExprKind::Undefined
            | ExprKind::Ident(_) => 0,
            ExprKind::Field { object, .. } => object.height(),
            ExprKind::UnaryOp { operand, .. } => operand.height(),
            ExprKind::Call { callee, args } => args
                .iter()
                .map(Expr::height)
                .fold(callee.height(), usize::max),
            ExprKind::Object(fields) => fields.iter().map(|(_, v)| v.height()).max().unwrap_or(0),
            ExprKind::BinOp { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                left.height().max(right.height())
            }
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => condition
                .height()
                .max(then_expr.height())
                .max(else_expr.height()),
        };
        below + 1
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Number literal: `1`, `0.25`, `.5`, `1e3`
    Number(f64),
    /// `true` / `false`
    Bool(bool),
    /// `null`
    Null,
    /// `undefined`
    Undefined,
    /// Name reference: `x`, `v`, `height`
    Ident(String),
    /// Member access: `v.originx`, `color.r`
    Field {
        object: Box<Expr>,
        field: String,
    },
    /// Call: `math.sin(x)`, `q.noise(x, y)`
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// Object literal: `{ r: 1, g: 0.5, b }`
    Object(Vec<(String, Expr)>),
    /// Binary operation: `a + b`
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary operation: `-x`, `!b`
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// Short-circuit `a && b` / `a || b`, yields one of its operands.
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `condition ? then_expr : else_expr`
    Conditional {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Gt,
    Le,
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `===`
    StrictEq,
    /// `!==`
    StrictNe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}
