use crate::frontend::lexer::Span;

/// Binary operators of the expression language, in source spelling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
        }
    }
}

/// An expression together with the position of its first token.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span }
    }
}

/// Expression node.
///
/// Stack effects describe the compiled form and are written `( before -- after )`.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // ───────────────────────────── Literals ─────────────────────────────
    /// Integer literal. `( -- n )`
    Int(i64),

    /// Floating-point literal. `( -- x )`
    Double(f64),

    /// Double-quoted string literal. `( -- s )`
    Str(String),

    /// `true` / `false`. `( -- b )`
    Bool(bool),

    // ───────────────────────────── References ───────────────────────────
    /// Bare name: a scalar or a function parameter. `( -- v )`
    Name(String),

    /// `name(args...)`: builtin, user function or piecewise-linear table.
    ///
    /// `( a1 .. an -- v )`
    Call { name: String, args: Vec<Expr> },

    /// `name[i][j]` or `name[i, j]`: array element. `( i1 .. in -- v )`
    Index { name: String, indices: Vec<Expr> },

    // ───────────────────────────── Operators ────────────────────────────
    /// Unary minus. `( x -- -x )`
    Negate(Box<Expr>),

    /// Binary operator. `( a b -- a op b )`
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// A statement together with the position of its first token.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `name = expr;`
    Scalar { name: String, value: Expr },

    /// `name(p1, .., pn) = expr;`
    Function {
        name: String,
        params: Vec<String>,
        body: Expr,
    },

    /// `name = { (x1, y1) (x2, y2) .. };`
    Pwl {
        name: String,
        points: Vec<(Expr, Expr)>,
    },

    /// `name = [ e1, .. ];` when `sizes` is `None`, otherwise
    /// `name[n1][n2].. = [ e1, .. ];`
    Array {
        name: String,
        sizes: Option<Vec<Expr>>,
        elements: Vec<Expr>,
    },

    /// `name[i][j].. = expr;` into an existing array.
    ElementAssign {
        name: String,
        indices: Vec<Expr>,
        value: Expr,
    },

    /// `print expr;`
    Print(Expr),
}

impl StmtKind {
    /// Name declared or modified by this statement, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            StmtKind::Scalar { name, .. }
            | StmtKind::Function { name, .. }
            | StmtKind::Pwl { name, .. }
            | StmtKind::Array { name, .. }
            | StmtKind::ElementAssign { name, .. } => Some(name),
            StmtKind::Print(_) => None,
        }
    }
}
