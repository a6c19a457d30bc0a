use serde::{Deserialize, Serialize};

use crate::bytecode::builtin::Builtin;
use crate::frontend::lexer::quote_string;

// =============================================================================
// CELL - one slot of a bytecode program or of the operand stack
// =============================================================================

/// Tagged value or instruction.
///
/// Literal cells (`Int`, `Double`, `String`, `Bool`) are also what the
/// operand stack holds at run time. Reference and operator cells only ever
/// appear inside an `IcodeVector`.
///
/// Stack effects are written `( before -- after )`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    // ─── Literals ───
    /// `( -- n )`
    Int(i64),
    /// `( -- x )`
    Double(f64),
    /// `( -- s )`
    String(String),
    /// `( -- b )`
    Bool(bool),

    // ─── References ───
    /// Scalar or function parameter, resolved when executed. `( -- v )`
    Variable(String),

    /// Piecewise-linear table lookup. `( x -- y )`
    PwlRef(String),

    /// User function call. `( a1 .. an -- v )` with `n == arity`.
    FunctionRef { name: String, arity: usize },

    /// Array element lookup. `( i1 .. in -- v )` with `n == rank`.
    ArrayRef { name: String, rank: usize },

    // ─── Operators ───
    Op(Opcode),
}

impl Cell {
    pub fn type_name(&self) -> &'static str {
        match self {
            Cell::Int(_) => "integer",
            Cell::Double(_) => "double",
            Cell::String(_) => "string",
            Cell::Bool(_) => "boolean",
            Cell::Variable(_) => "variable reference",
            Cell::PwlRef(_) => "piecewise-linear reference",
            Cell::FunctionRef { .. } => "function reference",
            Cell::ArrayRef { .. } => "array reference",
            Cell::Op(_) => "operator",
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Cell::Int(_) | Cell::Double(_) | Cell::String(_) | Cell::Bool(_)
        )
    }

    /// Returns `(pops, pushes)` for this cell when executed.
    pub fn effect(&self) -> (usize, usize) {
        match self {
            Cell::Int(_) | Cell::Double(_) | Cell::String(_) | Cell::Bool(_) => (0, 1),
            Cell::Variable(_) => (0, 1),
            Cell::PwlRef(_) => (1, 1),
            Cell::FunctionRef { arity, .. } => (*arity, 1),
            Cell::ArrayRef { rank, .. } => (*rank, 1),
            Cell::Op(op) => op.effect(),
        }
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Int(n) => write!(f, "{}", n),
            Cell::Double(x) => write!(f, "{:?}", x),
            Cell::String(s) => f.write_str(&quote_string(s)),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Variable(name) | Cell::PwlRef(name) => write!(f, "{}", name),
            Cell::FunctionRef { name, arity } => write!(f, "{}/{}", name, arity),
            Cell::ArrayRef { name, rank } => write!(f, "{}[{}]", name, rank),
            Cell::Op(op) => write!(f, "{}", op.mnemonic()),
        }
    }
}

// =============================================================================
// OPCODE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Opcode {
    // ─── Binary arithmetic ( a b -- a op b ) ───
    Add,
    Subtract,
    Multiply,
    Divide,
    /// Always yields a double.
    Power,

    // ─── Unary ( x -- f(x) ) ───
    Negate,
    /// `x ^ 2` with a literal `2`; integer-preserving.
    Square,
    Nint,
    Sign,

    // ─── Comparison ( a b -- bool ) ───
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,

    // ─── Builtin dispatch ───
    /// `( x -- f(x) )`
    Builtin1(Builtin),
    /// `( a b -- f(a, b) )`
    Builtin2(Builtin),
}

impl Opcode {
    pub fn effect(self) -> (usize, usize) {
        match self {
            Opcode::Add | Opcode::Subtract | Opcode::Multiply | Opcode::Divide | Opcode::Power => {
                (2, 1)
            }
            Opcode::Negate | Opcode::Square | Opcode::Nint | Opcode::Sign => (1, 1),
            Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge | Opcode::Eq | Opcode::Ne => (2, 1),
            Opcode::Builtin1(_) => (1, 1),
            Opcode::Builtin2(_) => (2, 1),
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Add => "ADD",
            Opcode::Subtract => "SUB",
            Opcode::Multiply => "MUL",
            Opcode::Divide => "DIV",
            Opcode::Power => "POW",
            Opcode::Negate => "NEG",
            Opcode::Square => "SQUARE",
            Opcode::Nint => "NINT",
            Opcode::Sign => "SIGN",
            Opcode::Lt => "LT",
            Opcode::Le => "LE",
            Opcode::Gt => "GT",
            Opcode::Ge => "GE",
            Opcode::Eq => "EQ",
            Opcode::Ne => "NE",
            Opcode::Builtin1(_) => "BUILTIN1",
            Opcode::Builtin2(_) => "BUILTIN2",
        }
    }

    /// Infix spelling for binary operators, used when re-rendering source.
    pub fn infix(self) -> Option<&'static str> {
        Some(match self {
            Opcode::Add => "+",
            Opcode::Subtract => "-",
            Opcode::Multiply => "*",
            Opcode::Divide => "/",
            Opcode::Power => "^",
            Opcode::Lt => "<",
            Opcode::Le => "<=",
            Opcode::Gt => ">",
            Opcode::Ge => ">=",
            Opcode::Eq => "==",
            Opcode::Ne => "!=",
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effects() {
        assert_eq!(Cell::Int(1).effect(), (0, 1));
        assert_eq!(Cell::Variable("x".into()).effect(), (0, 1));
        assert_eq!(Cell::PwlRef("p".into()).effect(), (1, 1));
        assert_eq!(
            Cell::FunctionRef {
                name: "f".into(),
                arity: 3
            }
            .effect(),
            (3, 1)
        );
        assert_eq!(
            Cell::ArrayRef {
                name: "a".into(),
                rank: 2
            }
            .effect(),
            (2, 1)
        );
        assert_eq!(Cell::Op(Opcode::Add).effect(), (2, 1));
        assert_eq!(Cell::Op(Opcode::Builtin2(Builtin::Min)).effect(), (2, 1));
    }

    #[test]
    fn test_literal_classification() {
        assert!(Cell::String("s".into()).is_literal());
        assert!(!Cell::Op(Opcode::Negate).is_literal());
        assert!(!Cell::Variable("x".into()).is_literal());
    }

    #[test]
    fn test_display() {
        assert_eq!(Cell::Double(1.0).to_string(), "1.0");
        assert_eq!(Cell::String("GFS".into()).to_string(), "\"GFS\"");
        assert_eq!(Cell::String("a\u{7}\"b".into()).to_string(), "\"a\u{7}\\\"b\"");
        assert_eq!(Cell::Op(Opcode::Square).to_string(), "SQUARE");
        assert_eq!(Opcode::Ge.infix(), Some(">="));
        assert_eq!(Opcode::Nint.infix(), None);
    }
}
