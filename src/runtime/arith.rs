//! Operator semantics on literal cells.
//!
//! `Int op Int` stays integral for `+ - * /` (division truncates toward
//! zero); any double operand promotes both sides. Integer overflow,
//! division by exact zero and non-finite double results are arithmetic
//! errors.

use std::cmp::Ordering;

use crate::bytecode::builtin::Builtin;
use crate::bytecode::cell::{Cell, Opcode};
use crate::runtime::convert::{nint, number};
use crate::runtime::runtime_error::{
    RuntimeError, RuntimeErrorKind, division_by_zero, overflow, type_error,
};

pub fn binary(op: Opcode, a: Cell, b: Cell) -> Result<Cell, RuntimeError> {
    match op {
        Opcode::Add | Opcode::Subtract | Opcode::Multiply | Opcode::Divide => arithmetic(op, a, b),
        Opcode::Power => {
            let (x, y) = numeric_pair(op, &a, &b)?;
            finite(x.powf(y), op).map(Cell::Double)
        }
        Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge | Opcode::Eq | Opcode::Ne => {
            compare(op, &a, &b).map(Cell::Bool)
        }
        Opcode::Builtin2(builtin) => builtin2(builtin, a, b),
        _ => Err(RuntimeErrorKind::Type(format!("{} is not a binary operator", op.mnemonic())).into()),
    }
}

pub fn unary(op: Opcode, a: Cell) -> Result<Cell, RuntimeError> {
    match (op, a) {
        (Opcode::Negate, Cell::Int(n)) => n
            .checked_neg()
            .map(Cell::Int)
            .ok_or_else(|| RuntimeError::from(RuntimeErrorKind::Arithmetic(format!("integer overflow in -({})", n)))),
        (Opcode::Negate, Cell::Double(x)) => Ok(Cell::Double(-x)),

        (Opcode::Square, Cell::Int(n)) => n
            .checked_mul(n)
            .map(Cell::Int)
            .ok_or_else(|| overflow("*", n, n)),
        (Opcode::Square, Cell::Double(x)) => finite(x * x, op).map(Cell::Double),

        (Opcode::Nint | Opcode::Builtin1(Builtin::Nint), Cell::Int(n)) => Ok(Cell::Int(n)),
        (Opcode::Nint | Opcode::Builtin1(Builtin::Nint), Cell::Double(x)) => nint(x).map(Cell::Int),

        (Opcode::Sign | Opcode::Builtin1(Builtin::Sign), Cell::Int(n)) => Ok(Cell::Int(n.signum())),
        (Opcode::Sign | Opcode::Builtin1(Builtin::Sign), Cell::Double(x)) => Ok(Cell::Int(if x > 0.0 {
            1
        } else if x < 0.0 {
            -1
        } else {
            0
        })),

        (Opcode::Builtin1(Builtin::Abs), Cell::Int(n)) => n
            .checked_abs()
            .map(Cell::Int)
            .ok_or_else(|| RuntimeError::from(RuntimeErrorKind::Arithmetic(format!("integer overflow in abs({})", n)))),
        (Opcode::Builtin1(builtin), a @ (Cell::Int(_) | Cell::Double(_))) => builtin
            .apply1(number(&a)?)
            .map(Cell::Double)
            .map_err(|reason| RuntimeError::from(RuntimeErrorKind::Arithmetic(reason))),

        (Opcode::Negate | Opcode::Square | Opcode::Nint | Opcode::Sign | Opcode::Builtin1(_), other) => {
            Err(type_error("a number", other.type_name()))
        }
        (op, _) => Err(RuntimeErrorKind::Type(format!("{} is not a unary operator", op.mnemonic())).into()),
    }
}

fn arithmetic(op: Opcode, a: Cell, b: Cell) -> Result<Cell, RuntimeError> {
    if let (Cell::Int(x), Cell::Int(y)) = (&a, &b) {
        let (x, y) = (*x, *y);
        let (symbol, result) = match op {
            Opcode::Add => ("+", x.checked_add(y)),
            Opcode::Subtract => ("-", x.checked_sub(y)),
            Opcode::Multiply => ("*", x.checked_mul(y)),
            _ => {
                if y == 0 {
                    return Err(division_by_zero());
                }
                ("/", x.checked_div(y))
            }
        };
        return result.map(Cell::Int).ok_or_else(|| overflow(symbol, x, y));
    }

    let (x, y) = numeric_pair(op, &a, &b)?;
    let result = match op {
        Opcode::Add => x + y,
        Opcode::Subtract => x - y,
        Opcode::Multiply => x * y,
        _ => {
            if y == 0.0 {
                return Err(division_by_zero());
            }
            x / y
        }
    };
    finite(result, op).map(Cell::Double)
}

fn builtin2(builtin: Builtin, a: Cell, b: Cell) -> Result<Cell, RuntimeError> {
    match (builtin, &a, &b) {
        (Builtin::Max, Cell::Int(x), Cell::Int(y)) => Ok(Cell::Int(*x.max(y))),
        (Builtin::Min, Cell::Int(x), Cell::Int(y)) => Ok(Cell::Int(*x.min(y))),
        _ => {
            let (x, y) = numeric_pair(Opcode::Builtin2(builtin), &a, &b)?;
            builtin
                .apply2(x, y)
                .map(Cell::Double)
                .map_err(|reason| RuntimeError::from(RuntimeErrorKind::Arithmetic(reason)))
        }
    }
}

fn compare(op: Opcode, a: &Cell, b: &Cell) -> Result<bool, RuntimeError> {
    let ordering = match (a, b) {
        (Cell::Int(x), Cell::Int(y)) => Some(x.cmp(y)),
        (Cell::Int(_) | Cell::Double(_), Cell::Int(_) | Cell::Double(_)) => {
            number(a)?.partial_cmp(&number(b)?)
        }
        (Cell::String(x), Cell::String(y)) => Some(x.cmp(y)),
        (Cell::Bool(x), Cell::Bool(y)) => match op {
            Opcode::Eq => return Ok(x == y),
            Opcode::Ne => return Ok(x != y),
            _ => {
                return Err(RuntimeErrorKind::Type(format!(
                    "booleans only support == and !=, not {}",
                    op.infix().unwrap_or("?")
                ))
                .into());
            }
        },
        _ => {
            return Err(RuntimeErrorKind::Type(format!(
                "cannot compare {} with {}",
                a.type_name(),
                b.type_name()
            ))
            .into());
        }
    };

    let Some(ordering) = ordering else {
        return Err(RuntimeErrorKind::Arithmetic("comparison with NaN".to_string()).into());
    };

    Ok(match op {
        Opcode::Lt => ordering == Ordering::Less,
        Opcode::Le => ordering != Ordering::Greater,
        Opcode::Gt => ordering == Ordering::Greater,
        Opcode::Ge => ordering != Ordering::Less,
        Opcode::Eq => ordering == Ordering::Equal,
        _ => ordering != Ordering::Equal,
    })
}

fn numeric_pair(op: Opcode, a: &Cell, b: &Cell) -> Result<(f64, f64), RuntimeError> {
    match (number(a), number(b)) {
        (Ok(x), Ok(y)) => Ok((x, y)),
        _ => Err(RuntimeErrorKind::Type(format!(
            "{} needs numbers, got {} and {}",
            op.infix().unwrap_or(op.mnemonic()),
            a.type_name(),
            b.type_name()
        ))
        .into()),
    }
}

fn finite(x: f64, op: Opcode) -> Result<f64, RuntimeError> {
    if x.is_finite() {
        Ok(x)
    } else {
        Err(RuntimeErrorKind::Arithmetic(format!("{} produced a non-finite result", op.mnemonic())).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(op: Opcode, a: Cell, b: Cell) -> Cell {
        binary(op, a, b).unwrap()
    }

    fn assert_error(result: Result<Cell, RuntimeError>, error_contains: &str) {
        match result {
            Ok(cell) => panic!("expected error containing '{}', got {:?}", error_contains, cell),
            Err(e) => assert!(
                e.to_string().contains(error_contains),
                "expected error containing '{}', got: {}",
                error_contains,
                e
            ),
        }
    }

    #[test]
    fn test_integer_arithmetic_stays_integral() {
        assert_eq!(bin(Opcode::Add, Cell::Int(2), Cell::Int(3)), Cell::Int(5));
        assert_eq!(bin(Opcode::Divide, Cell::Int(3), Cell::Int(2)), Cell::Int(1));
        assert_eq!(bin(Opcode::Divide, Cell::Int(-7), Cell::Int(2)), Cell::Int(-3));
    }

    #[test]
    fn test_mixed_arithmetic_promotes() {
        assert_eq!(
            bin(Opcode::Divide, Cell::Int(3), Cell::Double(2.0)),
            Cell::Double(1.5)
        );
        assert_eq!(
            bin(Opcode::Multiply, Cell::Double(0.5), Cell::Int(4)),
            Cell::Double(2.0)
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert_error(binary(Opcode::Divide, Cell::Int(1), Cell::Int(0)), "division by zero");
        assert_error(
            binary(Opcode::Divide, Cell::Double(1.0), Cell::Double(0.0)),
            "division by zero",
        );
        assert_error(
            binary(Opcode::Divide, Cell::Double(1.0), Cell::Int(0)),
            "division by zero",
        );
    }

    #[test]
    fn test_integer_overflow() {
        assert_error(
            binary(Opcode::Add, Cell::Int(i64::MAX), Cell::Int(1)),
            "integer overflow",
        );
        assert_error(
            binary(Opcode::Divide, Cell::Int(i64::MIN), Cell::Int(-1)),
            "integer overflow",
        );
        assert_error(unary(Opcode::Square, Cell::Int(i64::MAX)), "integer overflow");
    }

    #[test]
    fn test_power_is_always_double() {
        assert_eq!(bin(Opcode::Power, Cell::Int(2), Cell::Int(3)), Cell::Double(8.0));
        assert_error(binary(Opcode::Power, Cell::Int(0), Cell::Int(-1)), "non-finite");
    }

    #[test]
    fn test_square_preserves_int() {
        assert_eq!(unary(Opcode::Square, Cell::Int(-4)).unwrap(), Cell::Int(16));
        assert_eq!(unary(Opcode::Square, Cell::Double(1.5)).unwrap(), Cell::Double(2.25));
    }

    #[test]
    fn test_nint_and_sign() {
        assert_eq!(unary(Opcode::Nint, Cell::Double(2.5)).unwrap(), Cell::Int(3));
        assert_eq!(unary(Opcode::Nint, Cell::Double(-2.5)).unwrap(), Cell::Int(-3));
        assert_eq!(unary(Opcode::Nint, Cell::Int(7)).unwrap(), Cell::Int(7));
        assert_eq!(unary(Opcode::Sign, Cell::Double(-0.1)).unwrap(), Cell::Int(-1));
        assert_eq!(unary(Opcode::Sign, Cell::Int(0)).unwrap(), Cell::Int(0));
        assert_eq!(unary(Opcode::Sign, Cell::Int(42)).unwrap(), Cell::Int(1));
    }

    #[test]
    fn test_int_preserving_builtins() {
        assert_eq!(
            unary(Opcode::Builtin1(Builtin::Abs), Cell::Int(-3)).unwrap(),
            Cell::Int(3)
        );
        assert_eq!(
            unary(Opcode::Builtin1(Builtin::Abs), Cell::Double(-3.0)).unwrap(),
            Cell::Double(3.0)
        );
        assert_eq!(
            bin(Opcode::Builtin2(Builtin::Max), Cell::Int(2), Cell::Int(5)),
            Cell::Int(5)
        );
        assert_eq!(
            bin(Opcode::Builtin2(Builtin::Min), Cell::Int(2), Cell::Double(1.5)),
            Cell::Double(1.5)
        );
        assert_eq!(
            unary(Opcode::Builtin1(Builtin::Floor), Cell::Int(2)).unwrap(),
            Cell::Double(2.0)
        );
    }

    #[test]
    fn test_builtin_domain_error() {
        assert_error(
            unary(Opcode::Builtin1(Builtin::Sqrt), Cell::Int(-4)),
            "arithmetic error",
        );
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(bin(Opcode::Gt, Cell::Double(0.7), Cell::Double(0.5)), Cell::Bool(true));
        assert_eq!(bin(Opcode::Le, Cell::Int(2), Cell::Double(2.0)), Cell::Bool(true));
        assert_eq!(bin(Opcode::Eq, Cell::Int(2), Cell::Double(2.0)), Cell::Bool(true));
        assert_eq!(
            bin(Opcode::Lt, Cell::String("GFS".into()), Cell::String("NAM".into())),
            Cell::Bool(true)
        );
        assert_eq!(bin(Opcode::Ne, Cell::Bool(true), Cell::Bool(false)), Cell::Bool(true));
        assert_error(binary(Opcode::Lt, Cell::Bool(true), Cell::Bool(false)), "only support");
        assert_error(
            binary(Opcode::Eq, Cell::String("1".into()), Cell::Int(1)),
            "cannot compare",
        );
    }

    #[test]
    fn test_type_errors() {
        assert_error(
            binary(Opcode::Add, Cell::String("a".into()), Cell::Int(1)),
            "+ needs numbers, got string and integer",
        );
        assert_error(unary(Opcode::Negate, Cell::Bool(true)), "expected a number");
    }
}
