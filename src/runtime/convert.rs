//! Marshalling between operand-stack cells and caller-facing values.

use crate::bytecode::cell::Cell;
use crate::lang::value::Value;
use crate::runtime::runtime_error::{RuntimeError, RuntimeErrorKind, type_error};

/// Converts a result cell into the value handed back to callers.
///
/// Only literal cells are results; anything else on top of the stack means
/// the machine was driven wrongly.
pub fn cell_to_result(cell: Cell) -> Result<Value, RuntimeError> {
    match cell {
        Cell::Int(n) => Ok(Value::Int(n)),
        Cell::Double(x) => Ok(Value::Double(x)),
        Cell::String(s) => Ok(Value::String(s)),
        Cell::Bool(b) => Ok(Value::Bool(b)),
        other => Err(type_error("a value", other.type_name())),
    }
}

/// Converts a caller-supplied value into a cell that can be pushed.
pub fn result_to_cell(value: Value) -> Cell {
    match value {
        Value::Int(n) => Cell::Int(n),
        Value::Double(x) => Cell::Double(x),
        Value::String(s) => Cell::String(s),
        Value::Bool(b) => Cell::Bool(b),
    }
}

/// Rounds to the nearest integer, ties away from zero.
pub fn nint(x: f64) -> Result<i64, RuntimeError> {
    let rounded = x.round();
    if rounded.is_finite() && rounded >= i64::MIN as f64 && rounded < i64::MAX as f64 {
        Ok(rounded as i64)
    } else {
        Err(RuntimeErrorKind::Arithmetic(format!("{} does not fit in an integer", x)).into())
    }
}

/// Reads a cell as an array index: integers as-is, doubles rounded with
/// [`nint`].
pub fn index_value(cell: &Cell) -> Result<i64, RuntimeError> {
    match cell {
        Cell::Int(n) => Ok(*n),
        Cell::Double(x) => nint(*x),
        other => Err(type_error("an integer index", other.type_name())),
    }
}

/// Reads a numeric cell as a double.
pub fn number(cell: &Cell) -> Result<f64, RuntimeError> {
    match cell {
        Cell::Int(n) => Ok(*n as f64),
        Cell::Double(x) => Ok(*x),
        other => Err(type_error("a number", other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_cells_convert() {
        assert_eq!(cell_to_result(Cell::Int(3)).unwrap(), Value::Int(3));
        assert_eq!(
            cell_to_result(Cell::String("GFS".into())).unwrap(),
            Value::String("GFS".into())
        );
        assert_eq!(result_to_cell(Value::Bool(true)), Cell::Bool(true));
    }

    #[test]
    fn test_reference_cells_do_not_convert() {
        let err = cell_to_result(Cell::Variable("x".into())).unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::Type(_)));
    }

    #[test]
    fn test_nint_ties_away_from_zero() {
        assert_eq!(nint(2.5).unwrap(), 3);
        assert_eq!(nint(-2.5).unwrap(), -3);
        assert_eq!(nint(2.4999).unwrap(), 2);
        assert_eq!(nint(-0.4).unwrap(), 0);
        assert!(nint(1e300).is_err());
    }

    #[test]
    fn test_index_value() {
        assert_eq!(index_value(&Cell::Int(4)).unwrap(), 4);
        assert_eq!(index_value(&Cell::Double(1.6)).unwrap(), 2);
        assert!(index_value(&Cell::Bool(true)).is_err());
    }

    #[test]
    fn test_number() {
        assert_eq!(number(&Cell::Int(2)).unwrap(), 2.0);
        assert!(number(&Cell::String("2".into())).is_err());
    }
}
