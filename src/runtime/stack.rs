use crate::bytecode::cell::Cell;
use crate::runtime::runtime_error::{RuntimeError, stack_underflow};

/// Operand stack used while executing bytecode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellStack {
    cells: Vec<Cell>,
}

impl CellStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    pub fn pop(&mut self) -> Result<Cell, RuntimeError> {
        self.cells.pop().ok_or_else(|| stack_underflow(1, 0))
    }

    /// Pops the top `n` cells, returned in the order they were pushed.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Cell>, RuntimeError> {
        let depth = self.cells.len();
        if depth < n {
            return Err(stack_underflow(n, depth));
        }
        Ok(self.cells.split_off(depth - n))
    }

    pub fn peek(&self) -> Option<&Cell> {
        self.cells.last()
    }

    pub fn depth(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Drops everything above `depth`.
    pub fn truncate(&mut self, depth: usize) {
        self.cells.truncate(depth);
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn as_slice(&self) -> &[Cell] {
        &self.cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::runtime_error::RuntimeErrorKind;

    #[test]
    fn test_push_pop() {
        let mut stack = CellStack::new();
        stack.push(Cell::Int(1));
        stack.push(Cell::Bool(true));
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.peek(), Some(&Cell::Bool(true)));
        assert_eq!(stack.pop().unwrap(), Cell::Bool(true));
        assert_eq!(stack.pop().unwrap(), Cell::Int(1));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_pop_empty() {
        let err = CellStack::new().pop().unwrap_err();
        assert_eq!(
            err.kind,
            RuntimeErrorKind::StackUnderflow {
                needed: 1,
                found: 0
            }
        );
    }

    #[test]
    fn test_pop_n_keeps_push_order() {
        let mut stack = CellStack::new();
        for n in 1..=4 {
            stack.push(Cell::Int(n));
        }
        assert_eq!(stack.pop_n(2).unwrap(), vec![Cell::Int(3), Cell::Int(4)]);
        assert_eq!(stack.depth(), 2);
        assert!(stack.pop_n(3).is_err());
        assert_eq!(stack.depth(), 2);
    }

    #[test]
    fn test_truncate() {
        let mut stack = CellStack::new();
        stack.push(Cell::Int(1));
        stack.push(Cell::Int(2));
        stack.truncate(1);
        assert_eq!(stack.as_slice(), &[Cell::Int(1)]);
        stack.truncate(5);
        assert_eq!(stack.depth(), 1);
    }
}
