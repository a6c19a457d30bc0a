use crate::bytecode::cell::Cell;

#[derive(Debug, Clone)]
pub struct StackCheckError {
    pub message: String,
}

impl std::fmt::Display for StackCheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stack-check error: {}", self.message)
    }
}

impl std::error::Error for StackCheckError {}

impl StackCheckError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Walks a program with a given initial stack height and returns the height
/// it finishes at.
///
/// Every cell has a static effect and programs have no jumps, so a linear
/// scan is a complete check.
pub fn check_cells_with_initial(cells: &[Cell], initial_height: usize) -> Result<usize, StackCheckError> {
    let mut h = initial_height;

    for (ip, cell) in cells.iter().enumerate() {
        let (pops, pushes) = cell.effect();
        if h < pops {
            return Err(StackCheckError::new(format!(
                "stack underflow at ip={}, cell={:?}, needed {} items, had {}",
                ip, cell, pops, h
            )));
        }
        h = h - pops + pushes;
    }

    Ok(h)
}

/// Checks that a program run on an empty stack leaves exactly one value.
pub fn check_cells(cells: &[Cell]) -> Result<(), StackCheckError> {
    match check_cells_with_initial(cells, 0)? {
        1 => Ok(()),
        h => Err(StackCheckError::new(format!(
            "program must leave exactly 1 value, leaves {}",
            h
        ))),
    }
}
