use thiserror::Error;

/// What went wrong while executing bytecode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeErrorKind {
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    #[error("index error: {0}")]
    Index(String),

    #[error("unbound name '{0}'")]
    UnboundName(String),

    #[error("non-termination: {0}")]
    NonTermination(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("stack underflow: needed {needed} item(s), found {found}")]
    StackUnderflow { needed: usize, found: usize },

    #[error("piecewise-linear domain error: {0}")]
    PwlDomain(String),
}

/// A runtime failure plus the chain of entries being evaluated when it
/// happened, innermost last.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub call_stack: Vec<String>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error: {}", self.kind)?;

        if self.call_stack.is_empty() {
            return Ok(());
        }
        write!(f, "\n  call stack:")?;

        let groups = self.frame_groups();
        let half = MAX_SHOWN_FRAMES / 2;
        for (n, (start, frame, count)) in groups.iter().enumerate() {
            if groups.len() > MAX_SHOWN_FRAMES && n >= half && n < groups.len() - half {
                if n == half {
                    let hidden: usize = groups[half..groups.len() - half].iter().map(|g| g.2).sum();
                    write!(f, "\n    ... {} more frames", hidden)?;
                }
                continue;
            }
            write!(f, "\n    {}: {}", start, frame)?;
            if *count > 1 {
                write!(f, " (repeated {} times)", count)?;
            }
        }
        Ok(())
    }
}

/// Most lines a call-stack listing prints; the middle of a longer chain is
/// elided.
const MAX_SHOWN_FRAMES: usize = 16;

impl std::error::Error for RuntimeError {}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind) -> Self {
        RuntimeError {
            kind,
            call_stack: Vec::new(),
        }
    }

    /// Runs of identical consecutive frames as `(first index, name, count)`.
    fn frame_groups(&self) -> Vec<(usize, &str, usize)> {
        let mut groups: Vec<(usize, &str, usize)> = Vec::new();
        for (i, frame) in self.call_stack.iter().enumerate() {
            match groups.last_mut() {
                Some((_, name, count)) if *name == frame.as_str() => *count += 1,
                _ => groups.push((i, frame.as_str(), 1)),
            }
        }
        groups
    }

    /// Records the entry being evaluated. Frames are added while unwinding,
    /// so the innermost frame is pushed first.
    pub fn with_context(mut self, context: &str) -> Self {
        self.call_stack.insert(0, context.to_string());
        self
    }
}

impl From<RuntimeErrorKind> for RuntimeError {
    fn from(kind: RuntimeErrorKind) -> Self {
        RuntimeError::new(kind)
    }
}

pub fn division_by_zero() -> RuntimeError {
    RuntimeErrorKind::Arithmetic("division by zero".to_string()).into()
}

pub fn overflow(op: &str, a: i64, b: i64) -> RuntimeError {
    RuntimeErrorKind::Arithmetic(format!("integer overflow in {} {} {}", a, op, b)).into()
}

pub fn type_error(expected: &str, got: &str) -> RuntimeError {
    RuntimeErrorKind::Type(format!("expected {}, got {}", expected, got)).into()
}

pub fn unbound(name: &str) -> RuntimeError {
    RuntimeErrorKind::UnboundName(name.to_string()).into()
}

pub fn stack_underflow(needed: usize, found: usize) -> RuntimeError {
    RuntimeErrorKind::StackUnderflow { needed, found }.into()
}

pub fn index_out_of_bounds(array: &str, fault: impl std::fmt::Display) -> RuntimeError {
    RuntimeErrorKind::Index(format!("array '{}': {}", array, fault)).into()
}
