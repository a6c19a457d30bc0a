use crate::frontend::lexer::Span;
use crate::lang::value::Value;
use crate::runtime::runtime_error::RuntimeError;

#[derive(Debug, Clone)]
pub enum CompileError {
    /// A reference to a name that is neither a parameter, a declared entry
    /// nor a builtin
    Undeclared { name: String, hint: Option<String> },

    /// A name used in a way its kind does not allow
    WrongKind {
        name: String,
        kind: String,
        reason: String,
        hint: Option<String>,
    },

    /// Call with the wrong number of arguments
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    /// Array reference with the wrong number of indices
    IndexCount {
        name: String,
        expected: usize,
        found: usize,
    },

    /// A declaration that is malformed on its own terms
    InvalidDefinition {
        name: String,
        reason: String,
        hint: Option<String>,
    },

    /// A compile-time constant that failed to evaluate
    ConstEval { what: String, error: RuntimeError },

    /// A compile-time constant of the wrong type
    ConstType {
        what: String,
        expected: String,
        found: String,
    },

    /// Internal compiler error (shouldn't happen in normal use)
    Internal(String),
}

impl CompileError {
    pub fn undeclared(name: &str) -> Self {
        CompileError::Undeclared {
            name: name.to_string(),
            hint: Some("declare it in this file or in a file loaded before it".to_string()),
        }
    }

    /// A function, table or array referenced as a plain value
    pub fn not_a_value(name: &str, kind: &str) -> Self {
        let hint = match kind {
            "array" => format!("index it, e.g. {}[0]", name),
            _ => format!("call it, e.g. {}(x)", name),
        };
        CompileError::WrongKind {
            name: name.to_string(),
            kind: kind.to_string(),
            reason: "cannot be used as a value".to_string(),
            hint: Some(hint),
        }
    }

    pub fn not_callable(name: &str, kind: &str) -> Self {
        CompileError::WrongKind {
            name: name.to_string(),
            kind: kind.to_string(),
            reason: "cannot be called".to_string(),
            hint: Some("only builtins, functions and piecewise-linear tables take arguments".to_string()),
        }
    }

    pub fn not_indexable(name: &str, kind: &str) -> Self {
        CompileError::WrongKind {
            name: name.to_string(),
            kind: kind.to_string(),
            reason: "cannot be indexed".to_string(),
            hint: None,
        }
    }

    pub fn arity_mismatch(name: &str, expected: usize, found: usize) -> Self {
        CompileError::ArityMismatch {
            name: name.to_string(),
            expected,
            found,
        }
    }

    pub fn index_count(name: &str, expected: usize, found: usize) -> Self {
        CompileError::IndexCount {
            name: name.to_string(),
            expected,
            found,
        }
    }

    pub fn builtin_redefinition(name: &str) -> Self {
        CompileError::InvalidDefinition {
            name: name.to_string(),
            reason: "is a builtin function and cannot be redefined".to_string(),
            hint: Some("pick a different name".to_string()),
        }
    }

    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        CompileError::InvalidDefinition {
            name: name.to_string(),
            reason: reason.into(),
            hint: None,
        }
    }

    pub fn invalid_with_hint(name: &str, reason: impl Into<String>, hint: impl Into<String>) -> Self {
        CompileError::InvalidDefinition {
            name: name.to_string(),
            reason: reason.into(),
            hint: Some(hint.into()),
        }
    }

    pub fn const_eval(what: impl Into<String>, error: RuntimeError) -> Self {
        CompileError::ConstEval {
            what: what.into(),
            error,
        }
    }

    pub fn const_type(what: impl Into<String>, expected: &str, found: &Value) -> Self {
        CompileError::ConstType {
            what: what.into(),
            expected: expected.to_string(),
            found: format!("{} {}", found.type_name(), found),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }

    /// Anchors this error at a source position.
    pub fn at(self, span: Span) -> CompileDiagnostic {
        CompileDiagnostic { error: self, span }
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Undeclared { name, hint } => {
                write!(f, "compile error: undeclared name '{}'", name)?;
                if let Some(h) = hint {
                    write!(f, "\n  hint: {}", h)?;
                }
                Ok(())
            }
            CompileError::WrongKind {
                name,
                kind,
                reason,
                hint,
            } => {
                write!(f, "compile error: {} '{}' {}", kind, name, reason)?;
                if let Some(h) = hint {
                    write!(f, "\n  hint: {}", h)?;
                }
                Ok(())
            }
            CompileError::ArityMismatch {
                name,
                expected,
                found,
            } => write!(
                f,
                "compile error: '{}' takes {} argument{}, got {}",
                name,
                expected,
                if *expected == 1 { "" } else { "s" },
                found
            ),
            CompileError::IndexCount {
                name,
                expected,
                found,
            } => write!(
                f,
                "compile error: array '{}' has {} dimension{}, got {} ind{}",
                name,
                expected,
                if *expected == 1 { "" } else { "s" },
                found,
                if *found == 1 { "ex" } else { "ices" }
            ),
            CompileError::InvalidDefinition { name, reason, hint } => {
                write!(f, "compile error: '{}' {}", name, reason)?;
                if let Some(h) = hint {
                    write!(f, "\n  hint: {}", h)?;
                }
                Ok(())
            }
            CompileError::ConstEval { what, error } => {
                write!(f, "compile error: cannot evaluate {}: {}", what, error)
            }
            CompileError::ConstType {
                what,
                expected,
                found,
            } => write!(f, "compile error: {} must be {}, got {}", what, expected, found),
            CompileError::Internal(msg) => {
                write!(f, "compile error: internal error: {}", msg)
            }
        }
    }
}

impl std::error::Error for CompileError {}

/// A compile error and the position of the construct that caused it.
#[derive(Debug, Clone)]
pub struct CompileDiagnostic {
    pub error: CompileError,
    pub span: Span,
}

impl std::fmt::Display for CompileDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.span.line, self.span.col, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::runtime_error::RuntimeErrorKind;

    #[test]
    fn test_undeclared_display() {
        let msg = CompileError::undeclared("thresh").to_string();
        assert!(msg.contains("undeclared name 'thresh'"));
        assert!(msg.contains("hint"));
    }

    #[test]
    fn test_not_a_value_hints() {
        let msg = CompileError::not_a_value("grid", "array").to_string();
        assert!(msg.contains("array 'grid' cannot be used as a value"));
        assert!(msg.contains("grid[0]"));

        let msg = CompileError::not_a_value("f", "function").to_string();
        assert!(msg.contains("f(x)"));
    }

    #[test]
    fn test_arity_pluralization() {
        assert!(
            CompileError::arity_mismatch("p", 1, 2)
                .to_string()
                .contains("'p' takes 1 argument, got 2")
        );
        assert!(
            CompileError::arity_mismatch("f", 2, 1)
                .to_string()
                .contains("takes 2 arguments")
        );
        assert!(
            CompileError::index_count("a", 2, 1)
                .to_string()
                .contains("2 dimensions, got 1 index")
        );
    }

    #[test]
    fn test_builtin_redefinition() {
        let msg = CompileError::builtin_redefinition("sin").to_string();
        assert!(msg.contains("'sin' is a builtin"));
    }

    #[test]
    fn test_const_eval_wraps_runtime_error() {
        let err = CompileError::const_eval(
            "array size",
            RuntimeError::new(RuntimeErrorKind::UnboundName("n".into())),
        );
        let msg = err.to_string();
        assert!(msg.contains("cannot evaluate array size"));
        assert!(msg.contains("unbound name 'n'"));
    }

    #[test]
    fn test_const_type_display() {
        let err = CompileError::const_type("size of dimension 0 of 'a'", "an integer", &Value::from("x"));
        assert_eq!(
            err.to_string(),
            "compile error: size of dimension 0 of 'a' must be an integer, got string \"x\""
        );
    }

    #[test]
    fn test_diagnostic_location_prefix() {
        let diag = CompileError::internal("boom").at(Span { line: 3, col: 7 });
        assert_eq!(diag.to_string(), "3:7: compile error: internal error: boom");
    }

    #[test]
    fn test_error_implements_std_error() {
        let err = CompileError::internal("test");
        let _: &dyn std::error::Error = &err;
    }
}
