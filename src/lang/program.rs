use super::node::Stmt;

/// Parsed config source: statements in source order.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}
