//! # Config language model
//!
//! The abstract syntax tree produced by the parser and consumed by the
//! bytecode compiler, plus the caller-facing [`value::Value`].
//!
//! ## Documentation conventions
//!
//! - Stack effects are written as `( before -- after )`.

pub mod node;
pub mod program;
pub mod value;
