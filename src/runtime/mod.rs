pub mod arith;
pub mod convert;
pub mod dump;
pub mod machine;
pub mod pwl;
pub mod runtime_error;
pub mod scope;
pub mod stack;
