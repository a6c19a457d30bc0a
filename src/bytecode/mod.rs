pub mod builtin;
pub mod cell;
pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod ir;
pub mod stack_check_error;

pub use cell::{Cell, Opcode};
pub use ir::{IcodeVector, SymbolTableEntry};
