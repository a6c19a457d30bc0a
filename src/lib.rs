//! # econfig
//!
//! Compiler and virtual machine for a small declarative config language.
//! Source files declare scalars, arrays, functions and piecewise-linear
//! tables; each declaration is compiled to postfix bytecode and evaluated
//! on demand by a [`Machine`].
//!
//! ```no_run
//! use econfig::{Machine, MissingNameConfig, Value};
//!
//! let mut machine = Machine::new();
//! machine.read("ensemble.cfg")?;
//! let model = machine.get("model", MissingNameConfig::Abort)?;
//! let hit = machine.call("thresh", &[Value::Double(0.7)])?;
//! # Ok::<(), econfig::Error>(())
//! ```

pub mod bytecode;
pub mod error;
pub mod frontend;
pub mod lang;
pub mod runtime;

pub use bytecode::cell::Cell;
pub use bytecode::ir::{IcodeVector, SymbolTableEntry};
pub use error::{ConfigParseError, ConfigParseErrorKind, Error, Result};
pub use lang::value::Value;
pub use runtime::machine::{Machine, MachineConfig, MissingNameConfig, NameResolution};
pub use runtime::pwl::PwlExtrapolation;
pub use runtime::runtime_error::{RuntimeError, RuntimeErrorKind};
pub use runtime::scope::EntryHandle;
