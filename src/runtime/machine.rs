use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace, warn};

use crate::bytecode::builtin::Builtin;
use crate::bytecode::cell::{Cell, Opcode};
use crate::bytecode::compile::Compiler;
use crate::bytecode::ir::{ArrayInfo, EntryKind, IcodeVector, IndexFault, PiecewiseLinear, SymbolTableEntry};
use crate::bytecode::stack_check_error::check_cells;
use crate::error::{ConfigParseError, Error, Result};
use crate::frontend::{lexer::Lexer, parser::Parser};
use crate::lang::{program::Program, value::Value};
use crate::runtime::arith;
use crate::runtime::convert::{cell_to_result, index_value, number, result_to_cell};
use crate::runtime::dump;
use crate::runtime::pwl::{self, PwlExtrapolation};
use crate::runtime::runtime_error::{
    RuntimeError, RuntimeErrorKind, index_out_of_bounds, stack_underflow, type_error, unbound,
};
use crate::runtime::scope::{EntryHandle, ScopeStack, SymbolTable};
use crate::runtime::stack::CellStack;

#[derive(Debug, Clone, PartialEq)]
pub struct MachineConfig {
    /// Nesting limit for entry evaluation. Every level costs several
    /// native frames, so the default stays well inside a 2 MiB thread
    /// stack.
    pub max_call_depth: usize,
    pub max_steps: Option<usize>,
    pub max_stack_size: usize,
    /// Largest element count a sized array declaration may ask for.
    pub max_array_elements: usize,
    pub pwl_extrapolation: PwlExtrapolation,
    pub name_resolution: NameResolution,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            max_call_depth: 128,
            max_steps: None,
            max_stack_size: 10_000,
            max_array_elements: 1_000_000,
            pwl_extrapolation: PwlExtrapolation::default(),
            name_resolution: NameResolution::default(),
        }
    }
}

/// Where names referenced while a function runs are looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameResolution {
    /// Every active frame, innermost first, then the global scope. A
    /// function called from another function sees its caller's parameters.
    #[default]
    Dynamic,
    /// Only the running function's own parameters, then the global scope.
    Lexical,
}

/// What [`Machine::get`] does when the name is not declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingNameConfig {
    /// Fail with an unbound-name error.
    #[default]
    Abort,
    /// Return `Ok(None)` and let the caller substitute a default.
    ReturnDefault,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    entries: Vec<SymbolTableEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Load {
    Replace,
    Extend,
}

const EVAL_FILE: &str = "<eval>";

/// A config-language virtual machine: one scope stack, one operand stack.
#[derive(Debug)]
pub struct Machine {
    scopes: ScopeStack,
    stack: CellStack,
    config: MachineConfig,
    // Safety limits
    call_depth: usize,
    steps: usize,
    printed: Vec<Value>,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Machine {
    fn clone(&self) -> Self {
        self.deep_clone()
    }
}

impl Machine {
    pub fn new() -> Self {
        Self::with_config(MachineConfig::default())
    }

    pub fn with_config(config: MachineConfig) -> Self {
        Self {
            scopes: ScopeStack::new(),
            stack: CellStack::new(),
            config,
            call_depth: 0,
            steps: 0,
            printed: Vec::new(),
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    // ─── Loading ───

    /// Replaces everything with the contents of a config file.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn read(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let source = read_source(path)?;
        self.load(&source, &path.display().to_string(), Load::Replace)
    }

    /// Like [`Machine::read`], from text. `file` only labels diagnostics.
    pub fn read_str(&mut self, source: &str, file: &str) -> Result<()> {
        self.load(source, file, Load::Replace)
    }

    /// Loads a config file on top of what is already defined; its
    /// declarations override earlier ones of the same name.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn extend(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let source = read_source(path)?;
        self.load(&source, &path.display().to_string(), Load::Extend)
    }

    pub fn extend_str(&mut self, source: &str, file: &str) -> Result<()> {
        self.load(source, file, Load::Extend)
    }

    /// Compiles into a staging machine and commits only on success, so a bad
    /// file leaves the current contents untouched.
    fn load(&mut self, source: &str, file: &str, mode: Load) -> Result<()> {
        let program = parse_program(source, file)?;

        let scopes = match mode {
            Load::Replace => ScopeStack::new(),
            Load::Extend => self.scopes.clone(),
        };
        let mut staging = Machine {
            scopes,
            ..Machine::with_config(self.config.clone())
        };

        staging
            .compiler()
            .compile_program(&program, &mut staging)
            .map_err(|d| ConfigParseError::compile(file, d))?;

        self.scopes = staging.scopes;
        self.stack.clear();
        match mode {
            Load::Replace => self.printed = staging.printed,
            Load::Extend => self.printed.extend(staging.printed),
        }

        info!(
            file,
            entries = self.scopes.global().len(),
            ?mode,
            "loaded config"
        );
        Ok(())
    }

    fn compiler(&self) -> Compiler {
        Compiler::with_entries(self.entries())
    }

    // ─── Lookup ───

    /// Searches every active scope, innermost first. Never executes
    /// anything.
    pub fn find(&self, name: &str) -> Option<EntryHandle> {
        self.scopes.find(name).cloned()
    }

    /// Global names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scopes.global().names()
    }

    /// Global entries in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = &SymbolTableEntry> {
        self.scopes.global().iter().map(|entry| &**entry)
    }

    pub fn array_dims(&self, name: &str) -> Option<&[usize]> {
        self.scopes.find(name)?.as_array().map(ArrayInfo::dims)
    }

    /// Size of dimension `dim` of an array entry.
    pub fn n_elements(&self, entry: &SymbolTableEntry, dim: usize) -> Option<usize> {
        entry.as_array()?.dims().get(dim).copied()
    }

    /// Values of the `print` statements run by the most recent loads.
    pub fn printed(&self) -> &[Value] {
        &self.printed
    }

    // ─── Evaluation ───

    /// Executes `entry`, leaving its value on the operand stack.
    ///
    /// Functions, tables and arrays consume their arguments or indices from
    /// the stack, pushed in declaration order. On error the stack is cut
    /// back below those operands and the scope stack is as it was.
    pub fn run(&mut self, entry: &SymbolTableEntry) -> Result<()> {
        let pops = operand_count(entry);
        let depth = self.stack.depth();
        let Some(base) = depth.checked_sub(pops) else {
            return Err(stack_underflow(pops, depth).with_context(&entry.name).into());
        };

        self.reset_execution_state();
        trace!(entry = %entry.name, depth, "run");

        self.apply(entry).map_err(|e| {
            self.stack.truncate(base);
            Error::from(e)
        })
    }

    /// Executes a standalone program, leaving its value on the stack.
    pub fn run_program(&mut self, code: &IcodeVector) -> Result<()> {
        check_cells(code.cells())
            .map_err(|e| RuntimeError::from(RuntimeErrorKind::Type(format!("malformed program: {}", e))))?;

        let base = self.stack.depth();
        self.reset_execution_state();

        self.exec_program(code, None).map_err(|e| {
            self.stack.truncate(base);
            Error::from(e)
        })
    }

    /// Runs `entry` and pops its value.
    pub fn value(&mut self, entry: &SymbolTableEntry) -> Result<Value> {
        self.run(entry)?;
        let cell = self.stack.pop()?;
        Ok(cell_to_result(cell)?)
    }

    /// Looks up and evaluates a scalar by name.
    pub fn get(&mut self, name: &str, missing: MissingNameConfig) -> Result<Option<Value>> {
        let Some(entry) = self.find(name) else {
            return match missing {
                MissingNameConfig::Abort => Err(unbound(name).into()),
                MissingNameConfig::ReturnDefault => Ok(None),
            };
        };
        if !matches!(entry.kind, EntryKind::Scalar(_)) {
            return Err(wrong_kind(&entry, "read as a scalar").into());
        }
        self.value(&entry).map(Some)
    }

    /// Evaluates one element of an array entry from native indices.
    pub fn element(&mut self, entry: &SymbolTableEntry, indices: &[i64]) -> Result<Value> {
        let Some(info) = entry.as_array() else {
            return Err(wrong_kind(entry, "indexed").into());
        };
        if indices.len() != info.rank() {
            let fault = IndexFault::Rank {
                expected: info.rank(),
                found: indices.len(),
            };
            return Err(index_out_of_bounds(&entry.name, fault).into());
        }

        for &index in indices {
            self.stack.push(Cell::Int(index));
        }
        self.value(entry)
    }

    /// Calls a builtin, user function or piecewise-linear table by name.
    pub fn call(&mut self, name: &str, args: &[Value]) -> Result<Value> {
        if let Some(builtin) = Builtin::lookup(name) {
            check_arity(name, builtin.arity(), args.len())?;
            let mut code: IcodeVector = args.iter().cloned().map(result_to_cell).collect();
            code.push(Cell::Op(builtin.opcode()));
            return self
                .evaluate(&code)
                .map_err(|e| Error::from(e.with_context(name)));
        }

        let entry = self.find(name).ok_or_else(|| unbound(name))?;
        let Some(arity) = entry.arity() else {
            return Err(wrong_kind(&entry, "called").into());
        };
        check_arity(name, arity, args.len())?;

        for arg in args {
            self.stack.push(result_to_cell(arg.clone()));
        }
        self.value(&entry)
    }

    /// Numeric convenience over [`Machine::call`].
    pub fn func(&mut self, name: &str, args: &[f64]) -> Result<f64> {
        let args: Vec<Value> = args.iter().copied().map(Value::Double).collect();
        let value = self.call(name, &args)?;
        value
            .as_double()
            .ok_or_else(|| Error::from(type_error("a number", value.type_name()).with_context(name)))
    }

    /// Compiles and runs a one-off expression without storing it.
    pub fn eval(&mut self, source: &str) -> Result<Value> {
        let tokens = Lexer::new(source)
            .tokenize()
            .map_err(|e| ConfigParseError::lex(EVAL_FILE, e))?;
        let expr = Parser::new(tokens)
            .parse_standalone_expression()
            .map_err(|e| ConfigParseError::syntax(EVAL_FILE, e))?;
        let code = self
            .compiler()
            .compile_expr(&expr, &[])
            .map_err(|d| ConfigParseError::compile(EVAL_FILE, d))?;

        debug!(cells = code.len(), "eval");
        Ok(self.evaluate(&code)?)
    }

    // ─── Low-level stack access ───

    pub fn push(&mut self, cell: Cell) {
        self.stack.push(cell);
    }

    pub fn pop(&mut self) -> Result<Cell> {
        Ok(self.stack.pop()?)
    }

    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.depth()
    }

    /// Discards every entry, the operand stack and recorded prints.
    pub fn clear(&mut self) {
        self.scopes.clear();
        self.stack.clear();
        self.printed.clear();
    }

    // ─── Copies and snapshots ───

    /// An independent copy: entries are duplicated, the operand stack starts
    /// empty.
    pub fn deep_clone(&self) -> Self {
        Self {
            scopes: self.scopes.deep_clone(),
            printed: self.printed.clone(),
            ..Self::with_config(self.config.clone())
        }
    }

    /// Serializes the global scope.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let snapshot = Snapshot {
            entries: self
                .scopes
                .global()
                .iter()
                .map(|entry| SymbolTableEntry::clone(entry))
                .collect(),
        };
        Ok(postcard::to_allocvec(&snapshot)?)
    }

    pub fn from_snapshot(bytes: &[u8], config: MachineConfig) -> Result<Self> {
        let snapshot: Snapshot = postcard::from_bytes(bytes)?;
        let mut machine = Self::with_config(config);
        for entry in snapshot.entries {
            machine.scopes.global_mut().insert(entry);
        }
        debug!(entries = machine.scopes.global().len(), "restored snapshot");
        Ok(machine)
    }

    // ─── Dumps ───

    /// Writes every global entry back out as source.
    pub fn dump(&self, out: &mut impl Write) -> io::Result<()> {
        for entry in self.scopes.global().iter() {
            writeln!(out, "{}", dump::render_entry(entry))?;
        }
        Ok(())
    }

    /// Evaluates every scalar and writes `name = value;`. Scalars that fail
    /// are written as a comment carrying the error.
    pub fn dump_constants(&mut self, out: &mut impl Write) -> io::Result<()> {
        let scalars: Vec<EntryHandle> = self
            .scopes
            .global()
            .iter()
            .filter(|entry| matches!(entry.kind, EntryKind::Scalar(_)))
            .cloned()
            .collect();

        for entry in scalars {
            match self.value(&entry) {
                Ok(value) => writeln!(out, "{} = {};", entry.name, result_to_cell(value))?,
                Err(e) => {
                    let message = e.to_string();
                    let first = message.lines().next().unwrap_or_default();
                    writeln!(out, "// {}: {}", entry.name, first)?;
                }
            }
        }
        Ok(())
    }

    // ─── Compiler hooks ───

    pub(crate) fn define(&mut self, entry: SymbolTableEntry) {
        let name = entry.name.clone();
        let kind = entry.kind_name();
        match self.scopes.global_mut().insert(entry) {
            Some(old) => warn!(name = %name, was = old.kind_name(), now = kind, "redefining entry"),
            None => trace!(name = %name, kind, "defined entry"),
        }
    }

    pub(crate) fn global_entry(&self, name: &str) -> Option<EntryHandle> {
        self.scopes.global().get(name).cloned()
    }

    pub(crate) fn assign_element(
        &mut self,
        name: &str,
        indices: &[i64],
        code: IcodeVector,
    ) -> std::result::Result<(), IndexFault> {
        let entry = self.scopes.global_mut().get_mut(name);
        match entry.map(|entry| &mut entry.kind) {
            Some(EntryKind::Array(info)) => info.set(indices, code),
            _ => Err(IndexFault::Rank {
                expected: 0,
                found: indices.len(),
            }),
        }
    }

    /// Runs a standalone program and pops its value, leaving the stack as
    /// it was.
    pub(crate) fn evaluate(&mut self, code: &IcodeVector) -> std::result::Result<Value, RuntimeError> {
        let base = self.stack.depth();
        self.reset_execution_state();

        let result = self
            .exec_program(code, None)
            .and_then(|()| self.stack.pop())
            .and_then(cell_to_result);

        self.stack.truncate(base);
        result
    }

    pub(crate) fn record_print(&mut self, value: Value) {
        self.printed.push(value);
    }

    // ─── Execution ───

    fn reset_execution_state(&mut self) {
        self.steps = 0;
        self.call_depth = 0;
    }

    fn check_limits(&mut self) -> std::result::Result<(), RuntimeError> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(RuntimeErrorKind::NonTermination(format!(
                    "execution step limit exceeded ({})",
                    max
                ))
                .into());
            }
        }

        if self.stack.depth() > self.config.max_stack_size {
            return Err(RuntimeErrorKind::NonTermination(format!(
                "operand stack limit exceeded ({})",
                self.config.max_stack_size
            ))
            .into());
        }

        Ok(())
    }

    /// Runs a program. `frame` is the scope of the function whose body this
    /// is, used by [`NameResolution::Lexical`].
    fn exec_program(&mut self, code: &IcodeVector, frame: Option<usize>) -> std::result::Result<(), RuntimeError> {
        if self.call_depth >= self.config.max_call_depth {
            return Err(RuntimeErrorKind::NonTermination(format!(
                "call depth limit exceeded ({}) - possible infinite recursion",
                self.config.max_call_depth
            ))
            .into());
        }

        self.call_depth += 1;
        let result = self.exec_cells(code.cells(), frame);
        self.call_depth -= 1;
        result
    }

    fn exec_cells(&mut self, cells: &[Cell], frame: Option<usize>) -> std::result::Result<(), RuntimeError> {
        for cell in cells {
            self.check_limits()?;

            match cell {
                Cell::Int(_) | Cell::Double(_) | Cell::String(_) | Cell::Bool(_) => {
                    self.stack.push(cell.clone())
                }

                Cell::Variable(name) => {
                    let entry = self.lookup(name, frame)?;
                    if !matches!(entry.kind, EntryKind::Scalar(_)) {
                        return Err(wrong_kind(&entry, "used as a value"));
                    }
                    self.apply(&entry)?;
                }

                Cell::PwlRef(name) => {
                    let entry = self.lookup(name, frame)?;
                    if !matches!(entry.kind, EntryKind::Pwl(_)) {
                        return Err(wrong_kind(&entry, "interpolated"));
                    }
                    self.apply(&entry)?;
                }

                Cell::FunctionRef { name, arity } => {
                    let entry = self.lookup(name, frame)?;
                    match entry.arity() {
                        Some(n) if n == *arity => self.apply(&entry)?,
                        Some(n) => {
                            return Err(RuntimeErrorKind::Type(format!(
                                "'{}' takes {} argument(s), called with {}",
                                name, n, arity
                            ))
                            .into());
                        }
                        None => return Err(wrong_kind(&entry, "called")),
                    }
                }

                Cell::ArrayRef { name, rank } => {
                    let entry = self.lookup(name, frame)?;
                    match entry.as_array() {
                        Some(info) if info.rank() == *rank => self.apply(&entry)?,
                        Some(info) => {
                            let fault = IndexFault::Rank {
                                expected: info.rank(),
                                found: *rank,
                            };
                            return Err(index_out_of_bounds(name, fault));
                        }
                        None => return Err(wrong_kind(&entry, "indexed")),
                    }
                }

                Cell::Op(op) => self.exec_op(*op)?,
            }
        }

        Ok(())
    }

    fn exec_op(&mut self, op: Opcode) -> std::result::Result<(), RuntimeError> {
        let result = match op.effect() {
            (1, _) => {
                let a = self.stack.pop()?;
                arith::unary(op, a)?
            }
            _ => {
                let b = self.stack.pop()?;
                let a = self.stack.pop()?;
                arith::binary(op, a, b)?
            }
        };
        self.stack.push(result);
        Ok(())
    }

    fn lookup(&self, name: &str, frame: Option<usize>) -> std::result::Result<EntryHandle, RuntimeError> {
        let entry = match self.config.name_resolution {
            NameResolution::Dynamic => self.scopes.find(name),
            NameResolution::Lexical => self.scopes.resolve(name, frame),
        };
        entry.map(Rc::clone).ok_or_else(|| unbound(name))
    }

    /// Consumes the entry's operands from the stack and pushes its value.
    fn apply(&mut self, entry: &SymbolTableEntry) -> std::result::Result<(), RuntimeError> {
        let result = match &entry.kind {
            EntryKind::Scalar(code) => self.exec_program(code, None),
            EntryKind::Array(info) => self.index_array(&entry.name, info),
            EntryKind::Function { params, body } => self.call_function(params, body),
            EntryKind::Pwl(table) => self.interpolate(table),
        };
        result.map_err(|e| e.with_context(&entry.name))
    }

    fn index_array(&mut self, name: &str, info: &ArrayInfo) -> std::result::Result<(), RuntimeError> {
        let cells = self.stack.pop_n(info.rank())?;
        let indices = cells.iter().map(index_value).collect::<std::result::Result<Vec<_>, _>>()?;
        let code = info
            .element(&indices)
            .map_err(|fault| index_out_of_bounds(name, fault))?;
        self.exec_program(code, None)
    }

    fn call_function(&mut self, params: &[String], body: &IcodeVector) -> std::result::Result<(), RuntimeError> {
        let args = self.stack.pop_n(params.len())?;

        let mut frame = SymbolTable::new();
        for (param, arg) in params.iter().zip(args) {
            frame.insert(SymbolTableEntry::scalar(param.clone(), IcodeVector::literal(arg)));
        }

        let index = self.scopes.push(frame);
        let result = self.exec_program(body, Some(index));
        self.scopes.pop();
        result
    }

    fn interpolate(&mut self, table: &PiecewiseLinear) -> std::result::Result<(), RuntimeError> {
        let x = number(&self.stack.pop()?)?;
        let y = pwl::evaluate(table, x, self.config.pwl_extrapolation)?;
        self.stack.push(Cell::Double(y));
        Ok(())
    }
}

/// Number of operands an entry consumes when run.
fn operand_count(entry: &SymbolTableEntry) -> usize {
    match &entry.kind {
        EntryKind::Scalar(_) => 0,
        EntryKind::Array(info) => info.rank(),
        EntryKind::Function { params, .. } => params.len(),
        EntryKind::Pwl(_) => 1,
    }
}

fn wrong_kind(entry: &SymbolTableEntry, action: &str) -> RuntimeError {
    RuntimeErrorKind::Type(format!(
        "{} '{}' cannot be {}",
        entry.kind_name(),
        entry.name,
        action
    ))
    .into()
}

fn check_arity(name: &str, expected: usize, found: usize) -> std::result::Result<(), RuntimeError> {
    if expected == found {
        Ok(())
    } else {
        Err(RuntimeErrorKind::Type(format!(
            "'{}' takes {} argument(s), called with {}",
            name, expected, found
        ))
        .into())
    }
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_program(source: &str, file: &str) -> std::result::Result<Program, ConfigParseError> {
    let tokens = Lexer::new(source)
        .tokenize()
        .map_err(|e| ConfigParseError::lex(file, e))?;
    Parser::new(tokens)
        .parse()
        .map_err(|e| ConfigParseError::syntax(file, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_src(source: &str) -> Machine {
        let mut machine = Machine::new();
        machine.read_str(source, "test.cfg").unwrap();
        machine
    }

    fn limited(max_call_depth: usize) -> MachineConfig {
        MachineConfig {
            max_call_depth,
            ..MachineConfig::default()
        }
    }

    fn assert_error(result: Result<Value>, error_contains: &str) {
        match result {
            Ok(value) => panic!("expected error containing '{}', got {:?}", error_contains, value),
            Err(e) => assert!(
                e.to_string().contains(error_contains),
                "expected error containing '{}', got: {}",
                error_contains,
                e
            ),
        }
    }

    // ─── Scoping ───

    #[test]
    fn test_callee_sees_caller_parameters() {
        let mut m = run_src("y = 10; f(x) = x + y; g(y) = f(1) + y;");
        assert_eq!(m.call("g", &[Value::Int(5)]).unwrap(), Value::Int(11));
        assert_eq!(m.call("f", &[Value::Int(1)]).unwrap(), Value::Int(11));
    }

    #[test]
    fn test_scalars_see_the_running_function() {
        let mut m = run_src("x = 1; twice = x * 2; f(x) = twice;");
        assert_eq!(m.call("f", &[Value::Int(5)]).unwrap(), Value::Int(10));
        assert_eq!(m.get("twice", MissingNameConfig::Abort).unwrap(), Some(Value::Int(2)));
    }

    #[test]
    fn test_lexical_resolution_skips_caller_frames() {
        let mut m = Machine::with_config(MachineConfig {
            name_resolution: NameResolution::Lexical,
            ..MachineConfig::default()
        });
        m.read_str("y = 10; f(x) = x + y; g(y) = f(1) + y; x = 1; twice = x * 2; h(x) = twice;", "lex.cfg")
            .unwrap();
        assert_eq!(m.call("g", &[Value::Int(5)]).unwrap(), Value::Int(16));
        assert_eq!(m.call("h", &[Value::Int(5)]).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_nested_calls_bind_their_own_parameters() {
        let mut m = run_src("sq(x) = x * x; hyp(a, b) = sqrt(sq(a) + sq(b));");
        assert_eq!(
            m.call("hyp", &[Value::Int(3), Value::Int(4)]).unwrap(),
            Value::Double(5.0)
        );
        assert_eq!(m.scope_depth(), 1);
    }

    // ─── Transactional run ───

    #[test]
    fn test_failed_run_restores_stacks() {
        let mut m = run_src("f(x) = x / 0; s = 1;");
        m.push(Cell::Int(7));
        m.push(Cell::Int(3));

        let f = m.find("f").unwrap();
        let err = m.run(&f).unwrap_err();
        assert!(matches!(err.runtime_kind(), Some(RuntimeErrorKind::Arithmetic(_))));
        assert_eq!(m.depth(), 1);
        assert_eq!(m.scope_depth(), 1);

        let s = m.find("s").unwrap();
        assert_eq!(m.value(&s).unwrap(), Value::Int(1));
        assert_eq!(m.pop().unwrap(), Cell::Int(7));
    }

    #[test]
    fn test_run_without_arguments_underflows() {
        let mut m = run_src("f(x, y) = x + y;");
        m.push(Cell::Int(1));
        let f = m.find("f").unwrap();
        let err = m.run(&f).unwrap_err();
        assert!(matches!(
            err.runtime_kind(),
            Some(RuntimeErrorKind::StackUnderflow { needed: 2, found: 1 })
        ));
        assert_eq!(m.depth(), 1);
    }

    #[test]
    fn test_run_leaves_exactly_one_value() {
        let mut m = run_src("thresh(p) = p > 0.5;");
        let thresh = m.find("thresh").unwrap();
        m.push(Cell::Double(0.7));
        m.run(&thresh).unwrap();
        assert_eq!(m.depth(), 1);
        assert_eq!(m.pop().unwrap(), Cell::Bool(true));
    }

    #[test]
    fn test_error_names_evaluation_chain() {
        let mut m = run_src("a = b + 1; b = 1 / 0;");
        let a = m.find("a").unwrap();
        match m.value(&a).unwrap_err() {
            Error::Runtime(e) => assert_eq!(e.call_stack, vec!["a".to_string(), "b".to_string()]),
            other => panic!("expected runtime error, got {}", other),
        }
    }

    // ─── Limits ───

    #[test]
    fn test_self_reference_hits_call_depth() {
        let mut m = Machine::with_config(limited(64));
        m.read_str("x = x + 1;", "loop.cfg").unwrap();
        let x = m.find("x").unwrap();
        let err = m.value(&x).unwrap_err();
        assert!(matches!(err.runtime_kind(), Some(RuntimeErrorKind::NonTermination(_))));
        assert_eq!(m.depth(), 0);
    }

    #[test]
    fn test_runaway_recursion_pops_every_frame() {
        let mut m = Machine::with_config(limited(64));
        m.read_str("f(n) = f(n + 1);", "loop.cfg").unwrap();
        assert_error(m.call("f", &[Value::Int(0)]), "call depth limit exceeded (64)");
        assert_eq!(m.scope_depth(), 1);
        assert_eq!(m.depth(), 0);
    }

    #[test]
    fn test_default_depth_limit_returns_an_error() {
        let mut m = run_src("x = x + 1; a = b; b = a; f(n) = f(n + 1);");
        let x = m.find("x").unwrap();
        let err = m.value(&x).unwrap_err();
        assert!(matches!(err.runtime_kind(), Some(RuntimeErrorKind::NonTermination(_))));
        assert_error(m.get("a", MissingNameConfig::Abort).map(|v| v.unwrap_or(Value::Int(0))), "call depth limit exceeded (128)");
        assert_error(m.call("f", &[Value::Int(0)]), "call depth limit exceeded (128)");
        assert_eq!(m.scope_depth(), 1);
        assert_eq!(m.depth(), 0);
        assert_eq!(m.eval("1 + 1").unwrap(), Value::Int(2));
    }

    #[test]
    fn test_step_limit() {
        let mut m = Machine::with_config(MachineConfig {
            max_steps: Some(5),
            ..MachineConfig::default()
        });
        assert_error(m.eval("1 + 2 + 3 + 4"), "step limit exceeded (5)");
        assert_eq!(m.eval("1 + 2").unwrap(), Value::Int(3));
    }

    #[test]
    fn test_stack_limit() {
        let mut m = Machine::with_config(MachineConfig {
            max_stack_size: 3,
            ..MachineConfig::default()
        });
        assert_error(m.eval("1 + (2 + (3 + (4 + 5)))"), "operand stack limit exceeded (3)");
    }

    // ─── Kind changes across loads ───

    #[test]
    fn test_redefined_kind_is_a_runtime_type_error() {
        let mut m = run_src("x = 1; y = x + 1;");
        m.extend_str("x(a) = a;", "override.cfg").unwrap();
        assert_error(
            m.get("y", MissingNameConfig::Abort).map(|v| v.unwrap_or(Value::Int(0))),
            "function 'x' cannot be used as a value",
        );
    }

    #[test]
    fn test_extend_overrides_in_place() {
        let mut m = run_src("a = 1; b = 2;");
        m.extend_str("a = 3; c = a + b;", "local.cfg").unwrap();
        assert_eq!(m.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(m.get("c", MissingNameConfig::Abort).unwrap(), Some(Value::Int(5)));
    }

    #[test]
    fn test_failed_load_keeps_contents() {
        let mut m = run_src("a = 1; print a;");
        assert!(m.extend_str("b = nope;", "bad.cfg").is_err());
        assert!(m.read_str("a = ;", "bad.cfg").is_err());
        assert!(m.find("b").is_none());
        assert_eq!(m.get("a", MissingNameConfig::Abort).unwrap(), Some(Value::Int(1)));
        assert_eq!(m.printed(), &[Value::Int(1)]);
    }

    #[test]
    fn test_assign_element_on_non_array() {
        let mut m = run_src("s = 1;");
        let fault = m
            .assign_element("s", &[0], IcodeVector::literal(Cell::Int(2)))
            .unwrap_err();
        assert_eq!(
            fault,
            IndexFault::Rank {
                expected: 0,
                found: 1
            }
        );
    }

    #[test]
    fn test_evaluate_restores_depth() {
        let mut m = run_src("");
        m.push(Cell::Int(1));
        let code = IcodeVector::from(vec![Cell::Int(1), Cell::Int(0), Cell::Op(Opcode::Divide)]);
        assert!(m.evaluate(&code).is_err());
        assert_eq!(m.depth(), 1);
    }

    #[test]
    fn test_malformed_program_rejected() {
        let mut m = Machine::new();
        let code = IcodeVector::from(vec![Cell::Int(1), Cell::Int(2)]);
        assert!(m.run_program(&code).is_err());
        assert_eq!(m.depth(), 0);
    }
}
