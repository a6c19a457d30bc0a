use std::collections::HashMap;

use tracing::{debug, info};

use crate::{
    bytecode::{
        builtin::Builtin,
        cell::{Cell, Opcode},
        compile_error::{CompileDiagnostic, CompileError},
        ir::{ArrayInfo, EntryKind, IcodeVector, MAX_ARRAY_DIMS, PiecewiseLinear, SymbolTableEntry},
        stack_check_error::check_cells,
    },
    lang::{
        node::{BinaryOp, Expr, ExprKind, Stmt, StmtKind},
        program::Program,
        value::Value,
    },
    runtime::{
        convert::{index_value, result_to_cell},
        machine::Machine,
    },
};

/// What the compiler needs to know about a name to emit references to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    Scalar,
    Array { rank: usize },
    Function { arity: usize },
    Pwl,
}

impl Signature {
    pub fn of(entry: &SymbolTableEntry) -> Self {
        match &entry.kind {
            EntryKind::Scalar(_) => Signature::Scalar,
            EntryKind::Array(info) => Signature::Array { rank: info.rank() },
            EntryKind::Function { params, .. } => Signature::Function {
                arity: params.len(),
            },
            EntryKind::Pwl(_) => Signature::Pwl,
        }
    }

    pub fn kind_name(self) -> &'static str {
        match self {
            Signature::Scalar => "scalar",
            Signature::Array { .. } => "array",
            Signature::Function { .. } => "function",
            Signature::Pwl => "piecewise-linear table",
        }
    }
}

pub struct Compiler {
    /// Final signature of every name visible to the fragment being compiled:
    /// entries already loaded, overridden by this fragment's declarations.
    signatures: HashMap<String, Signature>,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            signatures: HashMap::new(),
        }
    }

    /// Starts from the signatures of already-loaded entries.
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = &'a SymbolTableEntry>) -> Self {
        let signatures = entries
            .into_iter()
            .map(|entry| (entry.name.clone(), Signature::of(entry)))
            .collect();
        Self { signatures }
    }

    pub fn signature(&self, name: &str) -> Option<Signature> {
        self.signatures.get(name).copied()
    }

    /// Records the signature of every declaration in `program`, last one
    /// winning, so bodies can refer to names declared further down.
    pub fn declare_program(&mut self, program: &Program) -> Result<(), CompileDiagnostic> {
        for stmt in &program.statements {
            let (name, signature) = match &stmt.kind {
                StmtKind::Scalar { name, .. } => (name, Signature::Scalar),
                StmtKind::Function { name, params, .. } => {
                    for (i, param) in params.iter().enumerate() {
                        if params[..i].contains(param) {
                            return Err(CompileError::invalid(
                                name,
                                format!("declares parameter '{}' twice", param),
                            )
                            .at(stmt.span));
                        }
                    }
                    (
                        name,
                        Signature::Function {
                            arity: params.len(),
                        },
                    )
                }
                StmtKind::Pwl { name, .. } => (name, Signature::Pwl),
                StmtKind::Array { name, sizes, .. } => {
                    let rank = sizes.as_ref().map_or(1, Vec::len);
                    if rank > MAX_ARRAY_DIMS {
                        return Err(CompileError::invalid(
                            name,
                            format!(
                                "has {} dimensions, at most {} are allowed",
                                rank, MAX_ARRAY_DIMS
                            ),
                        )
                        .at(stmt.span));
                    }
                    (name, Signature::Array { rank })
                }
                StmtKind::ElementAssign { .. } | StmtKind::Print(_) => continue,
            };

            if Builtin::lookup(name).is_some() {
                return Err(CompileError::builtin_redefinition(name).at(stmt.span));
            }
            self.signatures.insert(name.to_string(), signature);
        }
        Ok(())
    }

    /// Compiles an expression to a program that leaves exactly one value.
    ///
    /// `params` are the formal parameters in scope; they shadow declared
    /// names of the same spelling.
    pub fn compile_expr(&self, expr: &Expr, params: &[String]) -> Result<IcodeVector, CompileDiagnostic> {
        let mut code = IcodeVector::new();
        self.emit(expr, params, &mut code)?;

        check_cells(code.cells())
            .map_err(|e| CompileError::internal(e.to_string()).at(expr.span))?;

        Ok(code)
    }

    fn emit(&self, expr: &Expr, params: &[String], out: &mut IcodeVector) -> Result<(), CompileDiagnostic> {
        let fail = |error: CompileError| error.at(expr.span);

        match &expr.kind {
            ExprKind::Int(n) => out.push(Cell::Int(*n)),
            ExprKind::Double(x) => out.push(Cell::Double(*x)),
            ExprKind::Str(s) => out.push(Cell::String(s.clone())),
            ExprKind::Bool(b) => out.push(Cell::Bool(*b)),

            ExprKind::Name(name) => {
                if params.contains(name) {
                    out.push(Cell::Variable(name.clone()));
                    return Ok(());
                }
                match self.signature(name) {
                    Some(Signature::Scalar) => out.push(Cell::Variable(name.clone())),
                    Some(other) => return Err(fail(CompileError::not_a_value(name, other.kind_name()))),
                    None if Builtin::lookup(name).is_some() => {
                        return Err(fail(CompileError::not_a_value(name, "builtin function")));
                    }
                    None => return Err(fail(CompileError::undeclared(name))),
                }
            }

            ExprKind::Call { name, args } => {
                if params.contains(name) {
                    return Err(fail(CompileError::not_callable(name, "parameter")));
                }

                let (cell, arity) = if let Some(builtin) = Builtin::lookup(name) {
                    (Cell::Op(builtin.opcode()), builtin.arity())
                } else {
                    match self.signature(name) {
                        Some(Signature::Function { arity }) => (
                            Cell::FunctionRef {
                                name: name.clone(),
                                arity,
                            },
                            arity,
                        ),
                        Some(Signature::Pwl) => (Cell::PwlRef(name.clone()), 1),
                        Some(other) => {
                            return Err(fail(CompileError::not_callable(name, other.kind_name())));
                        }
                        None => return Err(fail(CompileError::undeclared(name))),
                    }
                };

                if args.len() != arity {
                    return Err(fail(CompileError::arity_mismatch(name, arity, args.len())));
                }
                for arg in args {
                    self.emit(arg, params, out)?;
                }
                out.push(cell);
            }

            ExprKind::Index { name, indices } => {
                if params.contains(name) {
                    return Err(fail(CompileError::not_indexable(name, "parameter")));
                }
                let rank = match self.signature(name) {
                    Some(Signature::Array { rank }) => rank,
                    Some(other) => {
                        return Err(fail(CompileError::not_indexable(name, other.kind_name())));
                    }
                    None if Builtin::lookup(name).is_some() => {
                        return Err(fail(CompileError::not_indexable(name, "builtin function")));
                    }
                    None => return Err(fail(CompileError::undeclared(name))),
                };
                if indices.len() != rank {
                    return Err(fail(CompileError::index_count(name, rank, indices.len())));
                }
                for index in indices {
                    self.emit(index, params, out)?;
                }
                out.push(Cell::ArrayRef {
                    name: name.clone(),
                    rank,
                });
            }

            ExprKind::Negate(inner) => match &inner.kind {
                // fold negative literals
                ExprKind::Int(n) => out.push(Cell::Int(-n)),
                ExprKind::Double(x) => out.push(Cell::Double(-x)),
                _ => {
                    self.emit(inner, params, out)?;
                    out.push(Cell::Op(Opcode::Negate));
                }
            },

            ExprKind::Binary {
                op: BinaryOp::Pow,
                lhs,
                rhs,
            } if matches!(rhs.kind, ExprKind::Int(2)) => {
                self.emit(lhs, params, out)?;
                out.push(Cell::Op(Opcode::Square));
            }

            ExprKind::Binary { op, lhs, rhs } => {
                self.emit(lhs, params, out)?;
                self.emit(rhs, params, out)?;
                out.push(Cell::Op(opcode_for(*op)));
            }
        }

        Ok(())
    }

    /// Compiles `program` into `machine`'s global scope, statement by
    /// statement.
    ///
    /// Scalars, array elements and function bodies are stored unevaluated.
    /// Array sizes, element-assignment indices, table points and `print`
    /// arguments are evaluated here against what has been stored so far.
    pub fn compile_program(&mut self, program: &Program, machine: &mut Machine) -> Result<(), CompileDiagnostic> {
        self.declare_program(program)?;

        for stmt in &program.statements {
            self.compile_statement(stmt, machine)?;
        }

        debug!(
            statements = program.statements.len(),
            "compiled config fragment"
        );
        Ok(())
    }

    fn compile_statement(&self, stmt: &Stmt, machine: &mut Machine) -> Result<(), CompileDiagnostic> {
        match &stmt.kind {
            StmtKind::Scalar { name, value } => {
                let code = self.compile_expr(value, &[])?;
                machine.define(SymbolTableEntry::scalar(name, code));
            }

            StmtKind::Function { name, params, body } => {
                let code = self.compile_expr(body, params)?;
                machine.define(SymbolTableEntry::function(name, params.clone(), code));
            }

            StmtKind::Pwl { name, points } => {
                let mut table = Vec::with_capacity(points.len());
                for (i, (x, y)) in points.iter().enumerate() {
                    let what = |axis: &str| format!("{} of point {} in '{}'", axis, i, name);
                    let x = self.eval_number(x, machine, &what("x"))?;
                    let y = self.eval_number(y, machine, &what("y"))?;
                    table.push((x, y));
                }
                let table = PiecewiseLinear::new(table)
                    .map_err(|reason| CompileError::invalid(name, reason).at(stmt.span))?;
                machine.define(SymbolTableEntry::pwl(name, table));
            }

            StmtKind::Array {
                name,
                sizes,
                elements,
            } => {
                let dims = match sizes {
                    Some(sizes) => {
                        let mut dims = Vec::with_capacity(sizes.len());
                        for (axis, size) in sizes.iter().enumerate() {
                            let what = format!("size of dimension {} of '{}'", axis, name);
                            let n = self.eval_index(size, machine, &what)?;
                            if n < 1 {
                                return Err(CompileError::invalid(
                                    name,
                                    format!("dimension {} has size {}, sizes must be at least 1", axis, n),
                                )
                                .at(size.span));
                            }
                            dims.push(n as usize);
                        }
                        dims
                    }
                    None => vec![elements.len()],
                };

                let capacity = dims
                    .iter()
                    .try_fold(1usize, |acc, &d| acc.checked_mul(d))
                    .ok_or_else(|| CompileError::invalid(name, "is too large").at(stmt.span))?;
                let limit = machine.config().max_array_elements;
                if capacity > limit {
                    return Err(CompileError::invalid(
                        name,
                        format!("has {} elements, at most {} are allowed", capacity, limit),
                    )
                    .at(stmt.span));
                }
                if elements.len() > capacity {
                    return Err(CompileError::invalid_with_hint(
                        name,
                        format!(
                            "has {} initializers but room for only {} elements",
                            elements.len(),
                            capacity
                        ),
                        "missing trailing elements are filled with 0; extra ones are an error",
                    )
                    .at(stmt.span));
                }

                let codes = elements
                    .iter()
                    .map(|e| self.compile_expr(e, &[]))
                    .collect::<Result<Vec<_>, _>>()?;
                machine.define(SymbolTableEntry::array(name, ArrayInfo::new(dims, codes)));
            }

            StmtKind::ElementAssign {
                name,
                indices,
                value,
            } => {
                let rank = match machine.global_entry(name) {
                    Some(entry) => match entry.as_array() {
                        Some(info) => info.rank(),
                        None => {
                            return Err(CompileError::not_indexable(name, entry.kind_name()).at(stmt.span));
                        }
                    },
                    None => return Err(CompileError::undeclared(name).at(stmt.span)),
                };
                if indices.len() != rank {
                    return Err(CompileError::index_count(name, rank, indices.len()).at(stmt.span));
                }

                let mut tuple = Vec::with_capacity(indices.len());
                for (axis, index) in indices.iter().enumerate() {
                    let what = format!("index {} of '{}'", axis, name);
                    tuple.push(self.eval_index(index, machine, &what)?);
                }

                let code = self.compile_expr(value, &[])?;
                machine
                    .assign_element(name, &tuple, code)
                    .map_err(|fault| CompileError::invalid(name, fault.to_string()).at(stmt.span))?;
            }

            StmtKind::Print(expr) => {
                let value = self.eval_const(expr, machine, "print statement")?;
                info!(value = %value, "print");
                machine.record_print(value);
            }
        }

        Ok(())
    }

    fn eval_const(&self, expr: &Expr, machine: &mut Machine, what: &str) -> Result<Value, CompileDiagnostic> {
        let code = self.compile_expr(expr, &[])?;
        machine
            .evaluate(&code)
            .map_err(|e| CompileError::const_eval(what, e).at(expr.span))
    }

    fn eval_number(&self, expr: &Expr, machine: &mut Machine, what: &str) -> Result<f64, CompileDiagnostic> {
        let value = self.eval_const(expr, machine, what)?;
        value
            .as_double()
            .ok_or_else(|| CompileError::const_type(what, "a number", &value).at(expr.span))
    }

    fn eval_index(&self, expr: &Expr, machine: &mut Machine, what: &str) -> Result<i64, CompileDiagnostic> {
        let value = self.eval_const(expr, machine, what)?;
        index_value(&result_to_cell(value.clone()))
            .map_err(|_| CompileError::const_type(what, "an integer", &value).at(expr.span))
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

fn opcode_for(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Sub => Opcode::Subtract,
        BinaryOp::Mul => Opcode::Multiply,
        BinaryOp::Div => Opcode::Divide,
        BinaryOp::Pow => Opcode::Power,
        BinaryOp::Lt => Opcode::Lt,
        BinaryOp::Le => Opcode::Le,
        BinaryOp::Gt => Opcode::Gt,
        BinaryOp::Ge => Opcode::Ge,
        BinaryOp::Eq => Opcode::Eq,
        BinaryOp::Ne => Opcode::Ne,
    }
}
