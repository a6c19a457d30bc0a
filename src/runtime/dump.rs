//! Algebraic re-rendering of compiled entries.
//!
//! Postfix programs are folded back into infix text that the parser reads
//! back to the same program, with parentheses only where precedence needs
//! them.

use crate::bytecode::cell::{Cell, Opcode};
use crate::bytecode::ir::{EntryKind, IcodeVector, SymbolTableEntry};

/// Binding strength of a rendered fragment, loosest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
    Compare,
    Additive,
    Term,
    Power,
    Unary,
    Primary,
}

struct Fragment {
    text: String,
    level: Level,
}

impl Fragment {
    fn new(text: String, level: Level) -> Self {
        Self { text, level }
    }

    fn primary(text: String) -> Self {
        Self::new(text, Level::Primary)
    }

    /// Text of this fragment as an operand that must bind at least as
    /// tightly as `min`.
    fn at_least(self, min: Level) -> String {
        if self.level >= min {
            self.text
        } else {
            format!("({})", self.text)
        }
    }
}

/// Renders one entry as a declaration statement, `;` included.
pub fn render_entry(entry: &SymbolTableEntry) -> String {
    let name = &entry.name;
    match &entry.kind {
        EntryKind::Scalar(code) => format!("{} = {};", name, render_expr(code)),
        EntryKind::Function { params, body } => {
            format!("{}({}) = {};", name, params.join(", "), render_expr(body))
        }
        EntryKind::Array(info) => {
            let dims: String = info.dims().iter().map(|d| format!("[{}]", d)).collect();
            let elements: Vec<String> = info.elements().iter().map(render_expr).collect();
            format!("{}{} = [{}];", name, dims, elements.join(", "))
        }
        EntryKind::Pwl(table) => {
            let points: Vec<String> = table
                .points()
                .iter()
                .map(|(x, y)| format!("({:?}, {:?})", x, y))
                .collect();
            format!("{} = {{{}}};", name, points.join(" "))
        }
    }
}

/// Renders a postfix program as an infix expression.
///
/// A program that does not leave exactly one value falls back to its
/// postfix listing.
pub fn render_expr(code: &IcodeVector) -> String {
    let mut stack: Vec<Fragment> = Vec::new();

    for cell in code.cells() {
        let (pops, _) = cell.effect();
        if stack.len() < pops {
            return postfix_listing(code);
        }
        let args = stack.split_off(stack.len() - pops);
        stack.push(render_cell(cell, args));
    }

    match (stack.pop(), stack.is_empty()) {
        (Some(fragment), true) => fragment.text,
        _ => postfix_listing(code),
    }
}

fn render_cell(cell: &Cell, mut args: Vec<Fragment>) -> Fragment {
    match cell {
        Cell::Int(n) if *n < 0 => Fragment::new(n.to_string(), Level::Unary),
        Cell::Double(x) if x.is_sign_negative() => Fragment::new(format!("{:?}", x), Level::Unary),
        Cell::Int(_) | Cell::Double(_) | Cell::String(_) | Cell::Bool(_) => {
            Fragment::primary(cell.to_string())
        }
        Cell::Variable(name) => Fragment::primary(name.clone()),

        Cell::PwlRef(name) | Cell::FunctionRef { name, .. } => {
            Fragment::primary(call(name, args))
        }
        Cell::ArrayRef { name, .. } => {
            let indices: String = args.into_iter().map(|a| format!("[{}]", a.text)).collect();
            Fragment::primary(format!("{}{}", name, indices))
        }

        Cell::Op(op) => match op {
            Opcode::Negate => {
                // nested negation is parenthesized
                let operand = args.remove(0);
                let text = operand.at_least(Level::Primary);
                Fragment::new(format!("-{}", text), Level::Unary)
            }
            Opcode::Square => {
                let base = args.remove(0).at_least(Level::Unary);
                Fragment::new(format!("{} ^ 2", base), Level::Power)
            }
            Opcode::Nint => Fragment::primary(call("nint", args)),
            Opcode::Sign => Fragment::primary(call("sign", args)),
            Opcode::Builtin1(builtin) | Opcode::Builtin2(builtin) => {
                Fragment::primary(call(builtin.name(), args))
            }
            binary => {
                let rhs = args.pop();
                let lhs = args.pop();
                match (lhs, rhs) {
                    (Some(lhs), Some(rhs)) => render_binary(*binary, lhs, rhs),
                    _ => Fragment::primary(binary.mnemonic().to_string()),
                }
            }
        },
    }
}

fn render_binary(op: Opcode, lhs: Fragment, rhs: Fragment) -> Fragment {
    let symbol = op.infix().unwrap_or(op.mnemonic());
    let (level, lhs_min, rhs_min) = match op {
        Opcode::Add | Opcode::Subtract => (Level::Additive, Level::Additive, Level::Term),
        Opcode::Multiply | Opcode::Divide => (Level::Term, Level::Term, Level::Power),
        Opcode::Power => (Level::Power, Level::Unary, Level::Power),
        _ => (Level::Compare, Level::Additive, Level::Additive),
    };
    Fragment::new(
        format!("{} {} {}", lhs.at_least(lhs_min), symbol, rhs.at_least(rhs_min)),
        level,
    )
}

fn call(name: &str, args: Vec<Fragment>) -> String {
    let args: Vec<String> = args.into_iter().map(|a| a.text).collect();
    format!("{}({})", name, args.join(", "))
}

fn postfix_listing(code: &IcodeVector) -> String {
    let cells: Vec<String> = code.cells().iter().map(Cell::to_string).collect();
    format!("<postfix: {}>", cells.join(" "))
}
