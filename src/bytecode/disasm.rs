use std::io::{self, Write};

use crate::bytecode::cell::{Cell, Opcode};
use crate::bytecode::ir::{EntryKind, IcodeVector, SymbolTableEntry};

const RULE: &str = "════════════════════════════════════════";

/// Writes the bytecode of every entry, one banner per entry.
pub fn write_entries<'a>(
    out: &mut impl Write,
    entries: impl IntoIterator<Item = &'a SymbolTableEntry>,
) -> io::Result<()> {
    writeln!(out, "=== BYTECODE ===")?;
    writeln!(out)?;
    for entry in entries {
        write_entry(out, entry)?;
    }
    Ok(())
}

pub fn write_entry(out: &mut impl Write, entry: &SymbolTableEntry) -> io::Result<()> {
    let title = match &entry.kind {
        EntryKind::Function { params, .. } => format!("{}({})", entry.name, params.join(", ")),
        _ => entry.name.clone(),
    };

    writeln!(out, "{}", RULE)?;
    writeln!(out, " {} ({})", title, entry.kind_name())?;
    writeln!(out, " {}", size_line(&entry.kind))?;
    writeln!(out, "{}", RULE)?;

    match &entry.kind {
        EntryKind::Scalar(code) | EntryKind::Function { body: code, .. } => {
            out.write_all(disassemble(code, 0).as_bytes())?;
        }
        EntryKind::Array(info) => {
            for (offset, code) in info.elements().iter().enumerate() {
                let index: String = info
                    .index_tuple(offset)
                    .iter()
                    .map(|i| format!("[{}]", i))
                    .collect();
                writeln!(out, "{}:", index)?;
                out.write_all(disassemble(code, 1).as_bytes())?;
            }
        }
        EntryKind::Pwl(table) => {
            for (i, (x, y)) in table.points().iter().enumerate() {
                writeln!(out, "{:04}  POINT       ({:?}, {:?})", i, x, y)?;
            }
        }
    }
    writeln!(out)
}

fn size_line(kind: &EntryKind) -> String {
    match kind {
        EntryKind::Scalar(code) | EntryKind::Function { body: code, .. } => {
            format!("{} cells", code.len())
        }
        EntryKind::Array(info) => {
            let dims: Vec<String> = info.dims().iter().map(usize::to_string).collect();
            format!("{} elements, dims {}", info.len(), dims.join("x"))
        }
        EntryKind::Pwl(table) => format!("{} points", table.points().len()),
    }
}

/// Returns a listing of `code`, one cell per line.
pub fn disassemble(code: &IcodeVector, indent: usize) -> String {
    let prefix = "  ".repeat(indent);
    let mut output = String::new();

    for (ip, cell) in code.cells().iter().enumerate() {
        output.push_str(&format!("{}{:04}  {}\n", prefix, ip, format_cell(cell)));
    }

    output
}

fn format_cell(cell: &Cell) -> String {
    match cell {
        Cell::Int(_) | Cell::Double(_) | Cell::String(_) | Cell::Bool(_) => {
            format!("PUSH        {}", cell)
        }
        Cell::Variable(name) => format!("LOAD        {}", name),
        Cell::PwlRef(name) => format!("{:<24}; ( x -- y )", format!("PWL         {}", name)),
        Cell::FunctionRef { name, arity } => {
            format!("{:<24}; ( {} -- v )", format!("CALL        {}", name), arg_list("a", *arity))
        }
        Cell::ArrayRef { name, rank } => {
            format!("{:<24}; ( {} -- v )", format!("INDEX       {}", name), arg_list("i", *rank))
        }
        Cell::Op(op) => format_op(*op),
    }
}

fn format_op(op: Opcode) -> String {
    match op {
        Opcode::Builtin1(builtin) => format!("{:<24}; ( x -- {}(x) )", format!("BUILTIN1    {}", builtin), builtin),
        Opcode::Builtin2(builtin) => {
            format!("{:<24}; ( a b -- {}(a, b) )", format!("BUILTIN2    {}", builtin), builtin)
        }
        Opcode::Square => format!("{:<24}; ( x -- x*x )", "SQUARE"),
        Opcode::Power => format!("{:<24}; ( a b -- a^b ) double", "POW"),
        other => other.mnemonic().to_string(),
    }
}

fn arg_list(stem: &str, n: usize) -> String {
    match n {
        0 => String::new(),
        1 => format!("{}1", stem),
        n => format!("{}1..{}{}", stem, stem, n),
    }
}
