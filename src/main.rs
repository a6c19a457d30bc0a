use std::{
    fmt::Display,
    fs,
    io::{self, Write},
    path::PathBuf,
    process,
};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use econfig::Machine;
use econfig::bytecode::disasm;
use econfig::frontend::lexer::Lexer;
use econfig::frontend::parser::Parser as ConfigParser;
use econfig::frontend::token_dumper::TokenDumper;

#[derive(Parser, Debug)]
#[command(name = "econfig")]
#[command(about = "Compile and inspect config-language files")]
struct Cli {
    /// Config file to load
    file: PathBuf,

    /// Print the token stream and stop
    #[arg(long)]
    tokens: bool,

    /// Print the syntax tree and stop
    #[arg(long)]
    ast: bool,

    /// Print the compiled bytecode of every entry
    #[arg(long)]
    bc: bool,

    /// Print every entry back as source
    #[arg(long)]
    dump: bool,

    /// Evaluate every scalar and print its value
    #[arg(long)]
    constants: bool,

    /// Evaluate an expression against the loaded file (repeatable)
    #[arg(long = "eval", value_name = "EXPR")]
    eval: Vec<String>,

    /// Disable ANSI colors in token output
    #[arg(long)]
    no_color: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let label = cli.file.display().to_string();

    let source = match fs::read_to_string(&cli.file) {
        Ok(source) => source,
        Err(e) => fail(&format!("Failed to read '{}'", label), e),
    };

    if cli.tokens {
        dump_tokens(&source, cli.no_color);
        return;
    }

    if cli.ast {
        print_ast(&source);
        return;
    }

    let mut machine = Machine::new();
    if let Err(e) = machine.read_str(&source, &label) {
        fail("Config error", e);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();

    for value in machine.printed() {
        report(writeln!(out, "{}", value));
    }

    if cli.bc {
        report(disasm::write_entries(&mut out, machine.entries()));
    }

    if cli.dump {
        report(machine.dump(&mut out));
    }

    if cli.constants {
        report(machine.dump_constants(&mut out));
    }

    let mut failed = false;
    for expr in &cli.eval {
        match machine.eval(expr) {
            Ok(value) => report(writeln!(out, "{} => {}", expr, value)),
            Err(e) => {
                eprintln!("Eval error in '{}': {}", expr, e);
                failed = true;
            }
        }
    }

    if failed {
        process::exit(1);
    }
}

fn dump_tokens(source: &str, no_color: bool) {
    let tokens = match Lexer::new(source).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => fail("Lexer error", e),
    };

    let mut dumper = TokenDumper::new().pretty();
    if no_color {
        dumper = dumper.no_color();
    }

    report(dumper.dump(&tokens, &mut io::stdout().lock()));
}

fn print_ast(source: &str) {
    let tokens = match Lexer::new(source).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => fail("Lexer error", e),
    };

    match ConfigParser::new(tokens).parse() {
        Ok(program) => println!("{:#?}", program),
        Err(e) => fail("Parse error", e),
    }
}

fn report(result: io::Result<()>) {
    if let Err(e) = result {
        fail("Output error", e);
    }
}

fn fail(context: &str, error: impl Display) -> ! {
    eprintln!("{}: {}", context, error);
    process::exit(1);
}
