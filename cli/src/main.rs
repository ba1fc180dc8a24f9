// cellmesh-cli/src/main.rs
// Command-line interface for cellmesh

use std::io::Write;

use cellmesh_engine::{FormulaError, Position, Sheet, Value};
use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

#[derive(Parser)]
#[command(name = "cellmesh")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Set a cell's text
    Set {
        /// Cell reference, e.g. A1
        cell: String,
        /// Cell text; formulas start with '='
        text: String,
    },

    /// Print a cell's displayed value
    Get {
        /// Cell reference, e.g. A1
        cell: String,
    },

    /// Clear a cell
    Clear {
        /// Cell reference, e.g. A1
        cell: String,
    },

    /// Print the whole sheet
    Print {
        /// "values" (default) or "texts"
        #[arg(default_value = "values")]
        kind: String,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let mut sheet = Sheet::new();

    match cli.command {
        Some(command) => {
            if let Err(e) = run_command(&mut sheet, command) {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        None => repl(&mut sheet),
    }
}

fn run_command(sheet: &mut Sheet, command: Commands) -> Result<(), String> {
    match command {
        Commands::Set { cell, text } => {
            let pos = Position::from_a1(&cell).map_err(|e| e.to_string())?;
            sheet.set_cell(pos, &text).map_err(|e| e.to_string())
        }
        Commands::Get { cell } => {
            let pos = Position::from_a1(&cell).map_err(|e| e.to_string())?;
            print_value(sheet, pos)
        }
        Commands::Clear { cell } => {
            let pos = Position::from_a1(&cell).map_err(|e| e.to_string())?;
            sheet.clear_cell(pos).map_err(|e| e.to_string())
        }
        Commands::Print { kind } => print_sheet(sheet, &kind),
    }
}

fn print_value(sheet: &Sheet, pos: Position) -> Result<(), String> {
    match sheet.get_cell(pos).map_err(|e| e.to_string())? {
        Some(handle) => println!("{}", handle.get_value()),
        // A direct get_value() on an unset cell is the empty-cell error, not
        // the blank-is-zero 0 that only applies inside formula evaluation.
        None => println!("{}", Value::Error(FormulaError::Value)),
    }
    Ok(())
}

fn print_sheet(sheet: &Sheet, kind: &str) -> Result<(), String> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match kind {
        "values" => sheet.print_values(&mut out).map_err(|e| e.to_string()),
        "texts" => sheet.print_texts(&mut out).map_err(|e| e.to_string()),
        other => Err(format!("unknown print kind: {other} (expected values or texts)")),
    }
}

/// Interactive line-oriented driver: `set`, `get`, `clear`, `print [values|texts]`.
fn repl(sheet: &mut Sheet) {
    let mut editor = DefaultEditor::new().expect("failed to initialize line editor");
    println!("cellmesh — type 'help' for commands, 'exit' to quit");

    loop {
        match editor.readline("cellmesh> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                editor.add_history_entry(line).ok();
                if !dispatch(sheet, line) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {e}");
                break;
            }
        }
    }
}

/// Returns `false` when the REPL should exit.
fn dispatch(sheet: &mut Sheet, line: &str) -> bool {
    let mut parts = line.splitn(3, char::is_whitespace);
    let cmd = parts.next().unwrap_or("");

    match cmd {
        "exit" | "quit" => return false,
        "help" => {
            println!("commands: set <cell> <text> | get <cell> | clear <cell> | print [values|texts] | exit");
        }
        "set" => {
            let cell = parts.next().unwrap_or("").trim();
            let text = parts.next().unwrap_or("").trim();
            match Position::from_a1(cell) {
                Ok(pos) => {
                    if let Err(e) = sheet.set_cell(pos, text) {
                        println!("error: {e}");
                    }
                }
                Err(e) => println!("error: {e}"),
            }
        }
        "get" => {
            let cell = parts.next().unwrap_or("").trim();
            match Position::from_a1(cell) {
                Ok(pos) => {
                    if let Err(e) = print_value(sheet, pos) {
                        println!("error: {e}");
                    }
                }
                Err(e) => println!("error: {e}"),
            }
        }
        "clear" => {
            let cell = parts.next().unwrap_or("").trim();
            match Position::from_a1(cell) {
                Ok(pos) => {
                    if let Err(e) = sheet.clear_cell(pos) {
                        println!("error: {e}");
                    }
                }
                Err(e) => println!("error: {e}"),
            }
        }
        "print" => {
            let kind = parts.next().unwrap_or("values").trim();
            let kind = if kind.is_empty() { "values" } else { kind };
            if let Err(e) = print_sheet(sheet, kind) {
                println!("error: {e}");
            }
        }
        other => println!("unknown command: {other} (try 'help')"),
    }
    std::io::stdout().flush().ok();
    true
}
