//! Line-oriented REPLs, one per evaluation strategy.
//!
//! Each REPL reads one line at a time, lexes and parses it, and either
//! evaluates the resulting [`monkey::ast::Program`] directly or compiles and
//! runs it on the VM. State (the tree-walker's `Environment`, or the VM's
//! constant pool / globals / symbol table) persists across lines within a
//! single REPL session.

use std::io::{BufRead, Write};

use monkey::bytecode::{Compiler, SymbolTable, VM};
use monkey::object::Environment;
use monkey::{Lexer, Parser};

const TREE_PROMPT: &str = ">> ";
const VM_PROMPT: &str = "> ";

fn print_parse_errors(out: &mut impl Write, errors: &[String]) {
    for msg in errors {
        let _ = writeln!(out, "\t{msg}");
    }
}

/// Runs the tree-walking-evaluator REPL until `input` is exhausted.
pub fn run_tree_walking(mut input: impl BufRead, mut out: impl Write) {
    let env = Environment::new();
    let mut line = String::new();

    loop {
        let _ = write!(out, "{TREE_PROMPT}");
        let _ = out.flush();
        line.clear();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }

        let lexer = Lexer::new(&line);
        let mut parser = Parser::new(lexer);
        let program = parser.parse_program();
        if !parser.errors().is_empty() {
            print_parse_errors(&mut out, parser.errors());
            continue;
        }

        let result = monkey::eval_program(&program, &env);
        let _ = writeln!(out, "{}", result.inspect());
    }
}

/// Runs the VM REPL until `input` is exhausted. The constant pool, global
/// slot array, and symbol table are threaded through a fresh [`Compiler`]
/// and [`VM`] on every line so `let` bindings and function definitions
/// persist across lines.
pub fn run_vm(mut input: impl BufRead, mut out: impl Write) {
    let mut constants = Vec::new();
    let mut globals = vec![monkey::Object::Null; 65536];
    let mut symbol_table = SymbolTable::new();
    for (index, (name, _)) in monkey::builtins::BUILTINS.iter().enumerate() {
        symbol_table.define_builtin(index, *name);
    }
    let mut line = String::new();

    loop {
        let _ = write!(out, "{VM_PROMPT}");
        let _ = out.flush();
        line.clear();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }

        let lexer = Lexer::new(&line);
        let mut parser = Parser::new(lexer);
        let program = parser.parse_program();
        if !parser.errors().is_empty() {
            print_parse_errors(&mut out, parser.errors());
            continue;
        }

        let mut compiler = Compiler::new_with_state(constants, symbol_table);
        if let Err(err) = compiler.compile_program(&program) {
            let _ = writeln!(out, "Woops! Compilation failed:\n {err}");
            (constants, symbol_table) = compiler.into_parts();
            continue;
        }

        let mut vm = VM::with_globals(compiler.bytecode(), std::mem::take(&mut globals));
        (constants, symbol_table) = compiler.into_parts();
        if let Err(err) = vm.run() {
            let _ = writeln!(out, "Woops! Executing bytecode failed:\n {err}");
            globals = vm.into_globals();
            continue;
        }

        let _ = writeln!(out, "{}", vm.last_popped_stack_elem().inspect());
        globals = vm.into_globals();
    }
}
