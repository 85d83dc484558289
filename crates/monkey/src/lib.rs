//! Lexer, parser, tree-walking evaluator, and bytecode compiler/VM for a
//! small expression-oriented language.
//!
//! Two ways to run a [`ast::Program`]: [`evaluator::eval_program`] walks the
//! AST directly against an [`object::Environment`]; [`bytecode::Compiler`]
//! compiles it to bytecode that [`bytecode::VM`] then executes. Both share
//! the same [`object::Object`] runtime model and are validated against each
//! other.

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod evaluator;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod token;

pub use bytecode::{CompileError, Compiler, SymbolTable, VmError, VM};
pub use evaluator::eval_program;
pub use lexer::Lexer;
pub use object::{Environment, Object};
pub use parser::Parser;
