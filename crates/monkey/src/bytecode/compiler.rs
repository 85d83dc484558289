//! Single-pass bytecode compiler (spec.md §5, §6).

use thiserror::Error;
use tracing::debug;

use crate::ast::{Expression, Program, Statement};
use crate::builtins::BUILTINS;
use crate::bytecode::code::{make_instruction, Instructions, Opcode};
use crate::bytecode::symbol_table::{SymbolScope, SymbolTable};
use crate::object::Object;

#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("identifier not found: {0}")]
    UnknownIdentifier(String),
    #[error("unknown operator: {0}")]
    UnknownOperator(String),
    #[error(
        "cannot compile a closure over local `{0}` from an enclosing function; \
         only globals, builtins, and the function's own locals/parameters are supported"
    )]
    UnsupportedClosure(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

/// Compiles a parsed [`Program`] into a flat constant pool plus bytecode.
/// Each function literal compiles to its own nested `Instructions` blob
/// stored as an `Object::CompiledFunction` in the constant pool — there is no
/// separate "chunk" concept beyond that.
pub struct Compiler {
    constants: Vec<Object>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    #[must_use]
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, (name, _)) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, *name);
        }
        Self {
            constants: Vec::new(),
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Reuses a prior compiler's constant pool and globals — used by the
    /// REPL so each line sees definitions from earlier lines.
    #[must_use]
    pub fn new_with_state(constants: Vec<Object>, symbol_table: SymbolTable) -> Self {
        Self {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    #[must_use]
    pub fn bytecode(&self) -> Bytecode<'_> {
        Bytecode {
            instructions: &self.current_scope().instructions,
            constants: &self.constants,
        }
    }

    /// Consumes the compiler, returning its constant pool and symbol table
    /// together — used by the REPL, which needs to thread both into the
    /// next line's compiler regardless of whether this line's run
    /// succeeded.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Object>, SymbolTable) {
        (self.constants, self.symbol_table)
    }

    pub fn compile_program(&mut self, program: &Program) -> Result<(), CompileError> {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_statement(&mut self, stmt: &Statement) -> Result<(), CompileError> {
        match stmt {
            Statement::Expression(es) => {
                if let Some(expr) = &es.expression {
                    self.compile_expression(expr)?;
                    self.emit(Opcode::OpPop, &[]);
                }
                Ok(())
            }
            Statement::Let(ls) => {
                // Value is compiled before the binding is defined, so `let x
                // = x;` resolves `x` against whatever the name meant in an
                // enclosing scope (or fails to resolve) rather than reading
                // its own not-yet-initialized slot.
                if let Some(value) = &ls.value {
                    self.compile_expression(value)?;
                }
                let symbol = self.symbol_table.define(&ls.name.value);
                match symbol.scope {
                    SymbolScope::Global => self.emit(Opcode::OpSetGlobal, &[symbol.index]),
                    SymbolScope::Local => self.emit(Opcode::OpSetLocal, &[symbol.index]),
                    SymbolScope::Builtin => unreachable!("let cannot shadow a builtin index"),
                };
                Ok(())
            }
            Statement::Return(rs) => {
                if let Some(value) = &rs.return_value {
                    self.compile_expression(value)?;
                } else {
                    self.emit(Opcode::OpNull, &[]);
                }
                self.emit(Opcode::OpReturnValue, &[]);
                Ok(())
            }
            Statement::Block(block) => {
                for stmt in &block.statements {
                    self.compile_statement(stmt)?;
                }
                Ok(())
            }
        }
    }

    fn compile_expression(&mut self, expr: &Expression) -> Result<(), CompileError> {
        match expr {
            Expression::IntegerLiteral(il) => {
                let constant = self.add_constant(Object::Integer(il.value));
                self.emit(Opcode::OpConstant, &[constant]);
                Ok(())
            }
            Expression::StringLiteral(sl) => {
                let constant = self.add_constant(Object::String(sl.value.as_str().into()));
                self.emit(Opcode::OpConstant, &[constant]);
                Ok(())
            }
            Expression::Boolean(b) => {
                self.emit(if b.value { Opcode::OpTrue } else { Opcode::OpFalse }, &[]);
                Ok(())
            }
            Expression::Array(al) => {
                for el in &al.elements {
                    self.compile_expression(el)?;
                }
                self.emit(Opcode::OpArray, &[al.elements.len()]);
                Ok(())
            }
            Expression::Index(ix) => {
                self.compile_expression(&ix.left)?;
                self.compile_expression(&ix.index)?;
                self.emit(Opcode::OpIndex, &[]);
                Ok(())
            }
            Expression::Prefix(pe) => {
                self.compile_expression(&pe.right)?;
                match pe.operator.as_str() {
                    "!" => self.emit(Opcode::OpBang, &[]),
                    "-" => self.emit(Opcode::OpMinus, &[]),
                    other => return Err(CompileError::UnknownOperator(other.to_string())),
                };
                Ok(())
            }
            Expression::Infix(ie) => {
                // `<`/`<=` are compiled by swapping operand order and
                // reusing `OpGreaterThan`/its complement — there is no
                // dedicated less-than opcode (spec.md §5).
                if ie.operator == "<" {
                    self.compile_expression(&ie.right)?;
                    self.compile_expression(&ie.left)?;
                    self.emit(Opcode::OpGreaterThan, &[]);
                    return Ok(());
                }
                self.compile_expression(&ie.left)?;
                self.compile_expression(&ie.right)?;
                match ie.operator.as_str() {
                    "+" => self.emit(Opcode::OpAdd, &[]),
                    "-" => self.emit(Opcode::OpSub, &[]),
                    "*" => self.emit(Opcode::OpMul, &[]),
                    "/" => self.emit(Opcode::OpDiv, &[]),
                    ">" => self.emit(Opcode::OpGreaterThan, &[]),
                    "==" => self.emit(Opcode::OpEqual, &[]),
                    "!=" => self.emit(Opcode::OpNotEqual, &[]),
                    "and" => self.emit(Opcode::OpAnd, &[]),
                    "or" => self.emit(Opcode::OpOr, &[]),
                    other => return Err(CompileError::UnknownOperator(other.to_string())),
                };
                Ok(())
            }
            Expression::If(ie) => {
                self.compile_expression(&ie.condition)?;
                let jump_not_truthy_pos = self.emit(Opcode::OpJumpNotTruthy, &[9999]);
                self.compile_block(&ie.consequence)?;
                if self.last_instruction_is(Opcode::OpPop) {
                    self.remove_last_pop();
                }
                let jump_pos = self.emit(Opcode::OpJump, &[9999]);
                let after_consequence = self.current_scope().instructions.len();
                self.replace_operand(jump_not_truthy_pos, after_consequence);

                match &ie.alternative {
                    Some(alt) => {
                        self.compile_block(alt)?;
                        if self.last_instruction_is(Opcode::OpPop) {
                            self.remove_last_pop();
                        }
                    }
                    None => {
                        self.emit(Opcode::OpNull, &[]);
                    }
                }
                let after_alternative = self.current_scope().instructions.len();
                self.replace_operand(jump_pos, after_alternative);
                Ok(())
            }
            Expression::Identifier(ident) => {
                if self.symbol_table.resolves_local_in_outer_function(&ident.value) {
                    return Err(CompileError::UnsupportedClosure(ident.value.clone()));
                }
                let symbol = self
                    .symbol_table
                    .resolve(&ident.value)
                    .ok_or_else(|| CompileError::UnknownIdentifier(ident.value.clone()))?;
                match symbol.scope {
                    SymbolScope::Global => self.emit(Opcode::OpGetGlobal, &[symbol.index]),
                    SymbolScope::Local => self.emit(Opcode::OpGetLocal, &[symbol.index]),
                    SymbolScope::Builtin => self.emit(Opcode::OpGetBuiltin, &[symbol.index]),
                };
                Ok(())
            }
            Expression::Function(fl) => {
                self.enter_scope();
                for param in &fl.parameters {
                    self.symbol_table.define(&param.value);
                }
                for stmt in &fl.body.statements {
                    self.compile_statement(stmt)?;
                }
                if self.last_instruction_is(Opcode::OpPop) {
                    self.replace_last_pop_with_return();
                }
                if !self.last_instruction_is(Opcode::OpReturnValue) {
                    self.emit(Opcode::OpReturn, &[]);
                }
                let num_locals = self.symbol_table.num_definitions();
                let instructions = self.leave_scope();
                let compiled = Object::CompiledFunction(std::rc::Rc::new(crate::object::CompiledFunction {
                    instructions,
                    num_locals,
                    num_parameters: fl.parameters.len(),
                }));
                let constant = self.add_constant(compiled);
                self.emit(Opcode::OpConstant, &[constant]);
                Ok(())
            }
            Expression::Call(ce) => {
                self.compile_expression(&ce.function)?;
                for arg in &ce.arguments {
                    self.compile_expression(arg)?;
                }
                self.emit(Opcode::OpCall, &[ce.arguments.len()]);
                Ok(())
            }
        }
    }

    fn compile_block(&mut self, block: &crate::ast::BlockStatement) -> Result<(), CompileError> {
        for stmt in &block.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::new_enclosed(outer);
        debug!(depth = self.scopes.len(), "entering compilation scope");
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("scope stack underflow");
        let outer = std::mem::take(&mut self.symbol_table)
            .into_outer()
            .expect("leave_scope called without a matching enter_scope");
        self.symbol_table = outer;
        debug!(depth = self.scopes.len() + 1, "leaving compilation scope");
        scope.instructions
    }

    fn current_scope(&self) -> &CompilationScope {
        self.scopes.last().expect("scope stack is never empty")
    }

    fn current_scope_mut(&mut self) -> &mut CompilationScope {
        self.scopes.last_mut().expect("scope stack is never empty")
    }

    fn add_constant(&mut self, obj: Object) -> usize {
        self.constants.push(obj);
        self.constants.len() - 1
    }

    fn emit(&mut self, op: Opcode, operands: &[usize]) -> usize {
        let ins = make_instruction(op, operands);
        let position = self.current_scope().instructions.len();
        let scope = self.current_scope_mut();
        scope.instructions.extend_from_slice(&ins);
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode: op, position });
        position
    }

    fn last_instruction_is(&self, op: Opcode) -> bool {
        self.current_scope()
            .last_instruction
            .is_some_and(|last| last.opcode == op)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.current_scope_mut();
        let last = scope.last_instruction.expect("remove_last_pop requires a last instruction");
        scope.instructions.truncate(last.position);
        scope.last_instruction = scope.previous_instruction;
    }

    fn replace_last_pop_with_return(&mut self) {
        let scope = self.current_scope_mut();
        let last = scope
            .last_instruction
            .expect("replace_last_pop_with_return requires a last instruction");
        let new_instruction = make_instruction(Opcode::OpReturnValue, &[]);
        scope.instructions[last.position..last.position + new_instruction.len()]
            .copy_from_slice(&new_instruction);
        scope.last_instruction = Some(EmittedInstruction {
            opcode: Opcode::OpReturnValue,
            position: last.position,
        });
    }

    fn replace_operand(&mut self, position: usize, operand: usize) {
        let scope = self.current_scope_mut();
        let op = Opcode::from_byte(scope.instructions[position]).expect("position is an opcode byte");
        let new_instruction = make_instruction(op, &[operand]);
        scope.instructions[position..position + new_instruction.len()].copy_from_slice(&new_instruction);
        debug!(position, target = operand, "patched forward jump");
    }
}

pub struct Bytecode<'a> {
    pub instructions: &'a Instructions,
    pub constants: &'a [Object],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn compile(input: &str) -> Compiler {
        let lexer = Lexer::new(input);
        let mut parser = Parser::new(lexer);
        let program = parser.parse_program();
        assert!(parser.errors().is_empty(), "parse errors: {:?}", parser.errors());
        let mut compiler = Compiler::new();
        compiler.compile_program(&program).expect("compile should succeed");
        compiler
    }

    #[test]
    fn compiles_integer_arithmetic_with_pop_after_each_statement() {
        let compiler = compile("1 + 2");
        let bytecode = compiler.bytecode();
        assert_eq!(bytecode.constants.len(), 2);
        assert_eq!(*bytecode.instructions.last().unwrap(), Opcode::OpPop as u8);
    }

    #[test]
    fn less_than_is_compiled_via_swapped_greater_than() {
        let compiler = compile("1 < 2;");
        let bytecode = compiler.bytecode();
        assert!(bytecode.instructions.contains(&(Opcode::OpGreaterThan as u8)));
    }

    #[test]
    fn global_let_bindings_emit_set_and_get_global() {
        let compiler = compile("let x = 1; x;");
        let bytecode = compiler.bytecode();
        assert!(bytecode.instructions.contains(&(Opcode::OpSetGlobal as u8)));
        assert!(bytecode.instructions.contains(&(Opcode::OpGetGlobal as u8)));
    }

    #[test]
    fn rejects_closing_over_an_outer_functions_local() {
        let lexer = Lexer::new("fn(x) { fn() { x } }");
        let mut parser = Parser::new(lexer);
        let program = parser.parse_program();
        let mut compiler = Compiler::new();
        let err = compiler.compile_program(&program).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedClosure(name) if name == "x"));
    }

    #[test]
    fn if_without_alternative_compiles_a_null_branch() {
        let compiler = compile("if (true) { 10 }; 3333;");
        let bytecode = compiler.bytecode();
        assert!(bytecode.instructions.contains(&(Opcode::OpNull as u8)));
    }
}
