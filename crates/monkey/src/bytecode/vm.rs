//! Stack-based virtual machine with call frames.

use std::rc::Rc;

use thiserror::Error;
use tracing::trace;

use crate::builtins::builtin_by_index;
use crate::bytecode::code::Opcode;
use crate::bytecode::compiler::Bytecode;
use crate::bytecode::frame::Frame;
use crate::object::{CompiledFunction, Object, ObjectType};

const STACK_SIZE: usize = 2048;
const GLOBALS_SIZE: usize = 65536;
const FRAMES_SIZE: usize = 1024;

#[derive(Debug, Error, PartialEq)]
pub enum VmError {
    #[error("unsupported types for binary operation: {left} {op} {right}")]
    UnsupportedBinaryOperands {
        left: ObjectType,
        op: &'static str,
        right: ObjectType,
    },
    #[error("unsupported type for prefix {op}: {operand}")]
    UnsupportedUnaryOperand { op: &'static str, operand: ObjectType },
    #[error("unknown opcode: {0}")]
    UnknownOpcode(u8),
    #[error("wrong number of arguments: want={want}, got={got}")]
    WrongArgumentCount { want: usize, got: usize },
    #[error("calling non-function: {0}")]
    CallingNonFunction(ObjectType),
    #[error("index operator not supported: {0}")]
    UnsupportedIndex(ObjectType),
}

/// Executes compiled bytecode against a stack of values, a fixed-size
/// global slot array, and a stack of call [`Frame`]s.
///
/// Out-of-bounds array indexing pushes [`Object::Null`] rather than
/// erroring, matching the tree-walking evaluator's reference semantics.
pub struct VM {
    constants: Vec<Object>,
    stack: Vec<Object>,
    sp: usize,
    globals: Vec<Object>,
    frames: Vec<Frame>,
}

impl VM {
    #[must_use]
    pub fn new(bytecode: Bytecode<'_>) -> Self {
        Self::with_globals(bytecode, vec![Object::Null; GLOBALS_SIZE])
    }

    /// Reuses a prior run's globals — used by the REPL so each line sees
    /// `let` bindings from earlier lines.
    #[must_use]
    pub fn with_globals(bytecode: Bytecode<'_>, globals: Vec<Object>) -> Self {
        let main_fn = Rc::new(CompiledFunction {
            instructions: bytecode.instructions.clone(),
            num_locals: 0,
            num_parameters: 0,
        });
        let mut frames = Vec::with_capacity(FRAMES_SIZE);
        frames.push(Frame::new(main_fn, 0));
        Self {
            constants: bytecode.constants.to_vec(),
            stack: vec![Object::Null; STACK_SIZE],
            sp: 0,
            globals,
            frames,
        }
    }

    #[must_use]
    pub fn into_globals(self) -> Vec<Object> {
        self.globals
    }

    /// The result of a run: the slot just vacated by the final `OpPop`,
    /// which the REPL reads back as the line's value.
    #[must_use]
    pub fn last_popped_stack_elem(&self) -> &Object {
        &self.stack[self.sp]
    }

    pub fn run(&mut self) -> Result<(), VmError> {
        while !self.current_frame().is_done() {
            let op_byte = self.current_frame_mut().read_opcode();
            let op = Opcode::from_byte(op_byte).ok_or(VmError::UnknownOpcode(op_byte))?;

            match op {
                Opcode::OpConstant => {
                    let idx = self.current_frame_mut().read_u16_operand() as usize;
                    let constant = self.constants[idx].clone();
                    self.push(constant);
                }
                Opcode::OpPop => {
                    self.pop();
                }
                Opcode::OpAdd => self.execute_add()?,
                Opcode::OpSub => self.execute_integer_binary_op(op)?,
                Opcode::OpMul => self.execute_integer_binary_op(op)?,
                Opcode::OpDiv => self.execute_integer_binary_op(op)?,
                Opcode::OpGreaterThan => self.execute_integer_binary_op(op)?,
                Opcode::OpTrue => self.push(Object::Boolean(true)),
                Opcode::OpFalse => self.push(Object::Boolean(false)),
                Opcode::OpNull => self.push(Object::Null),
                Opcode::OpAnd => {
                    let right = self.pop();
                    let left = self.pop();
                    self.push(Object::Boolean(left.is_truthy() && right.is_truthy()));
                }
                Opcode::OpOr => {
                    let right = self.pop();
                    let left = self.pop();
                    self.push(Object::Boolean(left.is_truthy() || right.is_truthy()));
                }
                Opcode::OpEqual => {
                    let right = self.pop();
                    let left = self.pop();
                    self.push(Object::Boolean(left == right));
                }
                Opcode::OpNotEqual => {
                    let right = self.pop();
                    let left = self.pop();
                    self.push(Object::Boolean(left != right));
                }
                Opcode::OpMinus => {
                    let operand = self.pop();
                    match operand {
                        Object::Integer(value) => self.push(Object::Integer(-value)),
                        other => {
                            return Err(VmError::UnsupportedUnaryOperand {
                                op: "-",
                                operand: other.object_type(),
                            })
                        }
                    }
                }
                Opcode::OpBang => {
                    let operand = self.pop();
                    self.push(Object::Boolean(!operand.is_truthy()));
                }
                Opcode::OpJump => {
                    let pos = self.current_frame_mut().read_u16_operand() as usize;
                    self.current_frame_mut().set_pc(pos);
                }
                Opcode::OpJumpNotTruthy => {
                    let pos = self.current_frame_mut().read_u16_operand() as usize;
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame_mut().set_pc(pos);
                    }
                }
                Opcode::OpSetGlobal => {
                    let idx = self.current_frame_mut().read_u16_operand() as usize;
                    let value = self.pop();
                    self.globals[idx] = value;
                }
                Opcode::OpGetGlobal => {
                    let idx = self.current_frame_mut().read_u16_operand() as usize;
                    self.push(self.globals[idx].clone());
                }
                Opcode::OpSetLocal => {
                    let idx = self.current_frame_mut().read_u8_operand() as usize;
                    let base = self.current_frame().base_pointer;
                    let value = self.pop();
                    self.stack[base + idx] = value;
                }
                Opcode::OpGetLocal => {
                    let idx = self.current_frame_mut().read_u8_operand() as usize;
                    let base = self.current_frame().base_pointer;
                    self.push(self.stack[base + idx].clone());
                }
                Opcode::OpGetBuiltin => {
                    let idx = self.current_frame_mut().read_u8_operand() as usize;
                    let builtin = builtin_by_index(idx)
                        .expect("compiler only ever emits indices of registered builtins");
                    self.push(Object::Builtin(builtin));
                }
                Opcode::OpArray => {
                    let n = self.current_frame_mut().read_u16_operand() as usize;
                    let elements = self.stack[self.sp - n..self.sp].to_vec();
                    self.sp -= n;
                    self.push(Object::Array(Rc::new(elements)));
                }
                Opcode::OpIndex => {
                    let index = self.pop();
                    let left = self.pop();
                    self.execute_index(left, index)?;
                }
                Opcode::OpCall => {
                    let num_args = self.current_frame_mut().read_u8_operand() as usize;
                    self.execute_call(num_args)?;
                }
                Opcode::OpReturnValue => {
                    let return_value = self.pop();
                    let frame = self.frames.pop().expect("frame stack is never empty");
                    trace!(base_pointer = frame.base_pointer, "return from call");
                    // A top-level `return` pops the main frame, which has no
                    // caller to unwind into — halt instead of underflowing
                    // `base_pointer - 1`. `pop` already left `return_value`
                    // at `self.sp`, the same slot a trailing `OpPop` would
                    // leave it in.
                    if frame.base_pointer == 0 {
                        return Ok(());
                    }
                    self.sp = frame.base_pointer - 1;
                    self.push(return_value);
                }
                Opcode::OpReturn => {
                    let frame = self.frames.pop().expect("frame stack is never empty");
                    trace!(base_pointer = frame.base_pointer, "bare return from call");
                    if frame.base_pointer == 0 {
                        self.push(Object::Null);
                        self.sp -= 1;
                        return Ok(());
                    }
                    self.sp = frame.base_pointer - 1;
                    self.push(Object::Null);
                }
            }
        }
        Ok(())
    }

    fn execute_add(&mut self) -> Result<(), VmError> {
        let right = self.pop();
        let left = self.pop();
        match (&left, &right) {
            (Object::Integer(l), Object::Integer(r)) => {
                self.push(Object::Integer(l + r));
                Ok(())
            }
            (Object::String(l), Object::String(r)) => {
                self.push(Object::String(Rc::from(format!("{l}{r}"))));
                Ok(())
            }
            _ => Err(VmError::UnsupportedBinaryOperands {
                left: left.object_type(),
                op: "+",
                right: right.object_type(),
            }),
        }
    }

    fn execute_integer_binary_op(&mut self, op: Opcode) -> Result<(), VmError> {
        let right = self.pop();
        let left = self.pop();
        let (Object::Integer(l), Object::Integer(r)) = (&left, &right) else {
            return Err(VmError::UnsupportedBinaryOperands {
                left: left.object_type(),
                op: opcode_symbol(op),
                right: right.object_type(),
            });
        };
        let (l, r) = (*l, *r);
        match op {
            Opcode::OpSub => self.push(Object::Integer(l - r)),
            Opcode::OpMul => self.push(Object::Integer(l * r)),
            Opcode::OpDiv => self.push(Object::Integer(l / r)),
            Opcode::OpGreaterThan => self.push(Object::Boolean(l > r)),
            _ => unreachable!("execute_integer_binary_op called with non-arithmetic opcode"),
        }
        Ok(())
    }

    fn execute_index(&mut self, left: Object, index: Object) -> Result<(), VmError> {
        match (&left, &index) {
            (Object::Array(elements), Object::Integer(idx)) => {
                if *idx < 0 || *idx as usize >= elements.len() {
                    self.push(Object::Null);
                } else {
                    self.push(elements[*idx as usize].clone());
                }
                Ok(())
            }
            _ => Err(VmError::UnsupportedIndex(left.object_type())),
        }
    }

    fn execute_call(&mut self, num_args: usize) -> Result<(), VmError> {
        let callee = self.stack[self.sp - num_args - 1].clone();
        match callee {
            Object::CompiledFunction(cf) => {
                if num_args != cf.num_parameters {
                    return Err(VmError::WrongArgumentCount {
                        want: cf.num_parameters,
                        got: num_args,
                    });
                }
                let base = self.sp - num_args;
                trace!(num_args, base, "calling compiled function");
                self.sp = base + cf.num_locals;
                self.frames.push(Frame::new(cf, base));
                Ok(())
            }
            Object::Builtin(b) => {
                let args = self.stack[self.sp - num_args..self.sp].to_vec();
                let result = (b.func)(&args);
                self.sp -= num_args + 1;
                self.push(result);
                Ok(())
            }
            other => Err(VmError::CallingNonFunction(other.object_type())),
        }
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack is never empty")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack is never empty")
    }

    fn push(&mut self, obj: Object) {
        if self.sp == self.stack.len() {
            self.stack.resize(self.stack.len() + STACK_SIZE, Object::Null);
        }
        self.stack[self.sp] = obj;
        self.sp += 1;
    }

    /// Decrements `sp` and returns the value that was on top — without
    /// clearing the stack slot. The slot still holding its value after `sp`
    /// passes it is exactly what makes `last_popped_stack_elem` work: the
    /// next `push` will overwrite it, but nothing does until then.
    fn pop(&mut self) -> Object {
        self.sp -= 1;
        self.stack[self.sp].clone()
    }
}

fn opcode_symbol(op: Opcode) -> &'static str {
    match op {
        Opcode::OpSub => "-",
        Opcode::OpMul => "*",
        Opcode::OpDiv => "/",
        Opcode::OpGreaterThan => ">",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compiler::Compiler;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn run(input: &str) -> Object {
        let lexer = Lexer::new(input);
        let mut parser = Parser::new(lexer);
        let program = parser.parse_program();
        assert!(parser.errors().is_empty(), "parse errors: {:?}", parser.errors());
        let mut compiler = Compiler::new();
        compiler.compile_program(&program).expect("compile should succeed");
        let mut vm = VM::new(compiler.bytecode());
        vm.run().expect("vm run should succeed");
        vm.last_popped_stack_elem().clone()
    }

    #[test]
    fn integer_arithmetic() {
        assert_eq!(run("5 + 5 + 5 + 5 - 10"), Object::Integer(10));
        assert_eq!(run("2 * 2 * 2"), Object::Integer(8));
        assert_eq!(run("5 * (2 + 10)"), Object::Integer(60));
    }

    #[test]
    fn less_than_via_swapped_greater_than() {
        assert_eq!(run("1 < 2"), Object::Boolean(true));
        assert_eq!(run("1 > 2"), Object::Boolean(false));
    }

    #[test]
    fn and_or_are_eager_not_short_circuiting() {
        assert_eq!(run("true and false"), Object::Boolean(false));
        assert_eq!(run("false or true"), Object::Boolean(true));
    }

    #[test]
    fn if_expression_without_alternative_yields_null() {
        assert_eq!(run("if (false) { 10 }"), Object::Null);
        assert_eq!(run("if (1 > 2) { 10 }"), Object::Null);
    }

    #[test]
    fn nested_return_unwinds_through_blocks() {
        let input = "if (10 > 1) { if (10 > 1) { return 10; } return 1; }";
        assert_eq!(run(input), Object::Integer(10));
    }

    #[test]
    fn global_let_bindings_persist_across_statements() {
        assert_eq!(run("let one = 1; let two = 2; one + two"), Object::Integer(3));
    }

    #[test]
    fn string_concatenation() {
        match run(r#""Hello" + " " + "World""#) {
            Object::String(s) => assert_eq!(&*s, "Hello World"),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn array_literals_and_indexing() {
        assert_eq!(run("[1, 2, 3][0] + [1, 2, 3][2]"), Object::Integer(4));
    }

    #[test]
    fn out_of_bounds_index_yields_null_matching_the_evaluator() {
        assert_eq!(run("[1, 2, 3][10]"), Object::Null);
        assert_eq!(run("[1, 2, 3][-1]"), Object::Null);
    }

    #[test]
    fn compiled_functions_with_locals_and_arguments() {
        let input = "let add = fn(a, b) { let c = a + b; c; }; add(1, 2);";
        assert_eq!(run(input), Object::Integer(3));
    }

    #[test]
    fn first_class_functions_without_explicit_return() {
        let input = "let noReturn = fn() { }; noReturn();";
        assert_eq!(run(input), Object::Null);
    }

    #[test]
    fn calling_a_function_with_wrong_arity_is_a_vm_error() {
        let lexer = Lexer::new("let f = fn(a) { a }; f(1, 2);");
        let mut parser = Parser::new(lexer);
        let program = parser.parse_program();
        let mut compiler = Compiler::new();
        compiler.compile_program(&program).expect("compile should succeed");
        let mut vm = VM::new(compiler.bytecode());
        let err = vm.run().unwrap_err();
        assert_eq!(err, VmError::WrongArgumentCount { want: 1, got: 2 });
    }

    #[test]
    fn builtin_len_over_string_and_array() {
        assert_eq!(run(r#"len("four")"#), Object::Integer(4));
        assert_eq!(run("len([1, 2, 3])"), Object::Integer(3));
    }

    #[test]
    fn builtin_argument_errors_surface_as_an_error_object_not_a_vm_abort() {
        match run("len(1)") {
            Object::Error(msg) => {
                assert_eq!(msg, "argument to `len` not supported, got INTEGER");
            }
            other => panic!("expected an Error object, got {other:?}"),
        }
    }
}
