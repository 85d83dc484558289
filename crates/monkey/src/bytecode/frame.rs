//! A VM call-stack activation record (spec.md §3 "Frame").

use std::rc::Rc;

use crate::bytecode::code::{read_u16, read_u8};
use crate::object::CompiledFunction;

/// One activation record: the function being executed, its program counter,
/// and the base pointer demarcating where its locals begin on the value
/// stack. Parameters occupy the lowest local slots (spec.md §4.5 call
/// dispatch).
pub struct Frame {
    func: Rc<CompiledFunction>,
    pc: usize,
    pub base_pointer: usize,
}

impl Frame {
    #[must_use]
    pub fn new(func: Rc<CompiledFunction>, base_pointer: usize) -> Self {
        Self {
            func,
            pc: 0,
            base_pointer,
        }
    }

    #[must_use]
    pub fn instructions(&self) -> &[u8] {
        &self.func.instructions
    }

    #[must_use]
    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    /// Reads the next byte as an opcode and advances the program counter
    /// past it.
    pub fn read_opcode(&mut self) -> u8 {
        let byte = self.instructions()[self.pc];
        self.pc += 1;
        byte
    }

    pub fn read_u16_operand(&mut self) -> u16 {
        let value = read_u16(self.instructions(), self.pc);
        self.pc += 2;
        value
    }

    pub fn read_u8_operand(&mut self) -> u8 {
        let value = read_u8(self.instructions(), self.pc);
        self.pc += 1;
        value
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.pc >= self.instructions().len()
    }
}
