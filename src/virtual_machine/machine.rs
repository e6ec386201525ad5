//! Core virtual machine implementation.
//!
//! [`Machine`] owns the instruction table, the constant pool, the globals
//! table, the global operand stack, and the control stack of frames. The
//! dispatch loop fetches one instruction at a time and executes it through
//! an `op_*` handler; jumps and calls translate logical addresses to table
//! indices through a constant-time side table.
//!
//! Reference counting is expressed through ownership: loading clones a
//! handle, storing moves one in (dropping the previous occupant), popping
//! moves one out, and frame teardown drops everything the frame still
//! holds. The bytecode is trusted; where the format's undefined corners
//! are reachable anyway (stack underflow, unset table slots, bad jump
//! targets) execution stops with a diagnostic error.

use crate::virtual_machine::container::{
    self, ParseMode, Record, StdinTokens, StrTokens, parse_int, read_record,
};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{BinOp, Instr, Opcode, UnOp};
use crate::virtual_machine::slot::{ElemType, Scalar, Slot, SlotRef};
use crate::virtual_machine::trace::Tracer;
use self::frame::{Frame, OperandStack};
use std::fs;
use std::io::{self, Write as _};
use std::path::Path;
use std::rc::Rc;

pub(crate) mod frame;

/// Upper bound on loaded instructions.
pub const MAX_INSTRUCTIONS: usize = 1_000_000;
/// Upper bound on logical instruction addresses.
pub const MAX_ADDRESS: i64 = 2_000_000;

/// Address-map entry for addresses that carry no instruction.
const UNMAPPED: u32 = u32::MAX;

macro_rules! trace {
    ($self:ident, $($arg:tt)*) => {
        if let Some(tracer) = $self.tracer.as_ref() {
            tracer.note(format!($($arg)*));
        }
    };
}

/// The SLang stack virtual machine.
pub struct Machine {
    /// Loaded instructions in load order.
    instructions: Vec<Instr>,
    /// Logical address to table index, `UNMAPPED` where no instruction is.
    addr_index: Vec<u32>,
    /// Constant pool, sized by `CMALLOC` and filled by `CONSTANT` records.
    constants: Vec<Option<SlotRef>>,
    /// Globals table, sized by a frameless `VMALLOC`.
    globals: Vec<Option<SlotRef>>,
    /// Operand stack used at global scope and by `LOAD_GLOBAL`/`STORE_GLOBAL`.
    global_operands: OperandStack,
    /// Control stack; the last frame is the active one.
    frames: Vec<Frame>,
    /// Index of the next instruction to execute.
    ip: usize,
    /// Shared void sentinel pushed by `LOAD_NULL`; lives as long as the machine.
    null_slot: SlotRef,
    /// Verbose narration sink, if enabled.
    tracer: Option<Tracer>,
    /// Where `PRINTK` writes.
    output: Box<dyn io::Write>,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    /// Creates an empty machine printing to stdout.
    pub fn new() -> Self {
        Self {
            instructions: Vec::new(),
            addr_index: Vec::new(),
            constants: Vec::new(),
            globals: Vec::new(),
            global_operands: OperandStack::new(),
            frames: Vec::new(),
            ip: 0,
            null_slot: Slot::void(),
            tracer: None,
            output: Box::new(io::stdout()),
        }
    }

    /// Enables verbose narration.
    pub fn set_tracer(&mut self, tracer: Tracer) {
        self.tracer = Some(tracer);
    }

    /// Redirects `PRINTK` output (used by tests).
    pub fn set_output(&mut self, output: Box<dyn io::Write>) {
        self.output = output;
    }

    // ==================== Loading ====================

    /// Loads every record of a token stream.
    pub fn load_source(&mut self, text: &str, mode: ParseMode) -> Result<(), VMError> {
        let mut tokens = StrTokens::new(text);
        while let Some(record) = read_record(&mut tokens, mode)? {
            self.load_record(record)?;
        }
        Ok(())
    }

    /// Applies one record: `CMALLOC` sizes the constant pool, `CONSTANT`
    /// fills one entry, everything else joins the instruction table. The
    /// interactive dispatch sentinel is a no-op here.
    pub fn load_record(&mut self, record: Record) -> Result<(), VMError> {
        match record {
            Record::Dispatch => Ok(()),
            Record::Constant {
                index,
                ty,
                value,
                refs,
            } => self.set_constant(index, ty, &value, refs),
            Record::Instr(instr) if instr.opcode == Opcode::Cmalloc => {
                let size = alloc_size(instr.operand)?;
                self.constants = vec![None; size];
                Ok(())
            }
            Record::Instr(instr) => self.add_instruction(instr),
        }
    }

    /// Appends an instruction and maps its logical address.
    pub fn add_instruction(&mut self, instr: Instr) -> Result<(), VMError> {
        if self.instructions.len() >= MAX_INSTRUCTIONS {
            return Err(VMError::TooManyInstructions(MAX_INSTRUCTIONS));
        }
        if instr.address < 0 || instr.address > MAX_ADDRESS {
            return Err(VMError::AddressOutOfRange(instr.address));
        }
        let address = instr.address as usize;
        if address >= self.addr_index.len() {
            self.addr_index.resize(address + 1, UNMAPPED);
        }
        self.addr_index[address] = self.instructions.len() as u32;
        self.instructions.push(instr);
        Ok(())
    }

    /// Builds one constant-pool entry from its record fields.
    ///
    /// The container's initial-refcount field is accepted for round-trip
    /// fidelity but not applied: handle counts are intrinsic to the
    /// ownership model.
    fn set_constant(&mut self, index: i64, ty: i64, value: &str, _refs: i64) -> Result<(), VMError> {
        let slot = match ty {
            0 => Slot::scalar(Scalar::Int(parse_int(value, "an int constant")?)),
            1 => Slot::scalar(Scalar::Float(value.parse::<f64>().map_err(|_| {
                VMError::MalformedToken {
                    token: value.to_string(),
                    expected: "a float constant",
                }
            })?)),
            2 => Slot::scalar(Scalar::Char(parse_int(value, "a char constant")? as u8)),
            _ => {
                return Err(VMError::MalformedToken {
                    token: ty.to_string(),
                    expected: "a constant type in 0..=2",
                });
            }
        };
        let size = self.constants.len();
        let entry = usize::try_from(index)
            .ok()
            .and_then(|i| self.constants.get_mut(i))
            .ok_or(VMError::SlotIndexOutOfBounds {
                table: "constant",
                index,
                size,
            })?;
        *entry = Some(slot);
        Ok(())
    }

    // ==================== Dispatch ====================

    /// Runs from the current instruction pointer until `HALT` or the end
    /// of the table. Interactive mode re-enters here after loading more
    /// instructions and continues from where the last run stopped.
    pub fn dispatch(&mut self) -> Result<(), VMError> {
        while self.ip < self.instructions.len() {
            let instr = self.instructions[self.ip];
            self.ip += 1;
            if let Some(tracer) = &self.tracer {
                tracer.begin(&instr);
            }
            let halted = self.exec(&instr)?;
            if let Some(tracer) = &self.tracer {
                tracer.finish(&instr);
            }
            if halted {
                break;
            }
        }
        Ok(())
    }

    /// Executes one instruction; returns `true` on `HALT`.
    fn exec(&mut self, instr: &Instr) -> Result<bool, VMError> {
        match instr.opcode {
            // Cmalloc and Constant are consumed at load time; if a stream
            // sneaks them into the table they fall through like Noop.
            Opcode::Noop | Opcode::Cmalloc | Opcode::Constant => {}
            Opcode::Vmalloc => self.op_vmalloc(instr.operand)?,
            Opcode::PopOp => self.op_pop_op()?,
            Opcode::LoadNull => self.op_load_null()?,
            Opcode::LoadConstant => self.op_load_constant(instr.operand)?,
            Opcode::LoadName => self.op_load_name(instr.operand)?,
            Opcode::LoadNameGlobal => self.op_load_name_global(instr.operand)?,
            Opcode::LoadInt => self.op_load_int(instr.operand)?,
            Opcode::LoadFloat => self.op_load_float(instr.operand)?,
            Opcode::LoadChar => self.op_load_char(instr.operand)?,
            Opcode::BinarySubscr => self.op_binary_subscr()?,
            Opcode::StoreSubscr => {
                self.subscr_store(true)?;
            }
            Opcode::StoreSubscrInplace => {
                self.subscr_store(false)?;
            }
            Opcode::StoreSubscrNopop => self.op_store_subscr_nopop()?,
            Opcode::StoreName => self.op_store_name(instr.operand, false)?,
            Opcode::StoreNameNopop => self.op_store_name(instr.operand, true)?,
            Opcode::StoreNameGlobal => self.op_store_name_global(instr.operand, false)?,
            Opcode::StoreNameGlobalNopop => self.op_store_name_global(instr.operand, true)?,
            Opcode::BuildArr => self.op_build_arr(instr.operand)?,
            Opcode::BinaryOp => self.op_binary_op(instr.operand)?,
            Opcode::UnaryOp => self.op_unary_op(instr.operand)?,
            Opcode::Jmp => self.op_jmp(instr.operand)?,
            Opcode::JmpTrue => self.op_jmp_cond(instr.operand, true)?,
            Opcode::JmpFalse => self.op_jmp_cond(instr.operand, false)?,
            Opcode::Push => self.op_push()?,
            Opcode::Ret => self.op_ret()?,
            Opcode::Call => self.op_call(instr.operand)?,
            Opcode::LoadGlobal => self.op_load_global()?,
            Opcode::StoreGlobal => self.op_store_global()?,
            Opcode::Printk => self.op_printk()?,
            Opcode::Halt => {
                trace!(self, "Received HALT; terminating.");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Translates a logical address into an instruction index.
    fn index_of(&self, address: i64) -> Result<usize, VMError> {
        usize::try_from(address)
            .ok()
            .and_then(|a| self.addr_index.get(a))
            .copied()
            .filter(|&i| i != UNMAPPED)
            .map(|i| i as usize)
            .ok_or(VMError::UndefinedJumpTarget(address))
    }

    /// The active operand stack: the current frame's, or the global one
    /// when no frame is live.
    fn active_operands_mut(&mut self) -> &mut OperandStack {
        match self.frames.last_mut() {
            Some(frame) => &mut frame.operands,
            None => &mut self.global_operands,
        }
    }

    fn push_operand(&mut self, slot: SlotRef) -> Result<(), VMError> {
        self.active_operands_mut().push(slot)
    }

    fn pop_operand(&mut self) -> Result<SlotRef, VMError> {
        self.active_operands_mut().pop()
    }

    fn peek_operand(&mut self) -> Result<SlotRef, VMError> {
        Ok(Rc::clone(self.active_operands_mut().top()?))
    }

    // ==================== Opcode handlers ====================

    fn op_vmalloc(&mut self, size: i64) -> Result<(), VMError> {
        let size = alloc_size(size)?;
        match self.frames.last_mut() {
            Some(frame) => frame.locals = vec![None; size],
            None => self.globals = vec![None; size],
        }
        trace!(self, "Allocated a variable table of {size} slots.");
        Ok(())
    }

    fn op_pop_op(&mut self) -> Result<(), VMError> {
        let slot = self.pop_operand()?;
        trace!(self, "Popped {slot} from the operand stack.");
        Ok(())
    }

    fn op_load_null(&mut self) -> Result<(), VMError> {
        trace!(self, "NULL value (type: void) was loaded to the operand stack.");
        self.push_operand(Rc::clone(&self.null_slot))
    }

    fn op_load_constant(&mut self, index: i64) -> Result<(), VMError> {
        let slot = fetch_slot(&self.constants, "constant", index)?;
        trace!(self, "Constant {slot} was loaded to the operand stack.");
        self.push_operand(slot)
    }

    fn op_load_name(&mut self, index: i64) -> Result<(), VMError> {
        let frame = self
            .frames
            .last()
            .ok_or(VMError::NoActiveFrame("LOAD_NAME"))?;
        let slot = fetch_slot(&frame.locals, "locals", index)?;
        trace!(self, "Loaded name {index}: {slot}.");
        self.push_operand(slot)
    }

    fn op_load_name_global(&mut self, index: i64) -> Result<(), VMError> {
        let slot = fetch_slot(&self.globals, "globals", index)?;
        trace!(self, "Loaded global name {index}: {slot}.");
        self.push_operand(slot)
    }

    fn op_load_int(&mut self, value: i64) -> Result<(), VMError> {
        trace!(self, "Int value {value} was loaded to the operand stack.");
        self.push_operand(Slot::scalar(Scalar::Int(value)))
    }

    /// The container encodes float operands as integers; the textual float
    /// channel is `CONSTANT` records.
    fn op_load_float(&mut self, value: i64) -> Result<(), VMError> {
        trace!(self, "Float value {value} was loaded to the operand stack.");
        self.push_operand(Slot::scalar(Scalar::Float(value as f64)))
    }

    fn op_load_char(&mut self, value: i64) -> Result<(), VMError> {
        trace!(self, "Char value {value} was loaded to the operand stack.");
        self.push_operand(Slot::scalar(Scalar::Char(value as u8)))
    }

    fn op_store_name(&mut self, index: i64, keep: bool) -> Result<(), VMError> {
        let value = if keep {
            self.peek_operand()?
        } else {
            self.pop_operand()?
        };
        trace!(self, "Stored {value} to name {index} in locals.");
        let frame = self
            .frames
            .last_mut()
            .ok_or(VMError::NoActiveFrame("STORE_NAME"))?;
        store_slot(&mut frame.locals, "locals", index, value)
    }

    fn op_store_name_global(&mut self, index: i64, keep: bool) -> Result<(), VMError> {
        let value = if keep {
            self.peek_operand()?
        } else {
            self.pop_operand()?
        };
        trace!(self, "Stored {value} to name {index} in globals.");
        store_slot(&mut self.globals, "globals", index, value)
    }

    fn op_build_arr(&mut self, code: i64) -> Result<(), VMError> {
        let len_slot = self.pop_operand()?;
        let len = require_int(&len_slot)?;
        let slot = match ElemType::from_code(code) {
            Some(elem) => {
                if len < 0 {
                    return Err(VMError::InvalidAllocationSize(len));
                }
                Slot::array(len as usize, elem)
            }
            // nested or void element types are unrepresentable
            None => Slot::void(),
        };
        trace!(self, "Built {slot}.");
        self.push_operand(slot)
    }

    fn op_binary_subscr(&mut self) -> Result<(), VMError> {
        let index_slot = self.pop_operand()?;
        let array_slot = self.pop_operand()?;
        let index = require_int(&index_slot)?;
        let cell = array_slot
            .as_array()
            .ok_or_else(|| VMError::NotAnArray(array_slot.to_string()))?
            .cell(index)?;
        trace!(self, "Loaded element {index} of the array: {cell}.");
        self.push_operand(cell)
    }

    /// Common body of the `STORE_SUBSCR` family: pops the value and the
    /// index, writes the value's payload into the addressed cell, and
    /// returns the value handle for `NOPOP` to push back.
    fn subscr_store(&mut self, pop_array: bool) -> Result<SlotRef, VMError> {
        let value = self.pop_operand()?;
        let index_slot = self.pop_operand()?;
        let index = require_int(&index_slot)?;
        let array_slot = if pop_array {
            self.pop_operand()?
        } else {
            self.peek_operand()?
        };
        let array = array_slot
            .as_array()
            .ok_or_else(|| VMError::NotAnArray(array_slot.to_string()))?;
        array.store(index, value.get().unwrap_or(Scalar::Void))?;
        trace!(self, "Changed element {index} of the array to {value}.");
        Ok(value)
    }

    fn op_store_subscr_nopop(&mut self) -> Result<(), VMError> {
        let value = self.subscr_store(true)?;
        self.push_operand(value)
    }

    fn op_binary_op(&mut self, code: i64) -> Result<(), VMError> {
        let op = BinOp::try_from(code)?;
        let right = self.pop_operand()?;
        let left = self.pop_operand()?;
        let result = Slot::scalar(binary_result(op, left.get(), right.get()));
        trace!(
            self,
            "Popped {left} and {right}, applied binary operator {code}; pushed {result}."
        );
        self.push_operand(result)
    }

    fn op_unary_op(&mut self, code: i64) -> Result<(), VMError> {
        let op = UnOp::try_from(code)?;
        let operand = self.pop_operand()?;
        match op {
            UnOp::Not | UnOp::Neg => {
                let result = Slot::scalar(unary_result(op, operand.get()));
                trace!(
                    self,
                    "Popped {operand}, applied unary operator {code}; pushed {result}."
                );
                self.push_operand(result)?;
            }
            UnOp::Inc | UnOp::Dec => {
                let delta = if op == UnOp::Inc { 1 } else { -1 };
                if let Some(Scalar::Int(v)) = operand.get() {
                    operand.set(Scalar::Int(v.wrapping_add(delta)));
                }
                trace!(self, "Adjusted the loaded variable in place to {operand}.");
            }
        }
        Ok(())
    }

    fn op_jmp(&mut self, target: i64) -> Result<(), VMError> {
        self.ip = self.index_of(target)?;
        trace!(self, "Jumped to instruction address {target}.");
        Ok(())
    }

    fn op_jmp_cond(&mut self, target: i64, want_true: bool) -> Result<(), VMError> {
        let condition = self.pop_operand()?;
        if condition.truthy() == want_true {
            self.ip = self.index_of(target)?;
            trace!(self, "Condition met; jumped to instruction address {target}.");
        } else {
            trace!(self, "Condition not met; fell through.");
        }
        Ok(())
    }

    fn op_push(&mut self) -> Result<(), VMError> {
        self.frames.push(Frame::new());
        trace!(self, "Frame pushed onto the control stack.");
        Ok(())
    }

    fn op_call(&mut self, target: i64) -> Result<(), VMError> {
        let return_ip = self.ip;
        let frame = self.frames.last_mut().ok_or(VMError::NoActiveFrame("CALL"))?;
        frame.return_ip = Some(return_ip);
        self.ip = self.index_of(target)?;
        trace!(self, "Calling subroutine at address {target}.");
        Ok(())
    }

    /// Tears down the current frame. The return address comes from the
    /// frame left on top after the pop: by convention a procedure body
    /// opens with its own `PUSH`, so the matching `CALL` recorded the
    /// address in the frame below. When the control stack empties, the
    /// popped frame's own record covers bodies that never pushed.
    fn op_ret(&mut self) -> Result<(), VMError> {
        let mut frame = self.frames.pop().ok_or(VMError::ReturnWithoutFrame)?;
        let value = frame.operands.pop()?;
        let resume = match self.frames.last() {
            Some(caller) => caller.return_ip,
            None => frame.return_ip,
        };
        self.ip = resume.ok_or(VMError::ReturnWithoutCall)?;
        trace!(
            self,
            "Frame popped from the control stack; returning {value}."
        );
        // ownership of `value` moves to the caller's stack; everything the
        // frame still holds is released when it drops
        self.push_operand(value)
    }

    fn op_load_global(&mut self) -> Result<(), VMError> {
        let value = self.global_operands.pop()?;
        trace!(self, "Moved {value} from the global operand stack.");
        self.push_operand(value)
    }

    fn op_store_global(&mut self) -> Result<(), VMError> {
        let value = self.pop_operand()?;
        trace!(self, "Moved {value} onto the global operand stack.");
        self.global_operands.push(value)
    }

    fn op_printk(&mut self) -> Result<(), VMError> {
        let value = self.pop_operand()?;
        writeln!(self.output, "{value}")?;
        Ok(())
    }
}

// ==================== Operator evaluation ====================

/// Evaluates a binary operator over two scalar payloads.
///
/// `None` stands for an array operand; no operator rule covers arrays, so
/// arithmetic yields void and equality treats them as mismatched tags.
fn binary_result(op: BinOp, left: Option<Scalar>, right: Option<Scalar>) -> Scalar {
    use Scalar::Int;
    let (Some(left), Some(right)) = (left, right) else {
        return match op {
            BinOp::Eq => Int(0),
            BinOp::Ne => Int(1),
            _ => Scalar::Void,
        };
    };
    match op {
        BinOp::Add => arith(left, right, |a, b| a.wrapping_add(b), |a, b| a + b),
        BinOp::Sub => arith(left, right, |a, b| a.wrapping_sub(b), |a, b| a - b),
        BinOp::Mul => arith(left, right, |a, b| a.wrapping_mul(b), |a, b| a * b),
        BinOp::Div => arith(left, right, |a, b| a / b, |a, b| a / b),
        BinOp::Mod => int_arith(left, right, |a, b| a % b),
        BinOp::And => int_arith(left, right, |a, b| a & b),
        BinOp::Or => int_arith(left, right, |a, b| a | b),
        BinOp::Shl => int_arith(left, right, |a, b| a.wrapping_shl(b as u32)),
        BinOp::Shr => int_arith(left, right, |a, b| a.wrapping_shr(b as u32)),
        BinOp::Xor => int_arith(left, right, |a, b| a ^ b),
        BinOp::Lt => ordering(left, right, |a, b| a < b, |a, b| a < b),
        BinOp::Le => ordering(left, right, |a, b| a <= b, |a, b| a <= b),
        BinOp::Gt => ordering(left, right, |a, b| a > b, |a, b| a > b),
        BinOp::Ge => ordering(left, right, |a, b| a >= b, |a, b| a >= b),
        BinOp::Eq => Int(scalar_eq(left, right) as i64),
        BinOp::Ne => Int(!scalar_eq(left, right) as i64),
    }
}

/// Numeric arithmetic with int-to-float promotion.
fn arith(
    left: Scalar,
    right: Scalar,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> Scalar {
    use Scalar::{Float, Int};
    match (left, right) {
        (Int(a), Int(b)) => Int(int_op(a, b)),
        (Int(a), Float(b)) => Float(float_op(a as f64, b)),
        (Float(a), Int(b)) => Float(float_op(a, b as f64)),
        (Float(a), Float(b)) => Float(float_op(a, b)),
        _ => Scalar::Void,
    }
}

/// Operators defined on int/int only (bitwise, shifts, modulo).
fn int_arith(left: Scalar, right: Scalar, op: fn(i64, i64) -> i64) -> Scalar {
    match (left, right) {
        (Scalar::Int(a), Scalar::Int(b)) => Scalar::Int(op(a, b)),
        _ => Scalar::Void,
    }
}

/// Ordering comparisons over numeric operands; the result is int 0/1.
fn ordering(
    left: Scalar,
    right: Scalar,
    int_cmp: fn(i64, i64) -> bool,
    float_cmp: fn(f64, f64) -> bool,
) -> Scalar {
    use Scalar::{Float, Int};
    match (left, right) {
        (Int(a), Int(b)) => Int(int_cmp(a, b) as i64),
        (Int(a), Float(b)) => Int(float_cmp(a as f64, b) as i64),
        (Float(a), Int(b)) => Int(float_cmp(a, b as f64) as i64),
        (Float(a), Float(b)) => Int(float_cmp(a, b) as i64),
        _ => Scalar::Void,
    }
}

/// Equality over matched scalar tags; anything else is a mismatch.
fn scalar_eq(left: Scalar, right: Scalar) -> bool {
    match (left, right) {
        (Scalar::Int(a), Scalar::Int(b)) => a == b,
        (Scalar::Float(a), Scalar::Float(b)) => a == b,
        (Scalar::Char(a), Scalar::Char(b)) => a == b,
        _ => false,
    }
}

/// Evaluates `NOT`/`NEG`; `INC`/`DEC` mutate in place and never get here.
fn unary_result(op: UnOp, operand: Option<Scalar>) -> Scalar {
    match (op, operand) {
        (UnOp::Not, Some(Scalar::Int(v))) => Scalar::Int((v == 0) as i64),
        (UnOp::Neg, Some(Scalar::Int(v))) => Scalar::Int(v.wrapping_neg()),
        (UnOp::Neg, Some(Scalar::Float(v))) => Scalar::Float(-v),
        _ => Scalar::Void,
    }
}

// ==================== Table access helpers ====================

/// Reads a table slot, cloning the handle for the stack.
fn fetch_slot(
    table: &[Option<SlotRef>],
    name: &'static str,
    index: i64,
) -> Result<SlotRef, VMError> {
    let size = table.len();
    let entry = usize::try_from(index)
        .ok()
        .and_then(|i| table.get(i))
        .ok_or(VMError::SlotIndexOutOfBounds {
            table: name,
            index,
            size,
        })?;
    entry.clone().ok_or(VMError::UnsetSlot { table: name, index })
}

/// Replaces a table slot, dropping the previous occupant.
fn store_slot(
    table: &mut [Option<SlotRef>],
    name: &'static str,
    index: i64,
    value: SlotRef,
) -> Result<(), VMError> {
    let size = table.len();
    let entry = usize::try_from(index)
        .ok()
        .and_then(|i| table.get_mut(i))
        .ok_or(VMError::SlotIndexOutOfBounds {
            table: name,
            index,
            size,
        })?;
    *entry = Some(value);
    Ok(())
}

fn require_int(slot: &SlotRef) -> Result<i64, VMError> {
    slot.as_int()
        .ok_or_else(|| VMError::ExpectedInt(slot.to_string()))
}

fn alloc_size(operand: i64) -> Result<usize, VMError> {
    usize::try_from(operand).map_err(|_| VMError::InvalidAllocationSize(operand))
}

// ==================== Front-end entry points ====================

/// Executes a compiled container file to completion.
///
/// A magic mismatch (including the garbage a wrong password produces)
/// surfaces as [`VMError::InvalidMagic`]; the CLI treats it as the silent
/// rejection the format prescribes.
pub fn run_file(path: &Path, verbose: bool, password: &str) -> Result<(), VMError> {
    let bytes = fs::read(path)?;
    let body = container::decode(bytes, password)?;
    let mut machine = Machine::new();
    if verbose {
        machine.set_tracer(Tracer::new(false));
    }
    machine.load_source(&body, ParseMode::Numeric)?;
    machine.dispatch()
}

/// Reads mnemonic records from stdin; every record with address `-1`
/// re-enters dispatch over what has been loaded so far.
pub fn interact(verbose: bool) -> Result<(), VMError> {
    let mut machine = Machine::new();
    if verbose {
        machine.set_tracer(Tracer::new(true));
    }
    let mut tokens = StdinTokens::new();
    while let Some(record) = read_record(&mut tokens, ParseMode::Mnemonic)? {
        match record {
            Record::Dispatch => machine.dispatch()?,
            other => machine.load_record(other)?,
        }
    }
    Ok(())
}
