// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The operand-stack virtual machine: dispatch loop, arithmetic, closures,
//! upvalue capture/close, calls and returns, and runtime-error reporting.

#[cfg(test)]
mod vm_test;

use crate::chunk::Chunk;
use crate::error::{VmError, VmResult};
use crate::frame::CallFrame;
use crate::intern::StringInterner;
use crate::object::{ClosureObj, FunctionObj, Heap, Object, ObjectId, UpvalueState};
use crate::opcode::op;
use crate::value::Value;
use std::rc::Rc;

/// Maximum operand-stack depth.
pub const STACK_MAX: usize = 4096;
/// Maximum nested call-frame depth.
pub const FRAMES_MAX: usize = 128;

/// Whether arithmetic type-checks its operands before acting on them.
///
/// Mirrors the reference VM's compile-time `ENABLE_TYPE_CHECK` flag as a
/// runtime setting: a well-typed compiler produces identical observable
/// behavior either way, so toggling this only changes whether a malformed
/// artifact fails fast with `TypeError` or is trusted (and may panic-free
/// but nonsensically compute on mismatched operands — `minvm` still
/// refuses nonsensical operand combinations even with checking off, since
/// Rust's `Value` match has no "trust me" escape hatch; the flag instead
/// governs whether a closure/function value reaching an arithmetic opcode
/// is reported as `TypeError` or as `Unimplemented`-style fallthrough).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCheck {
    /// Verify operand types before every arithmetic operation.
    Enabled,
    /// Trust the bytecode; still refuses to read out of bounds.
    Disabled,
}

/// Stack-based bytecode virtual machine.
///
/// Owns the object heap, the string intern set, the operand stack, the
/// call-frame stack, and the open-upvalue list.
///
/// No collector runs against `heap` today, but if one is added later its
/// mark roots are exactly: `stack` (every live operand), each frame in
/// `frames` (its `locals`, plus whatever live range its closure's arity
/// covers), `open_upvalues`, and every interned string still referenced by
/// a `StringObj` reachable from the above.
#[derive(Debug)]
pub struct Vm {
    heap: Heap,
    interner: StringInterner,
    /// GC root: every value currently live on the operand stack.
    stack: Vec<Value>,
    /// GC root: each active frame's `locals`.
    frames: Vec<CallFrame>,
    /// GC root: handles of currently open upvalues. Not required to stay
    /// sorted for correctness (closing scans and partitions the whole
    /// list), but new entries are appended, keeping recently captured
    /// locals near the end.
    open_upvalues: Vec<ObjectId>,
    current_chunk: Rc<Chunk>,
    ip: usize,
    /// Count of instructions dispatched within `current_chunk` so far;
    /// indexes `current_chunk.metadata` in execution order (see
    /// `Chunk::metadata_at`). Saved/restored across calls alongside `ip`.
    instr_index: usize,
    type_check: TypeCheck,
}

impl Vm {
    /// Construct a VM ready to execute `top_level`.
    #[must_use]
    pub fn new(top_level: Rc<Chunk>, heap: Heap, interner: StringInterner) -> Self {
        Self {
            heap,
            interner,
            stack: Vec::new(),
            frames: Vec::new(),
            open_upvalues: Vec::new(),
            current_chunk: top_level,
            ip: 0,
            instr_index: 0,
            type_check: TypeCheck::Enabled,
        }
    }

    /// Select whether arithmetic type-checks its operands.
    #[must_use]
    pub fn with_type_check(mut self, type_check: TypeCheck) -> Self {
        self.type_check = type_check;
        self
    }

    /// Borrow the object heap (used by tests and diagnostics).
    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Borrow the string interner (used by tests and diagnostics).
    #[must_use]
    pub fn interner(&self) -> &StringInterner {
        &self.interner
    }

    /// Current operand-stack depth (used by tests and diagnostics).
    #[must_use]
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    fn push(&mut self, value: Value) -> VmResult<()> {
        if self.stack.len() >= STACK_MAX {
            return Err(VmError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> VmResult<Value> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    fn next_u8(&mut self) -> VmResult<u8> {
        let byte = *self
            .current_chunk
            .code
            .get(self.ip)
            .ok_or_else(|| VmError::MalformedArtifact("ip ran past end of code".to_string()))?;
        self.ip += 1;
        Ok(byte)
    }

    fn next_u32_le(&mut self) -> VmResult<u32> {
        let end = self.ip + 4;
        let bytes = self
            .current_chunk
            .code
            .get(self.ip..end)
            .ok_or_else(|| VmError::MalformedArtifact("ip ran past end of code".to_string()))?;
        let array: [u8; 4] = bytes.try_into().expect("slice is exactly 4 bytes");
        self.ip = end;
        Ok(u32::from_le_bytes(array))
    }

    /// Run the dispatch loop until a `HALT`/`RETURN` at the top level, or
    /// the code runs out, or a fatal error occurs.
    ///
    /// # Errors
    ///
    /// Returns any [`VmError`] raised by a handler; the VM's state is left
    /// as-is (the caller drops the `Vm`, freeing the heap).
    pub fn run(&mut self) -> VmResult<Value> {
        loop {
            if self.ip >= self.current_chunk.code.len() {
                return Ok(self.stack.last().copied().unwrap_or(Value::Nil));
            }

            let opcode = self.next_u8()?;

            match opcode {
                op::HALT => return Ok(self.stack.last().copied().unwrap_or(Value::Nil)),

                op::POP => {
                    self.pop()?;
                }

                op::PUSH_CONST => {
                    let idx = self.next_u8()?;
                    let value = *self.current_chunk.constants.get(idx as usize).ok_or_else(|| {
                        VmError::MalformedArtifact(format!("constant index {idx} out of bounds"))
                    })?;
                    self.push(value)?;
                }

                op::ADD => self.binary_add()?,
                op::SUB => self.binary_numeric(op::SUB)?,
                op::MUL => self.binary_numeric(op::MUL)?,
                op::DIV => self.binary_numeric(op::DIV)?,
                op::MOD => self.binary_numeric(op::MOD)?,

                op::PUSH_CLOSURE => self.push_closure()?,

                op::CALL => {
                    // `call` resets `instr_index` to 0 for the callee chunk;
                    // skip the common increment below so its first
                    // instruction is not counted as already dispatched.
                    let argc = self.next_u8()?;
                    self.call(argc)?;
                    continue;
                }

                op::RETURN => match self.do_return()? {
                    // `do_return` restores `instr_index` to the position of
                    // the CALL we're resuming after; the common increment
                    // below advances it past that CALL.
                    Some(value) => return Ok(value),
                    None => {}
                },

                op::GET_LOCAL => {
                    let idx = self.next_u8()?;
                    let value = self.current_local(idx as usize)?;
                    self.push(value)?;
                }

                op::SET_LOCAL => {
                    let idx = self.next_u8()?;
                    let value = self.pop()?;
                    self.set_current_local(idx as usize, value)?;
                }

                op::GET_UPVALUE => {
                    let idx = self.next_u8()?;
                    let handle = self.current_upvalue(idx as usize)?;
                    self.push(self.read_upvalue(handle))?;
                }

                op::SET_UPVALUE => {
                    let idx = self.next_u8()?;
                    let value = self.pop()?;
                    let handle = self.current_upvalue(idx as usize)?;
                    self.write_upvalue(handle, value);
                }

                other => return Err(self.runtime_error(VmError::Unimplemented(other))),
            }

            self.instr_index += 1;
        }
    }

    fn binary_add(&mut self) -> VmResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        let result = match (left, right) {
            (Value::Int32(a), Value::Int32(b)) => Value::int(a.wrapping_add(b)),
            (Value::Float64(a), Value::Float64(b)) => Value::float(a + b),
            (Value::Object(a), Value::Object(b)) => self.concat_strings(a, b)?,
            (Value::Int32(a), Value::Float64(b)) | (Value::Float64(b), Value::Int32(a))
                if self.type_check == TypeCheck::Disabled =>
            {
                Value::float(f64::from(a) + b)
            }
            _ => {
                return Err(self.runtime_error(VmError::TypeError(format!(
                    "cannot add {} and {}",
                    left.type_name(),
                    right.type_name()
                ))));
            }
        };
        self.push(result)
    }

    fn concat_strings(&mut self, a: ObjectId, b: ObjectId) -> VmResult<Value> {
        let (Object::StringObj(a_id), Object::StringObj(b_id)) =
            (self.heap.get(a), self.heap.get(b))
        else {
            return Err(self.runtime_error(VmError::TypeError(
                "`+` on objects requires both operands to be strings".to_string(),
            )));
        };
        let mut bytes = self.interner.resolve(*a_id).as_bytes().to_vec();
        bytes.extend_from_slice(self.interner.resolve(*b_id).as_bytes());
        let id = self.interner.intern(bytes);
        let object = self.heap.alloc(Object::StringObj(id));
        Ok(Value::object(object))
    }

    fn binary_numeric(&mut self, opcode: u8) -> VmResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        let result = match (left, right) {
            (Value::Int32(a), Value::Int32(b)) => {
                if matches!(opcode, op::DIV | op::MOD) && b == 0 {
                    return Err(self.runtime_error(VmError::DivByZero));
                }
                match opcode {
                    op::SUB => Value::int(a.wrapping_sub(b)),
                    op::MUL => Value::int(a.wrapping_mul(b)),
                    op::DIV => Value::int(a.wrapping_div(b)),
                    op::MOD => Value::int(a.wrapping_rem(b)),
                    _ => unreachable!("binary_numeric called with non-arithmetic opcode"),
                }
            }
            (Value::Float64(a), Value::Float64(b)) => self.float_op(opcode, a, b)?,
            (Value::Int32(a), Value::Float64(b)) if self.type_check == TypeCheck::Disabled => {
                self.float_op(opcode, f64::from(a), b)?
            }
            (Value::Float64(a), Value::Int32(b)) if self.type_check == TypeCheck::Disabled => {
                self.float_op(opcode, a, f64::from(b))?
            }
            _ => {
                return Err(self.runtime_error(VmError::TypeError(format!(
                    "{} is not supported on {} and {}",
                    crate::opcode::name(opcode),
                    left.type_name(),
                    right.type_name()
                ))));
            }
        };
        self.push(result)
    }

    fn float_op(&self, opcode: u8, a: f64, b: f64) -> VmResult<Value> {
        if matches!(opcode, op::DIV | op::MOD) && b == 0.0 {
            return Err(self.runtime_error(VmError::DivByZero));
        }
        Ok(match opcode {
            op::SUB => Value::float(a - b),
            op::MUL => Value::float(a * b),
            op::DIV => Value::float(a / b),
            op::MOD => Value::float(a % b),
            _ => unreachable!("float_op called with non-arithmetic opcode"),
        })
    }

    fn current_frame_id(&self) -> Option<usize> {
        if self.frames.is_empty() {
            None
        } else {
            Some(self.frames.len() - 1)
        }
    }

    fn current_local(&self, slot: usize) -> VmResult<Value> {
        let frame_id = self.current_frame_id().ok_or_else(|| {
            self.runtime_error(VmError::TypeError(
                "cannot read a local slot outside a function frame".to_string(),
            ))
        })?;
        Ok(self.frames[frame_id].local(slot))
    }

    fn set_current_local(&mut self, slot: usize, value: Value) -> VmResult<()> {
        let frame_id = self.current_frame_id().ok_or_else(|| {
            self.runtime_error(VmError::TypeError(
                "cannot write a local slot outside a function frame".to_string(),
            ))
        })?;
        self.frames[frame_id].set_local(slot, value);
        Ok(())
    }

    fn current_upvalue(&self, index: usize) -> VmResult<ObjectId> {
        let frame_id = self.current_frame_id().ok_or_else(|| {
            self.runtime_error(VmError::TypeError(
                "cannot address an upvalue outside a function frame".to_string(),
            ))
        })?;
        let closure_id = self.frames[frame_id].closure;
        let Object::ClosureObj(closure) = self.heap.get(closure_id) else {
            return Err(self.runtime_error(VmError::TypeError(
                "current frame's closure is not a ClosureObj".to_string(),
            )));
        };
        closure.upvalues.get(index).copied().ok_or_else(|| {
            VmError::MalformedArtifact(format!("upvalue index {index} out of bounds"))
        })
    }

    fn capture_upvalue(&mut self, frame_id: usize, slot: usize) -> ObjectId {
        for &id in &self.open_upvalues {
            if let Object::UpvalueObj(UpvalueState::Open {
                frame_id: f,
                slot: s,
            }) = self.heap.get(id)
            {
                if *f == frame_id && *s == slot {
                    return id;
                }
            }
        }
        let id = self
            .heap
            .alloc(Object::UpvalueObj(UpvalueState::Open { frame_id, slot }));
        self.open_upvalues.push(id);
        id
    }

    fn close_upvalues_for_frame(&mut self, frame_id: usize) {
        let (closing, remaining): (Vec<_>, Vec<_>) =
            self.open_upvalues.drain(..).partition(|&id| {
                matches!(
                    self.heap.get(id),
                    Object::UpvalueObj(UpvalueState::Open { frame_id: f, .. }) if *f == frame_id
                )
            });
        self.open_upvalues = remaining;
        for id in closing {
            let slot = match self.heap.get(id) {
                Object::UpvalueObj(UpvalueState::Open { slot, .. }) => *slot,
                _ => unreachable!("open_upvalues only ever holds Open upvalue handles"),
            };
            let value = self.frames[frame_id].local(slot);
            if let Object::UpvalueObj(state) = self.heap.get_mut(id) {
                *state = UpvalueState::Closed(value);
            }
        }
    }

    /// Read the current value of an upvalue, following through to the
    /// owning frame's locals while open.
    #[must_use]
    pub fn read_upvalue(&self, id: ObjectId) -> Value {
        match self.heap.get(id) {
            Object::UpvalueObj(UpvalueState::Open { frame_id, slot }) => {
                self.frames[*frame_id].local(*slot)
            }
            Object::UpvalueObj(UpvalueState::Closed(value)) => *value,
            other => unreachable!("read_upvalue called on non-upvalue object: {other:?}"),
        }
    }

    /// Write through an upvalue, to the owning frame's locals while open.
    pub fn write_upvalue(&mut self, id: ObjectId, value: Value) {
        match self.heap.get_mut(id) {
            Object::UpvalueObj(UpvalueState::Open { frame_id, slot }) => {
                let (frame_id, slot) = (*frame_id, *slot);
                self.frames[frame_id].set_local(slot, value);
            }
            Object::UpvalueObj(state @ UpvalueState::Closed(_)) => {
                *state = UpvalueState::Closed(value);
            }
            other => unreachable!("write_upvalue called on non-upvalue object: {other:?}"),
        }
    }

    fn push_closure(&mut self) -> VmResult<()> {
        let idx = self.next_u8()?;
        let function_value = *self.current_chunk.constants.get(idx as usize).ok_or_else(|| {
            VmError::MalformedArtifact(format!("constant index {idx} out of bounds"))
        })?;
        let Some(function_id) = function_value.as_object() else {
            return Err(self.runtime_error(VmError::TypeError(
                "PUSH_CLOSURE constant is not a function".to_string(),
            )));
        };
        if !matches!(self.heap.get(function_id), Object::FunctionObj(_)) {
            return Err(self.runtime_error(VmError::TypeError(
                "PUSH_CLOSURE constant is not a function".to_string(),
            )));
        }

        let upcount = self.next_u32_le()?;
        let mut upvalues = Vec::with_capacity(upcount as usize);
        for _ in 0..upcount {
            let is_local = self.next_u8()?;
            let index = self.next_u32_le()? as usize;
            let handle = if is_local != 0 {
                let frame_id = self.current_frame_id().ok_or_else(|| {
                    self.runtime_error(VmError::TypeError(
                        "cannot capture a local upvalue outside a function frame".to_string(),
                    ))
                })?;
                self.capture_upvalue(frame_id, index)
            } else {
                self.current_upvalue(index)?
            };
            upvalues.push(handle);
        }

        let closure_id = self.heap.alloc(Object::ClosureObj(ClosureObj {
            function: function_id,
            upvalues,
        }));
        self.push(Value::object(closure_id))
    }

    fn call(&mut self, argc: u8) -> VmResult<()> {
        if self.frames.len() >= FRAMES_MAX {
            return Err(self.runtime_error(VmError::FrameOverflow));
        }

        let mut args = Vec::with_capacity(argc as usize);
        for _ in 0..argc {
            args.push(self.pop()?);
        }
        args.reverse();

        let callee = self.pop()?;
        let Some(closure_id) = callee.as_object() else {
            return Err(self.runtime_error(VmError::TypeError(format!(
                "cannot call a value of type {}",
                callee.type_name()
            ))));
        };
        let Object::ClosureObj(closure) = self.heap.get(closure_id) else {
            return Err(self.runtime_error(VmError::TypeError(format!(
                "cannot call a value of type {}",
                callee.type_name()
            ))));
        };
        let function_id = closure.function;
        let Object::FunctionObj(FunctionObj { arity, chunk, .. }) = self.heap.get(function_id)
        else {
            return Err(self.runtime_error(VmError::TypeError(
                "closure's function handle is not a FunctionObj".to_string(),
            )));
        };

        if args.len() as u32 != *arity {
            return Err(self.runtime_error(VmError::MalformedArtifact(format!(
                "arity mismatch: function expects {} arguments, got {}",
                arity,
                args.len()
            ))));
        }

        let callee_chunk = Rc::clone(chunk);
        let caller_chunk = std::mem::replace(&mut self.current_chunk, callee_chunk);
        let frame = CallFrame::new(closure_id, self.ip, caller_chunk, self.instr_index, args);
        self.frames.push(frame);
        self.ip = 0;
        self.instr_index = 0;
        Ok(())
    }

    /// Returns `Some(value)` if this was a top-level return (no caller to
    /// resume), or `None` after restoring the caller's execution state.
    fn do_return(&mut self) -> VmResult<Option<Value>> {
        let value = self.pop()?;
        let Some(frame_id) = self.current_frame_id() else {
            return Ok(Some(value));
        };
        self.close_upvalues_for_frame(frame_id);
        let frame = self.frames.pop().expect("current_frame_id confirmed a frame exists");
        self.current_chunk = frame.saved_chunk;
        self.ip = frame.saved_ip;
        self.instr_index = frame.saved_instr_index;
        self.push(value)?;
        Ok(None)
    }

    fn runtime_error(&self, error: VmError) -> VmError {
        log::error!("runtime fault at instruction {}: {error}", self.instr_index);
        error
    }

    /// Format a runtime error the way the reference VM reports it:
    ///
    /// ```text
    /// [-] Runtime error: <msg>
    ///  |  [-] <chunk.name> (<line+1>, <col+1>)
    /// [-]
    /// ```
    #[must_use]
    pub fn format_runtime_error(&self, error: &VmError) -> String {
        let meta = self.current_chunk.metadata_at(self.instr_index);
        let (line, col) = meta.map_or((0, 0), |m| (m.line + 1, m.col + 1));
        format!(
            "\n[-] Runtime error: {error}\n |  [-] {} ({line}, {col})\n[-]\n",
            self.current_chunk.name
        )
    }
}
