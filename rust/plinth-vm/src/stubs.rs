//! Host implementations of the shared stubs.
//!
//! Register and stack conventions follow the stub keys: operands arrive in
//! `a0`/`a1`/`a2` or on the stack, the result leaves in `v0`, and a stub
//! pops exactly the stack arguments its key says it consumes.

use std::cmp::Ordering;

use plinth_core::isa::{Cond, Reg};
use plinth_core::layout::{is_smi, smi_from_int, smi_to_int};
use plinth_core::runtime::StubKey;
use plinth_core::token::{BinaryOp, UnaryOp};
use tracing::trace;

use crate::error::VmError;
use crate::machine::{Flow, Interrupt, Vm};
use crate::memory::STACK_LIMIT_ADDRESS;
use crate::value::{array_index, to_int32, to_uint32};

impl Vm {
    pub(crate) fn call_stub(&mut self, key: StubKey) -> Flow<()> {
        *self.stats.stub_calls.entry(key).or_default() += 1;
        trace!(stub = %key, "stub call");
        let result = match key {
            StubKey::GenericBinaryOp { op, .. } => {
                self.binary_operation(op, self.reg(Reg::A1), self.reg(Reg::A0))?
            }
            StubKey::GenericUnaryOp { op, .. } => self.unary_operation(op, self.reg(Reg::A0))?,
            StubKey::Compare { cond, strict } => self.compare_stub(cond, strict),
            StubKey::StringAdd => {
                let right = self.pop()?;
                let left = self.pop()?;
                let joined =
                    self.heap.to_display_string(left) + &self.heap.to_display_string(right);
                self.heap.alloc_string(&joined)?
            }
            StubKey::InstanceOf => {
                let function = self.pop()?;
                let object = self.pop()?;
                if self.instance_of(object, function)? {
                    0
                } else {
                    1
                }
            }
            StubKey::CallFunction { argc } => {
                let args = self.pop_arguments(argc as usize)?;
                let receiver = self.pop()?;
                let function = self.peek(0)?;
                if !self.heap.is_function(function) {
                    return Err(self.throw_error("TypeError", "callee is not a function"));
                }
                self.call_function(function, receiver, &args)?
            }
            StubKey::Construct { argc } => {
                let args = self.pop_arguments(argc as usize)?;
                self.pop()?;
                let function = self.peek(0)?;
                self.construct(function, &args)?
            }
            StubKey::LoadIc { contextual } => {
                let name = self.name_in(Reg::A2)?;
                let receiver = self.peek(0)?;
                match self.load_named(receiver, &name)? {
                    Some(value) => value,
                    None if contextual => {
                        let message = format!("{name} is not defined");
                        return Err(self.throw_error("ReferenceError", message));
                    }
                    None => self.heap.undefined(),
                }
            }
            StubKey::StoreIc => {
                let name = self.name_in(Reg::A2)?;
                let value = self.reg(Reg::A0);
                self.store_named(self.reg(Reg::A1), &name, value)?;
                value
            }
            StubKey::KeyedLoadIc => {
                let key = self.peek(0)?;
                let receiver = self.peek(1)?;
                self.load_keyed(receiver, key)?
            }
            StubKey::KeyedStoreIc => {
                let key = self.peek(0)?;
                let receiver = self.peek(1)?;
                let value = self.reg(Reg::A0);
                self.store_keyed(receiver, key, value)?;
                value
            }
            StubKey::CallIc { argc, contextual } => {
                let args = self.pop_arguments(argc as usize)?;
                let receiver = self.pop()?;
                let name_word = self.peek(0)?;
                let name = self.heap.string_value(name_word)?.to_string();
                let function = match self.load_named(receiver, &name)? {
                    Some(function) => function,
                    None if contextual => {
                        let message = format!("{name} is not defined");
                        return Err(self.throw_error("ReferenceError", message));
                    }
                    None => self.heap.undefined(),
                };
                if !self.heap.is_function(function) {
                    return Err(self.throw_error("TypeError", format!("{name} is not a function")));
                }
                self.call_function(function, receiver, &args)?
            }
            StubKey::StackCheck => {
                let limit = self.heap.memory.read(STACK_LIMIT_ADDRESS)?;
                if self.reg(Reg::Sp) < limit {
                    return Err(self.throw_error("RangeError", "Maximum call stack size exceeded"));
                }
                self.reg(Reg::V0)
            }
        };
        self.set_reg(Reg::V0, result);
        Ok(())
    }

    fn name_in(&self, reg: Reg) -> Flow<String> {
        Ok(self.heap.string_value(self.reg(reg))?.to_string())
    }

    // -----------------------------------------------------------------------
    // Arithmetic
    // -----------------------------------------------------------------------

    pub(crate) fn binary_operation(&mut self, op: BinaryOp, left: u32, right: u32) -> Flow<u32> {
        let heap = &self.heap;
        let stringy = |w: u32| heap.is_string(w) || heap.is_js_object(w);
        if op == BinaryOp::Add && (stringy(left) || stringy(right)) {
            let joined = heap.to_display_string(left) + &heap.to_display_string(right);
            return Ok(self.heap.alloc_string(&joined)?);
        }
        if op == BinaryOp::Comma {
            return Ok(right);
        }
        let (a, b) = (heap.to_number(left), heap.to_number(right));
        let shift = to_uint32(b) & 0x1f;
        let result = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Mod => a % b,
            BinaryOp::BitOr => f64::from(to_int32(a) | to_int32(b)),
            BinaryOp::BitAnd => f64::from(to_int32(a) & to_int32(b)),
            BinaryOp::BitXor => f64::from(to_int32(a) ^ to_int32(b)),
            BinaryOp::Shl => f64::from(to_int32(a).wrapping_shl(shift)),
            BinaryOp::Sar => f64::from(to_int32(a) >> shift),
            BinaryOp::Shr => f64::from(to_uint32(a) >> shift),
            BinaryOp::Comma => b,
        };
        Ok(self.heap.number(result)?)
    }

    fn unary_operation(&mut self, op: UnaryOp, operand: u32) -> Flow<u32> {
        let n = self.heap.to_number(operand);
        let result = match op {
            UnaryOp::Neg => -n,
            UnaryOp::BitNot => f64::from(!to_int32(n)),
            UnaryOp::Plus => n,
            other => {
                return Err(VmError::BadOperand(format!("no unary stub for {other}")).into());
            }
        };
        Ok(self.heap.number(result)?)
    }

    /// Compares `a1` with `a0`. The result compared against zero under
    /// `cond` gives the answer; an unordered pair answers false.
    fn compare_stub(&self, cond: Cond, strict: bool) -> u32 {
        let (left, right) = (self.reg(Reg::A1), self.reg(Reg::A0));
        if matches!(cond, Cond::Eq | Cond::Ne) {
            let equal = if strict {
                self.heap.strict_equals(left, right)
            } else {
                self.heap.loose_equals(left, right)
            };
            return u32::from(!equal);
        }
        let result: i32 = match self.heap.compare(left, right) {
            Some(Ordering::Less) => -1,
            Some(Ordering::Equal) => 0,
            Some(Ordering::Greater) => 1,
            None if matches!(cond, Cond::Lt | Cond::Le) => 1,
            None => -1,
        };
        result as u32
    }

    // -----------------------------------------------------------------------
    // Objects
    // -----------------------------------------------------------------------

    /// The `prototype` object of a function, created on first use.
    pub(crate) fn function_prototype(&mut self, function: u32) -> Flow<u32> {
        if let Some(prototype) = self.heap.own_property(function, "prototype")? {
            return Ok(prototype);
        }
        let prototype = self.heap.alloc_object(0)?;
        self.heap.set_property(function, "prototype", prototype)?;
        Ok(prototype)
    }

    fn instance_of(&mut self, object: u32, function: u32) -> Flow<bool> {
        if !self.heap.is_function(function) {
            let message = "right-hand side of 'instanceof' is not callable";
            return Err(self.throw_error("TypeError", message));
        }
        if !self.heap.is_js_object(object) {
            return Ok(false);
        }
        let prototype = self.function_prototype(function)?;
        let mut current = self.heap.prototype(object)?;
        while current != 0 {
            if current == prototype {
                return Ok(true);
            }
            current = self.heap.prototype(current)?;
        }
        Ok(false)
    }

    fn construct(&mut self, function: u32, args: &[u32]) -> Flow<u32> {
        if !self.heap.is_function(function) {
            return Err(self.throw_error("TypeError", "object is not a constructor"));
        }
        let prototype = self.function_prototype(function)?;
        let receiver = self.heap.alloc_object(prototype)?;
        let result = self.call_function(function, receiver, args)?;
        Ok(if self.heap.is_js_object(result) {
            result
        } else {
            receiver
        })
    }

    fn nullish_access(&mut self, receiver: u32, name: &str) -> Interrupt {
        let what = self.heap.to_display_string(receiver);
        self.throw_error("TypeError", format!("Cannot access property '{name}' of {what}"))
    }

    /// Named property read; `None` when absent.
    pub(crate) fn load_named(&mut self, receiver: u32, name: &str) -> Flow<Option<u32>> {
        if self.heap.is_nullish(receiver) {
            return Err(self.nullish_access(receiver, name));
        }
        if self.heap.is_array(receiver) {
            if name == "length" {
                return Ok(Some(smi_from_int(self.heap.array_length(receiver)? as i32)));
            }
            if let Some(index) = array_index(name) {
                return Ok(self.element(receiver, index)?);
            }
        }
        if self.heap.is_js_object(receiver) {
            return Ok(self.heap.get_property(receiver, name)?);
        }
        if let Ok(s) = self.heap.string_value(receiver) {
            if name == "length" {
                return Ok(Some(smi_from_int(s.chars().count() as i32)));
            }
            if let Some(c) = array_index(name).and_then(|i| s.chars().nth(i)) {
                return Ok(Some(self.heap.alloc_string(&c.to_string())?));
            }
        }
        Ok(None)
    }

    /// Array element, with holes reading as absent.
    fn element(&self, array: u32, index: usize) -> Flow<Option<u32>> {
        let hole = self.heap.root(plinth_core::isa::Root::TheHole);
        Ok(self.heap.array_get(array, index)?.filter(|&w| w != hole))
    }

    pub(crate) fn store_named(&mut self, receiver: u32, name: &str, value: u32) -> Flow<()> {
        if self.heap.is_nullish(receiver) {
            return Err(self.nullish_access(receiver, name));
        }
        if !self.heap.is_js_object(receiver) {
            return Ok(());
        }
        if self.heap.is_array(receiver) {
            if let Some(index) = array_index(name) {
                return Ok(self.heap.array_set(receiver, index, value)?);
            }
        }
        Ok(self.heap.set_property(receiver, name, value)?)
    }

    /// Property name a key value stands for.
    pub(crate) fn key_name(&self, key: u32) -> String {
        self.heap.to_display_string(key)
    }

    fn load_keyed(&mut self, receiver: u32, key: u32) -> Flow<u32> {
        let found = if is_smi(key) && smi_to_int(key) >= 0 && self.heap.is_array(receiver) {
            self.element(receiver, smi_to_int(key) as usize)?
        } else {
            let name = self.key_name(key);
            self.load_named(receiver, &name)?
        };
        Ok(found.unwrap_or_else(|| self.heap.undefined()))
    }

    fn store_keyed(&mut self, receiver: u32, key: u32, value: u32) -> Flow<()> {
        if is_smi(key) && smi_to_int(key) >= 0 && self.heap.is_array(receiver) {
            return Ok(self.heap.array_set(receiver, smi_to_int(key) as usize, value)?);
        }
        let name = self.key_name(key);
        self.store_named(receiver, &name, value)
    }
}
