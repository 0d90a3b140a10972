//! The instruction interpreter.
//!
//! Each JS activation entered from the host (the main program, or a call
//! made by a call stub) runs in its own [`Vm::execute`] loop and ends when
//! the code jumps to [`HOST_RETURN`]. Stubs and runtime functions are host
//! code. A thrown value unwinds to the innermost handler on the machine
//! stack if that handler belongs to the current activation; otherwise it
//! propagates to the activation below.

use std::collections::HashMap;
use std::rc::Rc;

use plinth_core::isa::{Code, ConstId, Constant, Instr, Label, Operand, Reg};
use plinth_core::layout::{context, smi_from_int, stack_handler, POINTER_SIZE};
use plinth_core::module::{FunctionId, Module};
use plinth_core::runtime::{MajorKey, RuntimeFunction, StubKey};
use strum::{EnumCount, IntoEnumIterator};
use tracing::{debug, trace};

use crate::error::{Result, VmError};
use crate::heap::Heap;
use crate::memory::{
    code_address, decode_code_address, HANDLER_ADDRESS, HOST_RETURN, STACK_LIMIT_ADDRESS,
};
use crate::options::VmOptions;
use crate::value::Value;

/// Written to caller-saved registers after calls when clobbering is on.
const CLOBBER: u32 = 0xdead_beef;

/// Non-local exit from an instruction.
#[derive(Debug)]
pub(crate) enum Interrupt {
    /// A JS exception carrying the thrown value.
    Throw(u32),
    Fatal(VmError),
}

impl From<VmError> for Interrupt {
    fn from(err: VmError) -> Self {
        Interrupt::Fatal(err)
    }
}

pub(crate) type Flow<T> = std::result::Result<T, Interrupt>;

enum Next {
    Continue,
    Jump(usize),
    Transfer(FunctionId, usize),
    Return,
}

/// Execution counters.
#[derive(Debug, Default, Clone)]
pub struct Stats {
    pub steps: u64,
    pub stub_calls: HashMap<StubKey, u64>,
    pub runtime_calls: HashMap<RuntimeFunction, u64>,
    pub write_barriers: u64,
    /// Deepest nesting of JS activations seen.
    pub max_depth: usize,
}

impl Stats {
    pub fn stub_calls_of(&self, major: MajorKey) -> u64 {
        self.stub_calls
            .iter()
            .filter(|(key, _)| key.major() == major)
            .map(|(_, count)| count)
            .sum()
    }

    pub fn runtime_calls_of(&self, function: RuntimeFunction) -> u64 {
        self.runtime_calls.get(&function).copied().unwrap_or(0)
    }
}

#[derive(Debug)]
pub(crate) struct FunctionEntry {
    pub name: String,
    pub parameter_count: u32,
    pub heap_slots: u32,
    pub code: Option<Rc<Code>>,
}

#[derive(Debug)]
pub struct Vm {
    pub heap: Heap,
    pub(crate) functions: Vec<FunctionEntry>,
    options: VmOptions,
    regs: [u32; Reg::COUNT],
    constants: HashMap<(FunctionId, u32), u32>,
    pub(crate) boilerplates: Vec<Constant>,
    pub(crate) global_object: u32,
    pub(crate) global_context: u32,
    depth: usize,
    pub(crate) stats: Stats,
    pub(crate) output: Vec<String>,
}

impl Vm {
    pub fn new(module: &Module, options: VmOptions) -> Result<Self> {
        let mut heap = Heap::new(options.heap_bytes, options.stack_bytes)?;
        let global_object = heap.alloc_global_object()?;
        let undefined = heap.undefined();
        let global_context = heap.alloc_context(
            context::MIN_CONTEXT_SLOTS as usize,
            undefined,
            undefined,
            global_object,
        )?;

        let stack_top = heap.memory.stack_top();
        let limit = heap
            .memory
            .stack_base()
            .saturating_add(options.stack_reserve_bytes)
            .min(stack_top);
        heap.memory.write(STACK_LIMIT_ADDRESS, limit)?;
        heap.memory.write(HANDLER_ADDRESS, 0)?;

        let functions = module
            .functions
            .iter()
            .map(|f| FunctionEntry {
                name: f.name.clone(),
                parameter_count: f.parameter_count,
                heap_slots: f.heap_slots,
                code: f.code.clone().map(Rc::new),
            })
            .collect();

        let mut regs = [0; Reg::COUNT];
        regs[Reg::Sp.index()] = stack_top;
        regs[Reg::Cp.index()] = global_context;
        Ok(Self {
            heap,
            functions,
            options,
            regs,
            constants: HashMap::new(),
            boilerplates: Vec::new(),
            global_object,
            global_context,
            depth: 0,
            stats: Stats::default(),
            output: Vec::new(),
        })
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Lines written by `%Print`.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn global_object(&self) -> u32 {
        self.global_object
    }

    // -----------------------------------------------------------------------
    // Host entry points
    // -----------------------------------------------------------------------

    /// Runs function 0 with the global object as receiver.
    pub fn run_main(&mut self) -> Result<Value> {
        let closure = self.heap.alloc_function(0, self.global_context)?;
        let receiver = self.global_object;
        let word = self.call_from_host(closure, receiver, &[])?;
        debug!(steps = self.stats.steps, heap_used = self.heap.heap_used(), "main returned");
        Ok(self.heap.describe(word))
    }

    /// Calls the global function `name`, typically one the main program
    /// declared.
    pub fn call_global(&mut self, name: &str, args: &[Value]) -> Result<Value> {
        let function = self
            .heap
            .get_property(self.global_object, name)?
            .ok_or_else(|| VmError::Uncaught(format!("ReferenceError: {name} is not defined")))?;
        let words = args
            .iter()
            .map(|arg| self.word_of(arg))
            .collect::<Result<Vec<_>>>()?;
        let receiver = self.global_object;
        let word = self.call_from_host(function, receiver, &words)?;
        Ok(self.heap.describe(word))
    }

    pub fn set_global(&mut self, name: &str, value: &Value) -> Result<()> {
        let word = self.word_of(value)?;
        self.heap.set_property(self.global_object, name, word)
    }

    pub fn get_global(&self, name: &str) -> Result<Option<Value>> {
        let word = self.heap.get_property(self.global_object, name)?;
        Ok(word.map(|w| self.heap.describe(w)))
    }

    /// A fresh object that compares equal to `null` and `undefined`.
    pub fn new_undetectable(&mut self) -> Result<Value> {
        Ok(Value::Object(self.heap.alloc_undetectable()?))
    }

    /// Elements of an array value.
    pub fn array_values(&self, value: &Value) -> Result<Vec<Value>> {
        let Value::Array(word) = value else {
            return Err(VmError::BadOperand(format!("{value} is not an array")));
        };
        let length = self.heap.array_length(*word)?;
        (0..length)
            .map(|i| {
                let element = self.heap.array_get(*word, i)?;
                Ok(element.map_or(Value::Undefined, |w| self.heap.describe(w)))
            })
            .collect()
    }

    /// Named property of an object value.
    pub fn property(&self, value: &Value, name: &str) -> Result<Option<Value>> {
        let (Value::Object(word) | Value::Array(word)) = value else {
            return Ok(None);
        };
        let found = self.heap.get_property(*word, name)?;
        Ok(found.map(|w| self.heap.describe(w)))
    }

    pub fn word_of(&mut self, value: &Value) -> Result<u32> {
        Ok(match value {
            Value::Undefined => self.heap.undefined(),
            Value::Null => self.heap.null(),
            Value::Bool(b) => self.heap.boolean(*b),
            Value::Smi(v) => self.heap.number(f64::from(*v))?,
            Value::Number(n) => self.heap.number(*n)?,
            Value::String(s) => self.heap.alloc_string(s)?,
            Value::Object(word) | Value::Array(word) => *word,
            Value::Function(id) => self.heap.alloc_function(*id, self.global_context)?,
            Value::Hole => self.heap.root(plinth_core::isa::Root::TheHole),
        })
    }

    fn call_from_host(&mut self, function: u32, receiver: u32, args: &[u32]) -> Result<u32> {
        match self.call_function(function, receiver, args) {
            Ok(word) => Ok(word),
            Err(Interrupt::Throw(exception)) => {
                let description = self.describe_exception(exception);
                debug!(exception = %description, "uncaught exception");
                Err(VmError::Uncaught(description))
            }
            Err(Interrupt::Fatal(err)) => Err(err),
        }
    }

    pub(crate) fn describe_exception(&self, exception: u32) -> String {
        if self.heap.is_js_object(exception) {
            let field = |name: &str| {
                self.heap
                    .get_property(exception, name)
                    .ok()
                    .flatten()
                    .map(|w| self.heap.to_display_string(w))
            };
            if let (Some(name), Some(message)) = (field("name"), field("message")) {
                return format!("{name}: {message}");
            }
        }
        self.heap.to_display_string(exception)
    }

    // -----------------------------------------------------------------------
    // Registers and stack
    // -----------------------------------------------------------------------

    pub fn reg(&self, reg: Reg) -> u32 {
        self.regs[reg.index()]
    }

    pub(crate) fn set_reg(&mut self, reg: Reg, value: u32) {
        if reg != Reg::Zero {
            self.regs[reg.index()] = value;
        }
    }

    fn operand(&self, operand: Operand) -> u32 {
        match operand {
            Operand::Reg(r) => self.reg(r),
            Operand::Imm(v) => v as u32,
        }
    }

    pub(crate) fn push(&mut self, value: u32) -> Result<()> {
        let sp = self.reg(Reg::Sp).wrapping_sub(POINTER_SIZE as u32);
        if sp < self.heap.memory.stack_base() {
            return Err(VmError::StackOverflow);
        }
        self.heap.memory.write(sp, value)?;
        self.set_reg(Reg::Sp, sp);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<u32> {
        let sp = self.reg(Reg::Sp);
        let value = self.heap.memory.read(sp)?;
        self.set_reg(Reg::Sp, sp.wrapping_add(POINTER_SIZE as u32));
        Ok(value)
    }

    /// Stack word `depth` slots above `sp`.
    pub(crate) fn peek(&self, depth: usize) -> Result<u32> {
        let address = self.reg(Reg::Sp).wrapping_add((depth as u32) * POINTER_SIZE as u32);
        self.heap.memory.read(address)
    }

    pub(crate) fn drop_words(&mut self, count: usize) {
        let sp = self.reg(Reg::Sp).wrapping_add((count as u32) * POINTER_SIZE as u32);
        self.set_reg(Reg::Sp, sp);
    }

    /// Pops `count` arguments, the first one deepest.
    pub(crate) fn pop_arguments(&mut self, count: usize) -> Result<Vec<u32>> {
        let args = (0..count)
            .map(|i| self.peek(count - 1 - i))
            .collect::<Result<Vec<_>>>()?;
        self.drop_words(count);
        Ok(args)
    }

    fn clobber_after_call(&mut self) {
        if !self.options.clobber_caller_saved {
            return;
        }
        for reg in Reg::iter().filter(|r| r.is_caller_saved()) {
            self.set_reg(reg, CLOBBER);
        }
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    /// Runs `function` in a new activation and returns its result.
    /// Arguments beyond the declared parameters are dropped; missing ones
    /// are `undefined`.
    pub(crate) fn call_function(
        &mut self,
        function: u32,
        receiver: u32,
        args: &[u32],
    ) -> Flow<u32> {
        if !self.heap.is_function(function) {
            return Err(self.throw_error("TypeError", "object is not a function"));
        }
        let id = self.heap.function_id(function)?;
        let (code, parameter_count) = {
            let entry = self
                .functions
                .get(id as usize)
                .ok_or(VmError::UnknownFunction(id))?;
            trace!(function = %entry.name, id, depth = self.depth, "enter");
            let code = entry.code.clone().ok_or(VmError::MissingCode(id))?;
            (code, entry.parameter_count as usize)
        };
        if self.depth >= self.options.max_call_depth {
            return Err(self.throw_error("RangeError", "Maximum call stack size exceeded"));
        }

        let saved_sp = self.reg(Reg::Sp);
        let saved_fp = self.reg(Reg::Fp);
        let saved_ra = self.reg(Reg::Ra);
        let entry_handler = self.heap.memory.read(HANDLER_ADDRESS)?;

        self.depth += 1;
        self.stats.max_depth = self.stats.max_depth.max(self.depth);
        let outcome = self.activate(
            id,
            code,
            function,
            receiver,
            args,
            parameter_count,
            entry_handler,
        );
        self.depth -= 1;

        let sp_after = self.reg(Reg::Sp);
        self.set_reg(Reg::Fp, saved_fp);
        self.set_reg(Reg::Ra, saved_ra);
        match outcome {
            Ok(()) if sp_after == saved_sp => Ok(self.reg(Reg::V0)),
            Ok(()) => Err(Interrupt::Fatal(VmError::BadOperand(format!(
                "function {id} returned with sp off by {} bytes",
                sp_after.wrapping_sub(saved_sp) as i32
            )))),
            Err(interrupt) => {
                self.set_reg(Reg::Sp, saved_sp);
                self.heap.memory.write(HANDLER_ADDRESS, entry_handler)?;
                Err(interrupt)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn activate(
        &mut self,
        id: FunctionId,
        code: Rc<Code>,
        function: u32,
        receiver: u32,
        args: &[u32],
        parameter_count: usize,
        entry_handler: u32,
    ) -> Flow<()> {
        let undefined = self.heap.undefined();
        self.push(receiver)?;
        for i in 0..parameter_count {
            self.push(args.get(i).copied().unwrap_or(undefined))?;
        }
        let context = self.heap.function_context(function)?;
        self.set_reg(Reg::A1, function);
        self.set_reg(Reg::Cp, context);
        self.set_reg(Reg::Ra, HOST_RETURN);
        self.execute(id, code, entry_handler)
    }

    fn code_of(&self, id: FunctionId) -> Result<Rc<Code>> {
        self.functions
            .get(id as usize)
            .ok_or(VmError::UnknownFunction(id))?
            .code
            .clone()
            .ok_or(VmError::MissingCode(id))
    }

    fn execute(&mut self, mut id: FunctionId, mut code: Rc<Code>, entry_handler: u32) -> Flow<()> {
        let mut pc = 0;
        loop {
            let Some(instr) = code.instructions.get(pc) else {
                return Err(VmError::BadCodeAddress(code_address(id, pc)).into());
            };
            self.stats.steps += 1;
            if self.options.max_steps != 0 && self.stats.steps > self.options.max_steps {
                return Err(VmError::StepLimit(self.options.max_steps).into());
            }
            let next = self.step(instr, id, &code, pc);
            match next {
                Ok(Next::Continue) => pc += 1,
                Ok(Next::Jump(target)) => pc = target,
                Ok(Next::Transfer(target_id, target)) => {
                    if target_id != id {
                        code = self.code_of(target_id)?;
                        id = target_id;
                    }
                    pc = target;
                }
                Ok(Next::Return) => return Ok(()),
                Err(Interrupt::Throw(exception)) => {
                    let handler = self.heap.memory.read(HANDLER_ADDRESS)?;
                    if handler == entry_handler || handler == 0 {
                        return Err(Interrupt::Throw(exception));
                    }
                    let (target_id, target) = self.unwind_to(handler, exception)?;
                    if target_id != id {
                        code = self.code_of(target_id)?;
                        id = target_id;
                    }
                    pc = target;
                }
                Err(fatal) => return Err(fatal),
            }
        }
    }

    /// Pops the handler record at `handler` and resumes at its landing pad
    /// with the exception in `v0`.
    fn unwind_to(&mut self, handler: u32, exception: u32) -> Result<(FunctionId, usize)> {
        let word = |offset: i32| handler.wrapping_add(offset as u32);
        let next = self.heap.memory.read(word(stack_handler::NEXT_OFFSET))?;
        let fp = self.heap.memory.read(word(stack_handler::FP_OFFSET))?;
        let resume = self.heap.memory.read(word(stack_handler::PC_OFFSET))?;
        self.heap.memory.write(HANDLER_ADDRESS, next)?;
        self.set_reg(Reg::Sp, word(stack_handler::SIZE));
        self.set_reg(Reg::Fp, fp);
        self.set_reg(Reg::V0, exception);
        let cp = self.heap.memory.read(fp.wrapping_sub(POINTER_SIZE as u32))?;
        self.set_reg(Reg::Cp, cp);
        debug!(handler = format_args!("{handler:#x}"), "exception caught");
        decode_code_address(resume).ok_or(VmError::BadCodeAddress(resume))
    }

    fn label_position(code: &Code, label: Label) -> Result<usize> {
        code.label_position(label)
            .ok_or_else(|| VmError::BadOperand(format!("unbound label {label}")))
    }

    fn step(&mut self, instr: &Instr, id: FunctionId, code: &Code, pc: usize) -> Flow<Next> {
        match instr {
            Instr::Comment(_) => {}
            Instr::Li(rd, value) => self.set_reg(*rd, *value as u32),
            Instr::LoadConstant(rd, constant) => {
                let word = self.constant(id, code, *constant)?;
                self.set_reg(*rd, word);
            }
            Instr::LoadRoot(rd, root) => self.set_reg(*rd, self.heap.root(*root)),
            Instr::LoadExternal(rd, external) => {
                self.set_reg(*rd, self.heap.memory.external(*external))
            }
            Instr::Move(rd, rs) => self.set_reg(*rd, self.reg(*rs)),
            Instr::Lw(rt, mem) => {
                let address = self.reg(mem.base).wrapping_add(mem.offset as u32);
                let value = self.heap.memory.read(address)?;
                self.set_reg(*rt, value);
            }
            Instr::Sw(rt, mem) => {
                let address = self.reg(mem.base).wrapping_add(mem.offset as u32);
                self.heap.memory.write(address, self.reg(*rt))?;
            }
            Instr::Alu { op, rd, rs, rt } => {
                let value = op.apply(self.reg(*rs), self.operand(*rt));
                self.set_reg(*rd, value);
            }
            Instr::Shift { op, rd, rt, sa } => self.set_reg(*rd, op.apply(self.reg(*rt), *sa)),
            Instr::Branch { cond, rs, rt, target } => {
                if cond.holds(self.reg(*rs), self.operand(*rt)) {
                    return Ok(Next::Jump(Self::label_position(code, *target)?));
                }
            }
            Instr::Bal(target) => {
                self.set_reg(Reg::Ra, code_address(id, pc + 1));
                return Ok(Next::Jump(Self::label_position(code, *target)?));
            }
            Instr::Jr(rs) => {
                let address = self.reg(*rs);
                if address == HOST_RETURN {
                    return Ok(Next::Return);
                }
                let (target_id, target) =
                    decode_code_address(address).ok_or(VmError::BadCodeAddress(address))?;
                return Ok(Next::Transfer(target_id, target));
            }
            Instr::Push(rs) => self.push(self.reg(*rs))?,
            Instr::Pop(rd) => {
                let value = self.pop()?;
                self.set_reg(*rd, value);
            }
            Instr::CallStub(key) => {
                self.call_stub(*key)?;
                self.clobber_after_call();
            }
            Instr::CallRuntime { function, argc } => {
                let value = self.call_runtime(*function, *argc)?;
                self.set_reg(Reg::V0, value);
                self.clobber_after_call();
            }
            Instr::RecordWrite { object, offset } => {
                let object = self.reg(*object);
                let slot = object.wrapping_add(self.reg(*offset));
                if !self.heap.is_heap_object(object) || !self.heap.memory.is_heap_address(slot) {
                    return Err(VmError::BadOperand(format!(
                        "write barrier for {object:#010x} at {slot:#010x}"
                    ))
                    .into());
                }
                self.stats.write_barriers += 1;
            }
            Instr::Stop(message) => return Err(VmError::Trap(message.clone()).into()),
        }
        Ok(Next::Continue)
    }

    /// Materializes a constant pool entry, once per code object.
    /// Boilerplates become a smi index into the boilerplate table.
    fn constant(&mut self, id: FunctionId, code: &Code, constant: ConstId) -> Result<u32> {
        if let Some(&word) = self.constants.get(&(id, constant.0)) {
            return Ok(word);
        }
        let entry = code
            .constants
            .get(constant.0 as usize)
            .ok_or_else(|| {
                VmError::BadOperand(format!("constant {} of function {id}", constant.0))
            })?;
        let word = match entry {
            Constant::String(s) => self.heap.alloc_string(s)?,
            Constant::Number(n) => self.heap.alloc_heap_number(*n)?,
            Constant::ObjectBoilerplate(_) | Constant::ArrayBoilerplate(_) => {
                self.boilerplates.push(entry.clone());
                smi_from_int(self.boilerplates.len() as i32 - 1)
            }
        };
        self.constants.insert((id, constant.0), word);
        Ok(word)
    }

    // -----------------------------------------------------------------------
    // Exceptions
    // -----------------------------------------------------------------------

    /// Builds an error object `{ name, message }` to throw.
    pub(crate) fn throw_error(&mut self, name: &str, message: impl Into<String>) -> Interrupt {
        let message = message.into();
        match self.error_object(name, &message) {
            Ok(object) => Interrupt::Throw(object),
            Err(err) => Interrupt::Fatal(err),
        }
    }

    fn error_object(&mut self, name: &str, message: &str) -> Result<u32> {
        let object = self.heap.alloc_object(0)?;
        let name_word = self.heap.alloc_string(name)?;
        let message_word = self.heap.alloc_string(message)?;
        self.heap.set_property(object, "name", name_word)?;
        self.heap.set_property(object, "message", message_word)?;
        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_core::isa::{AluOp, Cond, External, MemOperand};
    use plinth_core::module::CompiledFunction;

    /// Wraps `body` in the standard frame entry and exit for a function
    /// without parameters. Labels index the wrapped instruction list.
    fn function(body: Vec<Instr>, labels: Vec<usize>) -> Module {
        let mut instructions = vec![
            Instr::Push(Reg::Ra),
            Instr::Push(Reg::Fp),
            Instr::Move(Reg::Fp, Reg::Sp),
            Instr::Push(Reg::Cp),
            Instr::Push(Reg::A1),
        ];
        instructions.extend(body);
        instructions.extend([
            Instr::Move(Reg::Sp, Reg::Fp),
            Instr::Lw(Reg::Fp, MemOperand::new(Reg::Sp, 0)),
            Instr::Lw(Reg::Ra, MemOperand::new(Reg::Sp, 4)),
            Instr::Alu {
                op: AluOp::Addu,
                rd: Reg::Sp,
                rs: Reg::Sp,
                rt: Operand::Imm(12),
            },
            Instr::Jr(Reg::Ra),
        ]);
        Module {
            functions: vec![CompiledFunction {
                id: 0,
                name: "main".into(),
                parameter_count: 0,
                heap_slots: 0,
                code: Some(Code {
                    instructions,
                    labels,
                    constants: Vec::new(),
                }),
            }],
            stubs: Vec::new(),
        }
    }

    fn always(target: u32) -> Instr {
        Instr::Branch {
            cond: Cond::Always,
            rs: Reg::Zero,
            rt: Operand::Imm(0),
            target: Label(target),
        }
    }

    /// Pushes a try-catch handler whose landing pad is in `ra`, then throws
    /// smi 7.
    fn throw_under_handler() -> Vec<Instr> {
        vec![
            Instr::Li(Reg::T0, 0),
            Instr::LoadExternal(Reg::T2, External::HandlerAddress),
            Instr::Lw(Reg::T1, MemOperand::new(Reg::T2, 0)),
            Instr::Alu {
                op: AluOp::Addu,
                rd: Reg::Sp,
                rs: Reg::Sp,
                rt: Operand::Imm(-16),
            },
            Instr::Sw(Reg::Ra, MemOperand::new(Reg::Sp, 12)),
            Instr::Sw(Reg::Fp, MemOperand::new(Reg::Sp, 8)),
            Instr::Sw(Reg::T0, MemOperand::new(Reg::Sp, 4)),
            Instr::Sw(Reg::T1, MemOperand::new(Reg::Sp, 0)),
            Instr::Sw(Reg::Sp, MemOperand::new(Reg::T2, 0)),
            Instr::Li(Reg::A0, smi_from_int(7) as i32),
            Instr::Push(Reg::A0),
            Instr::CallRuntime {
                function: RuntimeFunction::Throw,
                argc: 1,
            },
        ]
    }

    #[test]
    fn straight_line_code_returns_v0() {
        let module = function(
            vec![
                Instr::Li(Reg::V0, smi_from_int(21) as i32),
                Instr::Alu {
                    op: AluOp::Addu,
                    rd: Reg::V0,
                    rs: Reg::V0,
                    rt: Operand::Reg(Reg::V0),
                },
            ],
            vec![],
        );
        let mut vm = Vm::new(&module, VmOptions::default()).unwrap();
        assert_eq!(vm.run_main().unwrap(), Value::Smi(42));
        assert_eq!(vm.reg(Reg::Sp), vm.heap.memory.stack_top());
    }

    #[test]
    fn thrown_values_resume_at_the_handler() {
        // 5: bal L0; 6: b L1; 7..19: handler and throw; 19: exit.
        let mut body = vec![Instr::Bal(Label(0)), always(1)];
        body.extend(throw_under_handler());
        let module = function(body, vec![7, 19]);
        let mut vm = Vm::new(&module, VmOptions::default()).unwrap();
        assert_eq!(vm.run_main().unwrap(), Value::Smi(7));
        assert_eq!(vm.heap.memory.read(HANDLER_ADDRESS).unwrap(), 0);
    }

    #[test]
    fn exceptions_without_a_handler_escape_to_the_host() {
        let module = function(
            vec![
                Instr::Li(Reg::A0, smi_from_int(7) as i32),
                Instr::Push(Reg::A0),
                Instr::CallRuntime {
                    function: RuntimeFunction::Throw,
                    argc: 1,
                },
            ],
            vec![],
        );
        let mut vm = Vm::new(&module, VmOptions::default()).unwrap();
        assert_eq!(vm.run_main(), Err(VmError::Uncaught("7".into())));
    }

    #[test]
    fn runaway_loops_hit_the_step_limit() {
        let module = function(vec![always(0)], vec![5]);
        let options = VmOptions {
            max_steps: 100,
            ..VmOptions::default()
        };
        let mut vm = Vm::new(&module, options).unwrap();
        assert_eq!(vm.run_main(), Err(VmError::StepLimit(100)));
    }

    #[test]
    fn stop_instructions_trap() {
        let module = function(vec![Instr::Stop("unsupported: with".into())], vec![]);
        let mut vm = Vm::new(&module, VmOptions::default()).unwrap();
        assert_eq!(vm.run_main(), Err(VmError::Trap("unsupported: with".into())));
    }
}
