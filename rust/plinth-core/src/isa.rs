//! Target instruction set.
//!
//! A 32-bit load/store register machine modelled on MIPS32 with a handful
//! of macro instructions (`Push`, `Pop`, `CallStub`, `CallRuntime`,
//! `RecordWrite`) that a real macro assembler would expand in place.
//! Branch destinations are labels; a finished [`Code`] carries the table
//! that resolves every label to an instruction index.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

use crate::runtime::{RuntimeFunction, StubKey};

// ---------------------------------------------------------------------------
// Registers
// ---------------------------------------------------------------------------

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumCount,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Reg {
    Zero,
    At,
    V0,
    V1,
    A0,
    A1,
    A2,
    A3,
    T0,
    T1,
    T2,
    T3,
    T4,
    T5,
    T6,
    T7,
    T8,
    T9,
    S0,
    S1,
    S2,
    S3,
    S4,
    S5,
    S6,
    S7,
    Cp,
    Fp,
    Sp,
    Ra,
}

/// First operand of a pending comparison.
pub const COND1: Reg = Reg::S6;
/// Second operand of a pending comparison.
pub const COND2: Reg = Reg::S7;

impl Reg {
    pub fn index(self) -> usize {
        self as usize
    }

    /// Registers a stub or runtime call may overwrite.
    pub fn is_caller_saved(self) -> bool {
        matches!(
            self,
            Reg::At
                | Reg::V1
                | Reg::A0
                | Reg::A1
                | Reg::A2
                | Reg::A3
                | Reg::T0
                | Reg::T1
                | Reg::T2
                | Reg::T3
                | Reg::T4
                | Reg::T5
                | Reg::T6
                | Reg::T7
                | Reg::T8
                | Reg::T9
                | Reg::S6
                | Reg::S7
        )
    }
}

// ---------------------------------------------------------------------------
// Conditions and operands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Cond {
    Always,
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
    /// Unsigned less than.
    Ult,
    Uge,
    Ugt,
    Ule,
}

impl Cond {
    /// The condition that holds exactly when `self` does not.
    pub fn negate(self) -> Cond {
        match self {
            Cond::Always => Cond::Always,
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Lt => Cond::Ge,
            Cond::Ge => Cond::Lt,
            Cond::Gt => Cond::Le,
            Cond::Le => Cond::Gt,
            Cond::Ult => Cond::Uge,
            Cond::Uge => Cond::Ult,
            Cond::Ugt => Cond::Ule,
            Cond::Ule => Cond::Ugt,
        }
    }

    /// The condition to test when the operands are swapped.
    pub fn reverse(self) -> Cond {
        match self {
            Cond::Lt => Cond::Gt,
            Cond::Gt => Cond::Lt,
            Cond::Le => Cond::Ge,
            Cond::Ge => Cond::Le,
            Cond::Ult => Cond::Ugt,
            Cond::Ugt => Cond::Ult,
            Cond::Ule => Cond::Uge,
            Cond::Uge => Cond::Ule,
            other => other,
        }
    }

    pub fn holds(self, lhs: u32, rhs: u32) -> bool {
        let (sl, sr) = (lhs as i32, rhs as i32);
        match self {
            Cond::Always => true,
            Cond::Eq => lhs == rhs,
            Cond::Ne => lhs != rhs,
            Cond::Lt => sl < sr,
            Cond::Ge => sl >= sr,
            Cond::Gt => sl > sr,
            Cond::Le => sl <= sr,
            Cond::Ult => lhs < rhs,
            Cond::Uge => lhs >= rhs,
            Cond::Ugt => lhs > rhs,
            Cond::Ule => lhs <= rhs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Reg(Reg),
    Imm(i32),
}

impl From<Reg> for Operand {
    fn from(r: Reg) -> Self {
        Operand::Reg(r)
    }
}

impl From<i32> for Operand {
    fn from(v: i32) -> Self {
        Operand::Imm(v)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "{r}"),
            Operand::Imm(v) if *v < 0 || *v > 0xffff => write!(f, "{:#x}", *v as u32),
            Operand::Imm(v) => write!(f, "{v}"),
        }
    }
}

/// `offset(base)` addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemOperand {
    pub base: Reg,
    pub offset: i32,
}

impl MemOperand {
    pub fn new(base: Reg, offset: i32) -> Self {
        Self { base, offset }
    }

    /// Field of a tagged heap reference held in `base`.
    pub fn field(base: Reg, offset: i32) -> Self {
        Self::new(base, crate::layout::field_offset(offset))
    }
}

impl fmt::Display for MemOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.offset, self.base)
    }
}

// ---------------------------------------------------------------------------
// Symbolic values resolved when code is loaded
// ---------------------------------------------------------------------------

/// Well-known heap values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Root {
    Undefined,
    Null,
    True,
    False,
    TheHole,
    HeapNumberMap,
}

/// Addresses of VM-global words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum External {
    /// Head of the exception handler chain.
    HandlerAddress,
    /// Lowest permitted stack pointer.
    StackLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstId(pub u32);

/// Literal values that may appear inside a boilerplate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Smi(i32),
    Number(f64),
    String(String),
    True,
    False,
    Null,
    Undefined,
    /// Placeholder for a value computed at run time.
    Hole,
}

/// Entries of a code object's constant pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    String(String),
    Number(f64),
    ObjectBoilerplate(Vec<(String, ConstValue)>),
    ArrayBoilerplate(Vec<ConstValue>),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::String(s) => write!(f, "{s:?}"),
            Constant::Number(n) => write!(f, "{n}"),
            Constant::ObjectBoilerplate(props) => write!(f, "<object boilerplate {}>", props.len()),
            Constant::ArrayBoilerplate(elems) => write!(f, "<array boilerplate {}>", elems.len()),
        }
    }
}

// ---------------------------------------------------------------------------
// Instructions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum AluOp {
    Addu,
    Subu,
    And,
    Or,
    Xor,
    Nor,
    Mul,
    /// Shifts by a register amount (low five bits).
    Sllv,
    Srlv,
    Srav,
    /// Set if less than, signed.
    Slt,
}

impl AluOp {
    pub fn apply(self, a: u32, b: u32) -> u32 {
        match self {
            AluOp::Addu => a.wrapping_add(b),
            AluOp::Subu => a.wrapping_sub(b),
            AluOp::And => a & b,
            AluOp::Or => a | b,
            AluOp::Xor => a ^ b,
            AluOp::Nor => !(a | b),
            AluOp::Mul => (a as i32).wrapping_mul(b as i32) as u32,
            AluOp::Sllv => a << (b & 0x1f),
            AluOp::Srlv => a >> (b & 0x1f),
            AluOp::Srav => ((a as i32) >> (b & 0x1f)) as u32,
            AluOp::Slt => ((a as i32) < (b as i32)) as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ShiftOp {
    Sll,
    Srl,
    Sra,
}

impl ShiftOp {
    pub fn apply(self, value: u32, amount: u8) -> u32 {
        let sa = u32::from(amount & 0x1f);
        match self {
            ShiftOp::Sll => value << sa,
            ShiftOp::Srl => value >> sa,
            ShiftOp::Sra => ((value as i32) >> sa) as u32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instr {
    Comment(String),
    Li(Reg, i32),
    LoadConstant(Reg, ConstId),
    LoadRoot(Reg, Root),
    LoadExternal(Reg, External),
    Move(Reg, Reg),
    Lw(Reg, MemOperand),
    Sw(Reg, MemOperand),
    Alu {
        op: AluOp,
        rd: Reg,
        rs: Reg,
        rt: Operand,
    },
    Shift {
        op: ShiftOp,
        rd: Reg,
        rt: Reg,
        sa: u8,
    },
    Branch {
        cond: Cond,
        rs: Reg,
        rt: Operand,
        target: Label,
    },
    /// Branch and link: `ra` receives the address of the next instruction.
    Bal(Label),
    Jr(Reg),
    Push(Reg),
    Pop(Reg),
    CallStub(StubKey),
    CallRuntime {
        function: RuntimeFunction,
        argc: u8,
    },
    /// Notify the collector that `offset(object)` may now hold a pointer.
    RecordWrite {
        object: Reg,
        offset: Reg,
    },
    /// Trap. Reached only through a lowering the compiler could not handle.
    Stop(String),
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Comment(text) => write!(f, ";; {text}"),
            Instr::Li(rd, v) => write!(f, "li {rd}, {}", Operand::Imm(*v)),
            Instr::LoadConstant(rd, c) => write!(f, "li {rd}, const[{}]", c.0),
            Instr::LoadRoot(rd, root) => write!(f, "lroot {rd}, {root}"),
            Instr::LoadExternal(rd, ext) => write!(f, "li {rd}, &{ext}"),
            Instr::Move(rd, rs) => write!(f, "move {rd}, {rs}"),
            Instr::Lw(rt, mem) => write!(f, "lw {rt}, {mem}"),
            Instr::Sw(rt, mem) => write!(f, "sw {rt}, {mem}"),
            Instr::Alu { op, rd, rs, rt } => write!(f, "{op} {rd}, {rs}, {rt}"),
            Instr::Shift { op, rd, rt, sa } => write!(f, "{op} {rd}, {rt}, {sa}"),
            Instr::Branch {
                cond: Cond::Always,
                target,
                ..
            } => write!(f, "b {target}"),
            Instr::Branch {
                cond,
                rs,
                rt,
                target,
            } => write!(f, "b{cond} {rs}, {rt}, {target}"),
            Instr::Bal(target) => write!(f, "bal {target}"),
            Instr::Jr(rs) => write!(f, "jr {rs}"),
            Instr::Push(rs) => write!(f, "push {rs}"),
            Instr::Pop(rd) => write!(f, "pop {rd}"),
            Instr::CallStub(key) => write!(f, "call stub {key}"),
            Instr::CallRuntime { function, argc } => write!(f, "call runtime {function}/{argc}"),
            Instr::RecordWrite { object, offset } => write!(f, "record_write {object}, {offset}"),
            Instr::Stop(msg) => write!(f, "stop {msg:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Finished code
// ---------------------------------------------------------------------------

/// The instruction stream of one function plus everything needed to run it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Code {
    pub instructions: Vec<Instr>,
    /// Instruction index of every label, indexed by label number.
    pub labels: Vec<usize>,
    pub constants: Vec<Constant>,
}

impl Code {
    pub fn label_position(&self, label: Label) -> Option<usize> {
        self.labels.get(label.0 as usize).copied()
    }

    /// Number of non-comment instructions.
    pub fn len(&self) -> usize {
        self.instructions
            .iter()
            .filter(|i| !matches!(i, Instr::Comment(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stub keys called directly from this code, in emission order.
    pub fn stub_calls(&self) -> impl Iterator<Item = &StubKey> {
        self.instructions.iter().filter_map(|i| match i {
            Instr::CallStub(key) => Some(key),
            _ => None,
        })
    }

    /// Human-readable listing with label markers.
    pub fn disassemble(&self) -> String {
        let mut by_position: Vec<Vec<usize>> = vec![Vec::new(); self.instructions.len() + 1];
        for (label, &pos) in self.labels.iter().enumerate() {
            if pos < by_position.len() {
                by_position[pos].push(label);
            }
        }
        let mut out = String::new();
        for (pc, instr) in self.instructions.iter().enumerate() {
            for label in &by_position[pc] {
                out.push_str(&format!("L{label}:\n"));
            }
            out.push_str(&format!("{pc:5}  {instr}\n"));
        }
        for label in &by_position[self.instructions.len()] {
            out.push_str(&format!("L{label}:\n"));
        }
        if !self.constants.is_empty() {
            out.push_str("constants:\n");
            for (i, c) in self.constants.iter().enumerate() {
                out.push_str(&format!("  [{i}] {c}\n"));
            }
        }
        out
    }
}
