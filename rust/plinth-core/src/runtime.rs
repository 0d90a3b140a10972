//! Identifiers for shared stubs and runtime entry points.
//!
//! Generated code never inlines these bodies; it calls them by key. Two call
//! sites with the same shape must produce the same [`StubKey`] so that one
//! stub body serves both.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::isa::Cond;
use crate::token::{BinaryOp, UnaryOp};

/// Runtime entry points, called with their arguments on the stack.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
pub enum RuntimeFunction {
    Throw,
    ReThrow,
    NewContext,
    NewClosure,
    ToBool,
    ToNumber,
    Typeof,
    DeleteProperty,
    HasProperty,
    GetPropertyNames,
    ForInFilter,
    CreateObjectLiteral,
    CreateArrayLiteral,
    DeclareGlobal,
    ClassOf,
    StackGuard,
    Print,
    Abort,
}

impl RuntimeFunction {
    /// Number of stack arguments, or `None` for variadic entries.
    pub fn arity(self) -> Option<u8> {
        use RuntimeFunction::*;
        match self {
            Throw | ReThrow | NewContext | ToBool | ToNumber | Typeof | GetPropertyNames
            | CreateObjectLiteral | CreateArrayLiteral | ClassOf => Some(1),
            NewClosure | DeleteProperty | HasProperty | ForInFilter | DeclareGlobal => Some(2),
            StackGuard => Some(0),
            Print | Abort => None,
        }
    }

    /// Numeric id, stable for the lifetime of the enum.
    pub fn id(self) -> u16 {
        self as u16
    }
}

/// Result-reuse hint for binary operation stubs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
pub enum OverwriteMode {
    NoOverwrite,
    OverwriteLeft,
    OverwriteRight,
}

/// Stub family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, IntoStaticStr)]
pub enum MajorKey {
    GenericBinaryOp,
    GenericUnaryOp,
    Compare,
    StringAdd,
    InstanceOf,
    CallFunction,
    Construct,
    LoadIc,
    StoreIc,
    KeyedLoadIc,
    KeyedStoreIc,
    CallIc,
    StackCheck,
}

/// Largest right-hand constant a binary op stub is specialized for.
pub const MAX_KNOWN_RHS: i32 = 0x4000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StubKey {
    /// Operands in `a1` (left) and `a0` (right), result in `v0`.
    GenericBinaryOp {
        op: BinaryOp,
        mode: OverwriteMode,
        constant_rhs: Option<i32>,
    },
    /// Operand in `a0`, result in `v0`.
    GenericUnaryOp { op: UnaryOp, overwrite: bool },
    /// Operands in `a0`, `a1`; `v0` receives a value that compares against
    /// zero under `cond`.
    Compare { cond: Cond, strict: bool },
    /// Operands on the stack, both popped.
    StringAdd,
    /// Object and function on the stack, both popped; `v0` is zero on success.
    InstanceOf,
    /// Function, receiver and `argc` arguments on the stack.
    CallFunction { argc: u8 },
    Construct { argc: u8 },
    /// Name in `a2`, receiver at `sp[0]`.
    LoadIc { contextual: bool },
    /// Value in `a0`, receiver in `a1`, name in `a2`.
    StoreIc,
    /// Key at `sp[0]`, receiver at `sp[4]`.
    KeyedLoadIc,
    /// Value in `a0`, key at `sp[0]`, receiver at `sp[4]`.
    KeyedStoreIc,
    /// Name, receiver and `argc` arguments on the stack.
    CallIc { argc: u8, contextual: bool },
    StackCheck,
}

impl StubKey {
    /// Builds a binary op key, keeping the known right operand only when the
    /// stub has a specialization for it.
    pub fn generic_binary(op: BinaryOp, mode: OverwriteMode, constant_rhs: Option<i32>) -> Self {
        let constant_rhs = constant_rhs.filter(|&k| Self::specializes_on_rhs(op, k));
        StubKey::GenericBinaryOp {
            op,
            mode,
            constant_rhs,
        }
    }

    fn specializes_on_rhs(op: BinaryOp, k: i32) -> bool {
        match op {
            BinaryOp::Div => (2..=3).contains(&k),
            BinaryOp::Mod => {
                if k <= 1 {
                    false
                } else {
                    k <= 10 || (k <= MAX_KNOWN_RHS && (k as u32).is_power_of_two())
                }
            }
            _ => false,
        }
    }

    pub fn major(&self) -> MajorKey {
        match self {
            StubKey::GenericBinaryOp { .. } => MajorKey::GenericBinaryOp,
            StubKey::GenericUnaryOp { .. } => MajorKey::GenericUnaryOp,
            StubKey::Compare { .. } => MajorKey::Compare,
            StubKey::StringAdd => MajorKey::StringAdd,
            StubKey::InstanceOf => MajorKey::InstanceOf,
            StubKey::CallFunction { .. } => MajorKey::CallFunction,
            StubKey::Construct { .. } => MajorKey::Construct,
            StubKey::LoadIc { .. } => MajorKey::LoadIc,
            StubKey::StoreIc => MajorKey::StoreIc,
            StubKey::KeyedLoadIc => MajorKey::KeyedLoadIc,
            StubKey::KeyedStoreIc => MajorKey::KeyedStoreIc,
            StubKey::CallIc { .. } => MajorKey::CallIc,
            StubKey::StackCheck => MajorKey::StackCheck,
        }
    }

    /// Packed parameters distinguishing stubs of one major family.
    pub fn minor(&self) -> u32 {
        match *self {
            StubKey::GenericBinaryOp {
                op,
                mode,
                constant_rhs,
            } => {
                let known = match constant_rhs {
                    None => 0,
                    Some(k) if k <= 10 => k as u32 + 1,
                    Some(k) => 12 + (k as u32).trailing_zeros(),
                };
                (op as u32) | ((mode as u32) << 4) | (known << 6)
            }
            StubKey::GenericUnaryOp { op, overwrite } => (op as u32) | ((overwrite as u32) << 3),
            StubKey::Compare { cond, strict } => ((cond as u32) << 1) | strict as u32,
            StubKey::CallFunction { argc } | StubKey::Construct { argc } => argc as u32,
            StubKey::CallIc { argc, contextual } => ((argc as u32) << 1) | contextual as u32,
            StubKey::LoadIc { contextual } => contextual as u32,
            StubKey::StringAdd
            | StubKey::InstanceOf
            | StubKey::StoreIc
            | StubKey::KeyedLoadIc
            | StubKey::KeyedStoreIc
            | StubKey::StackCheck => 0,
        }
    }
}

impl fmt::Display for StubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StubKey::GenericBinaryOp {
                op,
                mode,
                constant_rhs,
            } => {
                let op_name: &'static str = op.into();
                write!(f, "GenericBinaryOp_{op_name}_{mode}")?;
                if let Some(k) = constant_rhs {
                    write!(f, "_ConstantRhs{k}")?;
                }
                Ok(())
            }
            StubKey::Compare { cond, strict } => {
                write!(f, "Compare_{cond}{}", if *strict { "_STRICT" } else { "" })
            }
            other => write!(f, "{}_{}", other.major(), other.minor()),
        }
    }
}
