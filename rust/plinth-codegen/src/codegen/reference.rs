//! Assignable locations.
//!
//! A reference is loaded in two steps: [`CodeGenerator::load_reference`]
//! pushes whatever the location needs (nothing for a slot, the receiver for
//! a named property, receiver and key for a keyed one), and a later get or
//! set consumes it. A get may keep the operands for a following set, as a
//! compound assignment does.

use plinth_core::ast::{Expr, PropertyKey, VarLocation};
use plinth_core::isa::Reg;
use plinth_core::layout::context;
use plinth_core::runtime::StubKey;

use super::{context_operand, CodeGenerator};
use crate::error::{CodegenError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceKind {
    Slot(VarLocation),
    Named { name: String, contextual: bool },
    Keyed,
    /// Cannot be compiled; loads and stores trap.
    Illegal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefState {
    Unloaded,
    Loaded,
    Illegal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub state: RefState,
    /// Keep the operands on the frame after a get.
    pub persist_after_get: bool,
}

impl Reference {
    /// Frame elements occupied by the loaded operands.
    pub fn size(&self) -> usize {
        match self.kind {
            ReferenceKind::Slot(_) | ReferenceKind::Illegal => 0,
            ReferenceKind::Named { .. } => 1,
            ReferenceKind::Keyed => 2,
        }
    }

    pub fn is_illegal(&self) -> bool {
        self.state == RefState::Illegal
    }
}

impl<'t, 'c> CodeGenerator<'t, 'c> {
    /// Pushes the global object.
    pub(crate) fn load_global(&mut self) -> Result<()> {
        self.masm
            .lw(Reg::T0, context_operand(Reg::Cp, context::GLOBAL_INDEX));
        self.emit_push(Reg::T0)
    }

    pub(crate) fn load_reference(
        &mut self,
        target: &'t Expr,
        persist_after_get: bool,
    ) -> Result<Reference> {
        let kind = match target {
            Expr::Property { object, key } => {
                self.load(object)?;
                match key {
                    PropertyKey::Named(name) => ReferenceKind::Named {
                        name: name.clone(),
                        contextual: false,
                    },
                    PropertyKey::Keyed(key) => {
                        self.load(key)?;
                        ReferenceKind::Keyed
                    }
                }
            }
            Expr::Var(var) => match var.location {
                VarLocation::Global => {
                    self.load_global()?;
                    ReferenceKind::Named {
                        name: var.name.clone(),
                        contextual: true,
                    }
                }
                VarLocation::Lookup => ReferenceKind::Illegal,
                location => ReferenceKind::Slot(location),
            },
            _ => {
                // Not assignable; still evaluate it for its side effects.
                self.load(target)?;
                self.drop(1)?;
                ReferenceKind::Illegal
            }
        };
        let state = if kind == ReferenceKind::Illegal {
            RefState::Illegal
        } else {
            RefState::Loaded
        };
        Ok(Reference {
            kind,
            state,
            persist_after_get,
        })
    }

    /// Pushes the referenced value. Unless the reference persists, its
    /// operands are released and only the value remains.
    pub(crate) fn get_value(&mut self, reference: &mut Reference) -> Result<()> {
        if reference.state == RefState::Unloaded {
            return Err(CodegenError::Unsupported("load through a released reference".into()));
        }
        match &reference.kind {
            ReferenceKind::Illegal => {
                self.unsupported("load from an invalid reference")?;
                return self.push_smi(0);
            }
            ReferenceKind::Slot(location) => {
                let location = *location;
                self.load_from_slot(location)?;
            }
            ReferenceKind::Named { name, contextual } => {
                let contextual = *contextual;
                let name = name.clone();
                self.masm.comment(format!("[ load named {name}"));
                self.load_string(Reg::A2, &name);
                self.call_stub(StubKey::LoadIc { contextual }, 0)?;
                self.emit_push(Reg::V0)?;
            }
            ReferenceKind::Keyed => {
                self.masm.comment("[ load keyed");
                self.call_stub(StubKey::KeyedLoadIc, 0)?;
                self.emit_push(Reg::V0)?;
            }
        }
        if !reference.persist_after_get {
            self.unload_reference(reference)?;
        }
        Ok(())
    }

    /// Stores the top element through the reference, consuming the
    /// operands and leaving the stored value on the frame.
    pub(crate) fn set_value(&mut self, reference: &mut Reference) -> Result<()> {
        if reference.state == RefState::Unloaded {
            return Err(CodegenError::Unsupported("store through a released reference".into()));
        }
        match &reference.kind {
            ReferenceKind::Illegal => return self.unsupported("store to an invalid reference"),
            ReferenceKind::Slot(location) => {
                let location = *location;
                self.store_to_slot(location)?;
            }
            ReferenceKind::Named { name, .. } => {
                let name = name.clone();
                self.masm.comment(format!("[ store named {name}"));
                self.emit_pop(Reg::A0)?;
                self.emit_pop(Reg::A1)?;
                self.load_string(Reg::A2, &name);
                self.call_stub(StubKey::StoreIc, 0)?;
                self.emit_push(Reg::V0)?;
            }
            ReferenceKind::Keyed => {
                self.masm.comment("[ store keyed");
                self.emit_pop(Reg::A0)?;
                self.call_stub(StubKey::KeyedStoreIc, 0)?;
                self.drop(2)?;
                self.emit_push(Reg::V0)?;
            }
        }
        reference.state = RefState::Unloaded;
        Ok(())
    }

    /// Drops the operands below the value on top of the frame.
    pub(crate) fn unload_reference(&mut self, reference: &mut Reference) -> Result<()> {
        let size = reference.size();
        if reference.state == RefState::Loaded && size > 0 {
            self.emit_pop(Reg::A0)?;
            self.drop(size)?;
            self.emit_push(Reg::A0)?;
        }
        reference.state = RefState::Unloaded;
        Ok(())
    }
}
