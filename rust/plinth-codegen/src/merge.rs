//! Control-flow merge points.
//!
//! A merge point owns a label plus the frame every edge into it must agree
//! on. Edges are recorded before or after binding; the first edge (or the
//! frame at binding, for a loop header) fixes the contract and every later
//! edge is checked against it. Frames are always spilled at an edge, so
//! agreement reduces to agreeing on height.
//!
//! An optional expected height lets an edge leave from a deeper frame, as a
//! `break` out of a `for-in` does: the surplus is dropped at the edge origin.

use plinth_core::isa::{Cond, Label, Operand, Reg};

use crate::error::{CodegenError, Result};
use crate::frame::VirtualFrame;
use crate::masm::Assembler;

/// Index of a merge point in its function's arena.
pub type TargetId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ForwardOnly,
    /// May be reached by edges emitted after it is bound.
    Bidirectional,
}

#[derive(Debug)]
struct JumpTarget {
    direction: Direction,
    label: Label,
    entry: Option<VirtualFrame>,
    linked: bool,
    bound: bool,
    expected_height: Option<usize>,
}

/// Arena of the merge points of one function.
#[derive(Debug, Default)]
pub struct Targets {
    targets: Vec<JumpTarget>,
}

impl Targets {
    pub fn new_target(&mut self, masm: &mut Assembler, direction: Direction) -> TargetId {
        self.targets.push(JumpTarget {
            direction,
            label: masm.new_label(),
            entry: None,
            linked: false,
            bound: false,
            expected_height: None,
        });
        self.targets.len() - 1
    }

    pub fn set_expected_height(&mut self, id: TargetId, height: usize) {
        self.targets[id].expected_height = Some(height);
    }

    pub fn expected_height(&self, id: TargetId) -> Option<usize> {
        self.targets[id].expected_height
    }

    /// Has edges waiting for the point to be bound.
    pub fn is_linked(&self, id: TargetId) -> bool {
        self.targets[id].linked
    }

    pub fn is_bound(&self, id: TargetId) -> bool {
        self.targets[id].bound
    }

    pub fn direction(&self, id: TargetId) -> Direction {
        self.targets[id].direction
    }

    pub fn label(&self, id: TargetId) -> Label {
        self.targets[id].label
    }

    pub fn entry_height(&self, id: TargetId) -> Option<usize> {
        self.targets[id].entry.as_ref().map(VirtualFrame::height)
    }

    fn record_edge(&mut self, id: TargetId, frame: &VirtualFrame) -> Result<()> {
        let target = &mut self.targets[id];
        if target.bound && target.direction == Direction::ForwardOnly {
            return Err(CodegenError::BackwardJump(id));
        }
        match &target.entry {
            Some(entry) if entry.height() != frame.height() => {
                return Err(CodegenError::MergeMismatch {
                    target: id,
                    expected: entry.height(),
                    found: frame.height(),
                })
            }
            Some(_) => {}
            None => target.entry = Some(frame.clone()),
        }
        if !target.bound {
            target.linked = true;
        }
        Ok(())
    }

    fn surplus(&self, id: TargetId, frame: &VirtualFrame) -> usize {
        match self.targets[id].expected_height {
            Some(expected) if frame.height() > expected => frame.height() - expected,
            _ => 0,
        }
    }

    /// Unconditional edge. The current position becomes unreachable.
    pub fn jump(
        &mut self,
        id: TargetId,
        masm: &mut Assembler,
        frame: &mut Option<VirtualFrame>,
    ) -> Result<()> {
        let mut f = frame.take().ok_or(CodegenError::NoFrame)?;
        f.spill_all(masm);
        let surplus = self.surplus(id, &f);
        f.drop(masm, surplus)?;
        self.record_edge(id, &f)?;
        masm.b(self.targets[id].label);
        Ok(())
    }

    /// Conditional edge taken when `rs cond rt` holds; falls through with
    /// the frame unchanged otherwise.
    pub fn branch(
        &mut self,
        id: TargetId,
        cond: Cond,
        rs: Reg,
        rt: Operand,
        masm: &mut Assembler,
        frame: &mut Option<VirtualFrame>,
    ) -> Result<()> {
        let f = frame.as_mut().ok_or(CodegenError::NoFrame)?;
        f.spill_all(masm);
        let surplus = self.surplus(id, f);
        let label = self.targets[id].label;
        if surplus == 0 {
            self.record_edge(id, f)?;
            masm.branch(cond, rs, rt, label);
            return Ok(());
        }
        let skip = masm.new_label();
        masm.branch(cond.negate(), rs, rt, skip);
        let mut edge = f.clone();
        edge.drop(masm, surplus)?;
        self.record_edge(id, &edge)?;
        masm.b(label);
        masm.bind(skip)
    }

    /// Branch-and-link edge: `ra` receives the address after the call and
    /// the current position stays reachable.
    pub fn call(
        &mut self,
        id: TargetId,
        masm: &mut Assembler,
        frame: &mut Option<VirtualFrame>,
    ) -> Result<()> {
        let f = frame.as_mut().ok_or(CodegenError::NoFrame)?;
        f.spill_all(masm);
        self.record_edge(id, f)?;
        masm.bal(self.targets[id].label);
        Ok(())
    }

    /// Binds the point at the current position. A live fall-through frame
    /// counts as one more edge; with no live frame the position becomes
    /// reachable exactly when some edge was recorded.
    pub fn bind(
        &mut self,
        id: TargetId,
        masm: &mut Assembler,
        frame: &mut Option<VirtualFrame>,
    ) -> Result<()> {
        if self.targets[id].bound {
            return Err(CodegenError::DoubleBind(id));
        }
        match frame.as_mut() {
            Some(f) => {
                f.spill_all(masm);
                let surplus = self.surplus(id, f);
                f.drop(masm, surplus)?;
                self.record_edge(id, f)?;
            }
            None => *frame = self.targets[id].entry.clone(),
        }
        let target = &mut self.targets[id];
        target.bound = true;
        target.linked = false;
        masm.bind(target.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Imm;
    use plinth_core::isa::Root;

    fn setup() -> (Assembler, Targets, Option<VirtualFrame>) {
        (
            Assembler::new(false),
            Targets::default(),
            Some(VirtualFrame::new(0, 0)),
        )
    }

    #[test]
    fn forward_edge_makes_bound_point_reachable() {
        let (mut masm, mut targets, mut frame) = setup();
        let exit = targets.new_target(&mut masm, Direction::ForwardOnly);
        frame.as_mut().unwrap().emit_push(&mut masm, Reg::V0);
        targets.jump(exit, &mut masm, &mut frame).unwrap();
        assert!(frame.is_none());
        assert!(targets.is_linked(exit));
        targets.bind(exit, &mut masm, &mut frame).unwrap();
        assert_eq!(frame.as_ref().map(VirtualFrame::height), Some(1));
        assert!(!targets.is_linked(exit));
    }

    #[test]
    fn unused_point_stays_unreachable() {
        let (mut masm, mut targets, _) = setup();
        let exit = targets.new_target(&mut masm, Direction::ForwardOnly);
        let mut frame = None;
        targets.bind(exit, &mut masm, &mut frame).unwrap();
        assert!(frame.is_none());
    }

    #[test]
    fn edges_with_different_heights_are_rejected() {
        let (mut masm, mut targets, mut frame) = setup();
        let exit = targets.new_target(&mut masm, Direction::ForwardOnly);
        targets
            .branch(exit, Cond::Eq, Reg::V0, Operand::Imm(0), &mut masm, &mut frame)
            .unwrap();
        frame.as_mut().unwrap().emit_push(&mut masm, Reg::V0);
        let err = targets.jump(exit, &mut masm, &mut frame).unwrap_err();
        assert_eq!(
            err,
            CodegenError::MergeMismatch {
                target: exit,
                expected: 0,
                found: 1
            }
        );
    }

    #[test]
    fn expected_height_drops_surplus_at_origin() {
        let (mut masm, mut targets, mut frame) = setup();
        let brk = targets.new_target(&mut masm, Direction::ForwardOnly);
        targets.set_expected_height(brk, 0);
        {
            let f = frame.as_mut().unwrap();
            f.emit_push(&mut masm, Reg::V0);
            f.emit_push(&mut masm, Reg::V0);
        }
        targets
            .branch(brk, Cond::Ne, Reg::V0, Operand::Imm(0), &mut masm, &mut frame)
            .unwrap();
        assert_eq!(frame.as_ref().map(VirtualFrame::height), Some(2));
        targets.jump(brk, &mut masm, &mut frame).unwrap();
        targets.bind(brk, &mut masm, &mut frame).unwrap();
        assert_eq!(frame.as_ref().map(VirtualFrame::height), Some(0));
        masm.finish().expect("all labels bound");
    }

    #[test]
    fn loop_header_accepts_back_edge_at_bound_height() {
        let (mut masm, mut targets, mut frame) = setup();
        let header = targets.new_target(&mut masm, Direction::Bidirectional);
        targets.bind(header, &mut masm, &mut frame).unwrap();
        frame.as_mut().unwrap().push_constant(Imm::Root(Root::True));
        frame.as_mut().unwrap().drop(&mut masm, 1).unwrap();
        targets.jump(header, &mut masm, &mut frame).unwrap();
        assert!(targets.is_bound(header));
    }

    #[test]
    fn forward_only_point_rejects_backward_edge() {
        let (mut masm, mut targets, mut frame) = setup();
        let exit = targets.new_target(&mut masm, Direction::ForwardOnly);
        targets.bind(exit, &mut masm, &mut frame).unwrap();
        assert_eq!(
            targets.jump(exit, &mut masm, &mut frame).unwrap_err(),
            CodegenError::BackwardJump(exit)
        );
    }

    #[test]
    fn edges_spill_pending_constants() {
        let (mut masm, mut targets, mut frame) = setup();
        let exit = targets.new_target(&mut masm, Direction::ForwardOnly);
        frame.as_mut().unwrap().push_constant(Imm::Root(Root::Null));
        targets
            .branch(exit, Cond::Eq, Reg::V0, Operand::Imm(0), &mut masm, &mut frame)
            .unwrap();
        assert!(frame.as_ref().unwrap().is_spilled());
    }
}
