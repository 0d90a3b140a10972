//! Interception of non-local jumps out of protected regions.
//!
//! While a try block is compiled, every jump to an enclosing break,
//! continue or return target lands on a substitute target instead, so the
//! handler record can be unlinked before control leaves. Regions nest: a
//! jump resolves through the innermost scope that intercepts its target,
//! and the unlink code of that scope later jumps to the original target,
//! which then resolves through the next scope out.

use crate::merge::TargetId;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShadowScope {
    entries: Vec<(TargetId, TargetId)>,
}

impl ShadowScope {
    pub fn intercept(&mut self, original: TargetId, shadow: TargetId) {
        self.entries.push((original, shadow));
    }

    pub fn lookup(&self, original: TargetId) -> Option<TargetId> {
        self.entries
            .iter()
            .find(|(o, _)| *o == original)
            .map(|(_, s)| *s)
    }

    /// `(original, shadow)` pairs in interception order.
    pub fn entries(&self) -> &[(TargetId, TargetId)] {
        &self.entries
    }
}

#[derive(Debug, Default)]
pub struct ShadowStack {
    scopes: Vec<ShadowScope>,
}

impl ShadowStack {
    pub fn push(&mut self, scope: ShadowScope) {
        self.scopes.push(scope);
    }

    pub fn pop(&mut self) -> Option<ShadowScope> {
        self.scopes.pop()
    }

    /// The target a jump to `target` must actually use.
    pub fn resolve(&self, target: TargetId) -> TargetId {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.lookup(target))
            .unwrap_or(target)
    }

    pub fn is_shadowed(&self, target: TargetId) -> bool {
        self.resolve(target) != target
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn innermost_scope_wins_and_popping_exposes_the_next() {
        let mut stack = ShadowStack::default();
        let mut outer = ShadowScope::default();
        outer.intercept(1, 10);
        stack.push(outer);
        let mut inner = ShadowScope::default();
        inner.intercept(1, 20);
        stack.push(inner);

        assert_eq!(stack.resolve(1), 20);
        stack.pop();
        assert_eq!(stack.resolve(1), 10);
        stack.pop();
        assert_eq!(stack.resolve(1), 1);
    }

    #[test]
    fn unrelated_targets_pass_through() {
        let mut stack = ShadowStack::default();
        let mut scope = ShadowScope::default();
        scope.intercept(3, 4);
        stack.push(scope);
        assert!(!stack.is_shadowed(5));
        assert!(stack.is_shadowed(3));
    }
}
