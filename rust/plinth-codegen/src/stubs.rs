//! Shared stub registry.
//!
//! Every call site names its stub by [`StubKey`]. The cache records which
//! bodies a module needs, one per distinct key, in order of first use.

use std::collections::HashMap;

use plinth_core::isa::Code;
use plinth_core::runtime::{MajorKey, StubKey};

#[derive(Debug, Default)]
pub struct StubCache {
    index: HashMap<StubKey, usize>,
    keys: Vec<StubKey>,
    uses: Vec<usize>,
}

impl StubCache {
    /// Records a use of `key`, returning its slot.
    pub fn intern(&mut self, key: StubKey) -> usize {
        if let Some(&slot) = self.index.get(&key) {
            self.uses[slot] += 1;
            return slot;
        }
        let slot = self.keys.len();
        self.index.insert(key, slot);
        self.keys.push(key);
        self.uses.push(1);
        slot
    }

    /// Records every stub call site of `code`.
    pub fn record(&mut self, code: &Code) {
        for key in code.stub_calls() {
            self.intern(*key);
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn uses(&self, key: &StubKey) -> usize {
        self.index.get(key).map_or(0, |&slot| self.uses[slot])
    }

    /// Distinct keys of one family.
    pub fn count_major(&self, major: MajorKey) -> usize {
        self.keys.iter().filter(|k| k.major() == major).count()
    }

    pub fn into_keys(self) -> Vec<StubKey> {
        self.keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_core::runtime::OverwriteMode;
    use plinth_core::token::BinaryOp;

    #[test]
    fn equal_keys_share_one_slot() {
        let mut cache = StubCache::default();
        let add = StubKey::generic_binary(BinaryOp::Add, OverwriteMode::NoOverwrite, None);
        let a = cache.intern(add);
        let b = cache.intern(StubKey::StackCheck);
        let c = cache.intern(add);
        assert_eq!((a, b, c), (0, 1, 0));
        assert_eq!(cache.uses(&add), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn keys_keep_first_use_order() {
        let mut cache = StubCache::default();
        cache.intern(StubKey::KeyedLoadIc);
        cache.intern(StubKey::LoadIc { contextual: true });
        cache.intern(StubKey::KeyedLoadIc);
        assert_eq!(
            cache.into_keys(),
            vec![StubKey::KeyedLoadIc, StubKey::LoadIc { contextual: true }]
        );
    }

    #[test]
    fn families_are_counted_by_major_key() {
        let mut cache = StubCache::default();
        cache.intern(StubKey::CallFunction { argc: 0 });
        cache.intern(StubKey::CallFunction { argc: 2 });
        cache.intern(StubKey::StoreIc);
        assert_eq!(cache.count_major(MajorKey::CallFunction), 2);
        assert_eq!(cache.count_major(MajorKey::StoreIc), 1);
    }
}
