//! Hash-consed retainer sets.
//!
//! Every set the store hands out is canonical: two sets with the same elements
//! are the same `SetId`, so equality and reuse are O(1). The store is emptied at
//! the start of every pass and nothing minted in one pass survives into the next.

use fxhash::FxHashMap;
use std::fmt::{Display, Formatter};

/// identity of the binding that an object is attributed to. only objects that
/// are retainers contribute their identity to sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Retainer(pub u32);

impl Retainer {
    /// attributed to roots that are not retainers themselves
    pub const SYSTEM: Retainer = Retainer(0);
}

impl Display for Retainer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if *self == Retainer::SYSTEM {
            f.write_str("SYSTEM")
        } else {
            write!(f, "ccs#{}", self.0)
        }
    }
}

/// handle to a canonical set. carries the pass (epoch) it was minted in, so a
/// handle left over from an earlier pass is never mistaken for a current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SetId {
    epoch: u32,
    index: u32,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RetainerSet {
    id: SetId,
    /// sorted, no duplicates
    elements: Box<[Retainer]>,
}

impl RetainerSet {
    pub fn id(&self) -> SetId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn contains(&self, r: Retainer) -> bool {
        self.elements.binary_search(&r).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = Retainer> + '_ {
        self.elements.iter().copied()
    }
}

impl Display for RetainerSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        for (i, r) in self.elements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{r}")?;
        }
        f.write_str("}")
    }
}

#[derive(Default)]
pub struct RetainerSetStore {
    epoch: u32,
    sets: Vec<RetainerSet>,
    table: FxHashMap<Box<[Retainer]>, SetId>,
}

impl RetainerSetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// drops every set and starts a new epoch
    pub fn reset(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.sets.clear();
        self.table.clear();
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn singleton(&mut self, r: Retainer) -> SetId {
        self.intern(vec![r])
    }

    /// `s ∪ {r}`; returns `s` itself when `r` is already a member
    pub fn add_element(&mut self, r: Retainer, s: SetId) -> SetId {
        let set = self.set(s);
        match set.elements.binary_search(&r) {
            Ok(_) => s,
            Err(at) => {
                let mut elements = Vec::with_capacity(set.len() + 1);
                elements.extend_from_slice(&set.elements[..at]);
                elements.push(r);
                elements.extend_from_slice(&set.elements[at..]);
                self.intern(elements)
            }
        }
    }

    pub fn is_member(&self, r: Retainer, s: SetId) -> bool {
        self.set(s).contains(r)
    }

    pub fn size(&self, s: SetId) -> usize {
        self.set(s).len()
    }

    /// looks a handle up, `None` if it belongs to an earlier pass
    pub fn get(&self, s: SetId) -> Option<&RetainerSet> {
        if s.epoch == self.epoch {
            self.sets.get(s.index as usize)
        } else {
            None
        }
    }

    pub fn is_current(&self, s: SetId) -> bool {
        s.epoch == self.epoch
    }

    /// number of distinct sets minted this pass
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RetainerSet> {
        self.sets.iter()
    }

    fn set(&self, s: SetId) -> &RetainerSet {
        debug_assert_eq!(s.epoch, self.epoch, "retainer set from an earlier pass");
        &self.sets[s.index as usize]
    }

    fn intern(&mut self, elements: Vec<Retainer>) -> SetId {
        if let Some(&id) = self.table.get(elements.as_slice()) {
            return id;
        }
        let id = SetId { epoch: self.epoch, index: self.sets.len() as u32 };
        let elements = elements.into_boxed_slice();
        self.table.insert(elements.clone(), id);
        self.sets.push(RetainerSet { id, elements });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Retainer = Retainer(1);
    const B: Retainer = Retainer(2);
    const C: Retainer = Retainer(3);

    #[test]
    fn singletons_are_shared() {
        let mut store = RetainerSetStore::new();
        let a = store.singleton(A);
        assert_eq!(store.singleton(A), a);
        assert_ne!(store.singleton(B), a);
        assert_eq!(store.size(a), 1);
        assert!(store.is_member(A, a));
        assert!(!store.is_member(B, a));
    }

    #[test]
    fn add_element_is_order_independent() {
        let mut store = RetainerSetStore::new();
        let a = store.singleton(A);
        let ab = store.add_element(B, a);
        let abc = store.add_element(C, ab);

        let c = store.singleton(C);
        let cb = store.add_element(B, c);
        let cba = store.add_element(A, cb);

        assert_eq!(abc, cba);
        assert_eq!(store.size(abc), 3);
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn adding_a_member_returns_the_same_set() {
        let mut store = RetainerSetStore::new();
        let a = store.singleton(A);
        let ab = store.add_element(B, a);
        assert_eq!(store.add_element(A, ab), ab);
        assert_eq!(store.add_element(B, ab), ab);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn reset_invalidates_old_handles() {
        let mut store = RetainerSetStore::new();
        let a = store.singleton(A);
        store.reset();
        assert!(store.get(a).is_none());
        assert!(store.is_empty());
        let again = store.singleton(A);
        assert_ne!(again, a);
        assert_eq!(store.get(again).map(|s| s.len()), Some(1));
    }

    #[test]
    fn display() {
        let mut store = RetainerSetStore::new();
        let s = store.singleton(B);
        let s = store.add_element(Retainer::SYSTEM, s);
        assert_eq!(store.get(s).unwrap().to_string(), "{SYSTEM,ccs#2}");
    }
}
