use crate::errors::err::ProfileErr;
use crate::heap::{Heap, ObjId};
use crate::traverse::Traversal;

/// snapshot of the runtime's root tables, taken before the traversal borrows the heap
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Roots {
    /// threads, per capability
    pub contexts: Vec<ObjId>,
    /// weak pointers that survived the collection, per generation
    pub weaks: Vec<ObjId>,
    /// occupied stable pointer slots
    pub stable: Vec<ObjId>,
    /// mutable lists of every capability and generation
    pub mutated: Vec<ObjId>,
}

impl Roots {
    pub fn of(heap: &Heap) -> Self {
        let contexts = heap.capabilities.iter().flat_map(|cap| cap.threads.iter().copied()).collect();
        let weaks = heap.generations.iter().flat_map(|gen| gen.weak_ptrs.iter().copied()).collect();
        let stable = heap.stable_ptrs.iter().flatten().copied().collect();
        let mutated = heap
            .capabilities
            .iter()
            .flat_map(|cap| cap.mut_lists.iter().flatten().copied())
            .collect();
        Self { contexts, weaks, stable, mutated }
    }

    /// number of roots walked from; mutable list entries are not walked from
    pub fn len(&self) -> usize {
        self.contexts.len() + self.weaks.len() + self.stable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// walks from every root, each in a sub-walk of its own, then refreshes
    /// the mutable list entries. those can be recorded by the write barrier
    /// without being reachable from anything above.
    pub fn seed(&self, traversal: &mut Traversal) -> Result<(), ProfileErr> {
        for &tso in &self.contexts {
            traversal.retain_root(tso)?;
        }
        for &weak in &self.weaks {
            traversal.retain_root(weak)?;
        }
        for &pinned in &self.stable {
            traversal.retain_root(pinned)?;
        }
        log::debug!("walked from {} roots", self.len());

        for &obj in &self.mutated {
            traversal.maybe_init(obj)?;
        }
        Ok(())
    }
}
