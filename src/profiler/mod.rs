//! Runs whole retainer profiling passes over a frozen heap and keeps the
//! resulting sets readable until the next pass begins.

pub mod roots;

use crate::config::ProfilerConfig;
use crate::errors::err::{ProfileErr, Site};
use crate::heap::kind::Kind;
use crate::heap::{Heap, ObjId};
use crate::profiler::roots::Roots;
use crate::retainer_set::{RetainerSet, RetainerSetStore};
use crate::traverse::stack::WorkStack;
use crate::traverse::{is_current, refresh, Traversal, VisitCounts};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassStats {
    pub pass: u32,
    pub objects_visited: u64,
    pub visit_attempts: u64,
    pub mean_visits: f64,
    pub max_stack_depth: usize,
    pub stack_chunks: usize,
    /// distinct retainer sets minted
    pub sets: usize,
}

impl Display for PassStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pass {}: {} objects visited, {} visits ({:.2} per object), {} retainer sets, stack depth {} over {} chunks",
            self.pass,
            self.objects_visited,
            self.visit_attempts,
            self.mean_visits,
            self.sets,
            self.max_stack_depth,
            self.stack_chunks
        )
    }
}

pub struct RetainerProfiler {
    config: ProfilerConfig,
    flip: bool,
    /// passes completed so far
    pass: u32,
    store: RetainerSetStore,
    counts: VisitCounts,
    max_stack_depth: usize,
    stack_chunks: usize,
}

impl RetainerProfiler {
    pub fn new(config: ProfilerConfig) -> Self {
        Self {
            config,
            flip: false,
            pass: 0,
            store: RetainerSetStore::new(),
            counts: VisitCounts::default(),
            max_stack_depth: 0,
            stack_chunks: 0,
        }
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    pub fn passes(&self) -> u32 {
        self.pass
    }

    pub fn store(&self) -> &RetainerSetStore {
        &self.store
    }

    /// flips the pass bit and drops every set of the previous pass
    pub fn begin_pass(&mut self) {
        self.flip = !self.flip;
        self.counts = VisitCounts::default();
        self.max_stack_depth = 0;
        self.stack_chunks = 0;
        self.store.reset();
    }

    /// walks from every root of `heap`. the work stack lives only as long as
    /// this call. on failure the sets minted so far are thrown away.
    pub fn retain_roots(&mut self, heap: &mut Heap) -> Result<(), ProfileErr> {
        let roots = Roots::of(heap);
        let mut stack = WorkStack::new(self.config.chunk_frames)?;

        let mut traversal = Traversal::new(heap, &mut stack, &mut self.store, self.flip);
        let result = roots.seed(&mut traversal);
        self.counts = traversal.counts;

        self.max_stack_depth = stack.max_depth();
        self.stack_chunks = stack.chunk_count();
        if let Err(e) = result {
            self.store.reset();
            return Err(e);
        }
        Ok(())
    }

    pub fn end_pass(&mut self) -> PassStats {
        self.pass += 1;
        let VisitCounts { objects_visited, visit_attempts } = self.counts;
        let mean_visits = if objects_visited == 0 { 0.0 } else { visit_attempts as f64 / objects_visited as f64 };
        let stats = PassStats {
            pass: self.pass,
            objects_visited,
            visit_attempts,
            mean_visits,
            max_stack_depth: self.max_stack_depth,
            stack_chunks: self.stack_chunks,
            sets: self.store.len(),
        };
        log::info!("{}", stats);
        stats
    }

    /// one complete pass: begin, refresh the statics, walk every root, check
    /// if configured, end
    pub fn profile(&mut self, heap: &mut Heap) -> Result<PassStats, ProfileErr> {
        self.begin_pass();
        self.reset_static_objects(heap)?;
        self.retain_roots(heap)?;
        if self.config.check_sets {
            if let Err(e) = self.check_sets(heap) {
                self.store.reset();
                return Err(e);
            }
        }
        Ok(self.end_pass())
    }

    /// the set `obj` got in the last pass, `None` if the pass never reached it
    pub fn current_retainer_set(&self, heap: &Heap, obj: ObjId) -> Result<Option<&RetainerSet>, ProfileErr> {
        let trav = heap.trav(obj)?;
        if !is_current(trav, &self.store, self.flip) {
            return Ok(None);
        }
        Ok(trav.set.and_then(|s| self.store.get(s)))
    }

    /// refreshes the traversal slots of the static objects, so that statics the
    /// coming pass does not reach read as unvisited instead of keeping stale sets
    pub fn reset_static_objects(&mut self, heap: &mut Heap) -> Result<(), ProfileErr> {
        use Kind::*;
        let statics = heap.static_objects.clone();
        for obj in statics {
            match heap.kind(obj)? {
                IndStatic => {}
                ThunkStatic | FunStatic | ConstrNoCaf
                | Constr | Constr1_0 | Constr0_1 | Constr2_0 | Constr1_1 | Constr0_2 => {
                    refresh(heap, &self.store, self.flip, obj)?
                }
                kind => return Err(ProfileErr::invalid(kind, Site::StaticReset)),
            }
        }
        Ok(())
    }

    fn check_sets(&self, heap: &Heap) -> Result<(), ProfileErr> {
        for obj in heap.ids() {
            let trav = heap.trav(obj)?;
            if !is_current(trav, &self.store, self.flip) || trav.set.is_none() {
                continue;
            }
            match self.current_retainer_set(heap, obj)? {
                Some(set) if !set.is_empty() => {}
                _ => {
                    log::error!("retainer set check failed for {:?}", obj);
                    return Err(ProfileErr::EmptyRetainerSet(obj));
                }
            }
        }
        Ok(())
    }
}

impl Default for RetainerProfiler {
    fn default() -> Self {
        Self::new(ProfilerConfig::default())
    }
}
