//! Depth-first retainer traversal over the frozen heap.
//!
//! The walk never recurses natively: pending work lives on a `WorkStack` of
//! resumable frames, and an object with a single child is followed in place
//! without touching the stack at all.

pub(crate) mod scan;
pub mod stack;

use crate::errors::err::{ProfileErr, Site};
use crate::heap::kind::Kind;
use crate::heap::{Heap, ObjId, Payload, TravData};
use crate::retainer_set::{Retainer, RetainerSetStore, SetId};
use crate::traverse::scan::Scanner;
use crate::traverse::stack::{Frame, Position, WorkStack};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VisitCounts {
    /// objects that got a retainer set for the first time this pass
    pub objects_visited: u64,
    /// every visit, including the ones cut short because nothing changed
    pub visit_attempts: u64,
}

/// whether `trav` was written in the pass running under `flip`. a set handle
/// minted by an earlier store epoch is stale even when the bit matches, which
/// happens for objects that sat out exactly two passes.
pub(crate) fn is_current(trav: TravData, store: &RetainerSetStore, flip: bool) -> bool {
    trav.flip == flip && trav.set.map_or(true, |s| store.is_current(s))
}

/// clears the traversal slot of `obj` if it was last written in an earlier pass
pub(crate) fn refresh(heap: &mut Heap, store: &RetainerSetStore, flip: bool, obj: ObjId) -> Result<(), ProfileErr> {
    let trav = heap.trav(obj)?;
    if !is_current(trav, store, flip) {
        *heap.trav_mut(obj)? = TravData { flip, set: None };
    }
    Ok(())
}

/// outcome of stepping a resumable frame
enum Next {
    Child { child: ObjId, last: bool },
    Exhausted,
}

pub struct Traversal<'a> {
    heap: &'a mut Heap,
    stack: &'a mut WorkStack,
    store: &'a mut RetainerSetStore,
    flip: bool,
    pub counts: VisitCounts,
}

impl<'a> Traversal<'a> {
    pub fn new(heap: &'a mut Heap, stack: &'a mut WorkStack, store: &'a mut RetainerSetStore, flip: bool) -> Self {
        Self { heap, stack, store, flip, counts: VisitCounts::default() }
    }

    /// the set `obj` got this pass, if any
    pub fn set_of(&self, obj: ObjId) -> Result<Option<SetId>, ProfileErr> {
        let trav = self.heap.trav(obj)?;
        Ok(if is_current(trav, self.store, self.flip) { trav.set } else { None })
    }

    pub fn maybe_init(&mut self, obj: ObjId) -> Result<(), ProfileErr> {
        refresh(self.heap, self.store, self.flip, obj)
    }

    fn associate(&mut self, obj: ObjId, set: SetId) -> Result<(), ProfileErr> {
        *self.heap.trav_mut(obj)? = TravData { flip: self.flip, set: Some(set) };
        Ok(())
    }

    /// computes the retainer set of everything reachable from `root`
    pub fn retain_root(&mut self, root: ObjId) -> Result<(), ProfileErr> {
        debug_assert!(self.stack.is_empty());
        let saved = self.stack.set_boundary();

        self.maybe_init(root)?;
        let obj = self.heap.get(root)?;
        let retainer = if obj.kind()?.is_retainer()? { obj.retainer() } else { Retainer::SYSTEM };
        log::debug!("retaining root {:?} as {}", root, retainer);
        self.stack.push(Frame::fresh(root, root, retainer))?;
        self.walk()?;

        self.stack.restore_boundary(saved);
        Ok(())
    }

    fn walk(&mut self) -> Result<(), ProfileErr> {
        'pop: while let Some((mut c, mut cp, mut r)) = self.next()? {
            loop {
                let kind = self.heap.kind(c)?;
                match kind {
                    Kind::Tso if self.heap.get(c)?.tso()?.is_finished() => {
                        log::trace!("skipping finished thread {:?}", c);
                        continue 'pop;
                    }
                    Kind::IndStatic => {
                        c = self.heap.get(c)?.ptr(0)?;
                        continue;
                    }
                    // static data with nothing dynamic behind it. visiting these would
                    // make them show up in one census and vanish from the next.
                    Kind::ConstrNoCaf => continue 'pop,
                    Kind::ThunkStatic | Kind::FunStatic => {
                        let fields = self.heap.get(c)?.fields()?;
                        if fields.srt.is_none() && (kind == Kind::ThunkStatic || fields.ptrs.is_empty()) {
                            continue 'pop;
                        }
                    }
                    _ => {}
                }

                self.maybe_init(c)?;
                let Some(child_r) = self.visit(c, cp, r)? else {
                    continue 'pop;
                };

                if self.push_eager(c, kind, child_r)? {
                    continue 'pop;
                }
                match self.push_children(c, kind, child_r)? {
                    Some(first) => {
                        cp = c;
                        c = first;
                        r = child_r;
                    }
                    None => continue 'pop,
                }
            }
        }
        Ok(())
    }

    /// updates the set of `c`, reached from `cp` while carrying retainer `r`.
    /// returns the retainer to hand down to the children of `c`, or `None` when
    /// they need not be looked at again.
    fn visit(&mut self, c: ObjId, cp: ObjId, r: Retainer) -> Result<Option<Retainer>, ProfileErr> {
        let current = self.set_of(c)?;
        self.counts.visit_attempts += 1;

        // a retainer parent has already replaced whatever set it inherited
        let s = if self.heap.kind(cp)?.is_retainer()? { None } else { self.set_of(cp)? };

        let obj = self.heap.get(c)?;
        let is_retainer = obj.kind()?.is_retainer()?;
        let own = obj.retainer();

        let Some(current) = current else {
            self.counts.objects_visited += 1;
            let set = match s {
                Some(s) => s,
                None => self.store.singleton(r),
            };
            self.associate(c, set)?;
            log::trace!("first visit to {:?} from {:?} via {}", c, cp, r);
            return Ok(Some(if is_retainer { own } else { r }));
        };

        if self.store.is_member(r, current) {
            return Ok(None);
        }

        // cp is not a retainer, so every visit to cp has been followed by one to c.
        // if cp's set is exactly one larger, it is the set c is about to get.
        let set = match s {
            Some(s) if self.store.size(s) == self.store.size(current) + 1 => s,
            _ => self.store.add_element(r, current),
        };
        self.associate(c, set)?;
        log::trace!("revisit of {:?} from {:?} adds {}", c, cp, r);

        Ok(if is_retainer { None } else { Some(r) })
    }

    /// pushes all children of the kinds whose position cannot be resumed
    /// cheaply. returns false for every other kind.
    fn push_eager(&mut self, c: ObjId, kind: Kind, r: Retainer) -> Result<bool, ProfileErr> {
        let heap = &*self.heap;
        let obj = heap.get(c)?;
        let mut scan = Scanner { heap, stack: &mut *self.stack, parent: c, retainer: r };

        match (kind, &obj.payload) {
            (Kind::Stack, Payload::Stack(frames)) => scan.frames(frames)?,
            (Kind::Tso, Payload::Tso(tso)) => {
                scan.push_opt(tso.stack)?;
                scan.push_opt(tso.blocked_exceptions)?;
                scan.push_opt(tso.bq)?;
                scan.push_opt(tso.trec)?;
                if tso.why_blocked.has_closure() {
                    scan.push_opt(tso.block_info)?;
                }
            }
            (Kind::BlockingQueue, Payload::BlockingQueue { link, bh, owner }) => {
                scan.push_opt(*link)?;
                scan.push_opt(*bh)?;
                scan.push_opt(*owner)?;
            }
            (Kind::Pap | Kind::Ap, Payload::Pap { fun, args }) => scan.pap(*fun, args)?,
            (Kind::ApStack, Payload::ApStack { fun, frames }) => {
                scan.push(*fun)?;
                scan.frames(frames)?;
            }
            (Kind::Stack | Kind::Tso | Kind::BlockingQueue | Kind::Pap | Kind::Ap | Kind::ApStack, _) => {
                return Err(obj.bad_payload())
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// returns the first child of `c` and, if there are more, pushes a frame to
    /// resume from. the frame may be pushed even when there is no first child,
    /// in which case the next pop picks up from it.
    fn push_children(&mut self, c: ObjId, kind: Kind, r: Retainer) -> Result<Option<ObjId>, ProfileErr> {
        use Kind::*;
        let obj = self.heap.get(c)?;

        let (first, pos) = match kind {
            Constr0_1 | Constr0_2 | ArrWords | CompactNfData => return Ok(None),

            MutVarClean | MutVarDirty | ThunkSelector | Blackhole | Constr1_0 | Constr1_1 => {
                return Ok(Some(obj.ptr(0)?))
            }

            Constr2_0 | MVarClean | MVarDirty | Weak => (Some(obj.ptr(0)?), Position::Step(1)),

            TVar | Constr | ConstrNoCaf | Prim | MutPrim | Bco
            | MutArrPtrsClean | MutArrPtrsDirty | MutArrPtrsFrozenClean | MutArrPtrsFrozenDirty
            | SmallMutArrPtrsClean | SmallMutArrPtrsDirty
            | SmallMutArrPtrsFrozenClean | SmallMutArrPtrsFrozenDirty => {
                let ptrs = &obj.fields()?.ptrs;
                match ptrs.len() {
                    0 => return Ok(None),
                    1 => return Ok(Some(ptrs[0])),
                    count => (Some(ptrs[0]), Position::Ptrs { next: 1, count: count as u32 }),
                }
            }

            FunStatic | Fun | Fun2_0 | Thunk | Thunk2_0 => {
                let fields = obj.fields()?;
                match (fields.ptrs.len(), fields.srt) {
                    (0, srt) => return Ok(srt),
                    (1, None) => return Ok(Some(fields.ptrs[0])),
                    (1, srt) => (Some(fields.ptrs[0]), Position::Srt(srt)),
                    (count, _) => (Some(fields.ptrs[0]), Position::Ptrs { next: 1, count: count as u32 }),
                }
            }

            Fun1_0 | Fun1_1 | Thunk1_0 | Thunk1_1 => {
                let fields = obj.fields()?;
                let first = obj.ptr(0)?;
                match fields.srt {
                    None => return Ok(Some(first)),
                    srt => (Some(first), Position::Srt(srt)),
                }
            }

            Fun0_1 | Fun0_2 | ThunkStatic | Thunk0_1 | Thunk0_2 => return Ok(obj.fields()?.srt),

            TRecChunk => match &obj.payload {
                Payload::TRecChunk { prev, .. } => (*prev, Position::Step(0)),
                _ => return Err(obj.bad_payload()),
            },

            Pap | Ap | ApStack | Tso | Stack | BlockingQueue | IndStatic | Ind | Whitehole | InvalidObject
            | UpdateFrame | CatchFrame | CatchRetryFrame | CatchStmFrame | UnderflowFrame | AtomicallyFrame
            | StopFrame | RetBco | RetSmall | RetBig | RetFun => {
                return Err(ProfileErr::invalid(kind, Site::PushChildren))
            }
        };

        debug_assert!(!matches!(pos, Position::Fresh { .. }));
        self.stack.push(Frame { obj: c, retainer: r, pos })?;
        Ok(first)
    }

    /// the next (object, parent, retainer) to visit. a fresh frame on top is
    /// handed out as is; otherwise the top frame is advanced to its next child,
    /// popping frames that have none left. `None` once the current sub-walk has
    /// no frames left.
    fn next(&mut self) -> Result<Option<(ObjId, ObjId, Retainer)>, ProfileErr> {
        loop {
            if self.stack.is_on_boundary() {
                return Ok(None);
            }
            let Some(top) = self.stack.top_mut() else {
                return Ok(None);
            };
            let (obj, retainer) = (top.obj, top.retainer);

            if let Position::Fresh { parent } = top.pos {
                self.stack.pop();
                return Ok(Some((obj, parent, retainer)));
            }

            match advance(&*self.heap, top)? {
                Next::Child { child, last } => {
                    if last {
                        self.stack.pop();
                    }
                    return Ok(Some((child, obj, retainer)));
                }
                Next::Exhausted => {
                    self.stack.pop();
                }
            }
        }
    }
}

/// moves a resumable frame on to the next child of its object. the first child
/// was already handed out by `push_children`, so every cursor starts at the second.
fn advance(heap: &Heap, frame: &mut Frame) -> Result<Next, ProfileErr> {
    use Kind::*;
    let obj = heap.get(frame.obj)?;
    let kind = obj.kind()?;

    let next = match (kind, &mut frame.pos) {
        (Constr2_0, Position::Step(_)) => Next::Child { child: obj.ptr(1)?, last: true },

        (MVarClean | MVarDirty | Weak, Position::Step(step)) => {
            let child = obj.ptr(*step as usize)?;
            *step += 1;
            Next::Child { child, last: *step == 3 }
        }

        // n entries of three fields each
        (TRecChunk, Position::Step(step)) => {
            let Payload::TRecChunk { entries, .. } = &obj.payload else {
                return Err(obj.bad_payload());
            };
            let (entry, field) = (*step as usize / 3, *step % 3);
            match entries.get(entry) {
                None => Next::Exhausted,
                Some(entry) => {
                    *step += 1;
                    let child = match field {
                        0 => entry.tvar,
                        1 => entry.expected,
                        _ => entry.new_value,
                    };
                    Next::Child { child, last: false }
                }
            }
        }

        (
            TVar | Constr | ConstrNoCaf | Prim | MutPrim | Bco
            | MutArrPtrsClean | MutArrPtrsDirty | MutArrPtrsFrozenClean | MutArrPtrsFrozenDirty
            | SmallMutArrPtrsClean | SmallMutArrPtrsDirty
            | SmallMutArrPtrsFrozenClean | SmallMutArrPtrsFrozenDirty,
            Position::Ptrs { next, count },
        ) => match obj.fields()?.ptrs.get(*next as usize) {
            Some(&child) => {
                *next += 1;
                Next::Child { child, last: *next >= *count }
            }
            None => Next::Exhausted,
        },

        (FunStatic | Fun | Fun2_0 | Thunk | Thunk2_0, Position::Ptrs { next, count }) => {
            let fields = obj.fields()?;
            let child = fields.ptrs.get(*next as usize).copied();
            *next += 1;
            let exhausted = *next >= *count;
            if exhausted {
                frame.pos = Position::Srt(fields.srt);
            }
            match child {
                Some(child) => Next::Child { child, last: exhausted && fields.srt.is_none() },
                None => take_srt(frame),
            }
        }

        (
            FunStatic | Fun | Fun2_0 | Thunk | Thunk2_0
            | Fun1_0 | Fun1_1 | Thunk1_0 | Thunk1_1
            | Fun0_1 | Fun0_2 | ThunkStatic | Thunk0_1 | Thunk0_2,
            Position::Srt(_),
        ) => take_srt(frame),

        _ => return Err(ProfileErr::invalid(kind, Site::Pop)),
    };
    Ok(next)
}

fn take_srt(frame: &mut Frame) -> Next {
    match &mut frame.pos {
        Position::Srt(srt) => match srt.take() {
            Some(child) => Next::Child { child, last: true },
            None => Next::Exhausted,
        },
        _ => Next::Exhausted,
    }
}
