//! In-memory stand-in for the runtime's frozen heap and its root tables.
//!
//! The traversal only ever reads object payloads; the one piece of state it
//! writes is the per-object traversal slot (`TravData`).

pub mod kind;
pub mod layout;

use crate::errors::err::{ProfileErr, Site};
use crate::heap::kind::Kind;
use crate::heap::layout::{ArgLayout, Bitmap, StackFrame, TRecEntry, Tso};
use crate::retainer_set::{Retainer, SetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId(pub usize);

impl ObjId {
    pub fn word(self) -> u64 {
        self.0 as u64
    }
}

/// pointers-first payload shared by constructors, functions, thunks, arrays
/// and the fixed-shape mutable objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    pub ptrs: Vec<ObjId>,
    pub words: Vec<u64>,
    /// static reference table, the one extra child functions and thunks may have
    pub srt: Option<ObjId>,
    pub args: Option<ArgLayout>,
    /// layout of the words a byte-code object's frames and arguments carry
    pub bco_bitmap: Option<Bitmap>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Fields(Fields),
    TRecChunk { prev: Option<ObjId>, entries: Vec<TRecEntry> },
    Tso(Box<Tso>),
    Stack(Vec<StackFrame>),
    /// a partial or saturated application of `fun`, used by both PAP and AP
    Pap { fun: ObjId, args: Vec<u64> },
    ApStack { fun: ObjId, frames: Vec<StackFrame> },
    BlockingQueue { link: Option<ObjId>, bh: Option<ObjId>, owner: Option<ObjId> },
}

/// traversal slot of an object header: the pass bit it was last touched in and
/// the retainer set it got then.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TravData {
    pub(crate) flip: bool,
    pub(crate) set: Option<SetId>,
}

#[derive(Debug, Clone)]
pub struct HeapObject {
    info: u8,
    /// the binding this object is attributed to
    pub ccs: Retainer,
    pub payload: Payload,
    pub(crate) trav: TravData,
}

impl HeapObject {
    pub fn kind(&self) -> Result<Kind, ProfileErr> {
        Kind::from_tag(self.info)
    }

    pub fn retainer(&self) -> Retainer {
        self.ccs
    }

    pub fn fields(&self) -> Result<&Fields, ProfileErr> {
        match &self.payload {
            Payload::Fields(fields) => Ok(fields),
            _ => Err(self.bad_payload()),
        }
    }

    pub fn ptr(&self, i: usize) -> Result<ObjId, ProfileErr> {
        self.fields()?.ptrs.get(i).copied().ok_or_else(|| self.bad_payload())
    }

    pub fn tso(&self) -> Result<&Tso, ProfileErr> {
        match &self.payload {
            Payload::Tso(tso) => Ok(&**tso),
            _ => Err(self.bad_payload()),
        }
    }

    pub(crate) fn bad_payload(&self) -> ProfileErr {
        match self.kind() {
            Ok(kind) => ProfileErr::invalid(kind, Site::Payload),
            Err(e) => e,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Capability {
    /// threads this capability knows about (run queue, blocked threads, ...)
    pub threads: Vec<ObjId>,
    /// one remembered set per generation
    pub mut_lists: Vec<Vec<ObjId>>,
}

#[derive(Debug, Clone, Default)]
pub struct Generation {
    pub weak_ptrs: Vec<ObjId>,
}

pub struct Heap {
    objects: Vec<HeapObject>,
    pub capabilities: Vec<Capability>,
    pub generations: Vec<Generation>,
    /// externally pinned objects; freed slots are `None`
    pub stable_ptrs: Vec<Option<ObjId>>,
    pub static_objects: Vec<ObjId>,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(1, 2)
    }
}

// constructors
impl Heap {
    pub fn new(n_capabilities: usize, n_generations: usize) -> Self {
        Self {
            objects: Vec::new(),
            capabilities: (0..n_capabilities)
                .map(|_| Capability { threads: Vec::new(), mut_lists: vec![Vec::new(); n_generations] })
                .collect(),
            generations: vec![Generation::default(); n_generations],
            stable_ptrs: Vec::new(),
            static_objects: Vec::new(),
        }
    }

    pub fn alloc(&mut self, kind: Kind, ccs: Retainer, payload: Payload) -> ObjId {
        self.alloc_raw(kind.tag(), ccs, payload)
    }

    /// allocates with an arbitrary info tag, which need not name a known kind
    pub fn alloc_raw(&mut self, info: u8, ccs: Retainer, payload: Payload) -> ObjId {
        let id = ObjId(self.objects.len());
        self.objects.push(HeapObject { info, ccs, payload, trav: TravData::default() });
        id
    }

    pub fn fields(&mut self, kind: Kind, ccs: Retainer, ptrs: &[ObjId]) -> ObjId {
        self.alloc(kind, ccs, Payload::Fields(Fields { ptrs: ptrs.to_vec(), ..Fields::default() }))
    }

    /// pointer-free data such as byte arrays and 0_x constructors
    pub fn data(&mut self, kind: Kind, words: Vec<u64>) -> ObjId {
        self.alloc(kind, Retainer::SYSTEM, Payload::Fields(Fields { words, ..Fields::default() }))
    }

    pub fn thunk(&mut self, kind: Kind, ccs: Retainer, ptrs: &[ObjId], srt: Option<ObjId>) -> ObjId {
        self.alloc(
            kind,
            ccs,
            Payload::Fields(Fields { ptrs: ptrs.to_vec(), srt, ..Fields::default() }),
        )
    }

    pub fn fun(&mut self, kind: Kind, ptrs: &[ObjId], srt: Option<ObjId>, args: ArgLayout) -> ObjId {
        self.alloc(
            kind,
            Retainer::SYSTEM,
            Payload::Fields(Fields { ptrs: ptrs.to_vec(), srt, args: Some(args), ..Fields::default() }),
        )
    }

    /// a byte-code object. calls to it take their argument layout from `bitmap`.
    pub fn bco(&mut self, ptrs: &[ObjId], bitmap: Bitmap) -> ObjId {
        self.alloc(
            Kind::Bco,
            Retainer::SYSTEM,
            Payload::Fields(Fields {
                ptrs: ptrs.to_vec(),
                args: Some(ArgLayout::Bco),
                bco_bitmap: Some(bitmap),
                ..Fields::default()
            }),
        )
    }

    pub fn mut_var(&mut self, ccs: Retainer, var: ObjId) -> ObjId {
        self.fields(Kind::MutVarDirty, ccs, &[var])
    }

    pub fn mvar(&mut self, ccs: Retainer, head: ObjId, tail: ObjId, value: ObjId) -> ObjId {
        self.fields(Kind::MVarDirty, ccs, &[head, tail, value])
    }

    pub fn weak(&mut self, ccs: Retainer, key: ObjId, value: ObjId, finalizer: ObjId) -> ObjId {
        self.fields(Kind::Weak, ccs, &[key, value, finalizer])
    }

    pub fn tso(&mut self, ccs: Retainer, tso: Tso) -> ObjId {
        self.alloc(Kind::Tso, ccs, Payload::Tso(Box::new(tso)))
    }

    pub fn stack(&mut self, ccs: Retainer, frames: Vec<StackFrame>) -> ObjId {
        self.alloc(Kind::Stack, ccs, Payload::Stack(frames))
    }

    pub fn pap(&mut self, fun: ObjId, args: Vec<u64>) -> ObjId {
        self.alloc(Kind::Pap, Retainer::SYSTEM, Payload::Pap { fun, args })
    }

    pub fn ap(&mut self, ccs: Retainer, fun: ObjId, args: Vec<u64>) -> ObjId {
        self.alloc(Kind::Ap, ccs, Payload::Pap { fun, args })
    }

    pub fn ap_stack(&mut self, ccs: Retainer, fun: ObjId, frames: Vec<StackFrame>) -> ObjId {
        self.alloc(Kind::ApStack, ccs, Payload::ApStack { fun, frames })
    }

    pub fn blocking_queue(
        &mut self,
        ccs: Retainer,
        link: Option<ObjId>,
        bh: Option<ObjId>,
        owner: Option<ObjId>,
    ) -> ObjId {
        self.alloc(Kind::BlockingQueue, ccs, Payload::BlockingQueue { link, bh, owner })
    }

    pub fn trec_chunk(&mut self, prev: Option<ObjId>, entries: Vec<TRecEntry>) -> ObjId {
        self.alloc(Kind::TRecChunk, Retainer::SYSTEM, Payload::TRecChunk { prev, entries })
    }

    /// static objects are also put on the static list the collector hands to
    /// `RetainerProfiler::reset_static_objects`
    pub fn static_object(&mut self, kind: Kind, ptrs: &[ObjId], srt: Option<ObjId>) -> ObjId {
        debug_assert!(kind.is_static() || matches!(kind, Kind::Constr | Kind::Constr1_0 | Kind::Constr2_0 | Kind::Constr1_1));
        let id = self.thunk(kind, Retainer::SYSTEM, ptrs, srt);
        self.static_objects.push(id);
        id
    }

    /// rewires a pointer field after allocation, which is how cycles get built
    pub fn set_ptr(&mut self, obj: ObjId, field: usize, target: ObjId) -> Result<(), ProfileErr> {
        let object = self.objects.get_mut(obj.0).ok_or(ProfileErr::DanglingPointer(obj))?;
        if let Payload::Fields(fields) = &mut object.payload {
            if let Some(slot) = fields.ptrs.get_mut(field) {
                *slot = target;
                return Ok(());
            }
        }
        Err(object.bad_payload())
    }
}

// root tables
impl Heap {
    pub fn add_thread(&mut self, cap: usize, tso: ObjId) {
        self.capabilities[cap].threads.push(tso);
    }

    pub fn add_weak(&mut self, gen: usize, weak: ObjId) {
        self.generations[gen].weak_ptrs.push(weak);
    }

    pub fn pin(&mut self, obj: ObjId) -> usize {
        match self.stable_ptrs.iter().position(Option::is_none) {
            Some(slot) => {
                self.stable_ptrs[slot] = Some(obj);
                slot
            }
            None => {
                self.stable_ptrs.push(Some(obj));
                self.stable_ptrs.len() - 1
            }
        }
    }

    pub fn unpin(&mut self, slot: usize) {
        self.stable_ptrs[slot] = None;
    }

    pub fn record_mutable(&mut self, cap: usize, gen: usize, obj: ObjId) {
        self.capabilities[cap].mut_lists[gen].push(obj);
    }
}

// accessors
impl Heap {
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjId> {
        (0..self.objects.len()).map(ObjId)
    }

    pub fn get(&self, id: ObjId) -> Result<&HeapObject, ProfileErr> {
        self.objects.get(id.0).ok_or(ProfileErr::DanglingPointer(id))
    }

    pub fn kind(&self, id: ObjId) -> Result<Kind, ProfileErr> {
        self.get(id)?.kind()
    }

    /// decodes a word that a descriptor marked as a pointer
    pub fn obj_at(&self, word: u64) -> Result<ObjId, ProfileErr> {
        let id = ObjId(word as usize);
        self.get(id).map(|_| id)
    }

    pub(crate) fn trav(&self, id: ObjId) -> Result<TravData, ProfileErr> {
        Ok(self.get(id)?.trav)
    }

    pub(crate) fn trav_mut(&mut self, id: ObjId) -> Result<&mut TravData, ProfileErr> {
        self.objects
            .get_mut(id.0)
            .map(|obj| &mut obj.trav)
            .ok_or(ProfileErr::DanglingPointer(id))
    }
}
