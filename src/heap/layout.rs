use crate::heap::kind::Kind;
use crate::heap::ObjId;
use bitvec::vec::BitVec;

/// largest layout that still fits in a small (inline) bitmap; the low bits of the
/// descriptor word are reserved for the size.
pub const SMALL_BITMAP_MAX: usize = 58;

pub(crate) const fn bitmask(from: u32, to_excluded: u32) -> u64 {
    let to = to_excluded - 1;
    if from > 63 || to > 63 || from > to {
        0
    } else {
        ((1u64 << (to - from + 1)) - 1) << from
    }
}

/// describes which words of a variable-length record are pointers.
/// a clear bit means pointer, a set bit means a non-pointer word.
#[derive(Debug, Clone, PartialEq)]
pub enum Bitmap {
    Small { size: u32, bits: u64 },
    Large(BitVec),
}

impl Bitmap {
    /// builds the descriptor for a record, `true` marking a pointer word.
    /// short layouts are packed inline, longer ones get an out-of-line bit vector.
    pub fn from_layout(pointers: &[bool]) -> Self {
        if pointers.len() <= SMALL_BITMAP_MAX {
            let bits = pointers
                .iter()
                .enumerate()
                .filter(|(_, &is_ptr)| !is_ptr)
                .fold(0u64, |acc, (i, _)| acc | 1 << i);
            Bitmap::Small { size: pointers.len() as u32, bits }
        } else {
            Bitmap::Large(pointers.iter().map(|&is_ptr| !is_ptr).collect())
        }
    }

    pub fn small(size: u32, bits: u64) -> Self {
        debug_assert!(size as usize <= SMALL_BITMAP_MAX);
        let bits = if size == 0 { 0 } else { bits & bitmask(0, size) };
        Bitmap::Small { size, bits }
    }

    pub fn len(&self) -> usize {
        match self {
            Bitmap::Small { size, .. } => *size as usize,
            Bitmap::Large(bits) => bits.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_pointer(&self, i: usize) -> bool {
        match self {
            Bitmap::Small { bits, .. } => bits.checked_shr(i as u32).is_some_and(|b| b & 1 == 0),
            Bitmap::Large(bits) => !bits[i],
        }
    }
}

/// argument layouts shared by many functions, looked up instead of stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgPattern {
    N,
    P,
    F,
    D,
    L,
    V16,
    NN,
    NP,
    PN,
    PP,
    NNN,
    NNP,
    NPN,
    NPP,
    PNN,
    PNP,
    PPN,
    PPP,
    PPPP,
    PPPPP,
    PPPPPP,
}

impl ArgPattern {
    // one letter per word: p for pointers, n for everything else
    fn words(self) -> &'static str {
        use ArgPattern::*;
        match self {
            N | F | D | L => "n",
            P => "p",
            V16 => "nn",
            NN => "nn",
            NP => "np",
            PN => "pn",
            PP => "pp",
            NNN => "nnn",
            NNP => "nnp",
            NPN => "npn",
            NPP => "npp",
            PNN => "pnn",
            PNP => "pnp",
            PPN => "ppn",
            PPP => "ppp",
            PPPP => "pppp",
            PPPPP => "ppppp",
            PPPPPP => "pppppp",
        }
    }

    pub fn bitmap(self) -> Bitmap {
        let layout: Vec<bool> = self.words().chars().map(|c| c == 'p').collect();
        Bitmap::from_layout(&layout)
    }
}

/// how the arguments of a function (or the words of a byte-code object's
/// frame) are laid out.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgLayout {
    Std(ArgPattern),
    Gen(Bitmap),
    /// the function is a byte-code object; its own bitmap describes the arguments
    Bco,
}

/// one record of a thread stack. which payload words hold pointers is decided
/// by the frame kind and its descriptor, as the words themselves are untyped.
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame {
    pub kind: Kind,
    pub bitmap: Option<Bitmap>,
    pub payload: Vec<u64>,
    pub srt: Option<ObjId>,
}

impl StackFrame {
    pub fn update(updatee: ObjId) -> Self {
        Self { kind: Kind::UpdateFrame, bitmap: None, payload: vec![updatee.word()], srt: None }
    }

    /// any frame described by an inline bitmap: return points, catch frames,
    /// stop and underflow frames.
    pub fn small(kind: Kind, payload: Vec<u64>, pointers: &[bool], srt: Option<ObjId>) -> Self {
        debug_assert_eq!(payload.len(), pointers.len());
        debug_assert!(pointers.len() <= SMALL_BITMAP_MAX);
        Self { kind, bitmap: Some(Bitmap::from_layout(pointers)), payload, srt }
    }

    pub fn big(payload: Vec<u64>, pointers: &[bool], srt: Option<ObjId>) -> Self {
        debug_assert_eq!(payload.len(), pointers.len());
        let bitmap = Bitmap::Large(pointers.iter().map(|&is_ptr| !is_ptr).collect());
        Self { kind: Kind::RetBig, bitmap: Some(bitmap), payload, srt }
    }

    pub fn ret_bco(bco: ObjId, args: Vec<u64>) -> Self {
        let mut payload = vec![bco.word()];
        payload.extend(args);
        Self { kind: Kind::RetBco, bitmap: None, payload, srt: None }
    }

    pub fn ret_fun(fun: ObjId, args: Vec<u64>, srt: Option<ObjId>) -> Self {
        let mut payload = vec![fun.word()];
        payload.extend(args);
        Self { kind: Kind::RetFun, bitmap: None, payload, srt }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TRecEntry {
    pub tvar: ObjId,
    pub expected: ObjId,
    pub new_value: ObjId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhatNext {
    RunGhc,
    Interpret,
    Complete,
    Killed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhyBlocked {
    NotBlocked,
    OnMVar,
    OnMVarRead,
    OnBlackHole,
    OnRead,
    OnWrite,
    OnDelay,
    OnStm,
    OnCCall,
    OnMsgThrowTo,
}

impl WhyBlocked {
    /// whether `block_info` holds the object the thread waits on
    pub fn has_closure(self) -> bool {
        matches!(
            self,
            WhyBlocked::OnMVar | WhyBlocked::OnMVarRead | WhyBlocked::OnBlackHole | WhyBlocked::OnMsgThrowTo
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tso {
    pub what_next: WhatNext,
    pub why_blocked: WhyBlocked,
    pub stack: Option<ObjId>,
    pub blocked_exceptions: Option<ObjId>,
    pub bq: Option<ObjId>,
    pub trec: Option<ObjId>,
    pub block_info: Option<ObjId>,
}

impl Tso {
    pub fn running(stack: ObjId) -> Self {
        Self {
            what_next: WhatNext::RunGhc,
            why_blocked: WhyBlocked::NotBlocked,
            stack: Some(stack),
            blocked_exceptions: None,
            bq: None,
            trec: None,
            block_info: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.what_next, WhatNext::Complete | WhatNext::Killed)
    }
}
