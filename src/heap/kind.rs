use crate::errors::err::{ProfileErr, Site};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// closure type of a heap object, as stored in its info tag.
/// the `_x_y` suffixes give the number of pointer and non-pointer payload words
/// for the kinds that have a fixed layout.
#[derive(Debug, FromPrimitive, PartialEq, Eq, Copy, Clone, Hash)]
#[repr(u8)]
pub enum Kind {
    InvalidObject,

    Constr,
    Constr1_0,
    Constr0_1,
    Constr2_0,
    Constr1_1,
    Constr0_2,
    ConstrNoCaf,

    Fun,
    Fun1_0,
    Fun0_1,
    Fun2_0,
    Fun1_1,
    Fun0_2,
    FunStatic,

    Thunk,
    Thunk1_0,
    Thunk0_1,
    Thunk2_0,
    Thunk1_1,
    Thunk0_2,
    ThunkStatic,
    ThunkSelector,

    Bco,
    Ap,
    Pap,
    ApStack,
    Ind,
    IndStatic,
    Blackhole,
    Whitehole,

    MVarClean,
    MVarDirty,
    TVar,
    MutVarClean,
    MutVarDirty,
    Weak,
    Prim,
    MutPrim,
    ArrWords,
    MutArrPtrsClean,
    MutArrPtrsDirty,
    MutArrPtrsFrozenClean,
    MutArrPtrsFrozenDirty,
    SmallMutArrPtrsClean,
    SmallMutArrPtrsDirty,
    SmallMutArrPtrsFrozenClean,
    SmallMutArrPtrsFrozenDirty,
    CompactNfData,

    Tso,
    Stack,
    BlockingQueue,
    TRecChunk,

    // stack frames, only legal inside a stack record
    UpdateFrame,
    CatchFrame,
    CatchRetryFrame,
    CatchStmFrame,
    UnderflowFrame,
    AtomicallyFrame,
    StopFrame,
    RetBco,
    RetSmall,
    RetBig,
    RetFun,
}

impl Kind {
    pub fn from_tag(tag: u8) -> Result<Self, ProfileErr> {
        Kind::from_u8(tag).ok_or(ProfileErr::UnknownInfoTag(tag))
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// whether objects of this kind count as a reason for something else to stay alive.
    ///
    /// threads and their stacks are the roots of the program, so they retain.
    /// every mutable object retains as well, as do delayed computations and weak
    /// pointers, which are seeded as roots of their own. immutable data, functions
    /// and partial applications never do. frames and plain indirections cannot
    /// appear on their own in a frozen heap.
    pub fn is_retainer(self) -> Result<bool, ProfileErr> {
        use Kind::*;
        match self {
            Tso | Stack
            | MutPrim | MVarClean | MVarDirty | TVar | MutVarClean | MutVarDirty
            | MutArrPtrsClean | MutArrPtrsDirty | SmallMutArrPtrsClean | SmallMutArrPtrsDirty
            | BlockingQueue
            | Thunk | Thunk1_0 | Thunk0_1 | Thunk2_0 | Thunk1_1 | Thunk0_2 | ThunkSelector
            | Ap | ApStack | ThunkStatic
            | Weak => Ok(true),

            Constr | ConstrNoCaf | Constr1_0 | Constr0_1 | Constr2_0 | Constr1_1 | Constr0_2
            | Fun | Fun1_0 | Fun0_1 | Fun2_0 | Fun1_1 | Fun0_2
            | Pap
            | IndStatic | Blackhole | Whitehole
            | FunStatic
            | Prim | Bco | ArrWords | CompactNfData
            | TRecChunk
            | MutArrPtrsFrozenClean | MutArrPtrsFrozenDirty
            | SmallMutArrPtrsFrozenClean | SmallMutArrPtrsFrozenDirty => Ok(false),

            UpdateFrame | CatchFrame | CatchRetryFrame | CatchStmFrame | UnderflowFrame
            | AtomicallyFrame | StopFrame | RetBco | RetSmall | RetBig | RetFun
            | Ind | InvalidObject => Err(ProfileErr::invalid(self, Site::IsRetainer)),
        }
    }

    pub fn is_frame(self) -> bool {
        use Kind::*;
        matches!(
            self,
            UpdateFrame | CatchFrame | CatchRetryFrame | CatchStmFrame | UnderflowFrame
                | AtomicallyFrame | StopFrame | RetBco | RetSmall | RetBig | RetFun
        )
    }

    pub fn is_static(self) -> bool {
        matches!(
            self,
            Kind::ConstrNoCaf | Kind::FunStatic | Kind::ThunkStatic | Kind::IndStatic
        )
    }
}
