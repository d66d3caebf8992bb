use crate::heap::kind::Kind;
use crate::heap::ObjId;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// the step of the traversal that ran into an object it cannot handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    IsRetainer,
    PushChildren,
    Pop,
    StackScan,
    StaticReset,
    Payload,
}

impl Display for Site {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Site::IsRetainer => "isRetainer",
            Site::PushChildren => "push",
            Site::Pop => "pop",
            Site::StackScan => "stack scan",
            Site::StaticReset => "static reset",
            Site::Payload => "payload",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ProfileErr {
    /// the heap holds an object whose kind is illegal where it was found.
    /// the engine assumes a consistent heap, so a pass hitting this is over.
    #[error("invalid object in {site}: {kind:?}")]
    InvalidObject { kind: Kind, site: Site },

    #[error("unknown closure info tag {0}")]
    UnknownInfoTag(u8),

    #[error("pointer to {0:?} is outside the heap")]
    DanglingPointer(ObjId),

    /// found by the post-pass check: the object was reached but holds no retainer
    #[error("{0:?} was visited but has an empty retainer set")]
    EmptyRetainerSet(ObjId),

    #[error("out of memory growing the traverse stack ({frames} frames in use)")]
    OutOfMemory { frames: usize },
}

impl ProfileErr {
    pub(crate) fn invalid(kind: Kind, site: Site) -> Self {
        log::error!("invalid object in {site}: {kind:?}");
        Self::InvalidObject { kind, site }
    }
}
