use crate::errors::err::ProfileErr;
use crate::heap::ObjId;
use crate::retainer_set::Retainer;

pub const BLOCK_SIZE: usize = 4096;

/// frames per chunk when a chunk is one block
pub const DEFAULT_CHUNK_FRAMES: usize = BLOCK_SIZE / std::mem::size_of::<Frame>();

/// where a frame is in enumerating the children of its object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// a root or an eagerly pushed child that has not been looked at yet
    Fresh { parent: ObjId },
    /// next field of a small fixed-shape object. for transaction chunks this
    /// is `3 * entry + field`.
    Step(u32),
    /// next index into the object's pointer array
    Ptrs { next: u32, count: u32 },
    /// the remaining static reference, if any
    Srt(Option<ObjId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub obj: ObjId,
    /// retainer handed to the children of `obj`
    pub retainer: Retainer,
    pub pos: Position,
}

impl Frame {
    pub fn fresh(obj: ObjId, parent: ObjId, retainer: Retainer) -> Self {
        Self { obj, retainer, pos: Position::Fresh { parent } }
    }
}

/// depth a sub-walk runs down to; frames below it belong to an enclosing walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary(usize);

/// explicit traversal stack made of fixed-size chunks.
///
/// chunks are only ever appended to the chain. once the top chunk runs empty
/// the stack steps back to the previous one but keeps the emptied chunk for the
/// next time it grows. the whole chain goes away when the stack is dropped at the
/// end of a pass.
pub struct WorkStack {
    chunks: Vec<Vec<Frame>>,
    current: usize,
    chunk_frames: usize,
    boundary: Boundary,
    depth: usize,
    max_depth: usize,
}

impl WorkStack {
    pub fn new(chunk_frames: usize) -> Result<Self, ProfileErr> {
        let chunk_frames = chunk_frames.max(1);
        Ok(Self {
            chunks: vec![Self::alloc_chunk(chunk_frames, 0)?],
            current: 0,
            chunk_frames,
            boundary: Boundary(0),
            depth: 0,
            max_depth: 0,
        })
    }

    fn alloc_chunk(chunk_frames: usize, depth: usize) -> Result<Vec<Frame>, ProfileErr> {
        let mut chunk = Vec::new();
        chunk
            .try_reserve_exact(chunk_frames)
            .map_err(|_| ProfileErr::OutOfMemory { frames: depth })?;
        Ok(chunk)
    }

    /// true iff the chain is back at its first chunk and that chunk is empty
    pub fn is_empty(&self) -> bool {
        self.current == 0 && self.chunks[0].is_empty()
    }

    pub fn push(&mut self, frame: Frame) -> Result<(), ProfileErr> {
        if self.chunks[self.current].len() == self.chunk_frames {
            if self.current + 1 == self.chunks.len() {
                let chunk = Self::alloc_chunk(self.chunk_frames, self.depth)?;
                self.chunks.push(chunk);
                log::debug!("traverse stack grew to {} chunks", self.chunks.len());
            }
            self.current += 1;
        }
        self.chunks[self.current].push(frame);
        self.depth += 1;
        self.max_depth = self.max_depth.max(self.depth);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Frame> {
        let frame = self.chunks[self.current].pop()?;
        // keep the top chunk non-empty unless the whole stack is
        if self.chunks[self.current].is_empty() && self.current > 0 {
            self.current -= 1;
        }
        self.depth -= 1;
        Some(frame)
    }

    pub fn top(&self) -> Option<&Frame> {
        self.chunks[self.current].last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.chunks[self.current].last_mut()
    }

    /// starts a sub-walk at the current top. returns the boundary to restore
    /// once the sub-walk is done.
    pub fn set_boundary(&mut self) -> Boundary {
        std::mem::replace(&mut self.boundary, Boundary(self.depth))
    }

    pub fn restore_boundary(&mut self, saved: Boundary) {
        debug_assert!(saved.0 <= self.depth);
        self.boundary = saved;
    }

    /// whether the current sub-walk has no frames left
    pub fn is_on_boundary(&self) -> bool {
        self.depth == self.boundary.0
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}
