use crate::traverse::stack::DEFAULT_CHUNK_FRAMES;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilerConfig {
    /// frames per work stack chunk
    pub chunk_frames: usize,
    /// after every pass, check that each object given a set has at least one retainer
    pub check_sets: bool,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self { chunk_frames: DEFAULT_CHUNK_FRAMES, check_sets: cfg!(feature = "debug") }
    }
}
