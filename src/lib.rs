pub mod config;
pub mod demo;
pub mod errors;
pub mod heap;
pub mod profiler;
pub mod retainer_set;
pub mod traverse;

#[cfg(test)]
mod tests;
