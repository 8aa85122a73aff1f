pub mod adjacency;
pub mod smoothing;

pub use adjacency::{HexGridIndex, RingIndex};
pub use smoothing::SmoothingEngine;
