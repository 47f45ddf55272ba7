//! Pure operations used by the readers.

pub mod convention;
pub mod projection;

// Re-export commonly used items
pub use convention::{frame_rotations, identify};
pub use projection::effective_read_set;
