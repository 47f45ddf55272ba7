//! Core data types for the ebsd-conv crate.

pub mod dataset;
pub mod phase;
pub mod transform;

// Re-export commonly used items
pub use dataset::{
    status, Dataset, ErrorKind, GridType, Header, HeaderKey, HeaderKind, HeaderValue,
    NumericArray, ReadError,
};
pub use phase::{
    decode_families, CrystalSymmetry, HklFamily, LatticeConstants, Phase, PhaseRegistry,
    HKL_RECORD_SIZE,
};
pub use transform::{CoordinateConvention, TransformDescriptor};
