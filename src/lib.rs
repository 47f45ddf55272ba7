//! Ingestion of EBSD (electron backscatter diffraction) orientation maps.
//!
//! Two readers produce the same normalized [`types::Dataset`]:
//! [`adapters::AngReader`] for TSL `.ang` text files and
//! [`adapters::H5AngReader`] for `.ang` scans stored in a hierarchical
//! container. Both implement [`adapters::FormatReader`].

pub mod adapters;
pub mod ang;
pub mod container;
pub mod ffi;
pub mod gzip;
pub mod ops;
pub mod types;

// Re-export commonly used items
pub use adapters::{AngReader, FormatReader, H5AngReader};
pub use ops::identify;
pub use types::{status, CoordinateConvention, Dataset, ErrorKind, Phase, ReadError};
