//! Format readers producing a normalized [`Dataset`].
//!
//! Both readers implement [`FormatReader`] independently. The hierarchical
//! reader reuses the `.ang` grammar as a standalone utility for its
//! `OriginalFile` fallback.

pub mod ang;
pub mod h5ang;

use std::collections::BTreeSet;

use crate::ops::convention::identify;
use crate::types::dataset::{Dataset, ReadError};
use crate::types::phase::Phase;
use crate::types::transform::{CoordinateConvention, TransformDescriptor};

// Re-export commonly used items
pub use ang::AngReader;
pub use h5ang::H5AngReader;

/// Column selection shared by the readers.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub arrays: BTreeSet<String>,
    /// When true, every available column is read regardless of `arrays`.
    pub read_all: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            arrays: BTreeSet::new(),
            read_all: true,
        }
    }
}

/// Reading capability shared by all scan formats.
pub trait FormatReader {
    /// Parse header fields and phases into the dataset. Any previous header,
    /// phases and columns are discarded first.
    fn read_header(&mut self) -> Result<(), ReadError>;

    /// Materialize the selected columns. Reads the header first if it has not
    /// been read. On failure the header and phases stay populated and no
    /// columns are committed.
    fn read_data(&mut self) -> Result<(), ReadError>;

    /// Restrict later data reads to these column names.
    fn set_arrays_to_read(&mut self, names: BTreeSet<String>);

    /// Override the column restriction when `read_all` is true.
    fn read_all_arrays(&mut self, read_all: bool);

    fn dataset(&self) -> &Dataset;

    fn into_dataset(self) -> Dataset
    where
        Self: Sized;

    /// Populate header and phases only.
    fn read_header_only(&mut self) -> Result<(), ReadError> {
        self.read_header()
    }

    /// Header read followed by data read.
    fn read_file(&mut self) -> Result<(), ReadError> {
        self.read_header_only()?;
        self.read_data()
    }

    /// Phases ordered by id.
    fn phases(&self) -> &[Phase] {
        self.dataset().phases.phases()
    }
}

/// Classify the dataset's transforms, substituting `vendor_defaults` when
/// the header does not record them.
pub(crate) fn tag_convention(
    dataset: &Dataset,
    vendor_defaults: (TransformDescriptor, TransformDescriptor),
) -> CoordinateConvention {
    let (sample, euler) = dataset.header.transforms().unwrap_or(vendor_defaults);
    identify(&sample, &euler)
}

/// Transforms the TSL software assumes when a file does not record them.
pub(crate) fn tsl_defaults() -> (TransformDescriptor, TransformDescriptor) {
    (
        TransformDescriptor::new(180.0, 0.0, 1.0, 0.0),
        TransformDescriptor::new(90.0, 0.0, 0.0, 1.0),
    )
}
