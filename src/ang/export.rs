//! Render a [`Dataset`] as `.ang` text.

use super::data::write_rows;
use super::grammar::write_header;
use crate::types::dataset::{Dataset, ReadError};

/// Header followed by one data row per point. The verbatim header is reused
/// when the dataset carries one; otherwise it is rendered from the parsed
/// fields and phases.
pub fn dataset_to_ang(dataset: &Dataset) -> Result<String, ReadError> {
    let mut out = match dataset.original_header.as_deref() {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => write_header(&dataset.header, dataset.phases.phases()),
    };
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&write_rows(&dataset.data, dataset.point_count)?);
    Ok(out)
}
