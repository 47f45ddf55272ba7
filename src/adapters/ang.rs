//! TSL `.ang` flat text reader.
//!
//! The file is a `#` header block followed by one whitespace-separated row
//! per scan point. Gzip-compressed files are inflated transparently.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{tag_convention, tsl_defaults, FormatReader, ReadOptions};
use crate::ang::{available_columns, header_end, parse_header, parse_rows};
use crate::ops::projection::effective_read_set;
use crate::types::dataset::{Dataset, ReadError};
use crate::types::phase::PhaseRegistry;
use crate::types::transform::TransformDescriptor;

#[derive(Debug)]
enum Source {
    Path(PathBuf),
    Text(String),
}

/// Reader for a single `.ang` scan.
#[derive(Debug)]
pub struct AngReader {
    source: Source,
    options: ReadOptions,
    vendor_defaults: (TransformDescriptor, TransformDescriptor),
    dataset: Dataset,
    /// File contents, loaded once per header read.
    text: Option<String>,
}

impl AngReader {
    /// Reader for the file at `path`. Nothing is read until a read call.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_source(Source::Path(path.as_ref().to_path_buf()))
    }

    /// Reader over `.ang` text already in memory.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::with_source(Source::Text(text.into()))
    }

    fn with_source(source: Source) -> Self {
        AngReader {
            source,
            options: ReadOptions::default(),
            vendor_defaults: tsl_defaults(),
            dataset: Dataset::default(),
            text: None,
        }
    }

    /// Transforms assumed when the header does not record them.
    pub fn with_vendor_transforms(
        mut self,
        sample: TransformDescriptor,
        euler: TransformDescriptor,
    ) -> Self {
        self.vendor_defaults = (sample, euler);
        self
    }

    fn load(&self) -> Result<String, ReadError> {
        let path = match &self.source {
            Source::Text(text) => return Ok(text.clone()),
            Source::Path(path) => path,
        };

        let bytes = fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                ReadError::MissingFile(format!("{}: no such file", path.display()))
            }
            _ => ReadError::MissingFile(format!("{}: {e}", path.display())),
        })?;
        let bytes = crate::gzip::maybe_inflate(bytes).map_err(|e| {
            ReadError::MalformedHeader(format!("{}: gzip stream: {e}", path.display()))
        })?;

        Ok(String::from_utf8(bytes).unwrap_or_else(|e| {
            log::warn!("{}: not valid UTF-8, decoding lossily", path.display());
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }))
    }
}

impl FormatReader for AngReader {
    fn read_header(&mut self) -> Result<(), ReadError> {
        self.dataset.clear();
        self.text = None;

        let text = self.load()?;
        let end = header_end(&text);
        let parsed = parse_header(&text[..end])?;

        self.dataset.header = parsed.header;
        self.dataset.phases = PhaseRegistry::try_from(parsed.phases)?;
        self.dataset.original_header = Some(text[..end].to_string());
        self.dataset.convention = tag_convention(&self.dataset, self.vendor_defaults);

        log::debug!(
            "ang header: {} keys, {} phases, {} convention",
            self.dataset.header.len(),
            self.dataset.phases.len(),
            self.dataset.convention.name()
        );
        self.text = Some(text);
        Ok(())
    }

    fn read_data(&mut self) -> Result<(), ReadError> {
        if self.text.is_none() {
            self.read_header()?;
        }
        let Some(text) = self.text.as_deref() else {
            return Err(ReadError::MissingDataSection("header was not loaded".into()));
        };

        let data = &text[header_end(text)..];
        if data.trim().is_empty() {
            return Err(ReadError::MissingDataSection(
                "no data rows after the header".into(),
            ));
        }

        let available = available_columns(data);
        let wanted = effective_read_set(&self.options.arrays, self.options.read_all, &available);
        let block = parse_rows(data, &wanted)?;

        let declared = self.dataset.header.declared_point_count()?;
        if declared > 0 && declared != block.row_count {
            return Err(ReadError::ColumnLengthMismatch(format!(
                "header declares {declared} points, data block has {} rows",
                block.row_count
            )));
        }

        let selected = block.columns.len();
        self.dataset.commit_columns(block.columns)?;
        if selected == 0 {
            self.dataset.point_count = block.row_count;
        }

        log::info!(
            "read {} of {} columns, {} points",
            selected,
            available.len(),
            self.dataset.point_count
        );
        Ok(())
    }

    fn set_arrays_to_read(&mut self, names: BTreeSet<String>) {
        self.options.arrays = names;
    }

    fn read_all_arrays(&mut self, read_all: bool) {
        self.options.read_all = read_all;
    }

    fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    fn into_dataset(self) -> Dataset {
        self.dataset
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use crate::types::dataset::{ErrorKind, GridType, HeaderKey, NumericArray};
    use crate::types::transform::CoordinateConvention;

    pub(crate) const SCAN: &str = "\
# TEM_PIXperUM          1.000000
# x-star                0.4961
# y-star                0.7314
# z-star                0.6812
# WorkingDistance       18.0
#
# Phase 2
# MaterialName  \tIron (Alpha)
# Formula     \tFe
# Info \t\t
# Symmetry              43
# LatticeConstants      2.870 2.870 2.870  90.000  90.000  90.000
# NumberFamilies        1
# hklFamilies   \t 1  1  0 1 9.3 1
# Categories 0 0 0 0 0
#
# Phase 1
# MaterialName  \tNickel
# Formula     \tNi
# Info \t\t
# Symmetry              43
# LatticeConstants      3.520 3.520 3.520  90.000  90.000  90.000
# NumberFamilies        2
# hklFamilies   \t 1  1  1 1 8.469246 1
# hklFamilies   \t 2  0  0 1 7.008723 1
# Categories 0 0 0 0 0
#
# GRID: SqrGrid
# XSTEP: 0.500000
# YSTEP: 0.500000
# NCOLS_ODD: 2
# NCOLS_EVEN: 2
# NROWS: 2
#
# OPERATOR: \tlab
# SAMPLEID: \t
# SCANID: \t
#
  0.1 0.2 0.3 0.0 0.0 100.0 0.9 1 500.0 0.5
  1.1 1.2 1.3 0.5 0.0 110.0 0.8 2 510.0 0.6
  2.1 2.2 2.3 0.0 0.5 120.0 0.7 1 520.0 0.7
  3.1 3.2 3.3 0.5 0.5 130.0 0.6 2 530.0 0.8
";

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn temp_file(name: &str, bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("ebsd_conv_{}_{name}", std::process::id()));
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_read_file_all_columns() {
        let mut reader = AngReader::from_text(SCAN);
        reader.read_file().unwrap();
        let ds = reader.dataset();

        assert_eq!(ds.point_count, 4);
        assert_eq!(ds.data.len(), 10);
        assert_eq!(
            ds.column("PhaseData"),
            Some(&NumericArray::Int(vec![1, 2, 1, 2]))
        );
        assert_eq!(ds.column("Phi1").unwrap().as_f32().map(|v| v[3]), Some(3.1));
        assert_eq!(ds.header.grid(), GridType::Square);
        assert_eq!(ds.header.float(HeaderKey::WorkingDistance), 18.0);
        assert_eq!(ds.convention, CoordinateConvention::TslDefault);
        assert!(ds.original_header.as_deref().unwrap().ends_with("#\n"));
    }

    #[test]
    fn test_phases_sorted_by_id() {
        let mut reader = AngReader::from_text(SCAN);
        reader.read_header_only().unwrap();
        let ids: Vec<i32> = reader.phases().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(reader.phases()[0].families.len(), 2);
        assert_eq!(reader.phases()[1].material_name, "Iron (Alpha)");
        assert!(reader.dataset().data.is_empty());
    }

    #[test]
    fn test_projection() {
        let mut reader = AngReader::from_text(SCAN);
        reader.read_all_arrays(false);
        reader.set_arrays_to_read(names(&["Confidence Index", "Nope"]));
        reader.read_file().unwrap();
        let cols: Vec<&str> = reader.dataset().column_names().collect();
        assert_eq!(cols, vec!["Confidence Index"]);

        let mut reader = AngReader::from_text(SCAN);
        reader.read_all_arrays(false);
        reader.read_file().unwrap();
        assert!(reader.dataset().data.is_empty());
        assert_eq!(reader.dataset().point_count, 4);

        let mut reader = AngReader::from_text(SCAN);
        reader.set_arrays_to_read(names(&["Fit"]));
        reader.read_all_arrays(true);
        reader.read_file().unwrap();
        assert_eq!(reader.dataset().data.len(), 10);
    }

    #[test]
    fn test_missing_file() {
        let mut reader = AngReader::new("/nonexistent/scan.ang");
        let err = reader.read_file().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingFile);
        assert_eq!(err.code(), -100);
    }

    #[test]
    fn test_header_only_file_has_no_data_section() {
        let header_only = &SCAN[..header_end(SCAN)];
        let mut reader = AngReader::from_text(header_only);
        reader.read_header_only().unwrap();

        let err = reader.read_data().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingDataSection);
        assert_eq!(reader.phases().len(), 2);
    }

    #[test]
    fn test_short_scan_keeps_header_and_phases() {
        let truncated: String = SCAN.lines().take(SCAN.lines().count() - 1).collect::<Vec<_>>().join("\n");
        let mut reader = AngReader::from_text(truncated);
        let err = reader.read_file().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ColumnLengthMismatch);

        let ds = reader.dataset();
        assert_eq!(ds.phases.len(), 2);
        assert_eq!(ds.header.int(HeaderKey::NRows), 2);
        assert!(ds.data.is_empty());
    }

    #[test]
    fn test_huge_grid_dimensions_fail_cleanly() {
        let text = SCAN.replace("# NCOLS_ODD: 2", "# NCOLS_ODD: 9223372036854775807")
            .replace("# NROWS: 2", "# NROWS: 4");
        let mut reader = AngReader::from_text(text);
        reader.read_header().unwrap();

        let err = reader.read_data().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedHeader);
        assert_eq!(reader.phases().len(), 2);
        assert!(reader.dataset().data.is_empty());
    }

    #[test]
    fn test_malformed_header_aborts() {
        let text = SCAN.replace("# NROWS: 2", "# NROWS: two");
        let mut reader = AngReader::from_text(text);
        let err = reader.read_file().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedHeader);
        assert!(reader.dataset().phases.is_empty());
    }

    #[test]
    fn test_read_data_reads_header_first() {
        let mut reader = AngReader::from_text(SCAN);
        reader.read_data().unwrap();
        assert_eq!(reader.phases().len(), 2);
        assert_eq!(reader.dataset().point_count, 4);
    }

    #[test]
    fn test_recorded_transforms_override_vendor_defaults() {
        let text = SCAN.replace(
            "# GRID: SqrGrid",
            "# SampleTransformationAngle 180\n# SampleTransformationAxis 0 1 0\n\
             # EulerTransformationAngle 0\n# EulerTransformationAxis 0 0 1\n# GRID: SqrGrid",
        );
        let mut reader = AngReader::from_text(text);
        reader.read_header_only().unwrap();
        assert_eq!(reader.dataset().convention, CoordinateConvention::HklDefault);

        let mut reader = AngReader::from_text(SCAN).with_vendor_transforms(
            TransformDescriptor::new(1.0, 0.0, 0.0, 1.0),
            TransformDescriptor::new(0.0, 0.0, 0.0, 1.0),
        );
        reader.read_header_only().unwrap();
        assert_eq!(reader.dataset().convention, CoordinateConvention::Unknown);
    }

    #[test]
    fn test_plain_and_gzip_files() {
        let plain = temp_file("plain.ang", SCAN.as_bytes());
        let mut reader = AngReader::new(&plain);
        reader.read_file().unwrap();
        assert_eq!(reader.dataset().point_count, 4);
        let _ = fs::remove_file(&plain);

        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(SCAN.as_bytes()).unwrap();
        let gz = temp_file("scan.ang.gz", &enc.finish().unwrap());
        let mut reader = AngReader::new(&gz);
        reader.read_file().unwrap();
        let ds = reader.into_dataset();
        assert_eq!(ds.point_count, 4);
        assert_eq!(ds.phases.len(), 2);
        let _ = fs::remove_file(&gz);
    }

    #[test]
    fn test_reread_resets_state() {
        let mut reader = AngReader::from_text(SCAN);
        reader.read_file().unwrap();
        reader.read_header_only().unwrap();
        assert!(reader.dataset().data.is_empty());
        assert_eq!(reader.phases().len(), 2);
    }
}
