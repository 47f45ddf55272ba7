//! The normalized in-memory dataset both readers produce: header metadata,
//! the phase registry, and equal-length named columns.

use std::collections::BTreeMap;

use super::phase::PhaseRegistry;
use super::transform::{CoordinateConvention, TransformDescriptor};

// ---------------------------------------------------------------------------
// Header values
// ---------------------------------------------------------------------------

/// A single header value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Int(i64),
    Float(f64),
    Text(String),
    Floats(Vec<f32>),
}

impl HeaderValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Float(v) => Some(*v),
            HeaderValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HeaderValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f32]> {
        match self {
            HeaderValue::Floats(v) => Some(v),
            _ => None,
        }
    }
}

/// Declared type of a known header key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    Int,
    Float,
    Text,
    /// Whitespace-separated list of exactly `n` floats.
    Floats(usize),
}

impl HeaderKind {
    /// Parse the textual value of a header line.
    pub fn parse(&self, text: &str) -> Option<HeaderValue> {
        let text = text.trim();
        match self {
            HeaderKind::Int => text.parse().ok().map(HeaderValue::Int),
            HeaderKind::Float => text.parse().ok().map(HeaderValue::Float),
            HeaderKind::Text => Some(HeaderValue::Text(text.to_string())),
            HeaderKind::Floats(n) => {
                let values: Option<Vec<f32>> =
                    text.split_whitespace().map(|t| t.parse().ok()).collect();
                values
                    .filter(|v| v.len() == *n)
                    .map(HeaderValue::Floats)
            }
        }
    }

    /// Coerce a value read natively (e.g. from a container scalar) to this kind.
    pub fn coerce(&self, value: HeaderValue) -> Option<HeaderValue> {
        match (self, value) {
            (HeaderKind::Int, HeaderValue::Int(v)) => Some(HeaderValue::Int(v)),
            (HeaderKind::Int, HeaderValue::Float(v)) if v.fract() == 0.0 => {
                Some(HeaderValue::Int(v as i64))
            }
            (HeaderKind::Float, v @ (HeaderValue::Float(_) | HeaderValue::Int(_))) => {
                v.as_f64().map(HeaderValue::Float)
            }
            (HeaderKind::Floats(n), HeaderValue::Floats(v)) if v.len() == *n => {
                Some(HeaderValue::Floats(v))
            }
            (HeaderKind::Text, HeaderValue::Text(s)) => Some(HeaderValue::Text(s)),
            (HeaderKind::Text, HeaderValue::Int(v)) => Some(HeaderValue::Text(v.to_string())),
            (HeaderKind::Text, HeaderValue::Float(v)) => Some(HeaderValue::Text(v.to_string())),
            (kind, HeaderValue::Text(s)) => kind.parse(&s),
            _ => None,
        }
    }
}

/// Known `.ang` header keys with their types and sentinel defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderKey {
    TemPixPerUm,
    XStar,
    YStar,
    ZStar,
    WorkingDistance,
    Grid,
    XStep,
    YStep,
    NColsOdd,
    NColsEven,
    NRows,
    Operator,
    SampleId,
    ScanId,
    SampleTransformationAngle,
    SampleTransformationAxis,
    EulerTransformationAngle,
    EulerTransformationAxis,
}

impl HeaderKey {
    pub const ALL: [HeaderKey; 18] = [
        HeaderKey::TemPixPerUm,
        HeaderKey::XStar,
        HeaderKey::YStar,
        HeaderKey::ZStar,
        HeaderKey::WorkingDistance,
        HeaderKey::Grid,
        HeaderKey::XStep,
        HeaderKey::YStep,
        HeaderKey::NColsOdd,
        HeaderKey::NColsEven,
        HeaderKey::NRows,
        HeaderKey::Operator,
        HeaderKey::SampleId,
        HeaderKey::ScanId,
        HeaderKey::SampleTransformationAngle,
        HeaderKey::SampleTransformationAxis,
        HeaderKey::EulerTransformationAngle,
        HeaderKey::EulerTransformationAxis,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HeaderKey::TemPixPerUm => "TEM_PIXperUM",
            HeaderKey::XStar => "x-star",
            HeaderKey::YStar => "y-star",
            HeaderKey::ZStar => "z-star",
            HeaderKey::WorkingDistance => "WorkingDistance",
            HeaderKey::Grid => "GRID",
            HeaderKey::XStep => "XSTEP",
            HeaderKey::YStep => "YSTEP",
            HeaderKey::NColsOdd => "NCOLS_ODD",
            HeaderKey::NColsEven => "NCOLS_EVEN",
            HeaderKey::NRows => "NROWS",
            HeaderKey::Operator => "OPERATOR",
            HeaderKey::SampleId => "SAMPLEID",
            HeaderKey::ScanId => "SCANID",
            HeaderKey::SampleTransformationAngle => "SampleTransformationAngle",
            HeaderKey::SampleTransformationAxis => "SampleTransformationAxis",
            HeaderKey::EulerTransformationAngle => "EulerTransformationAngle",
            HeaderKey::EulerTransformationAxis => "EulerTransformationAxis",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    pub fn kind(&self) -> HeaderKind {
        match self {
            HeaderKey::NColsOdd | HeaderKey::NColsEven | HeaderKey::NRows => HeaderKind::Int,
            HeaderKey::Grid | HeaderKey::Operator | HeaderKey::SampleId | HeaderKey::ScanId => {
                HeaderKind::Text
            }
            HeaderKey::SampleTransformationAxis | HeaderKey::EulerTransformationAxis => {
                HeaderKind::Floats(3)
            }
            _ => HeaderKind::Float,
        }
    }

    /// Sentinel used when the key is absent. The transformation keys have no
    /// sentinel here; readers substitute their vendor default pair instead.
    pub fn default_value(&self) -> Option<HeaderValue> {
        match self {
            HeaderKey::TemPixPerUm => Some(HeaderValue::Float(1.0)),
            HeaderKey::XStar
            | HeaderKey::YStar
            | HeaderKey::ZStar
            | HeaderKey::WorkingDistance
            | HeaderKey::XStep
            | HeaderKey::YStep => Some(HeaderValue::Float(0.0)),
            HeaderKey::Grid => Some(HeaderValue::Text(GridType::Square.name().to_string())),
            HeaderKey::NColsOdd | HeaderKey::NColsEven | HeaderKey::NRows => {
                Some(HeaderValue::Int(0))
            }
            HeaderKey::Operator | HeaderKey::SampleId | HeaderKey::ScanId => {
                Some(HeaderValue::Text(String::new()))
            }
            HeaderKey::SampleTransformationAngle
            | HeaderKey::SampleTransformationAxis
            | HeaderKey::EulerTransformationAngle
            | HeaderKey::EulerTransformationAxis => None,
        }
    }
}

/// Scan grid layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridType {
    Square,
    Hexagonal,
}

impl GridType {
    pub fn name(&self) -> &'static str {
        match self {
            GridType::Square => "SqrGrid",
            GridType::Hexagonal => "HexGrid",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "SqrGrid" => Some(GridType::Square),
            "HexGrid" => Some(GridType::Hexagonal),
            _ => None,
        }
    }
}

/// Header key/value metadata. Lookups of known keys fall back to the
/// sentinel table in [`HeaderKey::default_value`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    entries: BTreeMap<String, HeaderValue>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: HeaderValue) {
        self.entries.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.entries.get(name)
    }

    pub fn contains(&self, key: HeaderKey) -> bool {
        self.entries.contains_key(key.name())
    }

    /// Value of a known key, or its sentinel default when absent.
    pub fn value(&self, key: HeaderKey) -> Option<HeaderValue> {
        self.entries
            .get(key.name())
            .cloned()
            .or_else(|| key.default_value())
    }

    pub fn float(&self, key: HeaderKey) -> f64 {
        self.value(key).and_then(|v| v.as_f64()).unwrap_or(0.0)
    }

    pub fn int(&self, key: HeaderKey) -> i64 {
        self.value(key).and_then(|v| v.as_i64()).unwrap_or(0)
    }

    pub fn text(&self, key: HeaderKey) -> String {
        self.value(key)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default()
    }

    pub fn grid(&self) -> GridType {
        GridType::from_name(&self.text(HeaderKey::Grid)).unwrap_or(GridType::Square)
    }

    /// Number of scan points the grid dimensions declare. Dimensions whose
    /// product does not fit in `usize` are MalformedHeader.
    pub fn declared_point_count(&self) -> Result<usize, ReadError> {
        let dim = |key: HeaderKey| usize::try_from(self.int(key).max(0)).unwrap_or(usize::MAX);
        let (odd, even, rows) = (
            dim(HeaderKey::NColsOdd),
            dim(HeaderKey::NColsEven),
            dim(HeaderKey::NRows),
        );
        let count = match self.grid() {
            GridType::Square => odd.checked_mul(rows),
            GridType::Hexagonal => rows
                .div_ceil(2)
                .checked_mul(odd)
                .zip((rows / 2).checked_mul(even))
                .and_then(|(a, b)| a.checked_add(b)),
        };
        count.ok_or_else(|| {
            ReadError::MalformedHeader(format!(
                "grid {odd}/{even} columns x {rows} rows overflows the point count"
            ))
        })
    }

    fn transform(&self, angle: HeaderKey, axis: HeaderKey) -> Option<TransformDescriptor> {
        let angle = self.get(angle.name())?.as_f64()? as f32;
        let axis = self.get(axis.name())?.as_floats()?;
        match axis {
            [x, y, z] => Some(TransformDescriptor::new(angle, *x, *y, *z)),
            _ => None,
        }
    }

    /// Sample and euler transforms recorded in the header, if both are present.
    pub fn transforms(&self) -> Option<(TransformDescriptor, TransformDescriptor)> {
        let sample = self.transform(
            HeaderKey::SampleTransformationAngle,
            HeaderKey::SampleTransformationAxis,
        )?;
        let euler = self.transform(
            HeaderKey::EulerTransformationAngle,
            HeaderKey::EulerTransformationAxis,
        )?;
        Some((sample, euler))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &HeaderValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

/// A homogeneous numeric column.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericArray {
    Float(Vec<f32>),
    Int(Vec<i32>),
}

impl NumericArray {
    pub fn len(&self) -> usize {
        match self {
            NumericArray::Float(v) => v.len(),
            NumericArray::Int(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            NumericArray::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            NumericArray::Int(v) => Some(v),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// One ingested EBSD scan.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub header: Header,
    pub phases: PhaseRegistry,
    /// Materialized columns by native name. Every column has `point_count` values.
    pub data: BTreeMap<String, NumericArray>,
    pub point_count: usize,
    pub convention: CoordinateConvention,
    /// Verbatim header text, when the source carried it.
    pub original_header: Option<String>,
}

impl Default for Dataset {
    fn default() -> Self {
        Dataset {
            header: Header::new(),
            phases: PhaseRegistry::new(),
            data: BTreeMap::new(),
            point_count: 0,
            convention: CoordinateConvention::Unknown,
            original_header: None,
        }
    }
}

impl Dataset {
    pub fn column(&self, name: &str) -> Option<&NumericArray> {
        self.data.get(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        *self = Dataset::default();
    }

    /// Replace the columnar section after checking every column against the
    /// point count. On failure the existing data is left untouched.
    ///
    /// The point count is the header's declared count, or the length of the
    /// first column by name when the header declares none.
    pub fn commit_columns(
        &mut self,
        columns: BTreeMap<String, NumericArray>,
    ) -> Result<(), ReadError> {
        let declared = self.header.declared_point_count()?;
        let expected = if declared > 0 {
            declared
        } else {
            columns.values().next().map(NumericArray::len).unwrap_or(0)
        };

        for (name, col) in &columns {
            if col.len() != expected {
                return Err(ReadError::ColumnLengthMismatch(format!(
                    "column '{name}' has {} values, expected {expected}",
                    col.len()
                )));
            }
        }

        self.point_count = expected;
        self.data = columns;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Errors and status codes
// ---------------------------------------------------------------------------

/// Failure category of a read operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingFile,
    MalformedHeader,
    MissingDataSection,
    ColumnLengthMismatch,
    CorruptFamilyRecord,
    UnsupportedSchemaVersion,
    MalformedData,
}

impl ErrorKind {
    /// Nonzero status code reported across the C ABI.
    pub fn code(&self) -> i32 {
        match self {
            ErrorKind::MissingFile => -100,
            ErrorKind::MalformedHeader => -200,
            ErrorKind::MissingDataSection => -300,
            ErrorKind::ColumnLengthMismatch => -400,
            ErrorKind::CorruptFamilyRecord => -500,
            ErrorKind::UnsupportedSchemaVersion => -600,
            ErrorKind::MalformedData => -700,
        }
    }
}

/// Errors that can occur while ingesting a dataset.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReadError {
    #[error("missing file: {0}")]
    MissingFile(String),
    #[error("malformed header: {0}")]
    MalformedHeader(String),
    #[error("missing data section: {0}")]
    MissingDataSection(String),
    #[error("column length mismatch: {0}")]
    ColumnLengthMismatch(String),
    #[error("corrupt HKL family record: {0}")]
    CorruptFamilyRecord(String),
    #[error("unsupported schema version: {0}")]
    UnsupportedSchemaVersion(String),
    #[error("malformed data: {0}")]
    MalformedData(String),
}

impl ReadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReadError::MissingFile(_) => ErrorKind::MissingFile,
            ReadError::MalformedHeader(_) => ErrorKind::MalformedHeader,
            ReadError::MissingDataSection(_) => ErrorKind::MissingDataSection,
            ReadError::ColumnLengthMismatch(_) => ErrorKind::ColumnLengthMismatch,
            ReadError::CorruptFamilyRecord(_) => ErrorKind::CorruptFamilyRecord,
            ReadError::UnsupportedSchemaVersion(_) => ErrorKind::UnsupportedSchemaVersion,
            ReadError::MalformedData(_) => ErrorKind::MalformedData,
        }
    }

    pub fn code(&self) -> i32 {
        self.kind().code()
    }
}

/// Status code of a read result: 0 on success, the error's code otherwise.
pub fn status<T>(result: &Result<T, ReadError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_header(grid: &str, odd: i64, even: i64, rows: i64) -> Header {
        let mut h = Header::new();
        h.insert("GRID", HeaderValue::Text(grid.into()));
        h.insert("NCOLS_ODD", HeaderValue::Int(odd));
        h.insert("NCOLS_EVEN", HeaderValue::Int(even));
        h.insert("NROWS", HeaderValue::Int(rows));
        h
    }

    #[test]
    fn test_defaults_for_absent_keys() {
        let h = Header::new();
        assert_eq!(h.float(HeaderKey::TemPixPerUm), 1.0);
        assert_eq!(h.float(HeaderKey::XStep), 0.0);
        assert_eq!(h.int(HeaderKey::NRows), 0);
        assert_eq!(h.text(HeaderKey::Operator), "");
        assert_eq!(h.grid(), GridType::Square);
        assert!(h.transforms().is_none());
    }

    #[test]
    fn test_every_key_resolves() {
        for key in HeaderKey::ALL {
            assert_eq!(HeaderKey::from_name(key.name()), Some(key));
            let has_default = key.default_value().is_some();
            let is_transform = matches!(key.kind(), HeaderKind::Floats(_))
                || key.name().ends_with("TransformationAngle");
            assert!(has_default != is_transform, "{}", key.name());
        }
    }

    #[test]
    fn test_point_count_square_and_hex() {
        assert_eq!(grid_header("SqrGrid", 4, 4, 3).declared_point_count().unwrap(), 12);
        // rows 0 and 2 use NCOLS_ODD, row 1 uses NCOLS_EVEN
        assert_eq!(grid_header("HexGrid", 5, 4, 3).declared_point_count().unwrap(), 14);
    }

    #[test]
    fn test_point_count_overflow_is_malformed() {
        let err = grid_header("SqrGrid", i64::MAX, 0, 4)
            .declared_point_count()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedHeader);

        let err = grid_header("HexGrid", i64::MAX, i64::MAX, 4)
            .declared_point_count()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedHeader);
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(HeaderKind::Int.parse(" 42 "), Some(HeaderValue::Int(42)));
        assert_eq!(HeaderKind::Int.parse("4.2"), None);
        assert_eq!(
            HeaderKind::Floats(3).parse("0 1 0"),
            Some(HeaderValue::Floats(vec![0.0, 1.0, 0.0]))
        );
        assert_eq!(HeaderKind::Floats(3).parse("0 1"), None);
    }

    #[test]
    fn test_kind_coerce() {
        assert_eq!(
            HeaderKind::Int.coerce(HeaderValue::Float(7.0)),
            Some(HeaderValue::Int(7))
        );
        assert_eq!(HeaderKind::Int.coerce(HeaderValue::Float(7.5)), None);
        assert_eq!(
            HeaderKind::Float.coerce(HeaderValue::Text("0.25".into())),
            Some(HeaderValue::Float(0.25))
        );
    }

    #[test]
    fn test_commit_rejects_mismatch_and_keeps_data() {
        let mut ds = Dataset {
            header: grid_header("SqrGrid", 2, 2, 1),
            ..Dataset::default()
        };

        let mut cols = BTreeMap::new();
        cols.insert("CI".to_string(), NumericArray::Float(vec![0.1, 0.2]));
        cols.insert("Fit".to_string(), NumericArray::Float(vec![1.0]));
        let err = ds.commit_columns(cols).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ColumnLengthMismatch);
        assert!(ds.data.is_empty());

        let mut cols = BTreeMap::new();
        cols.insert("CI".to_string(), NumericArray::Float(vec![0.1, 0.2]));
        ds.commit_columns(cols).unwrap();
        assert_eq!(ds.point_count, 2);
    }

    #[test]
    fn test_commit_without_declared_count() {
        let mut ds = Dataset::default();
        let mut cols = BTreeMap::new();
        cols.insert("A".to_string(), NumericArray::Int(vec![1, 2, 3]));
        cols.insert("B".to_string(), NumericArray::Float(vec![1.0, 2.0, 3.0]));
        ds.commit_columns(cols).unwrap();
        assert_eq!(ds.point_count, 3);
    }

    #[test]
    fn test_status_codes() {
        let ok: Result<(), ReadError> = Ok(());
        assert_eq!(status(&ok), 0);
        let err: Result<(), ReadError> = Err(ReadError::MissingFile("x".into()));
        assert_eq!(status(&err), -100);
        assert_ne!(
            ErrorKind::MalformedHeader.code(),
            ErrorKind::MalformedData.code()
        );
    }
}
