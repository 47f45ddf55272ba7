//! Reader for `.ang` scans stored inside a hierarchical container.
//!
//! Layout under the target index:
//!
//! ```text
//! /<index>/Header/<Key>                         scalar (array for axis keys)
//! /<index>/Header/OriginalFile                  original `.ang` header text
//! /<index>/Header/Phases/<n>/...                one group per phase
//! /<index>/Header/Phases/<n>/HKLFamilies/<m>    24-byte family record
//! /<index>/Data/<column>                        numeric array
//! ```
//!
//! Header keys are read individually. A header group with none of the known
//! keys is parsed from `OriginalFile` with the `.ang` grammar instead.

use std::collections::{BTreeMap, BTreeSet};

use super::{tag_convention, tsl_defaults, FormatReader, ReadOptions};
use crate::ang::{header_end, parse_header};
use crate::container::{layout, numeric_children, ContainerAccess, GroupGuard, Scalar};
use crate::ops::projection::effective_read_set;
use crate::types::dataset::{
    Dataset, Header, HeaderKey, HeaderKind, HeaderValue, NumericArray, ReadError,
};
use crate::types::phase::{
    decode_families, CrystalSymmetry, HklFamily, LatticeConstants, Phase, PhaseRegistry,
    HKL_RECORD_SIZE,
};
use crate::types::transform::TransformDescriptor;

/// Reader for one indexed scan of a container.
pub struct H5AngReader<C: ContainerAccess> {
    container: C,
    index: String,
    options: ReadOptions,
    vendor_defaults: (TransformDescriptor, TransformDescriptor),
    dataset: Dataset,
    header_read: bool,
}

impl<C: ContainerAccess> H5AngReader<C> {
    pub fn new(container: C, index: impl Into<String>) -> Self {
        H5AngReader {
            container,
            index: index.into(),
            options: ReadOptions::default(),
            vendor_defaults: tsl_defaults(),
            dataset: Dataset::default(),
            header_read: false,
        }
    }

    /// Target another scan of the same container.
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self.header_read = false;
        self
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

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn container(&self) -> &C {
        &self.container
    }

    fn entry_path(&self) -> String {
        format!("/{}", self.index.trim_start_matches('/'))
    }
}

impl<C: ContainerAccess> FormatReader for H5AngReader<C> {
    fn read_header(&mut self) -> Result<(), ReadError> {
        self.dataset.clear();
        self.header_read = false;

        check_file_version(&self.container)?;

        let entry_path = self.entry_path();
        let entry = GroupGuard::open(&self.container, &entry_path)
            .map_err(|e| ReadError::MissingFile(format!("scan '{}': {e}", self.index)))?;
        let header = entry
            .open_child(layout::HEADER)
            .map_err(|e| ReadError::MalformedHeader(e.to_string()))?;

        let scan = read_header_group(&header)?;
        drop(header);
        drop(entry);

        self.dataset.header = scan.header;
        self.dataset.phases = PhaseRegistry::try_from(scan.phases)?;
        self.dataset.original_header = scan.original;
        self.dataset.convention = tag_convention(&self.dataset, self.vendor_defaults);
        self.header_read = true;

        log::debug!(
            "{entry_path}: {} header keys, {} phases, {} convention",
            self.dataset.header.len(),
            self.dataset.phases.len(),
            self.dataset.convention.name()
        );
        Ok(())
    }

    fn read_data(&mut self) -> Result<(), ReadError> {
        if !self.header_read {
            self.read_header()?;
        }

        let entry_path = self.entry_path();
        let entry = GroupGuard::open(&self.container, &entry_path)
            .map_err(|e| ReadError::MissingFile(format!("scan '{}': {e}", self.index)))?;
        let data = entry
            .open_child(layout::DATA)
            .map_err(|e| ReadError::MissingDataSection(e.to_string()))?;

        let available: BTreeSet<String> = data
            .children()
            .map_err(|e| ReadError::MissingDataSection(e.to_string()))?
            .into_iter()
            .collect();
        let wanted = effective_read_set(&self.options.arrays, self.options.read_all, &available);

        let mut columns = BTreeMap::new();
        for name in wanted {
            let array = data.array(&name).map_err(|e| {
                ReadError::MalformedData(format!("column '{name}': {e}"))
            })?;
            columns.insert(name, array);
        }
        drop(data);
        drop(entry);

        let selected = columns.len();
        self.dataset.commit_columns(columns)?;

        log::info!(
            "{entry_path}: read {selected} of {} columns, {} points",
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

fn check_file_version<C: ContainerAccess>(container: &C) -> Result<(), ReadError> {
    let root = GroupGuard::open(container, "/")
        .map_err(|e| ReadError::MissingFile(format!("container root: {e}")))?;
    if !root.contains(layout::FILE_VERSION) {
        return Ok(());
    }

    let version = root
        .scalar(layout::FILE_VERSION)
        .ok()
        .and_then(|s| s.as_i64())
        .ok_or_else(|| {
            ReadError::UnsupportedSchemaVersion(format!(
                "{} is not an integer",
                layout::FILE_VERSION
            ))
        })?;
    if version > layout::MAX_FILE_VERSION {
        return Err(ReadError::UnsupportedSchemaVersion(format!(
            "file version {version}, newest supported is {}",
            layout::MAX_FILE_VERSION
        )));
    }
    Ok(())
}

struct ScanHeader {
    header: Header,
    phases: Vec<Phase>,
    original: Option<String>,
}

fn scalar_value(scalar: Scalar) -> HeaderValue {
    match scalar {
        Scalar::Int(v) => HeaderValue::Int(v),
        Scalar::Float(v) => HeaderValue::Float(v),
        Scalar::Str(s) => HeaderValue::Text(s),
    }
}

fn floats(array: NumericArray) -> Vec<f32> {
    match array {
        NumericArray::Float(v) => v,
        NumericArray::Int(v) => v.into_iter().map(|x| x as f32).collect(),
    }
}

fn ints(array: NumericArray) -> Vec<i32> {
    match array {
        NumericArray::Int(v) => v,
        NumericArray::Float(v) => v.into_iter().map(|x| x as i32).collect(),
    }
}

fn read_header_group<C: ContainerAccess + ?Sized>(
    group: &GroupGuard<'_, C>,
) -> Result<ScanHeader, ReadError> {
    let original = group
        .scalar(layout::ORIGINAL_FILE)
        .ok()
        .and_then(|s| s.as_str().map(str::to_string));

    let mut header = Header::new();
    let mut found_known = false;
    for key in HeaderKey::ALL {
        if !group.contains(key.name()) {
            continue;
        }
        found_known = true;

        let raw = match key.kind() {
            HeaderKind::Floats(_) => group.array(key.name()).map(|a| HeaderValue::Floats(floats(a))),
            _ => group.scalar(key.name()).map(scalar_value),
        }
        .map_err(|e| ReadError::MalformedHeader(e.to_string()))?;

        let value = key.kind().coerce(raw).ok_or_else(|| {
            ReadError::MalformedHeader(format!(
                "header key {} is not a valid {:?}",
                key.name(),
                key.kind()
            ))
        })?;
        header.insert(key.name(), value);
    }

    let mut fallback_phases = Vec::new();
    if found_known {
        let children = group
            .children()
            .map_err(|e| ReadError::MalformedHeader(e.to_string()))?;
        for name in children {
            if HeaderKey::from_name(&name).is_some()
                || name == layout::ORIGINAL_FILE
                || name == layout::PHASES
            {
                continue;
            }
            match group.scalar(&name) {
                Ok(s) => header.insert(name, scalar_value(s)),
                Err(e) => log::debug!("skipping header entry '{name}': {e}"),
            }
        }
    } else {
        let text = original.as_deref().ok_or_else(|| {
            ReadError::MalformedHeader(format!(
                "{}: no header keys and no {}",
                group.path(),
                layout::ORIGINAL_FILE
            ))
        })?;
        log::info!(
            "{}: no individual header keys, parsing {}",
            group.path(),
            layout::ORIGINAL_FILE
        );
        let parsed = parse_header(&text[..header_end(text)])?;
        header = parsed.header;
        fallback_phases = parsed.phases;
    }

    let phases = if group.contains(layout::PHASES) {
        let phases_group = group
            .open_child(layout::PHASES)
            .map_err(|e| ReadError::MalformedHeader(e.to_string()))?;
        read_phases(&phases_group)?
    } else {
        fallback_phases
    };

    Ok(ScanHeader {
        header,
        phases,
        original,
    })
}

/// Phases in numeric child order.
fn read_phases<C: ContainerAccess + ?Sized>(
    group: &GroupGuard<'_, C>,
) -> Result<Vec<Phase>, ReadError> {
    let children = group
        .children()
        .map_err(|e| ReadError::MalformedHeader(e.to_string()))?;

    numeric_children(&children)
        .into_iter()
        .map(|(number, name)| {
            let phase_group = group
                .open_child(&name)
                .map_err(|e| ReadError::MalformedHeader(e.to_string()))?;
            read_phase(&phase_group, number)
        })
        .collect()
}

fn read_phase<C: ContainerAccess + ?Sized>(
    group: &GroupGuard<'_, C>,
    number: i64,
) -> Result<Phase, ReadError> {
    let malformed = |what: &str, e: &dyn std::fmt::Display| {
        ReadError::MalformedHeader(format!("{}: {what}: {e}", group.path()))
    };
    let text = |name: &str| -> Result<String, ReadError> {
        if !group.contains(name) {
            return Ok(String::new());
        }
        match group.scalar(name).map_err(|e| malformed(name, &e))? {
            Scalar::Str(s) => Ok(s),
            Scalar::Int(v) => Ok(v.to_string()),
            Scalar::Float(v) => Ok(v.to_string()),
        }
    };
    let int = |name: &str| -> Result<Option<i64>, ReadError> {
        if !group.contains(name) {
            return Ok(None);
        }
        let scalar = group.scalar(name).map_err(|e| malformed(name, &e))?;
        scalar
            .as_i64()
            .map(Some)
            .ok_or_else(|| malformed(name, &"not an integer"))
    };

    let id = int(layout::PHASE)?.unwrap_or(number);
    let mut phase = Phase::new(
        i32::try_from(id).map_err(|e| malformed(layout::PHASE, &e))?,
    );
    phase.material_name = text(layout::MATERIAL_NAME)?;
    phase.formula = text(layout::FORMULA)?;
    phase.info = text(layout::INFO)?;

    if let Some(code) = int(layout::SYMMETRY)? {
        let code = u32::try_from(code).map_err(|e| malformed(layout::SYMMETRY, &e))?;
        phase.symmetry = CrystalSymmetry::from_code(code);
    }

    if group.contains(layout::LATTICE_CONSTANTS) {
        let values = group
            .array(layout::LATTICE_CONSTANTS)
            .map(floats)
            .map_err(|e| malformed(layout::LATTICE_CONSTANTS, &e))?;
        phase.lattice_constants = LatticeConstants::from_slice(&values).ok_or_else(|| {
            malformed(
                layout::LATTICE_CONSTANTS,
                &format!("expected 6 values, got {}", values.len()),
            )
        })?;
    }

    if group.contains(layout::CATEGORIES) {
        phase.categories = group
            .array(layout::CATEGORIES)
            .map(ints)
            .map_err(|e| malformed(layout::CATEGORIES, &e))?;
    }

    let declared = int(layout::NUMBER_HKL_FAMILIES)?
        .map(|n| usize::try_from(n).map_err(|e| malformed(layout::NUMBER_HKL_FAMILIES, &e)))
        .transpose()?;

    if group.contains(layout::HKL_FAMILIES) {
        let families = group
            .open_child(layout::HKL_FAMILIES)
            .map_err(|e| malformed(layout::HKL_FAMILIES, &e))?;
        phase.families = read_families(&families, declared)?;
    } else if declared.unwrap_or(0) > 0 {
        log::warn!(
            "{}: declares {} HKL families but has no {} group",
            group.path(),
            declared.unwrap_or(0),
            layout::HKL_FAMILIES
        );
    }

    Ok(phase)
}

/// Concatenate the family records in numeric order and decode them.
fn read_families<C: ContainerAccess + ?Sized>(
    group: &GroupGuard<'_, C>,
    declared: Option<usize>,
) -> Result<Vec<HklFamily>, ReadError> {
    let children = group
        .children()
        .map_err(|e| ReadError::CorruptFamilyRecord(e.to_string()))?;
    let records = numeric_children(&children);

    let mut stream = Vec::with_capacity(records.len() * HKL_RECORD_SIZE);
    for (_, name) in &records {
        let bytes = group
            .record(name)
            .map_err(|e| ReadError::CorruptFamilyRecord(e.to_string()))?;
        stream.extend_from_slice(&bytes);
    }

    if stream.is_empty() {
        if declared.unwrap_or(0) > 0 {
            log::warn!(
                "{}: no HKL family records, declared {}",
                group.path(),
                declared.unwrap_or(0)
            );
        }
        return Ok(Vec::new());
    }

    decode_families(&stream, declared.unwrap_or(records.len()))
}
