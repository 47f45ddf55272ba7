//! `.ang` data block: one whitespace-separated row per scan point.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::dataset::{NumericArray, ReadError};

/// TSL column order for the fixed leading fields of a data row.
pub const COLUMN_NAMES: [&str; 10] = [
    "Phi1",
    "Phi",
    "Phi2",
    "X Position",
    "Y Position",
    "Image Quality",
    "Confidence Index",
    "PhaseData",
    "SEM Signal",
    "Fit",
];

/// Integer-valued column.
pub const PHASE_DATA: &str = "PhaseData";

/// Name of the field at `index`. Fields past the known layout are `Column N`
/// (1-based).
pub fn column_name(index: usize) -> String {
    COLUMN_NAMES
        .get(index)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("Column {}", index + 1))
}

/// Columns present in a data block, derived from its first row.
pub fn available_columns(data: &str) -> BTreeSet<String> {
    data.lines()
        .find(|l| !l.trim().is_empty())
        .map(|l| (0..l.split_whitespace().count()).map(column_name).collect())
        .unwrap_or_default()
}

/// Parsed rows: the selected columns plus the total row count.
#[derive(Debug, Default)]
pub struct DataBlock {
    pub columns: BTreeMap<String, NumericArray>,
    pub row_count: usize,
}

enum Builder {
    Float(Vec<f32>),
    Int(Vec<i32>),
}

/// Parse every data row, keeping only the fields named in `wanted`.
///
/// Every row must have as many fields as the first. A short or long row is
/// a `ColumnLengthMismatch`; a non-numeric field is `MalformedData`.
pub fn parse_rows(data: &str, wanted: &BTreeSet<String>) -> Result<DataBlock, ReadError> {
    let mut width: Option<usize> = None;
    let mut selected: Vec<(usize, String, Builder)> = Vec::new();
    let mut row_count = 0;

    for (line_no, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();

        let expected = *width.get_or_insert_with(|| {
            selected = (0..fields.len())
                .map(|i| (i, column_name(i)))
                .filter(|(_, name)| wanted.contains(name))
                .map(|(i, name)| {
                    let builder = if name == PHASE_DATA {
                        Builder::Int(Vec::new())
                    } else {
                        Builder::Float(Vec::new())
                    };
                    (i, name, builder)
                })
                .collect();
            fields.len()
        });

        if fields.len() != expected {
            return Err(ReadError::ColumnLengthMismatch(format!(
                "data line {}: {} fields, expected {expected}",
                line_no + 1,
                fields.len()
            )));
        }

        for (i, name, builder) in selected.iter_mut() {
            let token = fields[*i];
            let bad = || {
                ReadError::MalformedData(format!(
                    "data line {}: {name} value '{token}' is not numeric",
                    line_no + 1
                ))
            };
            match builder {
                Builder::Float(v) => v.push(token.parse().map_err(|_| bad())?),
                Builder::Int(v) => v.push(parse_int(token).ok_or_else(bad)?),
            }
        }
        row_count += 1;
    }

    let columns = selected
        .into_iter()
        .map(|(_, name, builder)| {
            let array = match builder {
                Builder::Float(v) => NumericArray::Float(v),
                Builder::Int(v) => NumericArray::Int(v),
            };
            (name, array)
        })
        .collect();

    Ok(DataBlock { columns, row_count })
}

/// Integers are sometimes written with a trailing `.0`.
fn parse_int(token: &str) -> Option<i32> {
    token.parse().ok().or_else(|| {
        let f: f32 = token.parse().ok()?;
        (f.fract() == 0.0).then_some(f as i32)
    })
}

/// Render columns back into data rows in TSL field order. Every column must
/// hold `rows` values.
pub fn write_rows(
    columns: &BTreeMap<String, NumericArray>,
    rows: usize,
) -> Result<String, ReadError> {
    if let Some((name, col)) = columns.iter().find(|(_, c)| c.len() != rows) {
        return Err(ReadError::ColumnLengthMismatch(format!(
            "column '{name}' has {} values, expected {rows}",
            col.len()
        )));
    }

    let mut ordered: Vec<(&String, &NumericArray)> = columns.iter().collect();
    ordered.sort_by_key(|(n, _)| {
        COLUMN_NAMES
            .iter()
            .position(|c| c == n)
            .unwrap_or(COLUMN_NAMES.len())
    });

    let mut out = String::new();
    for row in 0..rows {
        let fields: Vec<String> = ordered
            .iter()
            .map(|(_, col)| match col {
                NumericArray::Float(v) => v[row].to_string(),
                NumericArray::Int(v) => v[row].to_string(),
            })
            .collect();
        out.push_str("  ");
        out.push_str(&fields.join(" "));
        out.push('\n');
    }
    Ok(out)
}
