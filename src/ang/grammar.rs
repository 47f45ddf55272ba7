//! `.ang` header grammar.
//!
//! The header is the contiguous run of `#`-prefixed lines at the top of the
//! file. Each line is `# <KEY>[:] <value...>`; the key ends at the first
//! colon or whitespace. Phase blocks start at a `Phase` line and collect the
//! phase keys that follow until the next `Phase` line or a known top-level
//! key closes them. Unknown keys (`PointGroupID`, ...) leave the block open.
//!
//! The grammar is standalone so a container's `OriginalFile` text can be
//! parsed without a file on disk.

use crate::types::dataset::{Header, HeaderKey, HeaderValue, ReadError};
use crate::types::phase::{CrystalSymmetry, HklFamily, LatticeConstants, Phase};

/// Header line marker.
pub const HEADER_MARKER: char = '#';

/// Header fields and phases parsed from header text.
#[derive(Debug, Clone, Default)]
pub struct ParsedHeader {
    pub header: Header,
    /// Phases in file order.
    pub phases: Vec<Phase>,
}

/// Whether a line belongs to the header block.
pub fn is_header_line(line: &str) -> bool {
    line.trim_start().starts_with(HEADER_MARKER)
}

/// Split a header line into `(key, value)`. Returns `None` for a bare `#`.
pub fn split_header_line(line: &str) -> Option<(&str, &str)> {
    let body = line
        .trim_start()
        .strip_prefix(HEADER_MARKER)?
        .trim();
    if body.is_empty() {
        return None;
    }

    let key_end = body
        .find(|c: char| c == ':' || c.is_whitespace())
        .unwrap_or(body.len());
    let key = &body[..key_end];
    let rest = body[key_end..].trim_start();
    let value = rest.strip_prefix(':').unwrap_or(rest).trim();
    Some((key, value))
}

/// Byte offset where the data block starts (the first non-header line), or
/// `text.len()` when the text is all header.
pub fn header_end(text: &str) -> usize {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if !is_header_line(line) && !line.trim().is_empty() {
            return offset;
        }
        offset += line.len();
    }
    text.len()
}

enum PhaseKey {
    Phase,
    MaterialName,
    Formula,
    Info,
    Symmetry,
    LatticeConstants,
    NumberFamilies,
    HklFamilies,
    ElasticConstants,
    Categories,
}

impl PhaseKey {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "Phase" => Some(PhaseKey::Phase),
            "MaterialName" => Some(PhaseKey::MaterialName),
            "Formula" => Some(PhaseKey::Formula),
            "Info" => Some(PhaseKey::Info),
            "Symmetry" => Some(PhaseKey::Symmetry),
            "LatticeConstants" => Some(PhaseKey::LatticeConstants),
            "NumberFamilies" => Some(PhaseKey::NumberFamilies),
            "hklFamilies" => Some(PhaseKey::HklFamilies),
            "ElasticConstants" => Some(PhaseKey::ElasticConstants),
            // TSL writes the first category glued to the key: `Categories1 1 1 1 1`
            k if k.starts_with("Categories") => Some(PhaseKey::Categories),
            _ => None,
        }
    }
}

/// A phase under construction together with its declared family count.
struct OpenPhase {
    phase: Phase,
    declared_families: Option<usize>,
}

impl OpenPhase {
    fn finish(self) -> Result<Phase, ReadError> {
        if let Some(n) = self.declared_families {
            if n != self.phase.families.len() {
                return Err(ReadError::CorruptFamilyRecord(format!(
                    "phase {} declares {n} HKL families but lists {}",
                    self.phase.id,
                    self.phase.families.len()
                )));
            }
        }
        Ok(self.phase)
    }
}

/// Parse the header block at the start of `text`. Parsing stops at the
/// first data line.
pub fn parse_header(text: &str) -> Result<ParsedHeader, ReadError> {
    let mut parsed = ParsedHeader::default();
    let mut current: Option<OpenPhase> = None;
    let mut saw_header_line = false;

    for (line_no, line) in text.lines().enumerate() {
        if !is_header_line(line) {
            if line.trim().is_empty() {
                continue;
            }
            break;
        }
        saw_header_line = true;

        let Some((key, value)) = split_header_line(line) else {
            continue;
        };

        match PhaseKey::from_key(key) {
            Some(PhaseKey::Phase) => {
                if let Some(open) = current.take() {
                    parsed.phases.push(open.finish()?);
                }
                let id: i32 = value.parse().map_err(|_| {
                    ReadError::MalformedHeader(format!(
                        "line {}: phase id '{value}' is not an integer",
                        line_no + 1
                    ))
                })?;
                current = Some(OpenPhase {
                    phase: Phase::new(id),
                    declared_families: None,
                });
            }
            Some(phase_key) => {
                let open = current.as_mut().ok_or_else(|| {
                    ReadError::MalformedHeader(format!(
                        "line {}: '{key}' appears outside a Phase block",
                        line_no + 1
                    ))
                })?;
                apply_phase_key(open, phase_key, key, value, line_no + 1)?;
            }
            None => {
                if HeaderKey::from_name(key).is_some() {
                    if let Some(open) = current.take() {
                        parsed.phases.push(open.finish()?);
                    }
                }
                parsed.header.insert(key, parse_header_value(key, value, line_no + 1)?);
            }
        }
    }

    if let Some(open) = current.take() {
        parsed.phases.push(open.finish()?);
    }

    if !saw_header_line {
        return Err(ReadError::MalformedHeader(
            "no '#' header lines before the data block".into(),
        ));
    }

    Ok(parsed)
}

fn parse_header_value(key: &str, value: &str, line_no: usize) -> Result<HeaderValue, ReadError> {
    match HeaderKey::from_name(key) {
        Some(known) => known.kind().parse(value).ok_or_else(|| {
            ReadError::MalformedHeader(format!(
                "line {line_no}: value '{value}' for {key} is not a valid {:?}",
                known.kind()
            ))
        }),
        None => Ok(HeaderValue::Text(value.to_string())),
    }
}

fn apply_phase_key(
    open: &mut OpenPhase,
    key: PhaseKey,
    name: &str,
    value: &str,
    line_no: usize,
) -> Result<(), ReadError> {
    let id = open.phase.id;
    let malformed = |what: &str| {
        ReadError::MalformedHeader(format!("line {line_no}: phase {id} {what}: '{value}'"))
    };

    match key {
        PhaseKey::Phase => {}
        PhaseKey::MaterialName => open.phase.material_name = value.to_string(),
        PhaseKey::Formula => open.phase.formula = value.to_string(),
        PhaseKey::Info => open.phase.info = value.to_string(),
        PhaseKey::Symmetry => {
            let code: u32 = value.parse().map_err(|_| malformed("symmetry"))?;
            open.phase.symmetry = CrystalSymmetry::from_code(code);
        }
        PhaseKey::LatticeConstants => {
            let values: Vec<f32> = value
                .split_whitespace()
                .map(|t| t.parse())
                .collect::<Result<_, _>>()
                .map_err(|_| malformed("lattice constants"))?;
            open.phase.lattice_constants =
                LatticeConstants::from_slice(&values).ok_or_else(|| malformed("lattice constants"))?;
        }
        PhaseKey::NumberFamilies => {
            let n: usize = value.parse().map_err(|_| malformed("family count"))?;
            open.declared_families = Some(n);
        }
        PhaseKey::HklFamilies => open.phase.families.push(HklFamily::parse_text(value)?),
        // Elastic constants are not part of the phase model.
        PhaseKey::ElasticConstants => {}
        PhaseKey::Categories => {
            let glued = name.strip_prefix("Categories").unwrap_or("");
            open.phase.categories = std::iter::once(glued)
                .filter(|t| !t.is_empty())
                .chain(value.split_whitespace())
                .map(|t| t.parse())
                .collect::<Result<_, _>>()
                .map_err(|_| malformed("categories"))?;
        }
    }
    Ok(())
}

/// Render a header and phases back into `.ang` header text.
pub fn write_header(header: &Header, phases: &[Phase]) -> String {
    let mut out = String::new();
    for (key, value) in header.iter() {
        if HeaderKey::from_name(key).is_none() {
            continue;
        }
        out.push_str(&format!("# {key}: {}\n", format_value(value)));
    }
    for phase in phases {
        let lc = phase.lattice_constants.to_array();
        out.push_str(&format!("# Phase {}\n", phase.id));
        out.push_str(&format!("# MaterialName {}\n", phase.material_name));
        out.push_str(&format!("# Formula {}\n", phase.formula));
        out.push_str(&format!("# Info {}\n", phase.info));
        out.push_str(&format!("# Symmetry {}\n", phase.symmetry.code()));
        out.push_str(&format!(
            "# LatticeConstants {} {} {} {} {} {}\n",
            lc[0], lc[1], lc[2], lc[3], lc[4], lc[5]
        ));
        out.push_str(&format!("# NumberFamilies {}\n", phase.families.len()));
        for f in &phase.families {
            out.push_str(&format!(
                "# hklFamilies {} {} {} {} {} {}\n",
                f.h, f.k, f.l, f.s1, f.diffraction_intensity, f.s2
            ));
        }
        if !phase.categories.is_empty() {
            let cats: Vec<String> = phase.categories.iter().map(|c| c.to_string()).collect();
            out.push_str(&format!("# Categories {}\n", cats.join(" ")));
        }
    }
    out
}

fn format_value(value: &HeaderValue) -> String {
    match value {
        HeaderValue::Int(v) => v.to_string(),
        HeaderValue::Float(v) => v.to_string(),
        HeaderValue::Text(s) => s.clone(),
        HeaderValue::Floats(v) => v
            .iter()
            .map(|x| x.to_string())
            .collect::<Vec<_>>()
            .join(" "),
    }
}
