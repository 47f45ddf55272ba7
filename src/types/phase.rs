//! Crystallographic phase model: phases, their HKL reflection families, and
//! the id-ordered registry that owns them.
//!
//! HKL family record (24 bytes, little-endian, fixed field order):
//! - 4 bytes: h (i32)
//! - 4 bytes: k (i32)
//! - 4 bytes: l (i32)
//! - 4 bytes: s1 (i32)
//! - 4 bytes: diffraction intensity (f32)
//! - 4 bytes: s2 (i32)

use super::dataset::ReadError;

/// Size in bytes of one encoded [`HklFamily`] record.
pub const HKL_RECORD_SIZE: usize = 24;

/// One reflection family (plane family) observed for a phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HklFamily {
    pub h: i32,
    pub k: i32,
    pub l: i32,
    /// Whether the family is used in indexing (TSL "solution" flag).
    pub s1: i32,
    pub diffraction_intensity: f32,
    pub s2: i32,
}

impl HklFamily {
    /// Decode one record from the front of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, ReadError> {
        if bytes.len() < HKL_RECORD_SIZE {
            return Err(ReadError::CorruptFamilyRecord(format!(
                "HKL family record needs {HKL_RECORD_SIZE} bytes, got {}",
                bytes.len()
            )));
        }

        let word = |offset: usize| -> [u8; 4] {
            [
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ]
        };

        Ok(HklFamily {
            h: i32::from_le_bytes(word(0)),
            k: i32::from_le_bytes(word(4)),
            l: i32::from_le_bytes(word(8)),
            s1: i32::from_le_bytes(word(12)),
            diffraction_intensity: f32::from_le_bytes(word(16)),
            s2: i32::from_le_bytes(word(20)),
        })
    }

    /// Encode into the fixed 24-byte record layout.
    pub fn encode(&self) -> [u8; HKL_RECORD_SIZE] {
        let mut out = [0u8; HKL_RECORD_SIZE];
        out[0..4].copy_from_slice(&self.h.to_le_bytes());
        out[4..8].copy_from_slice(&self.k.to_le_bytes());
        out[8..12].copy_from_slice(&self.l.to_le_bytes());
        out[12..16].copy_from_slice(&self.s1.to_le_bytes());
        out[16..20].copy_from_slice(&self.diffraction_intensity.to_le_bytes());
        out[20..24].copy_from_slice(&self.s2.to_le_bytes());
        out
    }

    /// Parse the value part of a `hklFamilies` header line:
    /// `h k l s1 intensity [s2]`. A missing `s2` reads as 0.
    pub fn parse_text(value: &str) -> Result<Self, ReadError> {
        let fields: Vec<&str> = value.split_whitespace().collect();
        if fields.len() < 5 {
            return Err(ReadError::CorruptFamilyRecord(format!(
                "hklFamilies line needs at least 5 fields, got {}: '{}'",
                fields.len(),
                value.trim()
            )));
        }

        let int = |i: usize| -> Result<i32, ReadError> {
            fields[i].parse().map_err(|_| {
                ReadError::CorruptFamilyRecord(format!(
                    "hklFamilies field {i} is not an integer: '{}'",
                    fields[i]
                ))
            })
        };
        let intensity: f32 = fields[4].parse().map_err(|_| {
            ReadError::CorruptFamilyRecord(format!(
                "hklFamilies intensity is not a number: '{}'",
                fields[4]
            ))
        })?;

        Ok(HklFamily {
            h: int(0)?,
            k: int(1)?,
            l: int(2)?,
            s1: int(3)?,
            diffraction_intensity: intensity,
            s2: if fields.len() > 5 { int(5)? } else { 0 },
        })
    }
}

/// Decode `count` consecutive records from a byte stream.
///
/// Fails with `CorruptFamilyRecord` when the stream is shorter than
/// `count * HKL_RECORD_SIZE`. Trailing bytes beyond that are ignored.
pub fn decode_families(stream: &[u8], count: usize) -> Result<Vec<HklFamily>, ReadError> {
    let needed = count * HKL_RECORD_SIZE;
    if stream.len() < needed {
        return Err(ReadError::CorruptFamilyRecord(format!(
            "expected {count} HKL families ({needed} bytes), stream has {} bytes",
            stream.len()
        )));
    }

    stream[..needed]
        .chunks_exact(HKL_RECORD_SIZE)
        .map(HklFamily::decode)
        .collect()
}

/// Laue group of a phase, using the TSL symmetry codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrystalSymmetry {
    /// -1
    Triclinic,
    /// 2/m
    Monoclinic,
    /// 2/m, alternate TSL setting (c unique)
    MonoclinicC,
    /// 2/m, alternate TSL setting (a unique)
    MonoclinicA,
    /// mmm
    Orthorhombic,
    /// -3
    TrigonalLow,
    /// -3m
    TrigonalHigh,
    /// 4/m
    TetragonalLow,
    /// 4/mmm
    TetragonalHigh,
    /// 6/m
    HexagonalLow,
    /// 6/mmm
    HexagonalHigh,
    /// m-3
    CubicLow,
    /// m-3m
    CubicHigh,
    Unknown(u32),
}

impl CrystalSymmetry {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => CrystalSymmetry::Triclinic,
            2 => CrystalSymmetry::Monoclinic,
            20 => CrystalSymmetry::MonoclinicC,
            21 => CrystalSymmetry::MonoclinicA,
            22 => CrystalSymmetry::Orthorhombic,
            3 => CrystalSymmetry::TrigonalLow,
            32 => CrystalSymmetry::TrigonalHigh,
            4 => CrystalSymmetry::TetragonalLow,
            42 => CrystalSymmetry::TetragonalHigh,
            6 => CrystalSymmetry::HexagonalLow,
            62 => CrystalSymmetry::HexagonalHigh,
            23 => CrystalSymmetry::CubicLow,
            43 => CrystalSymmetry::CubicHigh,
            other => CrystalSymmetry::Unknown(other),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            CrystalSymmetry::Triclinic => 1,
            CrystalSymmetry::Monoclinic => 2,
            CrystalSymmetry::MonoclinicC => 20,
            CrystalSymmetry::MonoclinicA => 21,
            CrystalSymmetry::Orthorhombic => 22,
            CrystalSymmetry::TrigonalLow => 3,
            CrystalSymmetry::TrigonalHigh => 32,
            CrystalSymmetry::TetragonalLow => 4,
            CrystalSymmetry::TetragonalHigh => 42,
            CrystalSymmetry::HexagonalLow => 6,
            CrystalSymmetry::HexagonalHigh => 62,
            CrystalSymmetry::CubicLow => 23,
            CrystalSymmetry::CubicHigh => 43,
            CrystalSymmetry::Unknown(code) => *code,
        }
    }
}

/// Unit cell edge lengths (Angstroms) and angles (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LatticeConstants {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
}

impl LatticeConstants {
    /// Build from exactly six values in `a b c alpha beta gamma` order.
    pub fn from_slice(values: &[f32]) -> Option<Self> {
        match values {
            [a, b, c, alpha, beta, gamma] => Some(LatticeConstants {
                a: *a,
                b: *b,
                c: *c,
                alpha: *alpha,
                beta: *beta,
                gamma: *gamma,
            }),
            _ => None,
        }
    }

    pub fn to_array(&self) -> [f32; 6] {
        [self.a, self.b, self.c, self.alpha, self.beta, self.gamma]
    }
}

/// One crystallographic phase of a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Phase {
    pub id: i32,
    pub material_name: String,
    pub formula: String,
    pub info: String,
    pub symmetry: CrystalSymmetry,
    pub lattice_constants: LatticeConstants,
    /// Reflection families in file order.
    pub families: Vec<HklFamily>,
    pub categories: Vec<i32>,
}

impl Phase {
    pub fn new(id: i32) -> Self {
        Phase {
            id,
            material_name: String::new(),
            formula: String::new(),
            info: String::new(),
            symmetry: CrystalSymmetry::Unknown(0),
            lattice_constants: LatticeConstants::default(),
            families: Vec::new(),
            categories: Vec::new(),
        }
    }

    pub fn number_families(&self) -> usize {
        self.families.len()
    }
}

/// Phases of one dataset, kept sorted by id with ids unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseRegistry {
    phases: Vec<Phase>,
}

impl PhaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a phase at its id-ordered position. Duplicate ids are rejected.
    pub fn insert(&mut self, phase: Phase) -> Result<(), ReadError> {
        match self.phases.binary_search_by_key(&phase.id, |p| p.id) {
            Ok(_) => Err(ReadError::MalformedHeader(format!(
                "duplicate phase id {}",
                phase.id
            ))),
            Err(pos) => {
                self.phases.insert(pos, phase);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: i32) -> Option<&Phase> {
        self.phases
            .binary_search_by_key(&id, |p| p.id)
            .ok()
            .map(|i| &self.phases[i])
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Phase> {
        self.phases.iter()
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn clear(&mut self) {
        self.phases.clear();
    }
}

impl TryFrom<Vec<Phase>> for PhaseRegistry {
    type Error = ReadError;

    fn try_from(phases: Vec<Phase>) -> Result<Self, Self::Error> {
        let mut registry = PhaseRegistry::new();
        for phase in phases {
            registry.insert(phase)?;
        }
        Ok(registry)
    }
}
