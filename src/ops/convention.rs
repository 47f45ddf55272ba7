//! Classification of sample/euler transform pairs into vendor conventions.
//!
//! The table entries are calibration constants written by vendor software,
//! so they are compared with exact equality. Near-miss values are a
//! different convention, not a noisy match.

use glam::Quat;

use crate::types::dataset::Dataset;
use crate::types::transform::{CoordinateConvention, TransformDescriptor};

const KNOWN_CONVENTIONS: [(TransformDescriptor, TransformDescriptor, CoordinateConvention); 3] = [
    (
        TransformDescriptor::new(180.0, 0.0, 1.0, 0.0),
        TransformDescriptor::new(90.0, 0.0, 0.0, 1.0),
        CoordinateConvention::TslDefault,
    ),
    (
        TransformDescriptor::new(180.0, 0.0, 1.0, 0.0),
        TransformDescriptor::new(0.0, 0.0, 0.0, 1.0),
        CoordinateConvention::HklDefault,
    ),
    (
        TransformDescriptor::new(0.0, 0.0, 0.0, 1.0),
        TransformDescriptor::new(0.0, 0.0, 0.0, 1.0),
        CoordinateConvention::HedmDefault,
    ),
];

/// Identify the vendor convention a transform pair belongs to.
///
/// Returns [`CoordinateConvention::Unknown`] when no table entry matches
/// exactly (including any NaN component).
pub fn identify(
    sample: &TransformDescriptor,
    euler: &TransformDescriptor,
) -> CoordinateConvention {
    KNOWN_CONVENTIONS
        .iter()
        .find(|(s, e, _)| s == sample && e == euler)
        .map(|(_, _, convention)| *convention)
        .unwrap_or(CoordinateConvention::Unknown)
}

/// Sample and euler frame rotations of a dataset: the transforms its header
/// records, else the defaults of its tagged convention.
pub fn frame_rotations(dataset: &Dataset) -> Option<(Quat, Quat)> {
    let (sample, euler) = dataset
        .header
        .transforms()
        .or_else(|| dataset.convention.default_transforms())?;
    Some((sample.to_quat(), euler.to_quat()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    use crate::adapters::ang::tests::SCAN;
    use crate::adapters::{AngReader, FormatReader};
    use crate::types::dataset::HeaderValue;

    fn t(v: [f32; 4]) -> TransformDescriptor {
        TransformDescriptor::from_array(v)
    }

    #[test]
    fn test_known_fixtures() {
        assert_eq!(
            identify(&t([180.0, 0.0, 1.0, 0.0]), &t([90.0, 0.0, 0.0, 1.0])),
            CoordinateConvention::TslDefault
        );
        assert_eq!(
            identify(&t([180.0, 0.0, 1.0, 0.0]), &t([0.0, 0.0, 0.0, 1.0])),
            CoordinateConvention::HklDefault
        );
        assert_eq!(
            identify(&t([0.0, 0.0, 0.0, 1.0]), &t([0.0, 0.0, 0.0, 1.0])),
            CoordinateConvention::HedmDefault
        );
        assert_eq!(
            identify(&t([1.0, 0.0, 1.0, 0.0]), &t([90.0, 0.0, 0.0, 1.0])),
            CoordinateConvention::Unknown
        );
    }

    #[test]
    fn test_near_miss_is_unknown() {
        let almost = 180.0f32 - f32::EPSILON * 128.0;
        assert_ne!(almost, 180.0);
        assert_eq!(
            identify(&t([almost, 0.0, 1.0, 0.0]), &t([90.0, 0.0, 0.0, 1.0])),
            CoordinateConvention::Unknown
        );
    }

    #[test]
    fn test_nan_is_unknown() {
        assert_eq!(
            identify(&t([f32::NAN, 0.0, 1.0, 0.0]), &t([90.0, 0.0, 0.0, 1.0])),
            CoordinateConvention::Unknown
        );
    }

    #[test]
    fn test_table_entries_are_exclusive() {
        for (i, (s, e, _)) in KNOWN_CONVENTIONS.iter().enumerate() {
            let matches = KNOWN_CONVENTIONS
                .iter()
                .filter(|(s2, e2, _)| s2 == s && e2 == e)
                .count();
            assert_eq!(matches, 1, "entry {i} matches more than one row");
        }
    }

    #[test]
    fn test_default_transforms_identify_back() {
        for convention in [
            CoordinateConvention::TslDefault,
            CoordinateConvention::HklDefault,
            CoordinateConvention::HedmDefault,
        ] {
            let (s, e) = convention.default_transforms().unwrap();
            assert_eq!(identify(&s, &e), convention);
            assert_eq!(identify(&s, &e), identify(&s, &e));
        }
    }

    #[test]
    fn test_frame_rotations_from_convention() {
        let mut reader = AngReader::from_text(SCAN);
        reader.read_header_only().unwrap();
        let (sample, euler) = frame_rotations(reader.dataset()).unwrap();

        // 180 degrees about y, 90 degrees about z
        assert!((sample * Vec3::X - Vec3::NEG_X).length() < 1e-5);
        assert!((euler * Vec3::X - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_frame_rotations_prefer_header() {
        let mut ds = Dataset::default();
        assert!(frame_rotations(&ds).is_none());

        ds.header.insert("SampleTransformationAngle", HeaderValue::Float(0.0));
        ds.header.insert("SampleTransformationAxis", HeaderValue::Floats(vec![0.0, 0.0, 1.0]));
        ds.header.insert("EulerTransformationAngle", HeaderValue::Float(90.0));
        ds.header.insert("EulerTransformationAxis", HeaderValue::Floats(vec![1.0, 0.0, 0.0]));
        let (sample, euler) = frame_rotations(&ds).unwrap();
        assert_eq!(sample, Quat::IDENTITY);
        assert!((euler * Vec3::Y - Vec3::Z).length() < 1e-5);
    }
}
