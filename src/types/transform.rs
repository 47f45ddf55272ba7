//! Rotation descriptors relating sample, crystal and instrument frames.

use glam::{Quat, Vec3};

/// A rotation given as an angle in degrees about an (x, y, z) axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformDescriptor {
    pub angle: f32,
    pub axis: [f32; 3],
}

impl TransformDescriptor {
    pub const fn new(angle: f32, x: f32, y: f32, z: f32) -> Self {
        TransformDescriptor {
            angle,
            axis: [x, y, z],
        }
    }

    /// Build from `[angle, x, y, z]`.
    pub const fn from_array(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.angle, self.axis[0], self.axis[1], self.axis[2]]
    }

    /// The rotation as a unit quaternion. A zero axis yields the identity.
    pub fn to_quat(&self) -> Quat {
        let axis = Vec3::from_array(self.axis);
        if axis.length_squared() == 0.0 {
            return Quat::IDENTITY;
        }
        Quat::from_axis_angle(axis.normalize(), self.angle.to_radians())
    }
}

/// Vendor conventions for the sample and euler reference frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinateConvention {
    /// TSL / EDAX OIM.
    TslDefault,
    /// Oxford Instruments HKL Channel 5.
    HklDefault,
    /// High energy diffraction microscopy.
    HedmDefault,
    Unknown,
}

impl CoordinateConvention {
    /// The `(sample, euler)` transform pair that defines a named convention.
    pub fn default_transforms(&self) -> Option<(TransformDescriptor, TransformDescriptor)> {
        match self {
            CoordinateConvention::TslDefault => Some((
                TransformDescriptor::new(180.0, 0.0, 1.0, 0.0),
                TransformDescriptor::new(90.0, 0.0, 0.0, 1.0),
            )),
            CoordinateConvention::HklDefault => Some((
                TransformDescriptor::new(180.0, 0.0, 1.0, 0.0),
                TransformDescriptor::new(0.0, 0.0, 0.0, 1.0),
            )),
            CoordinateConvention::HedmDefault => Some((
                TransformDescriptor::new(0.0, 0.0, 0.0, 1.0),
                TransformDescriptor::new(0.0, 0.0, 0.0, 1.0),
            )),
            CoordinateConvention::Unknown => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CoordinateConvention::TslDefault => "TSL default",
            CoordinateConvention::HklDefault => "HKL default",
            CoordinateConvention::HedmDefault => "HEDM default",
            CoordinateConvention::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quat_half_turn_about_y() {
        let q = TransformDescriptor::new(180.0, 0.0, 1.0, 0.0).to_quat();
        let v = q * Vec3::X;
        assert!((v - Vec3::NEG_X).length() < 1e-5);
    }

    #[test]
    fn test_quat_zero_axis_is_identity() {
        let q = TransformDescriptor::new(45.0, 0.0, 0.0, 0.0).to_quat();
        assert_eq!(q, Quat::IDENTITY);
    }

    #[test]
    fn test_array_roundtrip() {
        let t = TransformDescriptor::from_array([90.0, 0.0, 0.0, 1.0]);
        assert_eq!(t.to_array(), [90.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_unknown_has_no_transforms() {
        assert!(CoordinateConvention::Unknown.default_transforms().is_none());
    }
}
