use crate::NeuroscanError;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

const AXES: [&str; 3] = ["X", "Y", "Z"];

/// Physical pixel spacing in microns per voxel.
///
/// Every component is strictly positive and finite. The only way to obtain a
/// value is through a validating constructor, so divisions by a component
/// never need to be checked again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleVector {
    x: f64,
    y: f64,
    z: f64,
}

impl ScaleVector {
    /// Validate and build a scale from microns per voxel along X, Y and Z.
    pub fn new(x: f64, y: f64, z: f64) -> Result<Self, NeuroscanError> {
        for (axis, value) in AXES.into_iter().zip([x, y, z]) {
            if !(value.is_finite() && value > 0.0) {
                return Err(NeuroscanError::InvalidScale(format!(
                    "spacing along {axis} must be strictly positive, got {value}"
                )));
            }
        }
        Ok(ScaleVector { x, y, z })
    }

    /// Build a scale from named axis spacings, as read from container
    /// metadata. Axes other than X, Y and Z are ignored.
    pub fn from_axis_map(axes: &HashMap<String, f64>) -> Result<Self, NeuroscanError> {
        let get = |axis: &str| {
            axes.get(axis).copied().ok_or_else(|| {
                NeuroscanError::InvalidScale(format!("no spacing found for axis {axis}"))
            })
        };
        ScaleVector::new(get("X")?, get("Y")?, get("Z")?)
    }

    /// Microns per voxel along X.
    pub fn x(&self) -> f64 {
        self.x
    }

    /// Microns per voxel along Y.
    pub fn y(&self) -> f64 {
        self.y
    }

    /// Microns per voxel along Z.
    pub fn z(&self) -> f64 {
        self.z
    }

    /// Components in array axis order (Z, Y, X).
    pub fn zyx(&self) -> [f64; 3] {
        [self.z, self.y, self.x]
    }

    /// Ratio of Z spacing to X spacing.
    pub fn anisotropy(&self) -> f64 {
        self.z / self.x
    }

    /// Physical volume of a single voxel in cubic microns.
    pub fn voxel_volume_um3(&self) -> f64 {
        self.x * self.y * self.z
    }
}

impl Display for ScaleVector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "X={:.4} um, Y={:.4} um, Z={:.4} um",
            self.x, self.y, self.z
        )
    }
}
