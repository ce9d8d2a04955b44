use crate::{NeuroscanError, ScaleVector};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Biological structure segmented from one channel of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    /// Motor neuron cell bodies
    Motor,
    /// Cell nuclei
    Nuclei,
}

impl Channel {
    /// Every channel, in processing order.
    pub const ALL: [Channel; 2] = [Channel::Motor, Channel::Nuclei];

    /// Index of the channel inside the source container.
    pub fn container_index(self) -> usize {
        match self {
            Channel::Motor => 1,
            Channel::Nuclei => 2,
        }
    }

    /// Tuning constants used for this channel.
    pub fn profile(self) -> &'static SegmentationProfile {
        match self {
            Channel::Motor => &MOTOR_PROFILE,
            Channel::Nuclei => &NUCLEI_PROFILE,
        }
    }

    /// Name used in output file names and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Motor => "motor",
            Channel::Nuclei => "nuclei",
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = NeuroscanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "motor" => Ok(Channel::Motor),
            "nuclei" => Ok(Channel::Nuclei),
            _ => Err(NeuroscanError::UnsupportedChannel(s.to_string())),
        }
    }
}

/// Fixed per-channel tuning of smoothing, model parameters and cleanup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentationProfile {
    /// Gaussian sigma in microns, axis order (Z, Y, X)
    pub sigma_um: [f64; 3],
    /// Expected object diameter in microns
    pub diameter_um: f64,
    /// Maximum allowed flow error per mask
    pub flow_threshold: f64,
    /// Cell probability cutoff for foreground
    pub cellprob_threshold: f64,
    /// Run the model in 3D mode
    pub do_3d: bool,
    /// Number of tiles evaluated together by the model
    pub batch_size: usize,
    /// Radius in voxels of the ball used to erode labels, if any
    pub erosion_radius: Option<usize>,
    /// Base voxel count below which objects are discarded
    pub min_object_voxels: usize,
}

/// Nuclei: light smoothing, permissive flows, eroded to separate touching
/// nuclei.
pub const NUCLEI_PROFILE: SegmentationProfile = SegmentationProfile {
    sigma_um: [1.0, 0.5, 0.5],
    diameter_um: 10.0,
    flow_threshold: 0.2,
    cellprob_threshold: 4.0,
    do_3d: true,
    batch_size: 8,
    erosion_radius: Some(4),
    min_object_voxels: 2000,
};

/// Motor neurons: stronger smoothing, strict cell probability.
pub const MOTOR_PROFILE: SegmentationProfile = SegmentationProfile {
    sigma_um: [1.714, 0.514, 0.514],
    diameter_um: 10.0,
    flow_threshold: -0.1,
    cellprob_threshold: 6.0,
    do_3d: true,
    batch_size: 8,
    erosion_radius: None,
    min_object_voxels: 2000,
};

impl SegmentationProfile {
    /// Gaussian sigma in voxels, axis order (Z, Y, X).
    pub fn voxel_sigma(&self, scale: &ScaleVector) -> [f64; 3] {
        let spacing = scale.zyx();
        [
            self.sigma_um[0] / spacing[0],
            self.sigma_um[1] / spacing[1],
            self.sigma_um[2] / spacing[2],
        ]
    }

    /// Expected object diameter in X voxels.
    pub fn diameter_voxels(&self, scale: &ScaleVector) -> f64 {
        self.diameter_um / scale.x()
    }

    /// Minimum object size in voxels.
    ///
    /// The physical volume cancels out, so this is always
    /// `min_object_voxels` up to rounding.
    pub fn min_object_volume_voxels(&self, scale: &ScaleVector) -> f64 {
        let voxel_volume_um3 = scale.voxel_volume_um3();
        let min_volume_um3 = self.min_object_voxels as f64 * voxel_volume_um3;
        min_volume_um3 / voxel_volume_um3
    }
}
