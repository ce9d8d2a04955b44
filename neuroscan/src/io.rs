//! Contracts of the collaborators around the core pipeline. Container
//! parsing lives in the `czi` crate, label output in [`crate::tiff_io`].

use crate::{Channel, LabelVolume, NeuroscanError, ScaleVector, Volume};
use std::path::Path;

/// Reads one channel of a source container as a 3D intensity volume.
pub trait VolumeLoader {
    /// Load the (Z, Y, X) volume of `channel` from `path`.
    fn load(&self, path: &Path, channel: Channel) -> Result<Volume, NeuroscanError>;
}

/// Reads the physical voxel spacing embedded in a source container.
pub trait ScaleMetadata {
    /// Spacing of `path` in microns per voxel.
    fn get(&self, path: &Path) -> Result<ScaleVector, NeuroscanError>;
}

/// Persists a label volume.
pub trait LabelWriter {
    /// Write `labels` to `path`. Nothing is left at `path` on failure.
    fn save(&self, path: &Path, labels: &LabelVolume) -> Result<(), NeuroscanError>;
}
