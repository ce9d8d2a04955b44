use crate::channel::Channel;
use std::path::PathBuf;

/// Failures of the segmentation pipeline. None of them are retried.
#[derive(Debug, thiserror::Error)]
pub enum NeuroscanError {
    /// An axis spacing is missing, zero, negative or not finite.
    #[error("invalid scale: {0}")]
    InvalidScale(String),

    /// A channel name outside of {motor, nuclei}.
    #[error("unsupported channel {0:?}, expected one of motor, nuclei")]
    UnsupportedChannel(String),

    /// The source container could not be read.
    #[error("unable to load {path:?}")]
    VolumeLoadFailure {
        /// Source file
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: anyhow::Error,
    },

    /// The segmentation capability failed or returned unusable masks.
    #[error("segmentation of the {channel} channel failed")]
    SegmentationFailure {
        /// Channel being segmented
        channel: Channel,
        /// Underlying cause
        #[source]
        source: anyhow::Error,
    },

    /// The label volume could not be persisted.
    #[error("unable to write {path:?}")]
    WriteFailure {
        /// Output file
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: anyhow::Error,
    },
}
