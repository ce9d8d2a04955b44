//! neuroscan
//!
//! Segmentation of nuclei and motor neurons in 3D microscopy volumes.
//! The pipeline per channel is smooth -> segment -> clean -> write, driven
//! by [`orchestrator::BatchOrchestrator`].
#![deny(missing_docs)]

use ndarray::Array3;

/// Cellpose command line bridge
pub mod cellpose;

/// Channels and their segmentation profiles
pub mod channel;

/// Wrapping of the segmentation capability
pub mod engine;

mod error;
pub use error::NeuroscanError;

/// Collaborator contracts
pub mod io;

/// Discovery, idempotent skipping and progress
pub mod orchestrator;

/// Erosion and small object removal
pub mod postprocess;

/// Scale-aware smoothing
pub mod preprocess;

/// Physical voxel spacing
pub mod scale;

/// Multi-page TIFF stacks
pub mod tiff_io;

/// Test doubles for the collaborators
#[cfg(test)]
pub(crate) mod testing;

pub use channel::{Channel, SegmentationProfile};
pub use engine::{EvalParams, SegmentationEngine, SegmentationModel};
pub use orchestrator::{BatchJob, BatchOrchestrator, BatchSummary, FailurePolicy};
pub use scale::ScaleVector;

/// Intensity samples of one channel, axis order (Z, Y, X).
pub type Volume = Array3<f32>;

/// Instance labels, same shape as the source [`Volume`]. 0 is background.
pub type LabelVolume = Array3<u32>;
