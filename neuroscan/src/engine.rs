use crate::{Channel, LabelVolume, NeuroscanError, ScaleVector, Volume};
use anyhow::{anyhow, ensure, Result};
use log::debug;

/// Parameters passed to the segmentation capability for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalParams {
    /// Expected object diameter in X voxels
    pub diameter: f64,
    /// Ratio of Z spacing to X spacing
    pub anisotropy: f64,
    /// Maximum allowed flow error per mask
    pub flow_threshold: f64,
    /// Cell probability cutoff for foreground
    pub cellprob_threshold: f64,
    /// Run in 3D mode
    pub do_3d: bool,
    /// Number of tiles evaluated together
    pub batch_size: usize,
    /// Axis of the volume holding Z planes
    pub z_axis: usize,
    /// Normalize intensities before evaluation
    pub normalize: bool,
}

impl EvalParams {
    /// Derive the call parameters of `channel` for a volume sampled at `scale`.
    pub fn for_channel(channel: Channel, scale: &ScaleVector) -> Self {
        let profile = channel.profile();
        EvalParams {
            diameter: profile.diameter_voxels(scale),
            anisotropy: scale.anisotropy(),
            flow_threshold: profile.flow_threshold,
            cellprob_threshold: profile.cellprob_threshold,
            do_3d: profile.do_3d,
            batch_size: profile.batch_size,
            z_axis: 0,
            normalize: true,
        }
    }
}

/// An opaque instance segmentation model.
///
/// Given a batch of volumes it returns one label mask per volume, in order.
/// Results may differ across model versions.
pub trait SegmentationModel {
    /// Segment every volume of `batch`.
    fn eval(&self, batch: &[Volume], params: &EvalParams) -> Result<Vec<LabelVolume>>;
}

/// Immutable handle on a segmentation model, built once per run and shared
/// by every file and channel.
pub struct SegmentationEngine<M> {
    model: M,
}

impl<M: SegmentationModel> SegmentationEngine<M> {
    /// Wrap an already constructed model.
    pub fn new(model: M) -> Self {
        SegmentationEngine { model }
    }

    /// The wrapped model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Segment one channel volume into raw instance labels.
    pub fn segment(
        &self,
        volume: &Volume,
        channel: Channel,
        scale: &ScaleVector,
    ) -> Result<LabelVolume, NeuroscanError> {
        let params = EvalParams::for_channel(channel, scale);
        debug!("Evaluating {channel} channel with {params:?}");
        self.eval_single(volume, &params)
            .map_err(|source| NeuroscanError::SegmentationFailure { channel, source })
    }

    fn eval_single(&self, volume: &Volume, params: &EvalParams) -> Result<LabelVolume> {
        let mut masks = self.model.eval(std::slice::from_ref(volume), params)?;
        ensure!(
            masks.len() == 1,
            "expected a single mask, the model returned {}",
            masks.len()
        );
        let mask = masks.pop().ok_or_else(|| anyhow!("no mask returned"))?;
        ensure!(
            mask.dim() == volume.dim(),
            "mask shape {:?} does not match volume shape {:?}",
            mask.dim(),
            volume.dim()
        );
        Ok(mask)
    }
}
