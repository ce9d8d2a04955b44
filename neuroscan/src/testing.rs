use crate::io::{LabelWriter, ScaleMetadata, VolumeLoader};
use crate::{
    Channel, EvalParams, LabelVolume, NeuroscanError, ScaleVector, SegmentationModel, Volume,
};
use anyhow::{bail, Result};
use ndarray::Array3;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub(crate) const VOLUME_SHAPE: (usize, usize, usize) = (2, 6, 6);

/// Returns empty masks and remembers the batch size and parameters of every call.
#[derive(Default)]
pub(crate) struct RecordingModel {
    pub(crate) calls: RefCell<Vec<(usize, EvalParams)>>,
}

impl SegmentationModel for RecordingModel {
    fn eval(&self, batch: &[Volume], params: &EvalParams) -> Result<Vec<LabelVolume>> {
        self.calls.borrow_mut().push((batch.len(), params.clone()));
        Ok(batch.iter().map(|v| Array3::zeros(v.raw_dim())).collect())
    }
}

pub(crate) struct FailingModel;

impl SegmentationModel for FailingModel {
    fn eval(&self, _batch: &[Volume], _params: &EvalParams) -> Result<Vec<LabelVolume>> {
        bail!("model exploded")
    }
}

/// Serves zero volumes. Files whose name contains "broken" fail to load.
#[derive(Default)]
pub(crate) struct MockLoader {
    pub(crate) loads: RefCell<Vec<(PathBuf, Channel)>>,
}

impl VolumeLoader for MockLoader {
    fn load(&self, path: &Path, channel: Channel) -> Result<Volume, NeuroscanError> {
        self.loads.borrow_mut().push((path.to_path_buf(), channel));
        if path.to_string_lossy().contains("broken") {
            return Err(NeuroscanError::VolumeLoadFailure {
                path: path.to_path_buf(),
                source: anyhow::anyhow!("corrupt container"),
            });
        }
        Ok(Array3::zeros(VOLUME_SHAPE))
    }
}

/// Serves a fixed axis map through the validating constructor.
pub(crate) struct MockScales {
    axes: HashMap<String, f64>,
    pub(crate) requests: RefCell<usize>,
}

impl MockScales {
    pub(crate) fn new(axes: &[(&str, f64)]) -> Self {
        MockScales {
            axes: axes
                .iter()
                .map(|&(axis, value)| (axis.to_string(), value))
                .collect(),
            requests: RefCell::new(0),
        }
    }

    pub(crate) fn reference() -> Self {
        MockScales::new(&[("X", 0.2), ("Y", 0.2), ("Z", 0.7)])
    }
}

impl ScaleMetadata for MockScales {
    fn get(&self, _path: &Path) -> Result<ScaleVector, NeuroscanError> {
        *self.requests.borrow_mut() += 1;
        ScaleVector::from_axis_map(&self.axes)
    }
}

/// Touches the output file so that reruns see it.
#[derive(Default)]
pub(crate) struct MockWriter {
    pub(crate) saved: RefCell<Vec<PathBuf>>,
}

impl LabelWriter for MockWriter {
    fn save(&self, path: &Path, labels: &LabelVolume) -> Result<(), NeuroscanError> {
        std::fs::write(path, format!("{:?}", labels.dim())).map_err(|e| {
            NeuroscanError::WriteFailure {
                path: path.to_path_buf(),
                source: e.into(),
            }
        })?;
        self.saved.borrow_mut().push(path.to_path_buf());
        Ok(())
    }
}
