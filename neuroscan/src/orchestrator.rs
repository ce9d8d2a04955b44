use crate::io::{LabelWriter, ScaleMetadata, VolumeLoader};
use crate::postprocess::clean;
use crate::preprocess::smooth;
use crate::{Channel, NeuroscanError, ScaleVector, SegmentationEngine, SegmentationModel};
use anyhow::anyhow;
use log::{debug, error, info};
use serde::Deserialize;
use std::ffi::OsStr;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Extension of the source containers picked up in a folder.
pub const CONTAINER_EXTENSION: &str = "czi";

/// Extension of the written label stacks.
pub const LABEL_EXTENSION: &str = "tiff";

/// `<dir>/<stem>_<channel>.tiff` for a source `<dir>/<stem>.<ext>`.
pub fn output_path_for(source: &Path, channel: Channel) -> PathBuf {
    let stem = source
        .file_stem()
        .map(OsStr::to_string_lossy)
        .unwrap_or_default();
    source.with_file_name(format!("{stem}_{channel}.{LABEL_EXTENSION}"))
}

/// One discovered source file and where each of its channels gets written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    source: PathBuf,
    outputs: [(Channel, PathBuf); 2],
}

impl BatchJob {
    /// Derive the output paths of `source`.
    pub fn new(source: &Path) -> Self {
        BatchJob {
            source: source.to_path_buf(),
            outputs: Channel::ALL.map(|channel| (channel, output_path_for(source, channel))),
        }
    }

    /// The source container.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Label output of `channel`.
    pub fn output_path(&self, channel: Channel) -> &Path {
        match channel {
            Channel::Motor => &self.outputs[0].1,
            Channel::Nuclei => &self.outputs[1].1,
        }
    }

    /// Channels whose output does not exist yet, in processing order.
    pub fn pending_channels(&self) -> Vec<Channel> {
        self.outputs
            .iter()
            .filter(|(_, output)| !output.exists())
            .map(|&(channel, _)| channel)
            .collect()
    }
}

/// What to do when a file of a batch fails.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the run on the first error.
    #[default]
    FailFast,
    /// Log the error, record it in the summary and move on to the next file.
    Continue,
}

/// A file that failed under [`FailurePolicy::Continue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    /// Source container
    pub source: PathBuf,
    /// Rendered error chain
    pub error: String,
}

/// Counters of one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    /// Source containers discovered
    pub files_found: usize,
    /// Files with at least one channel segmented in this run
    pub files_segmented: usize,
    /// Files whose every output already existed
    pub files_skipped: usize,
    /// Channels segmented in this run
    pub channels_segmented: usize,
    /// Channels skipped because their output existed
    pub channels_skipped: usize,
    /// Files that failed, in order
    pub failures: Vec<FailedItem>,
}

impl BatchSummary {
    fn record(&mut self, outcome: FileOutcome) {
        self.channels_segmented += outcome.segmented;
        self.channels_skipped += outcome.skipped;
        if outcome.segmented > 0 {
            self.files_segmented += 1;
        } else {
            self.files_skipped += 1;
        }
    }
}

impl Display for BatchSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} files found: {} segmented, {} already complete, {} failed \
             ({} channels segmented, {} skipped)",
            self.files_found,
            self.files_segmented,
            self.files_skipped,
            self.failures.len(),
            self.channels_segmented,
            self.channels_skipped
        )
    }
}

#[derive(Debug, Default)]
struct FileOutcome {
    segmented: usize,
    skipped: usize,
}

/// Recursively find every source container below `dir`, sorted by path.
pub fn discover_inputs(dir: &Path) -> Result<Vec<PathBuf>, NeuroscanError> {
    let discovery_error = |source: anyhow::Error| NeuroscanError::VolumeLoadFailure {
        path: dir.to_path_buf(),
        source,
    };
    let pattern = format!(
        "{}/**/*.{CONTAINER_EXTENSION}",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let mut sources = glob::glob(&pattern)
        .map_err(|e| discovery_error(e.into()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| discovery_error(e.into()))?;
    sources.retain(|path| path.is_file());
    sources.sort();
    Ok(sources)
}

/// Drives the per-channel pipeline over a file or a folder of files.
///
/// A channel whose output already exists is never recomputed, so an
/// interrupted batch can simply be started again.
pub struct BatchOrchestrator<'a, M> {
    engine: &'a SegmentationEngine<M>,
    loader: &'a dyn VolumeLoader,
    scales: &'a dyn ScaleMetadata,
    writer: &'a dyn LabelWriter,
    policy: FailurePolicy,
}

impl<'a, M: SegmentationModel> BatchOrchestrator<'a, M> {
    /// Orchestrate with the default [`FailurePolicy::FailFast`].
    pub fn new(
        engine: &'a SegmentationEngine<M>,
        loader: &'a dyn VolumeLoader,
        scales: &'a dyn ScaleMetadata,
        writer: &'a dyn LabelWriter,
    ) -> Self {
        BatchOrchestrator {
            engine,
            loader,
            scales,
            writer,
            policy: FailurePolicy::default(),
        }
    }

    /// Replace the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Segment a single container, or every container below a directory.
    pub fn run_segmentation(&self, path: &Path) -> Result<BatchSummary, NeuroscanError> {
        let summary = if path.is_dir() {
            self.segment_folder(path)?
        } else if path.is_file() {
            let mut summary = BatchSummary {
                files_found: 1,
                ..BatchSummary::default()
            };
            self.process(path, &mut summary)?;
            summary
        } else {
            return Err(NeuroscanError::VolumeLoadFailure {
                path: path.to_path_buf(),
                source: anyhow!("no such file or directory"),
            });
        };
        info!("{summary}");
        Ok(summary)
    }

    fn segment_folder(&self, dir: &Path) -> Result<BatchSummary, NeuroscanError> {
        let sources = discover_inputs(dir)?;
        let n = sources.len();
        info!("{n} images were found.");
        let mut summary = BatchSummary {
            files_found: n,
            ..BatchSummary::default()
        };
        for (i, source) in sources.iter().enumerate() {
            info!("[{}/{n}] {}", i + 1, source.display());
            self.process(source, &mut summary)?;
        }
        Ok(summary)
    }

    fn process(&self, source: &Path, summary: &mut BatchSummary) -> Result<(), NeuroscanError> {
        match self.segment_file(source) {
            Ok(outcome) => summary.record(outcome),
            Err(err) => match self.policy {
                FailurePolicy::FailFast => return Err(err),
                FailurePolicy::Continue => {
                    let error = format!("{:#}", anyhow::Error::from(err));
                    error!("{}: {error}", source.display());
                    summary.failures.push(FailedItem {
                        source: source.to_path_buf(),
                        error,
                    });
                }
            },
        }
        Ok(())
    }

    fn segment_file(&self, source: &Path) -> Result<FileOutcome, NeuroscanError> {
        let job = BatchJob::new(source);
        let mut outcome = FileOutcome::default();
        let mut file_scale: Option<ScaleVector> = None;
        for channel in Channel::ALL {
            let output = job.output_path(channel);
            if output.exists() {
                info!("Skipping {channel} channel, already segmented");
                outcome.skipped += 1;
                continue;
            }
            let scale = match file_scale {
                Some(scale) => scale,
                None => *file_scale.insert(self.scales.get(source)?),
            };
            self.segment_channel(&job, channel, &scale)?;
            outcome.segmented += 1;
        }
        Ok(outcome)
    }

    fn segment_channel(
        &self,
        job: &BatchJob,
        channel: Channel,
        scale: &ScaleVector,
    ) -> Result<(), NeuroscanError> {
        info!("Segmenting {channel} channel");
        debug!("{} at {scale}", job.source().display());
        let smoothed = {
            let volume = self.loader.load(job.source(), channel)?;
            smooth(&volume, channel, scale)
        };
        let raw = self.engine.segment(&smoothed, channel, scale)?;
        drop(smoothed);
        let labels = clean(raw, channel, scale);
        let output = job.output_path(channel);
        self.writer.save(output, &labels)?;
        info!("Wrote {}", output.display());
        Ok(())
    }
}
