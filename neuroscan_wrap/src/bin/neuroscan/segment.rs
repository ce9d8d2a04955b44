use anyhow::{bail, Context, Result};
use clap::Args;
use czi::CziLoader;
use log::info;
use neuroscan::cellpose::CellposeCli;
use neuroscan::tiff_io::TiffLabelWriter;
use neuroscan::{BatchOrchestrator, FailurePolicy, SegmentationEngine};
use neuroscan_wrap::utils::CliPath;

#[derive(Args, Debug, Clone)]
pub(crate) struct SegmentArgs {
    /// A .czi file, or a folder searched recursively for .czi files
    pub(crate) path: CliPath,

    /// Log failed files and carry on with the rest of the folder. Overrides
    /// failure_policy from parameters.toml.
    #[clap(long)]
    pub(crate) keep_going: bool,
}

pub(crate) fn run(args: &SegmentArgs) -> Result<()> {
    if let Some(threads) = *parameters_toml::erosion_threads()? {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Unable to size the erosion thread pool")?;
    }

    let model = CellposeCli::from_command_line(
        parameters_toml::cellpose_program()?,
        parameters_toml::cellpose_model()?,
        *parameters_toml::use_gpu()?,
    )?;
    info!(
        "Segmenting with cellpose model {} ({})",
        model.model_type(),
        if model.use_gpu() { "GPU" } else { "CPU" }
    );
    let engine = SegmentationEngine::new(model);
    let policy = if args.keep_going {
        FailurePolicy::Continue
    } else {
        *parameters_toml::failure_policy()?
    };

    let summary = BatchOrchestrator::new(&engine, &CziLoader, &CziLoader, &TiffLabelWriter)
        .with_failure_policy(policy)
        .run_segmentation(&args.path)?;
    if !summary.failures.is_empty() {
        bail!(
            "{} of {} files failed to segment",
            summary.failures.len(),
            summary.files_found
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[clap(flatten)]
        args: SegmentArgs,
    }

    #[test]
    fn test_parse_segment_args() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();
        let parsed = Wrapper::try_parse_from(["segment", root, "--keep-going"]).unwrap();
        assert!(parsed.args.keep_going);
        assert!(parsed.args.path.is_dir());

        assert!(Wrapper::try_parse_from(["segment", "/nonexistent/neuroscan"]).is_err());
    }
}
