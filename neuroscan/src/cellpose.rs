use crate::engine::{EvalParams, SegmentationModel};
use crate::tiff_io::{read_label_stack, write_float_stack};
use crate::{LabelVolume, Volume};
use anyhow::{bail, Context, Result};
use log::debug;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Suffix cellpose appends to the stem of every input it segments.
const MASK_SUFFIX: &str = "_cp_masks.tif";

/// Runs the `cellpose` command line program on a scratch directory of float
/// TIFF stacks and reads the masks it leaves behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellposeCli {
    program: PathBuf,
    prefix_args: Vec<String>,
    model_type: String,
    use_gpu: bool,
}

impl CellposeCli {
    /// Build from a whitespace separated command such as
    /// `python -m cellpose`.
    pub fn from_command_line(command: &str, model_type: &str, use_gpu: bool) -> Result<Self> {
        let mut words = command.split_whitespace();
        let Some(program) = words.next() else {
            bail!("the cellpose command is empty");
        };
        Ok(CellposeCli {
            program: PathBuf::from(program),
            prefix_args: words.map(String::from).collect(),
            model_type: model_type.to_string(),
            use_gpu,
        })
    }

    /// Name of the pretrained model.
    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    /// Whether the model is evaluated on the GPU.
    pub fn use_gpu(&self) -> bool {
        self.use_gpu
    }

    /// The invocation segmenting every image of `dir`.
    pub fn command(&self, dir: &Path, params: &EvalParams) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix_args)
            .arg(format!("--dir={}", dir.display()))
            .arg(format!("--pretrained_model={}", self.model_type))
            .arg(format!("--z_axis={}", params.z_axis))
            .args(["--chan=0", "--chan2=0"])
            .arg(format!("--diameter={}", params.diameter))
            .arg(format!("--anisotropy={}", params.anisotropy))
            .arg(format!("--flow_threshold={}", params.flow_threshold))
            .arg(format!("--cellprob_threshold={}", params.cellprob_threshold))
            .arg(format!("--batch_size={}", params.batch_size))
            .args(["--save_tif", "--no_npy"]);
        if params.do_3d {
            cmd.arg("--do_3D");
        }
        if !params.normalize {
            cmd.arg("--no_norm");
        }
        if self.use_gpu {
            cmd.arg("--use_gpu");
        }
        cmd
    }
}

impl SegmentationModel for CellposeCli {
    fn eval(&self, batch: &[Volume], params: &EvalParams) -> Result<Vec<LabelVolume>> {
        let workdir = tempfile::Builder::new()
            .prefix("neuroscan-cellpose")
            .tempdir()
            .context("Unable to create a scratch directory for cellpose")?;
        let stems: Vec<String> = (0..batch.len()).map(|i| format!("volume_{i:03}")).collect();
        for (stem, volume) in stems.iter().zip(batch) {
            write_float_stack(&workdir.path().join(format!("{stem}.tif")), volume)?;
        }

        let mut cmd = self.command(workdir.path(), params);
        debug!("running {cmd:?}");
        let output = cmd
            .output()
            .with_context(|| format!("Unable to run {}", self.program.display()))?;
        if !output.status.success() {
            bail!(
                "{} failed with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        stems
            .iter()
            .map(|stem| {
                let path = workdir.path().join(format!("{stem}{MASK_SUFFIX}"));
                read_label_stack(&path).with_context(|| format!("cellpose left no mask at {path:?}"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Channel, ScaleVector};
    use pretty_assertions::assert_eq;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_from_command_line() {
        let cli = CellposeCli::from_command_line("python -m cellpose", "cyto3", true).unwrap();
        assert_eq!(cli.program, PathBuf::from("python"));
        assert_eq!(cli.prefix_args, vec!["-m", "cellpose"]);
        assert_eq!(cli.model_type(), "cyto3");
        assert!(cli.use_gpu());
        assert!(CellposeCli::from_command_line("  ", "cyto3", false).is_err());
    }

    #[test]
    fn test_command_arguments() {
        let cli = CellposeCli::from_command_line("cellpose", "cyto3", false).unwrap();
        let scale = ScaleVector::new(0.25, 0.25, 1.0).unwrap();
        let params = EvalParams::for_channel(Channel::Motor, &scale);
        let cmd = cli.command(Path::new("/scratch/run"), &params);
        assert_eq!(cmd.get_program(), "cellpose");
        assert_eq!(
            args(&cmd),
            vec![
                "--dir=/scratch/run",
                "--pretrained_model=cyto3",
                "--z_axis=0",
                "--chan=0",
                "--chan2=0",
                "--diameter=40",
                "--anisotropy=4",
                "--flow_threshold=-0.1",
                "--cellprob_threshold=6",
                "--batch_size=8",
                "--save_tif",
                "--no_npy",
                "--do_3D",
            ]
        );

        let gpu = CellposeCli::from_command_line("cellpose", "nuclei", true).unwrap();
        let gpu_args = args(&gpu.command(Path::new("/tmp"), &params));
        assert_eq!(gpu_args.last().map(String::as_str), Some("--use_gpu"));
        assert!(gpu_args.contains(&"--pretrained_model=nuclei".to_string()));
    }

    #[test]
    fn test_unrunnable_program() {
        let scale = ScaleVector::new(0.2, 0.2, 0.7).unwrap();
        let params = EvalParams::for_channel(Channel::Nuclei, &scale);
        let volume = Volume::zeros((2, 4, 4));

        let missing =
            CellposeCli::from_command_line("/nonexistent/bin/cellpose", "cyto3", false).unwrap();
        let err = missing.eval(&[volume.clone()], &params).unwrap_err();
        assert!(format!("{err:#}").contains("Unable to run"));

        let failing = CellposeCli::from_command_line("false", "cyto3", false).unwrap();
        let err = failing.eval(&[volume], &params).unwrap_err();
        assert!(err.to_string().contains("failed with"));
    }
}
