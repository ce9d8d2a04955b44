//! parameters_toml
//!
//! Site specific settings read from a `parameters.toml` next to the running
//! executable. Every key is optional and falls back to its default.
#![deny(missing_docs)]

use anyhow::{Context, Result};
use log::warn;
use neuroscan::FailurePolicy;
use serde::Deserialize;
use std::borrow::{Borrow, Cow};
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
struct Parameters {
    /// Command running cellpose, split on whitespace, e.g. `python -m cellpose`.
    cellpose_program: Cow<'static, str>,
    /// Pretrained cellpose model.
    cellpose_model: Cow<'static, str>,
    /// Evaluate the model on the GPU.
    use_gpu: bool,
    /// Abort on the first failed file, or log it and continue.
    failure_policy: FailurePolicy,
    /// Size of the thread pool used for erosion. All cores when unset.
    erosion_threads: Option<usize>,
}

const DEFAULT_PARAMETERS: Parameters = Parameters {
    cellpose_program: Cow::Borrowed("cellpose"),
    cellpose_model: Cow::Borrowed("cyto3"),
    use_gpu: false,
    failure_policy: FailurePolicy::FailFast,
    erosion_threads: None,
};

impl Default for Parameters {
    fn default() -> Self {
        DEFAULT_PARAMETERS
    }
}

static PARAMETERS: OnceLock<Result<Parameters>> = OnceLock::new();

fn load_parameters(path: &Path) -> Result<Parameters> {
    if !path.exists() {
        warn!(
            "could not find parameters.toml at {}, falling back to defaults",
            path.display()
        );
        return Ok(DEFAULT_PARAMETERS);
    }
    let s = std::fs::read_to_string(path).with_context(|| path.display().to_string())?;
    toml::from_str(&s).with_context(|| path.display().to_string())
}

/// Return a reference to the global parameters.
/// The parameters may need to be loaded; if loading fails, return Err.
fn parameters() -> &'static Result<Parameters> {
    PARAMETERS.get_or_init(|| {
        let path = std::env::current_exe()
            .context("Unable to locate the running executable")?
            .with_file_name("parameters.toml");
        load_parameters(&path)
    })
}

/// Get a parameter from parameters.toml
macro_rules! parameter_getter {
    ($a:ident, $t:ty) => {
        /// Get this parameter from parameters.toml
        pub fn $a() -> Result<&'static $t> {
            let val: &'static $t = match parameters() {
                Err(e) => return Err(anyhow::anyhow!(e)),
                Ok(p) => Borrow::<$t>::borrow(&p.$a),
            };
            if DEFAULT_PARAMETERS.$a != *val {
                warn!("using non-default {} = {:?}", stringify!($a), val);
            }
            Ok(val)
        }
    };
}

parameter_getter!(cellpose_program, str);
parameter_getter!(cellpose_model, str);
parameter_getter!(use_gpu, bool);
parameter_getter!(failure_policy, FailurePolicy);
parameter_getter!(erosion_threads, Option<usize>);
