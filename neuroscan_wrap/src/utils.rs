use anyhow::{ensure, Context, Result};
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A path given on the command line. It must exist and is stored absolute,
/// so log lines and outputs do not depend on the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliPath(PathBuf);

impl FromStr for CliPath {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let path = Path::new(s);
        ensure!(path.exists(), "{s} does not exist");
        let absolute = path
            .canonicalize()
            .with_context(|| format!("Unable to resolve {s}"))?;
        Ok(CliPath(absolute))
    }
}

impl Deref for CliPath {
    type Target = Path;

    fn deref(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for CliPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for CliPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_existing_path_is_absolute() -> Result<()> {
        let dir = tempdir()?;
        let file = dir.path().join("sample.czi");
        std::fs::write(&file, b"")?;
        let path: CliPath = file.to_str().unwrap().parse()?;
        assert!(path.is_absolute());
        assert_eq!(path.file_name().unwrap(), "sample.czi");
        Ok(())
    }

    #[test]
    fn test_missing_path_is_rejected() {
        let err = "/nonexistent/neuroscan/run".parse::<CliPath>().unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
