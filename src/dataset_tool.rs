//! Dataset tool process boundary
//!
//! The `make_datasets` binary can run materialization out of process. Arguments
//! are passed as a vector, so a target such as `Egyptian cat` needs no quoting.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use crate::error::SubprocessError;

/// Arguments understood by `make_datasets`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetToolArgs {
    pub source_dir: PathBuf,
    pub target: String,
    pub images_per_folder: usize,
    /// Random experiments; the tool creates one extra folder for the baseline
    pub random_experiments: usize,
    pub config: Option<PathBuf>,
    pub seed: u64,
}

impl DatasetToolArgs {
    /// Command-line arguments in the tool's flag format
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--source_dir={}", self.source_dir.display()),
            format!("--target={}", self.target),
            format!("--number_of_images_per_folder={}", self.images_per_folder),
            format!("--number_of_random_folders={}", self.random_experiments),
            format!("--seed={}", self.seed),
        ];
        if let Some(config) = &self.config {
            args.push(format!("--config={}", config.display()));
        }
        args
    }
}

/// Run the dataset tool and wait for it; any non-zero exit is an error
pub fn run_dataset_tool(program: &Path, args: &DatasetToolArgs) -> Result<(), SubprocessError> {
    let argv = args.to_args();
    info!("Running {} {}", program.display(), argv.join(" "));

    let status = Command::new(program)
        .args(&argv)
        .status()
        .map_err(|source| SubprocessError::Spawn {
            program: program.to_path_buf(),
            source,
        })?;

    if !status.success() {
        return Err(SubprocessError::ExitStatus {
            program: program.to_path_buf(),
            status: status.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> DatasetToolArgs {
        DatasetToolArgs {
            source_dir: PathBuf::from("IMGNET_DOWNLOAD"),
            target: "Egyptian cat".to_string(),
            images_per_folder: 20,
            random_experiments: 10,
            config: None,
            seed: 7,
        }
    }

    #[test]
    fn test_target_with_space_is_single_argument() {
        let argv = args().to_args();
        assert!(argv.contains(&"--target=Egyptian cat".to_string()));
        assert!(argv.contains(&"--number_of_random_folders=10".to_string()));
        assert_eq!(argv.len(), 5);
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let err = run_dataset_tool(Path::new("/nonexistent/make_datasets"), &args()).unwrap_err();
        assert!(matches!(err, SubprocessError::Spawn { .. }));
    }

    #[test]
    fn test_failing_tool_is_exit_status_error() {
        let err = run_dataset_tool(Path::new("false"), &args()).unwrap_err();
        match err {
            SubprocessError::ExitStatus { program, .. } => {
                assert_eq!(program, PathBuf::from("false"));
            }
            other => panic!("expected ExitStatus, got {other:?}"),
        }
    }

    #[test]
    fn test_successful_tool_receives_arguments() {
        assert!(run_dataset_tool(Path::new("true"), &args()).is_ok());
    }
}
