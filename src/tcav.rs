//! TCAV invocation adapter
//!
//! Activation generation, CAV training and the TCAV estimator live in an
//! external library. This module supplies it with configuration (model files,
//! cache directories, the experiment plan) through [`AttributionBackend`] and
//! collects the results it returns.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::context::{random_folder_name, RunContext};
use crate::error::AttributionError;

/// Classifier the external library should wrap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub graph_path: PathBuf,
    pub label_path: PathBuf,
}

/// One CAV/TCAV computation: `concept` versus `negative_concept`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRun {
    pub bottleneck: String,
    pub alpha: f64,
    pub concept: String,
    pub negative_concept: String,
}

/// Every run the backend must perform for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentPlan {
    pub target: String,
    pub runs: Vec<ExperimentRun>,
}

impl ExperimentPlan {
    /// Concept-vs-random runs for every random experiment, plus
    /// random-vs-random baseline runs against the extra random folder.
    pub fn build(
        target: &str,
        concepts: &[String],
        bottlenecks: &[String],
        alphas: &[f64],
        random_experiments: usize,
    ) -> Self {
        let baseline = random_folder_name(random_experiments);
        let mut runs = Vec::new();

        for bottleneck in bottlenecks {
            for &alpha in alphas {
                for concept in concepts {
                    for i in 0..random_experiments {
                        runs.push(ExperimentRun {
                            bottleneck: bottleneck.clone(),
                            alpha,
                            concept: concept.clone(),
                            negative_concept: random_folder_name(i),
                        });
                    }
                }
                for i in 0..random_experiments {
                    runs.push(ExperimentRun {
                        bottleneck: bottleneck.clone(),
                        alpha,
                        concept: random_folder_name(i),
                        negative_concept: baseline.clone(),
                    });
                }
            }
        }

        Self {
            target: target.to_string(),
            runs,
        }
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Everything the external library needs for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionRequest {
    pub target: String,
    pub concepts: Vec<String>,
    pub model: ModelSpec,
    pub source_dir: PathBuf,
    pub activation_dir: PathBuf,
    pub cav_dir: PathBuf,
    pub bottlenecks: Vec<String>,
    pub alphas: Vec<f64>,
    pub random_experiments: usize,
    pub max_examples: usize,
    pub run_parallel: bool,
    pub plan: ExperimentPlan,
}

/// One result record returned by the external library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcavResult {
    #[serde(default)]
    pub cav_key: String,
    pub cav_concept: String,
    pub negative_concept: String,
    #[serde(default)]
    pub target_class: Option<usize>,
    /// TCAV score: fraction of target examples with positive directional derivative
    pub i_up: f64,
    #[serde(default)]
    pub val_directional_dirs_abs_mean: f64,
    #[serde(default)]
    pub val_directional_dirs_mean: f64,
    #[serde(default)]
    pub val_directional_dirs_std: f64,
    #[serde(default)]
    pub note: String,
    pub alpha: f64,
    pub bottleneck: String,
    #[serde(default)]
    pub cav_accuracies: BTreeMap<String, f64>,
}

/// Results of all runs in a plan
pub type ResultsSet = Vec<TcavResult>;

/// Collaborator that computes CAVs and TCAV scores
pub trait AttributionBackend {
    fn run(&mut self, request: &AttributionRequest) -> Result<ResultsSet, AttributionError>;
}

/// Decode a JSON results set
pub fn parse_results(json: &str) -> Result<ResultsSet, AttributionError> {
    Ok(serde_json::from_str(json)?)
}

/// Backend that runs an external program
///
/// The request is written as JSON to the program's stdin; a JSON array of
/// [`TcavResult`] is expected on stdout.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
}

impl CommandBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a command vector (`[program, args...]`)
    pub fn from_command(command: &[String]) -> Result<Self, AttributionError> {
        let (program, args) = command.split_first().ok_or_else(|| {
            AttributionError::Backend("attribution command is empty".to_string())
        })?;
        Ok(Self::new(program.clone(), args.to_vec()))
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl AttributionBackend for CommandBackend {
    fn run(&mut self, request: &AttributionRequest) -> Result<ResultsSet, AttributionError> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| AttributionError::Backend(format!("Failed to encode request: {e}")))?;
        debug!("Launching {}", self.command_line());

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| AttributionError::Launch {
                command: self.command_line(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .map_err(|source| AttributionError::Io {
                    path: PathBuf::from(&self.program),
                    source,
                })?;
        }

        let output = child
            .wait_with_output()
            .map_err(|source| AttributionError::Io {
                path: PathBuf::from(&self.program),
                source,
            })?;

        if !output.status.success() {
            return Err(AttributionError::ExitStatus {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_results(&String::from_utf8_lossy(&output.stdout))
    }
}

fn ensure_dir(path: &std::path::Path) -> Result<(), AttributionError> {
    std::fs::create_dir_all(path).map_err(|source| AttributionError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Prepare cache directories, check model files, and run the backend
pub fn run_attribution(
    backend: &mut dyn AttributionBackend,
    ctx: &RunContext,
    target: &str,
    concepts: &[String],
    random_experiments: usize,
) -> Result<ResultsSet, AttributionError> {
    ensure_dir(&ctx.working_dir)?;
    ensure_dir(&ctx.activation_dir())?;
    ensure_dir(&ctx.cav_dir())?;

    for path in [&ctx.graph_path, &ctx.label_path] {
        if !path.is_file() {
            return Err(AttributionError::ModelFiles(path.clone()));
        }
    }

    let plan = ExperimentPlan::build(
        target,
        concepts,
        &ctx.bottlenecks,
        &ctx.alphas,
        random_experiments,
    );
    info!(
        "Running TCAV for '{}': {} concepts, {} runs",
        target,
        concepts.len(),
        plan.len()
    );

    let request = AttributionRequest {
        target: target.to_string(),
        concepts: concepts.to_vec(),
        model: ModelSpec {
            name: ctx.model_name.clone(),
            graph_path: ctx.graph_path.clone(),
            label_path: ctx.label_path.clone(),
        },
        source_dir: ctx.source_dir.clone(),
        activation_dir: ctx.activation_dir(),
        cav_dir: ctx.cav_dir(),
        bottlenecks: ctx.bottlenecks.clone(),
        alphas: ctx.alphas.clone(),
        random_experiments,
        max_examples: ctx.max_examples,
        run_parallel: false,
        plan,
    };

    let results = backend.run(&request)?;
    if results.is_empty() {
        return Err(AttributionError::EmptyResults(target.to_string()));
    }
    info!("TCAV returned {} results", results.len());
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_counts() {
        let concepts = vec!["dotted".to_string(), "striped".to_string()];
        let plan = ExperimentPlan::build(
            "zebra",
            &concepts,
            &["mixed4c".to_string()],
            &[0.1, 0.01],
            3,
        );
        // 2 alphas * (2 concepts * 3 randoms + 3 baseline runs)
        assert_eq!(plan.len(), 18);
        assert!(plan
            .runs
            .iter()
            .any(|r| r.concept == "random500_0" && r.negative_concept == "random500_3"));
        assert!(plan
            .runs
            .iter()
            .filter(|r| r.concept == "dotted")
            .all(|r| r.negative_concept.starts_with("random500_")));
    }

    #[test]
    fn test_parse_results_defaults() {
        let json = r#"[{"cav_concept": "dotted", "negative_concept": "random500_0",
                        "i_up": 0.75, "alpha": 0.1, "bottleneck": "mixed4c"}]"#;
        let results = parse_results(json).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].i_up, 0.75);
        assert!(results[0].cav_accuracies.is_empty());
        assert_eq!(results[0].target_class, None);
    }

    #[test]
    fn test_parse_results_malformed() {
        assert!(matches!(
            parse_results("not json"),
            Err(AttributionError::Malformed(_))
        ));
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(CommandBackend::from_command(&[]).is_err());
    }

    fn model_context(dir: &std::path::Path) -> RunContext {
        let mut ctx = RunContext::with_source_dir(dir);
        ctx.working_dir = dir.join("work");
        std::fs::create_dir_all(ctx.graph_path.parent().unwrap()).unwrap();
        std::fs::write(&ctx.graph_path, b"graph").unwrap();
        std::fs::write(&ctx.label_path, b"dummy\nzebra\n").unwrap();
        ctx
    }

    fn shell_backend(script: &str) -> CommandBackend {
        CommandBackend::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[test]
    fn test_command_backend_reads_results_from_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = model_context(dir.path());
        let request_copy = dir.path().join("request.json");
        let script = format!(
            r#"cat > '{}'; echo '[{{"cav_concept": "dotted", "negative_concept": "random500_0", "i_up": 0.8, "alpha": 0.1, "bottleneck": "mixed4c"}}]'"#,
            request_copy.display()
        );

        let mut backend = shell_backend(&script);
        let results =
            run_attribution(&mut backend, &ctx, "zebra", &["dotted".to_string()], 2).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].cav_concept, "dotted");
        assert_eq!(results[0].i_up, 0.8);

        let sent: AttributionRequest =
            serde_json::from_str(&std::fs::read_to_string(&request_copy).unwrap()).unwrap();
        assert_eq!(sent.target, "zebra");
        assert_eq!(sent.concepts, vec!["dotted".to_string()]);
        assert!(!sent.run_parallel);
        // 1 concept * 2 randoms + 2 baseline runs
        assert_eq!(sent.plan.len(), 4);
    }

    #[test]
    fn test_command_backend_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = model_context(dir.path());
        let mut backend = shell_backend("cat >/dev/null; echo 'out of memory' >&2; exit 3");
        let err = run_attribution(&mut backend, &ctx, "zebra", &["dotted".to_string()], 2)
            .unwrap_err();
        match err {
            AttributionError::ExitStatus { stderr, .. } => assert_eq!(stderr, "out of memory"),
            other => panic!("expected ExitStatus, got {other:?}"),
        }
    }

    #[test]
    fn test_command_backend_malformed_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = model_context(dir.path());
        let mut backend = shell_backend("cat >/dev/null; echo 'Loading graph...'");
        let err = run_attribution(&mut backend, &ctx, "zebra", &["dotted".to_string()], 2)
            .unwrap_err();
        assert!(matches!(err, AttributionError::Malformed(_)));
    }

    #[test]
    fn test_command_backend_empty_results() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = model_context(dir.path());
        let mut backend = shell_backend("cat >/dev/null; echo '[]'");
        let err = run_attribution(&mut backend, &ctx, "zebra", &["dotted".to_string()], 2)
            .unwrap_err();
        assert!(matches!(err, AttributionError::EmptyResults(_)));
    }

    #[test]
    fn test_missing_program_is_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = model_context(dir.path());

        let mut backend = CommandBackend::new("/nonexistent/tcav-backend", vec![]);
        let err = run_attribution(&mut backend, &ctx, "zebra", &["dotted".to_string()], 2)
            .unwrap_err();
        assert!(matches!(err, AttributionError::Launch { .. }));
        assert!(ctx.activation_dir().is_dir());
        assert!(ctx.cav_dir().is_dir());
    }

    #[test]
    fn test_missing_model_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = RunContext::with_source_dir(dir.path());
        ctx.working_dir = dir.path().join("work");
        let mut backend = CommandBackend::new("true", vec![]);
        let err = run_attribution(&mut backend, &ctx, "zebra", &[], 1).unwrap_err();
        assert!(matches!(err, AttributionError::ModelFiles(_)));
    }
}
