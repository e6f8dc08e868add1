//! Run configuration and path context
//!
//! Every path the pipeline touches lives in [`RunContext`], which is threaded
//! through each stage instead of relying on the process working directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of random baseline folders (`random500_0`, `random500_1`, ...)
pub const RANDOM_FOLDER_PREFIX: &str = "random500";

/// Name of the i-th random baseline folder
pub fn random_folder_name(index: usize) -> String {
    format!("{RANDOM_FOLDER_PREFIX}_{index}")
}

/// User-facing options for a single run
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Target class label (e.g. "zebra")
    pub target: String,
    /// Number of top concepts to report (None = all)
    pub n: Option<usize>,
    /// Render the score chart before the ranking
    pub show_plot: bool,
    /// Images copied into every folder
    pub images_per_folder: usize,
    /// Random experiments; one extra random folder is materialized for the baseline
    pub random_experiments: usize,
    /// Seed for random folder sampling
    pub seed: u64,
}

impl RunConfig {
    /// Create a config with default counts for a target
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            n: None,
            show_plot: true,
            images_per_folder: 50,
            random_experiments: 10,
            seed: 42,
        }
    }

    /// Number of random folders that must exist on disk
    pub fn random_folder_count(&self) -> usize {
        self.random_experiments + 1
    }
}

/// Paths and model settings shared by all pipeline stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunContext {
    /// Directory holding image folders, Broden and the model files
    pub source_dir: PathBuf,
    /// Root of cached activations and CAVs
    pub working_dir: PathBuf,
    /// Background corpus root (tiny-imagenet-200 layout)
    pub background_dir: PathBuf,
    /// Broden root (contains `images/dtd/`)
    pub broden_dir: PathBuf,
    /// Optional texture metadata; the compiled-in catalog is used when absent
    pub texture_csv: Option<PathBuf>,
    /// Model wrapper name passed to the attribution backend
    pub model_name: String,
    /// Frozen classifier graph
    pub graph_path: PathBuf,
    /// Newline-delimited label file, ordered by logit index
    pub label_path: PathBuf,
    /// Bottleneck layers to analyze
    pub bottlenecks: Vec<String>,
    /// Regularization strengths for the CAV linear classifier
    pub alphas: Vec<f64>,
    /// Cap on images per activation set
    pub max_examples: usize,
    /// External program implementing the attribution contract
    pub attribution_command: Vec<String>,
}

impl Default for RunContext {
    fn default() -> Self {
        let source_dir = PathBuf::from("tcav/tcav_examples/image_models/imagenet/IMGNET_DOWNLOAD");
        Self::with_source_dir(source_dir)
    }
}

impl RunContext {
    /// Default layout rooted at `source_dir`
    pub fn with_source_dir(source_dir: impl Into<PathBuf>) -> Self {
        let source_dir = source_dir.into();
        Self {
            working_dir: std::env::temp_dir().join("acd").join("tcav_class_test"),
            background_dir: PathBuf::from("tiny-imagenet-200"),
            broden_dir: source_dir.join("broden1_224"),
            texture_csv: None,
            model_name: "GoogleNet".to_string(),
            graph_path: source_dir.join("inception5h/tensorflow_inception_graph.pb"),
            label_path: source_dir.join("inception5h/imagenet_comp_graph_label_strings.txt"),
            bottlenecks: vec!["mixed4c".to_string()],
            alphas: vec![0.1],
            max_examples: 100,
            attribution_command: vec!["python3".to_string(), "tcav_backend.py".to_string()],
            source_dir,
        }
    }

    /// Load overrides from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut ctx: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        // Derived paths left out of the file follow its source_dir
        let source_dir = std::mem::replace(&mut ctx.source_dir, Self::default().source_dir);
        ctx.rebase_source_dir(source_dir);
        Ok(ctx)
    }

    /// Move to a new source directory
    ///
    /// Source-relative paths still at their derived defaults follow the new
    /// root; paths set explicitly (e.g. in a config file) are kept.
    pub fn rebase_source_dir(&mut self, source_dir: impl Into<PathBuf>) {
        let old = Self::with_source_dir(self.source_dir.clone());
        let new = Self::with_source_dir(source_dir);
        if self.broden_dir == old.broden_dir {
            self.broden_dir = new.broden_dir;
        }
        if self.graph_path == old.graph_path {
            self.graph_path = new.graph_path;
        }
        if self.label_path == old.label_path {
            self.label_path = new.label_path;
        }
        self.source_dir = new.source_dir;
    }

    /// Cached activations directory
    pub fn activation_dir(&self) -> PathBuf {
        self.working_dir.join("activations")
    }

    /// Cached CAVs directory
    pub fn cav_dir(&self) -> PathBuf {
        self.working_dir.join("cavs")
    }

    /// Image folder for a target, concept or random set
    pub fn image_folder(&self, name: &str) -> PathBuf {
        self.source_dir.join(name)
    }

    /// Broden DTD texture images
    pub fn texture_images_dir(&self) -> PathBuf {
        self.broden_dir.join("images").join("dtd")
    }
}
