//! Pipeline runner for concept detection
//!
//! Coordinates dataset materialization, TCAV attribution and score ranking.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::concepts::{resolve_concepts, unique_concepts};
use crate::context::{RunConfig, RunContext};
use crate::dataset_tool::{run_dataset_tool, DatasetToolArgs};
use crate::materialize::{materialize, MaterializeSummary};
use crate::report::{aggregate, Ranking};
use crate::summary::{SignificanceSummarizer, Summarizer};
use crate::tcav::{run_attribution, AttributionBackend, ResultsSet};

/// How image folders are produced before attribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetStage {
    /// Build folders in this process
    InProcess,
    /// Run the `make_datasets` binary, forwarding an optional context file
    Tool {
        program: PathBuf,
        config: Option<PathBuf>,
    },
    /// Folders already exist
    Skip,
}

/// Results from a full run
#[derive(Debug)]
pub struct PipelineResults {
    /// Present when folders were built in-process
    pub materialized: Option<MaterializeSummary>,
    /// Raw attribution results
    pub results: ResultsSet,
    /// Ranked concept scores
    pub ranking: Ranking,
}

/// Main pipeline runner
pub struct Pipeline {
    ctx: RunContext,
    config: RunConfig,
    backend: Box<dyn AttributionBackend>,
    summarizer: Box<dyn Summarizer>,
    dataset_stage: DatasetStage,
}

impl Pipeline {
    /// Create a pipeline that materializes in-process and uses the default summarizer
    pub fn new(ctx: RunContext, config: RunConfig, backend: Box<dyn AttributionBackend>) -> Self {
        Self {
            ctx,
            config,
            backend,
            summarizer: Box::new(SignificanceSummarizer::default()),
            dataset_stage: DatasetStage::InProcess,
        }
    }

    pub fn with_dataset_stage(mut self, stage: DatasetStage) -> Self {
        self.dataset_stage = stage;
        self
    }

    pub fn with_summarizer(mut self, summarizer: Box<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Run all stages; any failure abandons the run
    pub fn run(&mut self) -> Result<PipelineResults> {
        info!("Starting concept detection for '{}'", self.config.target);
        info!("Config: {:?}", self.config);

        let listed = resolve_concepts(self.ctx.texture_csv.as_deref())?;
        // One folder and one ranking entry per concept name
        let concepts = unique_concepts(&listed);
        if concepts.len() < listed.len() {
            warn!(
                "Ignoring {} repeated concept names in the texture metadata",
                listed.len() - concepts.len()
            );
        }
        info!("{} candidate concepts", concepts.len());

        let materialized = self.prepare_dataset(&concepts)?;

        let results = run_attribution(
            self.backend.as_mut(),
            &self.ctx,
            &self.config.target,
            &concepts,
            self.config.random_experiments,
        )
        .context("TCAV attribution failed")?;

        let ranking = aggregate(
            &results,
            self.config.random_experiments,
            self.config.n,
            self.summarizer.as_ref(),
        )?;

        if let Some(best) = ranking.top.first() {
            info!("Top concept: {} ({:.4})", best.concept, best.score);
        }

        Ok(PipelineResults {
            materialized,
            results,
            ranking,
        })
    }

    fn prepare_dataset(&self, concepts: &[String]) -> Result<Option<MaterializeSummary>> {
        match &self.dataset_stage {
            DatasetStage::InProcess => {
                let summary = materialize(
                    &self.ctx,
                    &self.config.target,
                    concepts,
                    self.config.images_per_folder,
                    self.config.random_folder_count(),
                    self.config.seed,
                )?;
                Ok(Some(summary))
            }
            DatasetStage::Tool { program, config } => {
                let args = DatasetToolArgs {
                    source_dir: self.ctx.source_dir.clone(),
                    target: self.config.target.clone(),
                    images_per_folder: self.config.images_per_folder,
                    random_experiments: self.config.random_experiments,
                    config: config.clone(),
                    seed: self.config.seed,
                };
                run_dataset_tool(program, &args)?;
                Ok(None)
            }
            DatasetStage::Skip => Ok(None),
        }
    }
}
