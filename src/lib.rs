// Pedantic clippy configuration
#![allow(clippy::cast_precision_loss)] // usize→f64 in score statistics
#![allow(clippy::cast_possible_truncation)] // f64→usize for chart bar lengths
#![allow(clippy::cast_sign_loss)] // f64→usize when value is known positive
#![allow(clippy::module_name_repetitions)] // DatasetError in error.rs is fine
#![allow(clippy::doc_markdown)] // backticks for every technical term is excessive
#![allow(clippy::missing_errors_doc)] // # Errors section for every Result fn
#![allow(clippy::must_use_candidate)] // #[must_use] on every pure fn is excessive
#![allow(clippy::return_self_not_must_use)] // #[must_use] on builder-style Self returns
#![allow(clippy::needless_pass_by_value)] // value params for API flexibility
#![allow(clippy::float_cmp)] // exact zero checks in the t-test

//! ACD-rs: Automatic Concept Detection
//!
//! Ranks which texture concepts matter to an image classifier's prediction
//! for a target class, using TCAV (Testing with Concept Activation Vectors)
//! as an external attribution collaborator.
//!
//! ## Architecture
//!
//! - `context`: RunConfig and RunContext (all paths and model settings)
//! - `concepts`: Fixed texture concept catalog and Broden metadata parsing
//! - `imagenet`: Background corpus index (tiny-imagenet layout)
//! - `materialize`: Target, concept and random image folder construction
//! - `dataset_tool`: Out-of-process invocation of the `make_datasets` binary
//! - `tcav`: Attribution request/plan and the `AttributionBackend` seam
//! - `summary`: Per-concept statistics and significance testing
//! - `report`: Ranking, top-N truncation and stdout reporting
//! - `pipeline`: Pipeline runner coordinating all stages
//! - `error`: Typed errors for each stage

pub mod concepts;
pub mod context;
pub mod dataset_tool;
pub mod error;
pub mod imagenet;
pub mod materialize;
pub mod pipeline;
pub mod report;
pub mod summary;
pub mod tcav;

pub use concepts::{all_texture_concepts, load_texture_concepts, unique_concepts, TEXTURE_CONCEPTS};
pub use context::{random_folder_name, RunConfig, RunContext, RANDOM_FOLDER_PREFIX};
pub use dataset_tool::{run_dataset_tool, DatasetToolArgs};
pub use error::{AttributionError, DatasetError, ReportError, SubprocessError};
pub use imagenet::{BackgroundClass, BackgroundCorpus};
pub use materialize::{materialize, MaterializeSummary, Materializer, RANDOM_ATTEMPT_FACTOR};
pub use pipeline::{DatasetStage, Pipeline, PipelineResults};
pub use report::{aggregate, format_score, rank, render_chart, write_report, Ranking, ScoreRecord};
pub use summary::{ConceptSummary, SignificanceSummarizer, Summarizer};
pub use tcav::{
    parse_results, run_attribution, AttributionBackend, AttributionRequest, CommandBackend,
    ExperimentPlan, ExperimentRun, ModelSpec, ResultsSet, TcavResult,
};
