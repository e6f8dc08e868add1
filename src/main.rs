//! ACD-rs CLI: Automatic Concept Detection with TCAV

use std::path::PathBuf;
use std::process::ExitCode;

use acd_rs::{
    render_chart, write_report, CommandBackend, DatasetStage, Pipeline, RunConfig, RunContext,
};
use anyhow::{Context, Result};
use clap::builder::RangedU64ValueParser;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "acd-rs")]
#[command(about = "Automatic concept detection: rank texture concepts for a target class with TCAV")]
#[command(version)]
struct Cli {
    /// Name of the target class (e.g. "zebra", "Egyptian cat")
    #[arg(long)]
    target: String,

    /// Number of most important concepts to display (omit to display all)
    #[arg(long, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    n: Option<usize>,

    /// Show the score chart ("true"/"false"; shown when omitted)
    #[arg(long = "show_plot")]
    show_plot: Option<String>,

    /// Number of images in each folder
    #[arg(long = "number_of_images_per_folder", default_value_t = 50)]
    number_of_images_per_folder: usize,

    /// Number of random experiments; one extra random folder is created
    #[arg(
        long = "number_of_random_folders",
        default_value_t = 10,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    number_of_random_folders: usize,

    /// JSON file overriding paths and model settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding image folders, Broden and model files
    #[arg(long = "source_dir")]
    source_dir: Option<PathBuf>,

    /// Directory for cached activations and CAVs
    #[arg(long = "working_dir")]
    working_dir: Option<PathBuf>,

    /// Build folders by running this `make_datasets` binary instead of in-process
    #[arg(long = "dataset_tool", conflicts_with = "skip_download")]
    dataset_tool: Option<PathBuf>,

    /// Reuse existing image folders
    #[arg(long = "skip_download")]
    skip_download: bool,

    /// Attribution command: program followed by its arguments
    #[arg(long = "attribution_cmd", num_args = 1..)]
    attribution_cmd: Option<Vec<String>>,

    /// Seed for random folder sampling
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Write the full ranking as JSON to this directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Absent or unrecognized values show the chart
fn parse_show_plot(value: Option<&str>) -> bool {
    !matches!(value.map(str::to_lowercase).as_deref(), Some("false"))
}

fn build_context(cli: &Cli) -> Result<RunContext> {
    let mut ctx = match (&cli.config, &cli.source_dir) {
        (Some(path), _) => RunContext::from_json_file(path)?,
        (None, Some(source_dir)) => RunContext::with_source_dir(source_dir),
        (None, None) => RunContext::default(),
    };
    if let (Some(_), Some(source_dir)) = (&cli.config, &cli.source_dir) {
        ctx.rebase_source_dir(source_dir.clone());
    }
    if let Some(working_dir) = &cli.working_dir {
        ctx.working_dir = working_dir.clone();
    }
    if let Some(cmd) = &cli.attribution_cmd {
        ctx.attribution_command = cmd.clone();
    }
    Ok(ctx)
}

fn run(cli: &Cli) -> Result<()> {
    let ctx = build_context(cli)?;
    let config = RunConfig {
        target: cli.target.clone(),
        n: cli.n,
        show_plot: parse_show_plot(cli.show_plot.as_deref()),
        images_per_folder: cli.number_of_images_per_folder,
        random_experiments: cli.number_of_random_folders,
        seed: cli.seed,
    };

    println!("=== ACD-rs: Automatic Concept Detection ===");
    println!("Target: {}", config.target);
    println!("Source: {}", ctx.source_dir.display());
    println!("Work:   {}", ctx.working_dir.display());

    let stage = if cli.skip_download {
        DatasetStage::Skip
    } else if let Some(program) = &cli.dataset_tool {
        DatasetStage::Tool {
            program: program.clone(),
            config: cli.config.clone(),
        }
    } else {
        DatasetStage::InProcess
    };

    let backend = CommandBackend::from_command(&ctx.attribution_command)?;
    let mut pipeline =
        Pipeline::new(ctx, config.clone(), Box::new(backend)).with_dataset_stage(stage);

    println!("This may take a while...");
    let results = pipeline.run()?;

    if let Some(summary) = &results.materialized {
        if summary.target_images < config.images_per_folder {
            println!(
                "You requested {} but we were only able to find {} good images for {}",
                config.images_per_folder, summary.target_images, config.target
            );
        }
    }

    if config.show_plot {
        println!("\n{}", render_chart(&config.target, &results.ranking));
    }

    let stdout = std::io::stdout();
    write_report(&mut stdout.lock(), &config.target, &results.ranking.top)?;

    if let Some(output) = &cli.output {
        std::fs::create_dir_all(output)
            .with_context(|| format!("Failed to create {}", output.display()))?;
        let path = output.join("acd_results.json");
        std::fs::write(&path, serde_json::to_string_pretty(&results.ranking.all)?)?;
        info!("Results saved to {}", path.display());
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install logger: {e}");
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{e}");
            println!("{e:?}");
            println!("\nTerminating.\n");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_plot_tri_state() {
        assert!(parse_show_plot(None));
        assert!(parse_show_plot(Some("TRUE")));
        assert!(!parse_show_plot(Some("False")));
        assert!(parse_show_plot(Some("maybe")));
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "acd-rs",
            "--target=Egyptian cat",
            "--n=2",
            "--show_plot=false",
            "--number_of_images_per_folder=20",
            "--number_of_random_folders=5",
        ])
        .unwrap();
        assert_eq!(cli.target, "Egyptian cat");
        assert_eq!(cli.n, Some(2));
        assert_eq!(cli.number_of_random_folders, 5);
        assert!(Cli::try_parse_from(["acd-rs", "--target=zebra", "--n=0"]).is_err());
        assert!(Cli::try_parse_from(["acd-rs"]).is_err());
    }

    #[test]
    fn test_zero_random_folders_rejected() {
        let err = Cli::try_parse_from(["acd-rs", "--target=zebra", "--number_of_random_folders=0"]);
        assert!(err.is_err());
        let cli = Cli::try_parse_from(["acd-rs", "--target=zebra"]).unwrap();
        assert_eq!(cli.number_of_random_folders, 10);
    }

    #[test]
    fn test_config_with_source_dir_moves_derived_paths() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, br#"{"model_name": "InceptionV3"}"#).unwrap();
        let config = format!("--config={}", file.path().display());

        let cli = Cli::try_parse_from([
            "acd-rs",
            "--target=zebra",
            config.as_str(),
            "--source_dir=/data",
        ])
        .unwrap();
        let ctx = build_context(&cli).unwrap();
        assert_eq!(ctx.source_dir, PathBuf::from("/data"));
        assert_eq!(ctx.model_name, "InceptionV3");
        assert!(ctx.graph_path.starts_with("/data"));
        assert!(ctx.label_path.starts_with("/data"));
        assert_eq!(ctx.texture_images_dir(), PathBuf::from("/data/broden1_224/images/dtd"));
    }

    #[test]
    fn test_attribution_cmd_keeps_arguments_with_spaces() {
        let cli = Cli::try_parse_from([
            "acd-rs",
            "--attribution_cmd",
            "/opt/tcav tools/python3",
            "backend.py",
            "--target=zebra",
        ])
        .unwrap();
        assert_eq!(cli.target, "zebra");
        let ctx = build_context(&cli).unwrap();
        assert_eq!(
            ctx.attribution_command,
            vec!["/opt/tcav tools/python3".to_string(), "backend.py".to_string()]
        );
    }
}
