//! Builds target, texture concept and random folders for a TCAV run
//!
//! Usage:
//!   make_datasets --source_dir=IMGNET_DOWNLOAD --target="zebra" \
//!       --number_of_images_per_folder=50 --number_of_random_folders=10

use std::path::PathBuf;
use std::process::ExitCode;

use acd_rs::concepts::{resolve_concepts, unique_concepts};
use acd_rs::{materialize, RunContext};
use anyhow::Result;
use clap::builder::RangedU64ValueParser;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "make_datasets")]
#[command(about = "Create target, concept and random folders for TCAV")]
struct Args {
    /// Directory where the folders are created
    #[arg(long = "source_dir")]
    source_dir: PathBuf,

    /// Name of the target class
    #[arg(long)]
    target: String,

    /// Number of images in each folder
    #[arg(long = "number_of_images_per_folder")]
    number_of_images_per_folder: usize,

    /// Number of random experiments (one extra folder is created)
    #[arg(
        long = "number_of_random_folders",
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    number_of_random_folders: usize,

    /// JSON file overriding corpus paths
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for random folder sampling
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn run(args: &Args) -> Result<()> {
    let ctx = match &args.config {
        Some(path) => {
            let mut ctx = RunContext::from_json_file(path)?;
            ctx.rebase_source_dir(&args.source_dir);
            ctx
        }
        None => RunContext::with_source_dir(&args.source_dir),
    };

    if !ctx.source_dir.exists() {
        std::fs::create_dir_all(&ctx.source_dir)?;
        println!("Created source directory at {}", ctx.source_dir.display());
    }

    let concepts = unique_concepts(&resolve_concepts(ctx.texture_csv.as_deref())?);
    let summary = materialize(
        &ctx,
        &args.target,
        &concepts,
        args.number_of_images_per_folder,
        args.number_of_random_folders + 1,
        args.seed,
    )?;

    if summary.target_images < args.number_of_images_per_folder {
        println!(
            "You requested {} but we were only able to find {} good images for {}",
            args.number_of_images_per_folder, summary.target_images, args.target
        );
    }
    println!("Successfully created data at {}", ctx.source_dir.display());
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install logger: {e}");
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:?}");
            ExitCode::FAILURE
        }
    }
}
