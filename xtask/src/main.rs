use anyhow::Result;
use clap::{Parser, Subcommand};

mod tasks;

#[derive(Parser)]
#[command(
    name = "steel-defect-unet",
    about = "Steel surface defect segmentation toolkit",
    author,
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Regroup the training CSV into one row per image
    Prepare(tasks::prepare::PrepareArgs),
    /// Render ground-truth outlines of sampled images
    Inspect(tasks::inspect::InspectArgs),
    Train(tasks::train::TrainArgs),
    /// Sweep probability thresholds over the validation split
    Evaluate(tasks::evaluate::EvaluateArgs),
    /// Write a submission CSV for the test images
    Predict(tasks::predict::PredictArgs),
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Prepare(args) => tasks::prepare::run(args),
        Commands::Inspect(args) => tasks::inspect::run(args),
        Commands::Train(args) => tasks::train::run(args),
        Commands::Evaluate(args) => tasks::evaluate::run(args),
        Commands::Predict(args) => tasks::predict::run(args),
    }
}
