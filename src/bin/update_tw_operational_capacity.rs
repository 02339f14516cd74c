use std::error::Error;

use clap::Parser;
use log::info;
use tw_capacity::{config::Config, db::tw::pipeline::Pipeline};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of trailing days to process, today included
    #[arg(default_value_t = 3)]
    days: u32,
}

/// Run this job every morning.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Ok(path) = dotenvy::dotenv() {
        info!("Loaded environment from {}", path.display());
    }
    let config = Config::from_env()?;

    let mut pipeline = Pipeline::from_config(&config)?;
    let summary = pipeline.run(args.days)?;
    info!(
        "Done.  {} new records, {} of {} days failed",
        summary.inserted(),
        summary.failed(),
        summary.days.len()
    );
    Ok(())
}
