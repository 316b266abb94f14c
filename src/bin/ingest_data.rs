use std::error::Error;

use clap::Parser;
use log::info;
use taxi_ingest::{config::IngestConfig, pipeline::run};

/// Download a csv file and load it into a Postgres table, one chunk at a time.
fn main() -> Result<(), Box<dyn Error>> {
    // a missing .env file is fine, the flags can come from the command line
    let _ = dotenvy::dotenv();
    let args = IngestConfig::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let summary = run(&args)?;
    info!("done, {} rows inserted", summary.rows);
    Ok(())
}
