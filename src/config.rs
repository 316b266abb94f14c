use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::{db::postgres::PgConfig, errors::IngestError};

/// What to do when the destination table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IfExists {
    /// Drop the existing table and create it again from the csv header
    Replace,
    /// Keep the existing table and add the rows to it
    Append,
    /// Stop with an error
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Compression {
    Gzip,
    None,
    /// Look at the first two bytes of the file
    Infer,
}

/// Ingest CSV data to Postgres
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct IngestConfig {
    /// username for postgres
    #[arg(long, env = "PGUSER")]
    pub user: String,

    /// password for postgres
    #[arg(long, env = "PGPASSWORD", hide_env_values = true)]
    pub password: String,

    /// host for postgres
    #[arg(long, env = "PGHOST")]
    pub host: String,

    /// port for postgres
    #[arg(long, env = "PGPORT")]
    pub port: u16,

    /// database name for postgres
    #[arg(long, env = "PGDATABASE")]
    pub db: String,

    /// name of the table
    #[arg(long = "table_name")]
    pub table_name: String,

    /// url of the csv file
    #[arg(long)]
    pub url: String,

    /// local path the csv file is downloaded to, overwritten on each run
    #[arg(long, default_value = "output.csv")]
    pub output: PathBuf,

    /// number of rows inserted in one go
    #[arg(long = "chunk_size", default_value_t = 100_000)]
    pub chunk_size: usize,

    /// columns converted from text to timestamps
    #[arg(
        long = "datetime_columns",
        value_delimiter = ',',
        default_value = "tpep_pickup_datetime,tpep_dropoff_datetime"
    )]
    pub datetime_columns: Vec<String>,

    #[arg(long, value_enum, default_value_t = Compression::Gzip)]
    pub compression: Compression,

    /// csv field delimiter
    #[arg(long, default_value_t = ',')]
    pub delimiter: char,

    #[arg(long = "if_exists", value_enum, default_value_t = IfExists::Replace)]
    pub if_exists: IfExists,

    /// postgres schema of the destination table
    #[arg(long, default_value = "public")]
    pub schema: String,

    /// how many times to try attaching the database before giving up
    #[arg(long = "connect_attempts", default_value_t = 1)]
    pub connect_attempts: u32,
}

impl IngestConfig {
    pub fn pg_config(&self) -> PgConfig {
        PgConfig {
            user: self.user.clone(),
            password: self.password.clone(),
            host: self.host.clone(),
            port: self.port,
            db: self.db.clone(),
        }
    }

    /// Check the values clap can't check on its own.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidConfig(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if self.connect_attempts == 0 {
            return Err(IngestError::InvalidConfig(
                "connect_attempts must be at least 1".to_string(),
            ));
        }
        if !self.delimiter.is_ascii() {
            return Err(IngestError::InvalidConfig(format!(
                "delimiter {:?} is not a single byte character",
                self.delimiter
            )));
        }
        if self.table_name.is_empty() {
            return Err(IngestError::InvalidConfig(
                "table_name can't be empty".to_string(),
            ));
        }
        Ok(())
    }
}
