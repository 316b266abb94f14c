use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("download of {url} failed with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("column {0} not found in the csv header")]
    MissingColumn(String),

    #[error("can't parse {value:?} as a timestamp in column {column}, data row {row}")]
    Timestamp {
        column: String,
        /// 1-based, the header line is not counted
        row: u64,
        value: String,
    },

    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("{0}")]
    InvalidConfig(String),
}
