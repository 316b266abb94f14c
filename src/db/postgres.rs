use std::{fmt::Display, time::Duration};

use duckdb::Connection;
use log::info;

use crate::{
    errors::IngestError,
    utils::lib_duckdb::{quote_literal, WithRetry},
};

/// Name the Postgres database is attached under in DuckDB.
pub const PG_CATALOG: &str = "pg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub db: String,
}

impl PgConfig {
    /// The libpq keyword/value connection string.
    pub fn conninfo(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            conninfo_value(&self.host),
            self.port,
            conninfo_value(&self.db),
            conninfo_value(&self.user),
            conninfo_value(&self.password),
        )
    }

    /// Open an in-memory DuckDB connection with the Postgres database
    /// attached as [`PG_CATALOG`].
    pub fn connect(&self, max_attempts: u32) -> Result<Connection, IngestError> {
        info!("connecting to {}", self);
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("INSTALL postgres; LOAD postgres;")?;
        let sql = format!(
            "ATTACH {} AS {} (TYPE postgres);",
            quote_literal(&self.conninfo()),
            PG_CATALOG
        );
        conn.execute_batch_with_retry(&sql, max_attempts.max(1), Duration::from_millis(250))?;
        Ok(conn)
    }
}

/// Display as a connection url with the password masked, for logging.
impl Display for PgConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "postgresql://{}:***@{}:{}/{}",
            self.user, self.host, self.port, self.db
        )
    }
}

fn conninfo_value(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}
