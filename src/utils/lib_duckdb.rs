use std::time::Duration;

use log::warn;

pub trait WithRetry {
    /// Use this function when you have an `execute_batch` statement which
    /// attaches a remote database that may not be accepting connections yet.
    /// Suggested `initial_wait = Duration::from_millis(250)`.
    fn execute_batch_with_retry(
        &self,
        sql: &str,
        max_attempts: u32,
        initial_wait: Duration,
    ) -> Result<(), duckdb::Error>;
}

impl WithRetry for duckdb::Connection {
    fn execute_batch_with_retry(
        &self,
        sql: &str,
        max_attempts: u32,
        initial_wait: Duration,
    ) -> Result<(), duckdb::Error> {
        let mut attempts = 0;
        let mut wait_duration = initial_wait;

        loop {
            match self.execute_batch(sql) {
                Ok(_) => return Ok(()),
                Err(e) => {
                    attempts += 1;
                    if attempts >= max_attempts {
                        return Err(e);
                    }
                    warn!(
                        "Retrying DuckDB execute_batch after error: {} (attempt {}/{})",
                        e, attempts, max_attempts
                    );
                    std::thread::sleep(wait_duration);
                    wait_duration *= 2;
                }
            }
        }
    }
}

/// Quote an identifier for DuckDB, keeping its case.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for DuckDB.
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
