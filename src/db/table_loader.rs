use std::fmt::Display;

use duckdb::{appender_params_from_iter, Connection};
use itertools::Itertools;
use log::{debug, info};

use crate::{
    batch::{Batch, Schema, Value},
    config::IfExists,
    errors::IngestError,
    utils::lib_duckdb::quote_ident,
};

/// Local table that holds one batch before it is copied to the target.
const STAGING_TABLE: &str = "__taxi_ingest_staging";

/// A table in a (possibly attached) database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(name: &str) -> TableRef {
        TableRef {
            catalog: None,
            schema: None,
            name: name.to_string(),
        }
    }
}

impl Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts = [&self.catalog, &self.schema]
            .into_iter()
            .flatten()
            .chain(std::iter::once(&self.name))
            .map(|p| quote_ident(p))
            .join(".");
        write!(f, "{}", parts)
    }
}

/// Owns the database connection for the duration of a load.  The staging
/// table is dropped and the connection closed when the loader goes away.
pub struct TableLoader {
    conn: Connection,
    target: TableRef,
    schema: Option<Schema>,
}

impl TableLoader {
    pub fn new(conn: Connection, target: TableRef) -> TableLoader {
        TableLoader {
            conn,
            target,
            schema: None,
        }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn target(&self) -> &TableRef {
        &self.target
    }

    /// Create the destination table with the columns of `schema`.
    pub fn create_table(&mut self, schema: &Schema, if_exists: IfExists) -> Result<(), IngestError> {
        let columns = schema
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.kind))
            .join(", ");
        let sql = match if_exists {
            IfExists::Replace => format!(
                "DROP TABLE IF EXISTS {0};\nCREATE TABLE {0} ({1});",
                self.target, columns
            ),
            IfExists::Append => format!("CREATE TABLE IF NOT EXISTS {} ({});", self.target, columns),
            IfExists::Fail => format!("CREATE TABLE {} ({});", self.target, columns),
        };
        debug!("{}", sql);
        self.conn.execute_batch(&sql)?;

        let staging_columns = schema
            .columns
            .iter()
            .map(|c| format!("{} VARCHAR", quote_ident(&c.name)))
            .join(", ");
        self.conn.execute_batch(&format!(
            "CREATE OR REPLACE TABLE {} ({});",
            quote_ident(STAGING_TABLE),
            staging_columns
        ))?;

        info!("created table {} with {} columns", self.target, schema.columns.len());
        self.schema = Some(schema.clone());
        Ok(())
    }

    /// Append the rows of a batch to the destination table, in one statement.
    /// Return the number of rows inserted.
    pub fn append(&mut self, batch: &Batch) -> Result<usize, IngestError> {
        let schema = self.schema.as_ref().ok_or_else(|| {
            IngestError::InvalidConfig(format!("table {} was not created", self.target))
        })?;
        if batch.columns.len() != schema.columns.len() {
            return Err(IngestError::InvalidConfig(format!(
                "batch has {} columns, table {} has {}",
                batch.columns.len(),
                self.target,
                schema.columns.len()
            )));
        }

        let staging = quote_ident(STAGING_TABLE);
        self.conn.execute_batch(&format!("DELETE FROM {};", staging))?;
        {
            let mut appender = self.conn.appender(STAGING_TABLE)?;
            for row in &batch.rows {
                appender.append_row(appender_params_from_iter(row.iter().map(Value::to_sql_text)))?;
            }
            appender.flush()?;
        }

        let sql = format!(
            "INSERT INTO {} ({}) SELECT {} FROM {};",
            self.target,
            schema.columns.iter().map(|c| quote_ident(&c.name)).join(", "),
            schema
                .columns
                .iter()
                .map(|c| format!("CAST({} AS {})", quote_ident(&c.name), c.kind))
                .join(", "),
            staging
        );
        let n = self.conn.execute(&sql, [])?;
        self.conn.execute_batch(&format!("DELETE FROM {};", staging))?;
        Ok(n)
    }

    pub fn row_count(&self) -> Result<u64, IngestError> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", self.target), [], |r| r.get(0))?;
        Ok(n as u64)
    }

    /// Column names and types of the destination table, in table order.
    pub fn columns(&self) -> Result<Vec<(String, String)>, IngestError> {
        let mut stmt = self
            .conn
            .prepare(&format!("DESCRIBE SELECT * FROM {}", self.target))?;
        let columns = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }
}

impl Drop for TableLoader {
    fn drop(&mut self) {
        let _ = self
            .conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {};", quote_ident(STAGING_TABLE)));
    }
}
