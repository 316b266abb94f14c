use std::{
    fmt::Display,
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use csv::StringRecord;
use flate2::read::MultiGzDecoder;
use jiff::civil::DateTime;

use crate::{config::Compression, errors::IngestError, timestamp::parse_datetime};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Timestamp(DateTime),
}

impl Value {
    /// Text representation used when staging the value in DuckDB.
    pub fn to_sql_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            Value::Timestamp(dt) => Some(dt.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    BigInt,
    Double,
    Timestamp,
    Varchar,
}

impl Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ColumnType::*;
        match self {
            BigInt => write!(f, "BIGINT"),
            Double => write!(f, "DOUBLE"),
            Timestamp => write!(f, "TIMESTAMP"),
            Varchar => write!(f, "VARCHAR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    /// Infer the column types from a sample batch.  Columns in `datetime_columns`
    /// are always timestamps.  A column with only empty values is a VARCHAR.
    pub fn infer(batch: &Batch, datetime_columns: &[String]) -> Schema {
        let columns = batch
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let kind = if datetime_columns.contains(name) {
                    ColumnType::Timestamp
                } else {
                    infer_column(batch.rows.iter().map(|row| &row[i]))
                };
                Column {
                    name: name.clone(),
                    kind,
                }
            })
            .collect();
        Schema { columns }
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

fn infer_column<'a>(values: impl Iterator<Item = &'a Value>) -> ColumnType {
    let mut kind: Option<ColumnType> = None;
    for value in values {
        let s = match value {
            Value::Null => continue,
            Value::Timestamp(_) => return ColumnType::Timestamp,
            Value::Text(s) => s.trim(),
        };
        kind = match kind {
            None | Some(ColumnType::BigInt) if s.parse::<i64>().is_ok() => {
                Some(ColumnType::BigInt)
            }
            None | Some(ColumnType::BigInt) | Some(ColumnType::Double)
                if s.parse::<f64>().is_ok() =>
            {
                Some(ColumnType::Double)
            }
            _ => return ColumnType::Varchar,
        };
    }
    kind.unwrap_or(ColumnType::Varchar)
}

/// A bounded slice of consecutive rows from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Index of the first row of the batch among all the data rows of the source
    pub offset: u64,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Convert the text values of the given columns to timestamps, in place.
    /// Fails on the first value that isn't a recognizable datetime.
    pub fn coerce_timestamps(&mut self, names: &[String]) -> Result<(), IngestError> {
        for name in names {
            let i = self
                .column_index(name)
                .ok_or_else(|| IngestError::MissingColumn(name.clone()))?;
            for (k, row) in self.rows.iter_mut().enumerate() {
                if let Value::Text(s) = &row[i] {
                    let dt = parse_datetime(s).ok_or_else(|| IngestError::Timestamp {
                        column: name.clone(),
                        row: self.offset + k as u64 + 1,
                        value: s.clone(),
                    })?;
                    row[i] = Value::Timestamp(dt);
                }
            }
        }
        Ok(())
    }
}

/// Read a csv file in chunks of `chunk_size` rows.
pub struct BatchReader<R: Read> {
    reader: csv::Reader<R>,
    columns: Vec<String>,
    chunk_size: usize,
    offset: u64,
    record: StringRecord,
    done: bool,
}

impl BatchReader<Box<dyn Read>> {
    /// Open a local file.  With [`Compression::Infer`] the file is treated as
    /// gzip if it starts with the gzip magic bytes.  All the members of a
    /// concatenated gzip file are read.
    pub fn from_path(
        path: &Path,
        compression: Compression,
        delimiter: u8,
        chunk_size: usize,
    ) -> Result<Self, IngestError> {
        let gzip = match compression {
            Compression::Gzip => true,
            Compression::None => false,
            Compression::Infer => {
                let mut magic = [0u8; 2];
                let n = File::open(path)?.read(&mut magic)?;
                n == 2 && magic == [0x1f, 0x8b]
            }
        };
        let file = BufReader::new(File::open(path)?);
        let rdr: Box<dyn Read> = if gzip {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };
        BatchReader::new(rdr, delimiter, chunk_size)
    }
}

impl<R: Read> BatchReader<R> {
    pub fn new(rdr: R, delimiter: u8, chunk_size: usize) -> Result<Self, IngestError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .from_reader(rdr);
        let columns = reader.headers()?.iter().map(|h| h.to_string()).collect();
        Ok(BatchReader {
            reader,
            columns,
            chunk_size: chunk_size.max(1),
            offset: 0,
            record: StringRecord::new(),
            done: false,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Return the next batch, or `None` once the source is exhausted.
    pub fn next_batch(&mut self) -> Result<Option<Batch>, IngestError> {
        if self.done {
            return Ok(None);
        }
        let mut rows = Vec::with_capacity(self.chunk_size.min(16_384));
        while rows.len() < self.chunk_size {
            if !self.reader.read_record(&mut self.record)? {
                self.done = true;
                break;
            }
            let row = self
                .record
                .iter()
                .map(|field| match field {
                    "" => Value::Null,
                    s => Value::Text(s.to_string()),
                })
                .collect();
            rows.push(row);
        }
        if rows.is_empty() {
            return Ok(None);
        }
        let batch = Batch {
            columns: self.columns.clone(),
            offset: self.offset,
            rows,
        };
        self.offset += batch.len() as u64;
        Ok(Some(batch))
    }
}

impl<R: Read> Iterator for BatchReader<R> {
    type Item = Result<Batch, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
