use std::{io::Read, time::Instant};

use log::info;

use crate::{
    batch::{Batch, BatchReader, Schema},
    config::{IfExists, IngestConfig},
    db::{
        postgres::PG_CATALOG,
        table_loader::{TableLoader, TableRef},
    },
    errors::IngestError,
    fetch::download_file,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub batches: usize,
    pub rows: u64,
}

/// Fail early if one of the datetime columns is not in the header.
pub fn check_columns(header: &[String], datetime_columns: &[String]) -> Result<(), IngestError> {
    match datetime_columns.iter().find(|c| !header.contains(c)) {
        Some(c) => Err(IngestError::MissingColumn(c.clone())),
        None => Ok(()),
    }
}

/// Create the destination table from the first batch, then append every batch
/// until the source runs out.  The header is expected to have been checked with
/// [`check_columns`] already.
pub fn load_batches<R: Read>(
    mut reader: BatchReader<R>,
    loader: &mut TableLoader,
    datetime_columns: &[String],
    if_exists: IfExists,
) -> Result<LoadSummary, IngestError> {
    let mut next = reader.next_batch()?;
    let schema = match &next {
        Some(batch) => Schema::infer(batch, datetime_columns),
        None => Schema::infer(
            &Batch {
                columns: reader.columns().to_vec(),
                rows: vec![],
                offset: 0,
            },
            datetime_columns,
        ),
    };
    loader.create_table(&schema, if_exists)?;

    let mut summary = LoadSummary::default();
    while let Some(mut batch) = next {
        let start = Instant::now();
        batch.coerce_timestamps(datetime_columns)?;
        let n = loader.append(&batch)?;
        summary.batches += 1;
        summary.rows += n as u64;
        info!(
            "inserted another chunk of {} rows, took {:.3} seconds",
            n,
            start.elapsed().as_secs_f64()
        );
        drop(batch);
        next = reader.next_batch()?;
    }
    Ok(summary)
}

/// Download the file, connect to Postgres and load the file into the table.
pub fn run(config: &IngestConfig) -> Result<LoadSummary, IngestError> {
    config.validate()?;
    download_file(&config.url, &config.output)?;

    let reader = BatchReader::from_path(
        &config.output,
        config.compression,
        config.delimiter as u8,
        config.chunk_size,
    )?;
    check_columns(reader.columns(), &config.datetime_columns)?;

    let conn = config.pg_config().connect(config.connect_attempts)?;
    let target = TableRef {
        catalog: Some(PG_CATALOG.to_string()),
        schema: Some(config.schema.clone()),
        name: config.table_name.clone(),
    };
    let mut loader = TableLoader::new(conn, target);
    let summary = load_batches(
        reader,
        &mut loader,
        &config.datetime_columns,
        config.if_exists,
    )?;
    info!(
        "loaded {} rows in {} chunks into {}",
        summary.rows,
        summary.batches,
        loader.target()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use duckdb::Connection;
    use flate2::{write::GzEncoder, Compression as GzLevel};
    use std::error::Error;
    use std::fs::File;
    use std::io::Write;
    use std::net::TcpListener;

    fn init_logger() {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Info)
            .is_test(true)
            .try_init();
    }

    fn datetime_columns() -> Vec<String> {
        vec![
            "tpep_pickup_datetime".to_string(),
            "tpep_dropoff_datetime".to_string(),
        ]
    }

    fn taxi_csv(n: usize) -> String {
        let mut s = String::from(
            "VendorID,tpep_pickup_datetime,tpep_dropoff_datetime,passenger_count,trip_distance,PULocationID,DOLocationID,total_amount\n",
        );
        for i in 0..n {
            s.push_str(&format!(
                "{},2021-01-01 {:02}:{:02}:10,2021-01-01 {:02}:{:02}:59,{},{}.25,{},{},{}.80\n",
                1 + i % 2,
                i / 60 % 24,
                i % 60,
                i / 60 % 24,
                i % 60,
                1 + i % 4,
                i % 30,
                142 + i % 10,
                43 + i % 7,
                10 + i % 50
            ));
        }
        s
    }

    fn loader() -> Result<TableLoader, Box<dyn Error>> {
        Ok(TableLoader::new(
            Connection::open_in_memory()?,
            TableRef::new("yellow_taxi_data"),
        ))
    }

    #[test]
    fn load_250_rows_in_chunks_of_100() -> Result<(), Box<dyn Error>> {
        init_logger();
        let data = taxi_csv(250);
        let reader = BatchReader::new(data.as_bytes(), b',', 100)?;
        let mut loader = loader()?;
        let summary = load_batches(reader, &mut loader, &datetime_columns(), IfExists::Replace)?;
        assert_eq!(summary, LoadSummary { batches: 3, rows: 250 });
        assert_eq!(loader.row_count()?, 250);

        let names: Vec<String> = loader.columns()?.into_iter().map(|(n, _)| n).collect();
        let header: Vec<String> = taxi_csv(0).trim_end().split(',').map(String::from).collect();
        assert_eq!(names, header);
        Ok(())
    }

    #[test]
    fn header_only_creates_empty_table() -> Result<(), Box<dyn Error>> {
        let data = taxi_csv(0);
        let reader = BatchReader::new(data.as_bytes(), b',', 100)?;
        let mut loader = loader()?;
        let summary = load_batches(reader, &mut loader, &datetime_columns(), IfExists::Replace)?;
        assert_eq!(summary, LoadSummary::default());
        let columns = loader.columns()?;
        assert_eq!(columns.len(), 8);
        assert_eq!(columns[1].1, "TIMESTAMP");
        assert_eq!(columns[0].1, "VARCHAR");
        Ok(())
    }

    #[test]
    fn bad_timestamp_keeps_earlier_chunks() -> Result<(), Box<dyn Error>> {
        init_logger();
        let mut data = taxi_csv(150);
        data.push_str("1,not a time,2021-01-01 00:00:00,1,1.0,1,1,1.0\n");
        let reader = BatchReader::new(data.as_bytes(), b',', 100)?;
        let mut loader = loader()?;
        let res = load_batches(reader, &mut loader, &datetime_columns(), IfExists::Replace);
        match res {
            Err(IngestError::Timestamp { column, row, .. }) => {
                assert_eq!(column, "tpep_pickup_datetime");
                assert_eq!(row, 151);
            }
            other => panic!("expected a timestamp error, got {:?}", other),
        }
        // the first chunk is committed, nothing from the second one
        assert_eq!(loader.row_count()?, 100);
        Ok(())
    }

    #[test]
    fn missing_datetime_column() -> Result<(), Box<dyn Error>> {
        let data = "VendorID,lpep_pickup_datetime\n1,2021-01-01 00:00:00\n";
        let reader = BatchReader::new(data.as_bytes(), b',', 100)?;
        let res = check_columns(reader.columns(), &datetime_columns());
        assert!(matches!(res, Err(IngestError::MissingColumn(c)) if c == "tpep_pickup_datetime"));
        check_columns(reader.columns(), &["lpep_pickup_datetime".to_string()])?;
        Ok(())
    }

    #[test]
    fn rerun_replace_vs_append() -> Result<(), Box<dyn Error>> {
        let data = taxi_csv(120);
        let mut loader = loader()?;
        for _ in 0..2 {
            let reader = BatchReader::new(data.as_bytes(), b',', 50)?;
            load_batches(reader, &mut loader, &datetime_columns(), IfExists::Replace)?;
        }
        assert_eq!(loader.row_count()?, 120);

        let reader = BatchReader::new(data.as_bytes(), b',', 50)?;
        load_batches(reader, &mut loader, &datetime_columns(), IfExists::Append)?;
        assert_eq!(loader.row_count()?, 240);
        Ok(())
    }

    #[test]
    fn load_gzip_file_from_disk() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("output.csv");
        let mut enc = GzEncoder::new(File::create(&path)?, GzLevel::default());
        enc.write_all(taxi_csv(1000).as_bytes())?;
        enc.finish()?;

        let reader = BatchReader::from_path(&path, crate::config::Compression::Gzip, b',', 300)?;
        let mut loader = loader()?;
        let summary = load_batches(reader, &mut loader, &datetime_columns(), IfExists::Replace)?;
        assert_eq!(summary, LoadSummary { batches: 4, rows: 1000 });

        let total: f64 = loader.conn().query_row(
            "SELECT SUM(total_amount) FROM yellow_taxi_data",
            [],
            |r| r.get(0),
        )?;
        let expected: f64 = (0..1000).map(|i| 10.0 + (i % 50) as f64 + 0.8).sum();
        assert!((total - expected).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn unreachable_url_fails_before_connecting() -> Result<(), Box<dyn Error>> {
        let port = TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("output.csv");
        let url = format!("http://127.0.0.1:{}/yellow_tripdata_2021-01.csv.gz", port);
        // the database port is bogus too, a connection attempt would fail differently
        let config = IngestConfig::try_parse_from([
            "ingest_data",
            "--user",
            "root",
            "--password",
            "root",
            "--host",
            "127.0.0.1",
            "--port",
            "1",
            "--db",
            "ny_taxi",
            "--table_name",
            "yellow_taxi_data",
            "--url",
            url.as_str(),
            "--output",
            output.to_str().unwrap(),
        ])?;
        assert!(matches!(run(&config), Err(IngestError::Download(_))));
        assert!(!output.exists());
        Ok(())
    }

    #[test]
    fn missing_column_fails_before_connecting() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("green.csv");
        std::fs::write(&source, "VendorID,lpep_pickup_datetime\n1,2021-01-01 00:00:00\n")?;
        let output = dir.path().join("output.csv");
        let config = IngestConfig::try_parse_from([
            "ingest_data",
            "--user",
            "root",
            "--password",
            "root",
            "--host",
            "127.0.0.1",
            "--port",
            "1",
            "--db",
            "ny_taxi",
            "--table_name",
            "green_taxi_data",
            "--url",
            source.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--compression",
            "none",
        ])?;
        assert!(matches!(run(&config), Err(IngestError::MissingColumn(_))));
        assert!(output.exists());
        Ok(())
    }

    /// Needs a running Postgres with user/password root and a ny_taxi database.
    #[ignore]
    #[test]
    fn load_yellow_taxi_into_postgres() -> Result<(), Box<dyn Error>> {
        init_logger();
        let config = IngestConfig::try_parse_from([
            "ingest_data",
            "--user",
            "root",
            "--password",
            "root",
            "--host",
            "localhost",
            "--port",
            "5432",
            "--db",
            "ny_taxi",
            "--table_name",
            "yellow_taxi_trips",
            "--url",
            "https://github.com/DataTalksClub/nyc-tlc-data/releases/download/yellow/yellow_tripdata_2021-01.csv.gz",
        ])?;
        let summary = run(&config)?;
        assert_eq!(summary.rows, 1_369_765);
        Ok(())
    }
}
