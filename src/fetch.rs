use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::Path,
};

use log::info;
use reqwest::{blocking::Client, header::USER_AGENT};

use crate::errors::IngestError;

/// Download `url` to `file_path`, overwriting the file if it exists.
/// Plain paths and `file://` urls are copied.  Return the number of bytes
/// written.
pub fn download_file(url: &str, file_path: &Path) -> Result<u64, IngestError> {
    if let Some(dir) = file_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        let source = Path::new(url.strip_prefix("file://").unwrap_or(url));
        // copying a file onto itself truncates it
        if file_path.exists() && fs::canonicalize(source)? == fs::canonicalize(file_path)? {
            info!("{} is already in place", file_path.display());
            return Ok(fs::metadata(file_path)?.len());
        }
        info!("copying {} to {}", source.display(), file_path.display());
        return Ok(fs::copy(source, file_path)?);
    }

    info!("downloading {} to {}", url, file_path.display());
    let client = Client::builder().build()?;
    let mut response = client
        .get(url)
        .header(USER_AGENT, concat!("taxi_ingest/", env!("CARGO_PKG_VERSION")))
        .send()?;
    if !response.status().is_success() {
        return Err(IngestError::HttpStatus {
            url: url.to_string(),
            status: response.status(),
        });
    }

    let mut out = BufWriter::new(File::create(file_path)?);
    let n = io::copy(&mut response, &mut out)?;
    out.flush()?;
    info!("downloaded {} bytes", n);
    Ok(n)
}
