use std::fs;
use std::io::{self, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::PipelineError;
use crate::store;

/// Decompresses a gzip file into `dest`, returning the decompressed size.
pub fn gunzip_file(source: &Path, dest: &Path) -> Result<u64, PipelineError> {
    let file = fs::File::open(source).map_err(|err| {
        PipelineError::Filesystem(format!("open gzip {}: {err}", source.display()))
    })?;
    let mut decoder = GzDecoder::new(BufReader::new(file));
    let mut temp = store::temp_file_for(dest)?;
    let bytes = io::copy(&mut decoder, temp.as_file_mut()).map_err(|err| {
        PipelineError::Filesystem(format!("decompress {}: {err}", source.display()))
    })?;
    store::persist(temp, dest)?;
    Ok(bytes)
}

/// `ACAAML.xaa.pdbqt.gz` -> `ACAAML.xaa.pdbqt`
pub fn strip_gz_suffix(file_name: &str) -> &str {
    file_name.strip_suffix(".gz").unwrap_or(file_name)
}
