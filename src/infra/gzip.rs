//! Gzip framing of EPGX artifacts.
//!
//! The frame header is part of the format: downstream clients recognize an
//! artifact by its embedded filename and version comment.

use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Filename recorded in the gzip header.
pub const ARTIFACT_DB_NAME: &str = "epg.sqlite";

/// Version comment recorded in the gzip header.
pub fn artifact_comment(legacy: bool) -> &'static str {
    if legacy { "eltex epg v1" } else { "eltex epg v2" }
}

/// Compresses the finished database file into `dest` with the EPGX header.
pub fn compress_file(src: &Path, dest: &mut File, legacy: bool) -> io::Result<()> {
    let mut input = BufReader::new(File::open(src)?);
    let mut encoder = GzBuilder::new()
        .filename(ARTIFACT_DB_NAME)
        .comment(artifact_comment(legacy))
        .write(dest, Compression::best());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    Ok(())
}

/// Opens an artifact for reading, transparently inflating `.gz` files.
///
/// Returns the path of the plain database plus a temp-file guard that keeps
/// the inflated copy alive (and removes it when dropped).
pub fn open_database(path: &Path) -> io::Result<(PathBuf, Option<NamedTempFile>)> {
    let file = File::open(path)?;

    if path.extension().is_some_and(|ext| ext == "gz") {
        let mut decoder = GzDecoder::new(BufReader::new(file));
        let mut temp = tempfile::Builder::new()
            .prefix("db-")
            .suffix(".sqlite")
            .tempfile()?;
        io::copy(&mut decoder, temp.as_file_mut())?;
        temp.as_file_mut().flush()?;
        let temp_path = temp.path().to_path_buf();
        return Ok((temp_path, Some(temp)));
    }

    Ok((path.to_path_buf(), None))
}
