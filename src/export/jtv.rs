//! Legacy JTV export.
//!
//! Produces the classic JTV ZIP layout: one `<ch_id>.pdt` file holding
//! length-prefixed titles and one `<ch_id>.ndx` file of fixed 12-byte index
//! records pointing into it, per channel. Timestamps are Windows FILETIME.

use encoding_rs::Encoding;
use rusqlite::Connection;
use std::borrow::Cow;
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const PDT_SIGNATURE: &[u8] = b"JTV 3.x TV Program Data\x0a\x0a\x0a";

/// Seconds between 1601-01-01 (FILETIME epoch) and 1970-01-01.
const FILETIME_EPOCH_OFFSET: u64 = 11_644_473_600;

/// Export knobs.
#[derive(Debug, Clone)]
pub struct JtvOptions {
    /// Charset label for the title payload, e.g. `UTF-8` or `windows-1251`.
    pub charset: String,
    /// Hours added to every start time.
    pub hour_offset: i32,
}

impl Default for JtvOptions {
    fn default() -> Self {
        Self {
            charset: "UTF-8".to_string(),
            hour_offset: 0,
        }
    }
}

/// Errors raised during JTV export.
#[derive(Debug, Error)]
pub enum JtvError {
    #[error("encoder for '{0}' encoding can not be loaded")]
    UnknownCharset(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Writes the JTV archive for the (already inflated) database at `db_path`.
///
/// Returns the number of channels written. The archive goes through a temp
/// file in the destination directory and is renamed into place at the end.
pub fn export_jtv(
    db_path: &Path,
    output: &Path,
    options: &JtvOptions,
) -> Result<usize, JtvError> {
    let encoding = lookup_encoding(&options.charset)?;
    let conn = Connection::open(db_path)?;

    let out_dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temp = tempfile::Builder::new()
        .prefix("jtv-")
        .suffix(".zip")
        .tempfile_in(out_dir)?;
    let mut zip = ZipWriter::new(temp.reopen()?);
    let file_options =
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut stmt = conn.prepare(
        "SELECT ch_id, start_time, (SELECT text FROM text WHERE docid = title_id) \
         FROM search_meta ORDER BY ch_id, start_time ASC",
    )?;
    let mut rows = stmt.query([])?;

    let mut current: Option<String> = None;
    let mut ndx: Vec<u8> = Vec::new();
    let mut pdt_position: u16 = 0;
    let mut channels = 0usize;

    while let Some(row) = rows.next()? {
        let ch_id: String = row.get(0)?;
        let start_time: i64 = row.get(1)?;
        let title: Option<String> = row.get(2)?;
        let title = title.unwrap_or_default();

        if current.as_deref() != Some(ch_id.as_str()) {
            if let Some(previous) = current.take() {
                flush_ndx(&mut zip, &previous, &mut ndx, &file_options)?;
            }

            channels += 1;
            current = Some(ch_id.clone());

            // Reserve space for the 2-byte entry count.
            ndx.clear();
            ndx.extend_from_slice(&[0, 0]);

            zip.start_file(format!("{ch_id}.pdt"), file_options.clone())?;
            zip.write_all(PDT_SIGNATURE)?;
            pdt_position = PDT_SIGNATURE.len() as u16;
        }

        let shifted = start_time + i64::from(options.hour_offset) * 3600;
        let filetime = (shifted as u64).wrapping_add(FILETIME_EPOCH_OFFSET) * 10_000_000;

        let mut record = [0u8; 12];
        record[2..10].copy_from_slice(&filetime.to_le_bytes());
        record[10..12].copy_from_slice(&pdt_position.to_le_bytes());
        ndx.extend_from_slice(&record);

        let encoded: Cow<'_, [u8]> = match encoding {
            Some(enc) => enc.encode(&title).0,
            None => Cow::Borrowed(title.as_bytes()),
        };
        zip.write_all(&(encoded.len() as u16).to_le_bytes())?;
        zip.write_all(&encoded)?;
        pdt_position = pdt_position.wrapping_add(encoded.len() as u16 + 2);
    }

    if let Some(previous) = current {
        flush_ndx(&mut zip, &previous, &mut ndx, &file_options)?;
    }

    zip.finish()?;
    temp.persist(output).map_err(|e| JtvError::Io(e.error))?;

    Ok(channels)
}

fn lookup_encoding(label: &str) -> Result<Option<&'static Encoding>, JtvError> {
    if label.eq_ignore_ascii_case("UTF-8") {
        return Ok(None);
    }
    Encoding::for_label(label.as_bytes())
        .map(Some)
        .ok_or_else(|| JtvError::UnknownCharset(label.to_string()))
}

fn flush_ndx<W: Write + io::Seek>(
    zip: &mut ZipWriter<W>,
    ch_id: &str,
    ndx: &mut Vec<u8>,
    file_options: &SimpleFileOptions,
) -> Result<(), JtvError> {
    let entries = ((ndx.len() - 2) / 12) as u16;
    ndx[0..2].copy_from_slice(&entries.to_le_bytes());

    zip.start_file(format!("{ch_id}.ndx"), file_options.clone())?;
    zip.write_all(ndx)?;
    Ok(())
}
