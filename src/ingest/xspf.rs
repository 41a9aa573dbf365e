//! XSPF playlist augmentation.
//!
//! An optional second input merged after XMLTV ingest and before
//! finalization. Tracks are matched to existing channels by normalized
//! title; matches update channel metadata and rename the channel id to the
//! track's `psfile` (rewriting all staged meta rows), misses insert a new
//! channel row. The whole merge runs in a single transaction.

use crate::infra::fts_ready_name;
use crate::ingest::xmltv::{read_element_text, read_event, skip_subtree};
use crate::ingest::{BuildOptions, IngestError, IngestResult};
use crate::storage::EpgDatabase;
use quick_xml::Reader;
use quick_xml::events::Event;
use rusqlite::{OptionalExtension, params};
use std::io::BufRead;

/// Outcome counts of a playlist merge.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct XspfReport {
    pub added: usize,
    pub updated: usize,
    pub conflicts: usize,
}

/// One `<track>` of the playlist.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct XspfTrack {
    psfile: String,
    archive_limit: u32,
    subscribe: String,
    title: String,
    image: String,
}

/// Merges an XSPF playlist into the staged channel and meta tables.
pub fn merge_playlist<R: BufRead>(
    options: &BuildOptions,
    db: &EpgDatabase,
    input: R,
) -> IngestResult<XspfReport> {
    let mut reader = Reader::from_reader(input);
    let mut buf = Vec::new();

    loop {
        match read_event(&mut reader, &mut buf)? {
            Event::Start(ref e) => {
                let name = e.name();
                if name.as_ref() == b"playlist" {
                    break;
                }
                return Err(IngestError::MalformedXml(format!(
                    "<playlist> tag not found, got <{}> instead",
                    String::from_utf8_lossy(name.as_ref())
                )));
            }
            Event::Eof => {
                return Err(IngestError::MalformedXml(
                    "<playlist> root tag not found".to_string(),
                ));
            }
            _ => {}
        }
    }

    let tx = db.transaction().map_err(IngestError::StorageSetup)?;
    let conn = db.conn();

    // Statements are prepared once per merge, not per track.
    let mut find = conn
        .prepare("SELECT _id, ch_id FROM channels WHERE name = ?")
        .map_err(IngestError::StorageSetup)?;
    let mut insert = conn
        .prepare(
            "INSERT INTO channels (ch_id, image_uri, name, archive_time, ch_page) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .map_err(IngestError::StorageSetup)?;
    let mut update_channel = conn
        .prepare(
            "UPDATE channels SET ch_id = ?, image_uri = ?, archive_time = ?, ch_page = ? \
             WHERE _id = ?",
        )
        .map_err(IngestError::StorageSetup)?;
    let mut update_meta = conn
        .prepare("UPDATE search_meta_0 SET ch_id = ? WHERE ch_id = ?")
        .map_err(IngestError::StorageSetup)?;

    let mut report = XspfReport::default();

    loop {
        match read_event(&mut reader, &mut buf)? {
            Event::Start(e) => {
                if e.name().as_ref() == b"track" {
                    let track = read_track(&mut reader)?;
                    if track.psfile.is_empty() {
                        continue;
                    }

                    let key = fts_ready_name(&track.title);
                    let image = Some(track.image.as_str()).filter(|s| !s.is_empty());
                    let page = Some(track.subscribe.as_str()).filter(|s| !s.is_empty());
                    let archive_seconds = i64::from(track.archive_limit) * 3600;

                    let existing = find
                        .query_row(params![key], |row| {
                            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                        })
                        .optional()
                        .map_err(IngestError::StorageWrite)?;

                    match existing {
                        None => {
                            insert
                                .execute(params![
                                    track.psfile,
                                    image,
                                    key,
                                    archive_seconds,
                                    page
                                ])
                                .map_err(IngestError::StorageWrite)?;
                            report.added += 1;
                        }
                        Some((row_id, old_ch_id)) => {
                            let renamed = update_channel.execute(params![
                                track.psfile,
                                image,
                                archive_seconds,
                                page,
                                row_id
                            ]);
                            match renamed {
                                Ok(_) => {
                                    update_meta
                                        .execute(params![track.psfile, old_ch_id])
                                        .map_err(IngestError::StorageWrite)?;
                                    report.updated += 1;
                                }
                                Err(err)
                                    if options.ignore_conflicts
                                        && is_constraint_violation(&err) =>
                                {
                                    println!(
                                        "WARNING: cannot rename channel '{}' to '{}': {}",
                                        old_ch_id, track.psfile, err
                                    );
                                    report.conflicts += 1;
                                }
                                Err(err) => return Err(IngestError::StorageWrite(err)),
                            }
                        }
                    }
                } else {
                    skip_subtree(&mut reader, &e)?;
                }
            }
            Event::End(_) | Event::Empty(_) => {}
            Event::Eof => break,
            _ => {}
        }
    }

    drop((find, insert, update_channel, update_meta));
    tx.commit().map_err(IngestError::StorageWrite)?;

    Ok(report)
}

fn read_track<R: BufRead>(reader: &mut Reader<R>) -> IngestResult<XspfTrack> {
    let mut track = XspfTrack::default();
    let mut buf = Vec::new();

    loop {
        match read_event(reader, &mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"psfile" => track.psfile = read_element_text(reader)?,
                b"archive_limit" => {
                    track.archive_limit = read_element_text(reader)?.parse().unwrap_or(0);
                }
                b"subscribe" => track.subscribe = read_element_text(reader)?,
                b"title" => track.title = read_element_text(reader)?,
                b"image" => track.image = read_element_text(reader)?,
                _ => skip_subtree(reader, &e)?,
            },
            Event::End(_) => break,
            Event::Eof => {
                return Err(IngestError::MalformedXml(
                    "unexpected end of document inside <track>".to_string(),
                ));
            }
            _ => {}
        }
    }

    Ok(track)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
