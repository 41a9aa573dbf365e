//! Structural validation of a finished EPGX artifact.
//!
//! Re-reads the database the way a set-top-box client would and checks the
//! invariants the writer promises: magic number, referential integrity of
//! the interned dictionaries, a live FTS index, and one-hot tag ids.

use crate::storage::EPGX_APPLICATION_ID;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while validating an artifact.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("could not open EPGX file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{0}")]
    Corrupt(String),
}

/// Summary of a successfully validated artifact.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub channels: i64,
    pub programmes: i64,
    pub first_start: i64,
    pub last_start: i64,
    pub average_span_seconds: f64,
    pub has_tags: bool,
}

/// Validates the artifact at `path` (plain or `.gz`).
///
/// `quiet` suppresses the per-check progress lines.
pub fn validate(path: &Path, quiet: bool) -> Result<ValidationReport, ValidateError> {
    let (db_path, _guard) =
        crate::infra::open_database(path).map_err(|source| ValidateError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    let conn = Connection::open(&db_path)?;

    let step = |name: &str| {
        if !quiet {
            print!("{name}... ");
        }
    };
    let ok = || {
        if !quiet {
            println!("ok");
        }
    };

    step("Verifying application_id");
    let app_id: i64 = conn.query_row("PRAGMA application_id", [], |r| r.get(0))?;
    if app_id != EPGX_APPLICATION_ID {
        return Err(ValidateError::Corrupt(format!(
            "invalid application_id: expected {EPGX_APPLICATION_ID}, but got {app_id}"
        )));
    }
    ok();

    step("Running SQLite integrity check");
    let integrity: String = conn.query_row("PRAGMA integrity_check(1)", [], |r| r.get(0))?;
    if integrity != "ok" {
        return Err(ValidateError::Corrupt(format!(
            "integrity check found errors: {integrity}"
        )));
    }
    ok();

    step("Counting contents");
    let programmes: i64 = conn.query_row("SELECT COUNT(*) FROM search_meta", [], |r| r.get(0))?;
    if programmes == 0 {
        return Err(ValidateError::Corrupt(
            "schedule is empty - search_meta has 0 rows".to_string(),
        ));
    }
    ok();

    step("Checking integrity of string table");
    let with_text: i64 = conn.query_row(
        "SELECT COUNT(*) FROM search_meta \
         WHERE EXISTS (SELECT 1 FROM text WHERE docid = title_id) \
           AND EXISTS (SELECT 1 FROM text WHERE docid = description_id)",
        [],
        |r| r.get(0),
    )?;
    if with_text != programmes {
        return Err(ValidateError::Corrupt(format!(
            "schedule is corrupt: {} of {} items don't have title or description in text table",
            programmes - with_text,
            programmes
        )));
    }
    ok();

    step("Checking integrity of uri table");
    let with_uri: i64 = conn.query_row(
        "SELECT COUNT(*) FROM search_meta \
         WHERE image_uri IS NULL \
            OR EXISTS (SELECT 1 FROM uri WHERE uri._id = image_uri)",
        [],
        |r| r.get(0),
    )?;
    if with_uri != programmes {
        return Err(ValidateError::Corrupt(format!(
            "schedule is corrupt: {} of {} items have non-null image_uri \
             without a matching uri row",
            programmes - with_uri,
            programmes
        )));
    }
    ok();

    step("Checking integrity of channels table");
    let with_channel: i64 = conn.query_row(
        "SELECT COUNT(*) FROM search_meta \
         WHERE EXISTS (SELECT 1 FROM channels WHERE channels.ch_id = search_meta.ch_id)",
        [],
        |r| r.get(0),
    )?;
    if with_channel != programmes {
        return Err(ValidateError::Corrupt(format!(
            "schedule is corrupt: {} of {} items don't have channel in channels table",
            programmes - with_channel,
            programmes
        )));
    }
    ok();

    step("Checking integrity of FTS table");
    conn.query_row(
        "SELECT COUNT(*) FROM fts_search WHERE fts_search MATCH 'howdy*'",
        [],
        |r| r.get::<_, i64>(0),
    )?;
    ok();

    step("Checking integrity of tags table");
    let has_tags = check_tags(&conn)?;
    if !quiet {
        println!("{}", if has_tags { "ok" } else { "ok (no tags)" });
    }

    let channels: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT(ch_id)) FROM search_meta",
        [],
        |r| r.get(0),
    )?;
    let (first_start, last_start): (i64, i64) = conn.query_row(
        "SELECT MIN(start_time), MAX(start_time) FROM search_meta",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    let average_span_seconds: f64 = conn.query_row(
        "SELECT AVG(len) FROM (SELECT ch_id, (MAX(start_time) - MIN(start_time)) AS len \
         FROM search_meta GROUP BY ch_id)",
        [],
        |r| r.get(0),
    )?;

    Ok(ValidationReport {
        channels,
        programmes,
        first_start,
        last_start,
        average_span_seconds,
        has_tags,
    })
}

/// Verifies the tag bit layout; returns whether a tags table exists.
///
/// Without a tags table the meta rows must carry no tag bits either. The
/// probe query fails harmlessly when the column itself was excluded from
/// the build.
fn check_tags(conn: &Connection) -> Result<bool, ValidateError> {
    let has_table = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'tags'",
            [],
            |_| Ok(()),
        )
        .optional()?
        .is_some();

    if !has_table {
        if let Ok(stray) =
            conn.query_row("SELECT COUNT(*) FROM search_meta WHERE tags != 0", [], |r| {
                r.get::<_, i64>(0)
            })
            && stray > 0
        {
            return Err(ValidateError::Corrupt(
                "database has tags, but no tags table".to_string(),
            ));
        }
        return Ok(false);
    }

    let mut stmt = conn.prepare("SELECT _id, tag FROM tags ORDER BY _id")?;
    let rows = stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?;
    for row in rows {
        let (id, tag) = row?;
        if id.count_ones() != 1 {
            return Err(ValidateError::Corrupt(format!(
                "identifier of tag '{tag}' has more than 1 bit set (_id = {id})"
            )));
        }
    }

    Ok(true)
}
