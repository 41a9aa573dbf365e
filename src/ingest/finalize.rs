//! Finalization: runs once after every input has been consumed.
//!
//! Order matters: the scratch UNIQUE index is dropped first so the
//! synthetic end-of-day rows may land on an already occupied
//! `(ch_id, start_time)` slot, then tags are ranked and materialized, then
//! the meta table is rewritten into its final column set, and finally the
//! secondary indexes and FTS/statistics maintenance run.

use crate::ingest::dates::parse_xmltv_date;
use crate::ingest::{BuildOptions, IngestContext, IngestError, IngestResult};
use crate::storage::{EpgDatabase, IngestStatements};
use rusqlite::{Connection, params};
use std::collections::HashMap;

/// Highest assignable tag bit; bit 63 stays clear of the sign bit.
const MAX_TAG_BITS: usize = 63;

/// Finalizes the staged database into the deliverable schema.
pub fn finalize(
    options: &BuildOptions,
    ctx: &mut IngestContext,
    db: &EpgDatabase,
) -> IngestResult<()> {
    let tx = db.transaction().map_err(IngestError::StorageSetup)?;
    let conn = db.conn();

    conn.execute_batch("DROP INDEX ch_start_unique_idx;")
        .map_err(IngestError::StorageSetup)?;

    insert_end_markers(options, ctx, conn)?;

    let bits = assign_tag_bits(ctx, conn)?;
    materialize_bitmasks(conn, &bits)?;

    rewrite_schema(options, conn)?;

    tx.commit().map_err(IngestError::StorageWrite)?;

    create_indexes(options, conn)?;
    run_maintenance(conn)?;

    Ok(())
}

/// Inserts one synthetic entry per channel at the `stop` time of its latest
/// programme, labeled with the configured end-of-programme text. Channels
/// whose `stop` attribute cannot be parsed are silently skipped.
fn insert_end_markers(
    options: &BuildOptions,
    ctx: &mut IngestContext,
    conn: &Connection,
) -> IngestResult<()> {
    let Some(label) = options.end_title.as_deref().filter(|s| !s.is_empty()) else {
        return Ok(());
    };

    let mut stmts = IngestStatements::prepare(conn).map_err(IngestError::StorageSetup)?;
    let (label_id, _) = ctx.intern_text(&mut stmts, label)?;
    let (empty_id, _) = ctx.intern_text(&mut stmts, "")?;

    let mut markers: Vec<(String, i64)> = Vec::new();
    for (ch_id, window) in &ctx.windows {
        if let Ok(stop) = parse_xmltv_date(&window.last_stop, options.tz_override) {
            markers.push((ch_id.clone(), stop));
        }
    }
    markers.sort();

    for (ch_id, stop) in markers {
        stmts
            .insert_meta
            .execute(params![
                stop,
                ch_id,
                None::<i64>,
                label_id,
                empty_id,
                None::<i64>
            ])
            .map_err(IngestError::StorageWrite)?;
    }

    Ok(())
}

/// Ranks tags by (usage descending, name ascending) and persists the top 63
/// with one-hot ids. Returns the name-to-bit assignment.
fn assign_tag_bits(
    ctx: &IngestContext,
    conn: &Connection,
) -> IngestResult<HashMap<String, i64>> {
    let mut ranked: Vec<(&String, u64)> = ctx
        .tag_counts
        .iter()
        .map(|(name, &count)| (name, count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut insert = conn
        .prepare("INSERT INTO tags (_id, tag) VALUES (?, ?)")
        .map_err(IngestError::StorageSetup)?;

    let mut bits = HashMap::new();
    for (rank, (name, _)) in ranked.into_iter().take(MAX_TAG_BITS).enumerate() {
        let bit = 1i64 << rank;
        insert
            .execute(params![bit, name])
            .map_err(IngestError::StorageWrite)?;
        bits.insert(name.clone(), bit);
    }

    Ok(bits)
}

/// Second pass over the scratch tag lists: ORs the assigned bits of each
/// programme's tags into its meta row. Tags beyond the top 63 contribute
/// nothing.
fn materialize_bitmasks(conn: &Connection, bits: &HashMap<String, i64>) -> IngestResult<()> {
    let mut select = conn
        .prepare("SELECT program_id, tag_list FROM tag_list_0")
        .map_err(IngestError::StorageSetup)?;
    let mut update = conn
        .prepare("UPDATE search_meta_0 SET tags = ? WHERE _id = ?")
        .map_err(IngestError::StorageSetup)?;

    let rows = select
        .query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(IngestError::StorageWrite)?;

    for row in rows {
        let (program_id, tag_list) = row.map_err(IngestError::StorageWrite)?;
        let mut mask = 0i64;
        for token in tag_list.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            if let Some(&bit) = bits.get(token) {
                mask |= bit;
            }
        }
        if mask != 0 {
            update
                .execute(params![mask, program_id])
                .map_err(IngestError::StorageWrite)?;
        }
    }

    Ok(())
}

/// Rewrites `search_meta_0` into the final `search_meta`, keeping the
/// optional columns only when their exclusion flags are off, and drops the
/// scratch tables.
fn rewrite_schema(options: &BuildOptions, conn: &Connection) -> IngestResult<()> {
    conn.execute_batch("DROP TABLE tag_list_0;")
        .map_err(IngestError::StorageSetup)?;

    let mut definitions = vec![
        "_id INTEGER PRIMARY KEY",
        "ch_id TEXT NOT NULL",
        "start_time INTEGER",
        "title_id INTEGER NOT NULL",
        "description_id INTEGER NOT NULL",
    ];
    let mut columns = vec!["_id", "ch_id", "start_time", "title_id", "description_id"];

    if !options.skip_tags {
        definitions.push("tags INTEGER NOT NULL DEFAULT 0");
        columns.push("tags");
    }
    if !options.skip_year {
        definitions.push("year INTEGER");
        columns.push("year");
    }
    definitions.push("image_uri INTEGER");
    columns.push("image_uri");

    let column_list = columns.join(", ");
    conn.execute_batch(&format!(
        "CREATE TABLE search_meta ({});",
        definitions.join(", ")
    ))
    .map_err(IngestError::StorageSetup)?;
    conn.execute_batch(&format!(
        "INSERT INTO search_meta ({column_list}) SELECT {column_list} FROM search_meta_0;"
    ))
    .map_err(IngestError::StorageWrite)?;
    conn.execute_batch("DROP TABLE search_meta_0;")
        .map_err(IngestError::StorageSetup)?;

    if options.skip_tags {
        conn.execute_batch("DROP TABLE tags;")
            .map_err(IngestError::StorageSetup)?;
    }

    Ok(())
}

fn create_indexes(options: &BuildOptions, conn: &Connection) -> IngestResult<()> {
    conn.execute_batch(
        "CREATE INDEX time_idx ON search_meta (start_time);
         CREATE INDEX ch_idx ON search_meta (ch_id, start_time);
         CREATE INDEX description_idx ON search_meta (description_id);
         CREATE INDEX title_idx ON search_meta (title_id);",
    )
    .map_err(IngestError::StorageSetup)?;

    if !options.skip_tags {
        conn.execute_batch("CREATE INDEX tag_idx ON search_meta (tags);")
            .map_err(IngestError::StorageSetup)?;
    }

    Ok(())
}

fn run_maintenance(conn: &Connection) -> IngestResult<()> {
    conn.execute_batch("INSERT INTO fts_search(fts_search) VALUES('optimize');")
        .map_err(IngestError::PostProcess)?;
    conn.execute_batch("ANALYZE;")
        .map_err(IngestError::PostProcess)?;
    conn.execute_batch("VACUUM;")
        .map_err(IngestError::PostProcess)?;
    Ok(())
}
