//! Transaction-scoped batch of prepared ingest statements.
//!
//! Bulk inserts run inside one transaction per input file; the statement
//! batch is prepared anew after each `BEGIN` so handles never outlive the
//! transaction they were bound into.

use rusqlite::{Connection, Statement};

/// Prepared statements used by the ingest hot path.
pub struct IngestStatements<'conn> {
    /// `search_meta_0` insert; `tags` starts at 0 and is materialized later.
    pub insert_meta: Statement<'conn>,
    pub insert_text: Statement<'conn>,
    pub insert_fts: Statement<'conn>,
    pub insert_uri: Statement<'conn>,
    /// `OR IGNORE`: the same channel may arrive from several inputs.
    pub insert_channel: Statement<'conn>,
    pub insert_tag_list: Statement<'conn>,
}

impl<'conn> IngestStatements<'conn> {
    /// Prepares the batch against the current transaction's connection.
    pub fn prepare(conn: &'conn Connection) -> rusqlite::Result<Self> {
        Ok(Self {
            insert_meta: conn.prepare(
                "INSERT INTO search_meta_0 \
                 (start_time, ch_id, image_uri, title_id, description_id, year, tags) \
                 VALUES (?, ?, ?, ?, ?, ?, 0)",
            )?,
            insert_text: conn.prepare("INSERT INTO text (docid, text) VALUES (?, ?)")?,
            insert_fts: conn.prepare("INSERT INTO fts_search (docid, text) VALUES (?, ?)")?,
            insert_uri: conn.prepare("INSERT INTO uri (_id, uri) VALUES (?, ?)")?,
            insert_channel: conn.prepare(
                "INSERT OR IGNORE INTO channels (ch_id, image_uri, name, archive_time, ch_page) \
                 VALUES (?, ?, ?, ?, ?)",
            )?,
            insert_tag_list: conn
                .prepare("INSERT INTO tag_list_0 (program_id, tag_list) VALUES (?, ?)")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::EpgDatabase;
    use rusqlite::params;

    #[test]
    fn batch_prepares_against_staging_schema() {
        let db = EpgDatabase::create_in_memory(false).unwrap();
        assert!(IngestStatements::prepare(db.conn()).is_ok());
    }

    #[test]
    fn meta_insert_returns_row_id() {
        let db = EpgDatabase::create_in_memory(false).unwrap();
        let mut stmts = IngestStatements::prepare(db.conn()).unwrap();

        let first = stmts
            .insert_meta
            .insert(params![100, "ch", None::<i64>, 1, 1, None::<i64>])
            .unwrap();
        let second = stmts
            .insert_meta
            .insert(params![200, "ch", None::<i64>, 1, 1, None::<i64>])
            .unwrap();
        assert!(second > first);
    }

    #[test]
    fn channel_insert_ignores_duplicates() {
        let db = EpgDatabase::create_in_memory(false).unwrap();
        let mut stmts = IngestStatements::prepare(db.conn()).unwrap();

        let inserted = stmts
            .insert_channel
            .execute(params!["ch", None::<String>, "name", 0, None::<String>])
            .unwrap();
        assert_eq!(inserted, 1);

        let repeated = stmts
            .insert_channel
            .execute(params!["ch", None::<String>, "other", 0, None::<String>])
            .unwrap();
        assert_eq!(repeated, 0, "duplicate ch_id should be ignored, not an error");
    }
}
