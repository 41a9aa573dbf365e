//! Staging schema for the EPGX working database.

use rusqlite::Connection;

/// SQLite application id marking EPGX artifacts (`eltx` in hex).
pub const EPGX_APPLICATION_ID: i64 = 0x656c7478;

/// Creates the staging schema used during ingest.
///
/// # Tables created
/// - `text` - interned strings (titles, descriptions), keyed by `docid`
/// - `uri` - interned image URIs
/// - `channels` - one row per delivered channel
/// - `tags` - bit-assigned tag names, filled during finalization
/// - `search_meta_0` - scratch programme table, rewritten into the final
///   `search_meta` at the end of the run
/// - `tag_list_0` - scratch per-programme tag-name list, dropped after the
///   bitmask pass
/// - `fts_search` - the full-text index, doc-id keyed by interned text id
///
/// The legacy variant builds a contentless FTS table with the simple
/// tokenizer (text is preprocessed before indexing); the modern variant
/// uses unicode61 over the external `text` table.
pub fn create_staging_schema(conn: &Connection, legacy: bool) -> rusqlite::Result<()> {
    // Keep all scratch state in memory; the database file itself is a temp
    // file that gets compressed and renamed at the very end.
    conn.pragma_update(None, "journal_mode", "MEMORY")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "application_id", EPGX_APPLICATION_ID)?;

    conn.execute_batch(
        "CREATE TABLE text (docid INTEGER PRIMARY KEY, text TEXT);

         CREATE TABLE uri (_id INTEGER PRIMARY KEY, uri TEXT);

         CREATE TABLE channels (
             _id INTEGER PRIMARY KEY,
             image_uri TEXT,
             ch_id TEXT NOT NULL UNIQUE,
             name TEXT,
             archive_time INTEGER NOT NULL,
             ch_page TEXT
         );

         CREATE TABLE tags (_id INTEGER PRIMARY KEY, tag TEXT);

         CREATE TABLE search_meta_0 (
             _id INTEGER PRIMARY KEY,
             ch_id TEXT NOT NULL,
             start_time INTEGER,
             title_id INTEGER NOT NULL,
             description_id INTEGER NOT NULL,
             tags INTEGER NOT NULL DEFAULT 0,
             year INTEGER,
             image_uri INTEGER
         );

         CREATE UNIQUE INDEX ch_start_unique_idx ON search_meta_0 (ch_id, start_time);

         CREATE TABLE tag_list_0 (program_id INTEGER PRIMARY KEY, tag_list TEXT);",
    )?;

    if legacy {
        conn.execute_batch(
            "CREATE VIRTUAL TABLE fts_search
             USING fts4(content='', matchinfo='fts3', text, tokenize=simple);",
        )?;
    } else {
        conn.execute_batch(
            "CREATE VIRTUAL TABLE fts_search
             USING fts4(content='text', matchinfo='fts3', text, tokenize=unicode61);",
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_connection(legacy: bool) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_staging_schema(&conn, legacy).unwrap();
        conn
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?",
            [name],
            |_| Ok(()),
        )
        .is_ok()
    }

    // ===========================================
    // Tables and pragmas
    // ===========================================

    #[test]
    fn all_staging_tables_exist() {
        let conn = test_connection(false);
        for table in ["text", "uri", "channels", "tags", "search_meta_0", "tag_list_0"] {
            assert!(table_exists(&conn, table), "{table} should exist");
        }
    }

    #[test]
    fn application_id_is_set() {
        let conn = test_connection(false);
        let app_id: i64 = conn
            .query_row("PRAGMA application_id", [], |row| row.get(0))
            .unwrap();
        assert_eq!(app_id, EPGX_APPLICATION_ID);
    }

    // ===========================================
    // Constraints
    // ===========================================

    #[test]
    fn channels_ch_id_is_unique() {
        let conn = test_connection(false);
        conn.execute(
            "INSERT INTO channels (ch_id, name, archive_time) VALUES ('a', 'x', 0)",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO channels (ch_id, name, archive_time) VALUES ('a', 'y', 0)",
            [],
        );
        assert!(result.is_err(), "duplicate ch_id should be rejected");
    }

    #[test]
    fn meta_rejects_duplicate_channel_start_pair() {
        let conn = test_connection(false);
        conn.execute(
            "INSERT INTO search_meta_0 (ch_id, start_time, title_id, description_id) \
             VALUES ('a', 100, 1, 1)",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO search_meta_0 (ch_id, start_time, title_id, description_id) \
             VALUES ('a', 100, 2, 2)",
            [],
        );
        assert!(result.is_err(), "duplicate (ch_id, start_time) should be rejected");
    }

    #[test]
    fn meta_allows_same_start_on_other_channel() {
        let conn = test_connection(false);
        conn.execute(
            "INSERT INTO search_meta_0 (ch_id, start_time, title_id, description_id) \
             VALUES ('a', 100, 1, 1)",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO search_meta_0 (ch_id, start_time, title_id, description_id) \
             VALUES ('b', 100, 1, 1)",
            [],
        );
        assert!(result.is_ok());
    }

    // ===========================================
    // Full-text index
    // ===========================================

    #[test]
    fn modern_fts_matches_indexed_text() {
        let conn = test_connection(false);
        conn.execute(
            "INSERT INTO text (docid, text) VALUES (1, 'evening news')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO fts_search (docid, text) VALUES (1, 'evening news')",
            [],
        )
        .unwrap();

        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM fts_search WHERE fts_search MATCH 'news'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);
    }

    #[test]
    fn legacy_fts_is_contentless_but_searchable() {
        let conn = test_connection(true);
        conn.execute(
            "INSERT INTO fts_search (docid, text) VALUES (7, 'вечерние новости')",
            [],
        )
        .unwrap();

        let docid: i64 = conn
            .query_row(
                "SELECT docid FROM fts_search WHERE fts_search MATCH 'новости'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(docid, 7);
    }
}
