//! SQLite staging database and transaction plumbing.

mod schema;
mod statements;
mod transaction;

pub use schema::{EPGX_APPLICATION_ID, create_staging_schema};
pub use statements::IngestStatements;
pub use transaction::Transaction;

use rusqlite::Connection;
use std::path::Path;

/// The working EPGX database.
///
/// Owns the connection for the whole run; every ingest pass and the
/// finalization borrow it in turn.
pub struct EpgDatabase {
    conn: Connection,
}

impl EpgDatabase {
    /// Creates a fresh staging database at `path` and installs the schema.
    pub fn create(path: &Path, legacy: bool) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        create_staging_schema(&conn, legacy)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory staging database, mainly for tests.
    pub fn create_in_memory(legacy: bool) -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        create_staging_schema(&conn, legacy)?;
        Ok(Self { conn })
    }

    /// Returns a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begins a new transaction.
    ///
    /// The transaction rolls back on drop unless `commit()` is called.
    pub fn transaction(&self) -> rusqlite::Result<Transaction<'_>> {
        Transaction::begin(&self.conn)
    }
}
