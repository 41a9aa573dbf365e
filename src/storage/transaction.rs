//! RAII transaction wrapper over a borrowed connection.
//!
//! Unlike `rusqlite::Transaction` this does not borrow the connection
//! mutably, so transaction-scoped prepared statements can coexist with it.

use rusqlite::Connection;

/// A database transaction that rolls back automatically when dropped
/// unless `commit()` is called first.
pub struct Transaction<'a> {
    conn: &'a Connection,
    finished: bool,
}

impl<'a> Transaction<'a> {
    /// Starts a transaction on the given connection.
    pub(crate) fn begin(conn: &'a Connection) -> rusqlite::Result<Self> {
        conn.execute_batch("BEGIN")?;
        Ok(Self {
            conn,
            finished: false,
        })
    }

    /// Commits the transaction, consuming it.
    pub fn commit(mut self) -> rusqlite::Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            // Rollback failures cannot be surfaced from drop
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}
