//! Isolated test environment for end-to-end CLI tests.

use assert_cmd::Command;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};

/// Window flags wide enough to accept any 2024 fixture date in every
/// host time zone.
pub const WIDE_WINDOW: [&str; 4] = ["--offset", "01-01-1970 00:00", "--timespan", "876000"];

/// Isolated test environment with a temp working directory.
///
/// The directory is removed automatically when the env is dropped.
pub struct TestEnv {
    temp_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("failed to create temp directory"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes an XMLTV document wrapping `body` in the `<tv>` root.
    pub fn write_xmltv(&self, name: &str, body: &str) -> PathBuf {
        self.write_file(name, &format!("<tv>{body}</tv>"))
    }

    pub fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path().join(name);
        std::fs::write(&path, contents).expect("failed to write fixture");
        path
    }

    /// A bare `epgx` command.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("epgx").expect("binary should build");
        cmd.current_dir(self.path());
        cmd
    }

    /// A `build` command with the wide test window preconfigured.
    pub fn build_cmd<P: AsRef<Path>>(&self, inputs: &[P], output: &str) -> Command {
        let mut cmd = self.cmd();
        cmd.arg("build").args(WIDE_WINDOW).arg("-o").arg(output);
        for input in inputs {
            cmd.arg("-i").arg(input.as_ref());
        }
        cmd
    }

    /// Opens a built artifact, inflating the gzip frame.
    ///
    /// Returns the connection together with the temp-file guard keeping
    /// the inflated database alive.
    pub fn open_artifact(&self, output: &str) -> (Connection, Option<NamedTempFile>) {
        let path = self.path().join(output);
        let (db_path, guard) =
            epgx::infra::open_database(&path).expect("failed to open artifact");
        let conn = Connection::open(db_path).expect("failed to open database");
        (conn, guard)
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetches the interned text bodies of every title in start-time order.
pub fn titles_in_order(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare(
            "SELECT (SELECT text FROM text WHERE docid = title_id) \
             FROM search_meta ORDER BY start_time, ch_id",
        )
        .unwrap();
    let titles = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<String>, _>>()
        .unwrap();
    titles
}
