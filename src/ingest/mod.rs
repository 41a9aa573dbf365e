//! The XMLTV-to-EPGX ingest pipeline.

mod builder;
mod channel;
mod context;
mod dates;
mod finalize;
mod options;
mod programme;
mod xmltv;
mod xspf;

pub use builder::{BuildReport, BuildRequest, ScheduleInput, build};
pub use context::{ChannelWindow, IngestContext, IngestStats};
pub use dates::parse_xmltv_date;
pub use options::{BuildOptions, START_FORMAT, parse_channel_list, parse_start};
pub use xmltv::{ScheduleSink, XmltvChannel, XmltvProgramme, read_schedule};
pub use xspf::{XspfReport, merge_playlist};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can abort an ingest run.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Bad flags, malformed map file, unknown timezone.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An input file could not be opened.
    #[error("cannot open {path}: {source}")]
    InputOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root tag mismatch or a token that could not be read.
    #[error("malformed XML: {0}")]
    MalformedXml(String),

    /// An XMLTV date attribute did not match the expected shape.
    #[error("failed to parse date: {0}")]
    BadDate(String),

    /// Table, index or statement creation failed.
    #[error("storage setup failed: {0}")]
    StorageSetup(#[source] rusqlite::Error),

    /// An insert or update failed, including unique-index collisions.
    #[error("storage write failed: {0}")]
    StorageWrite(#[source] rusqlite::Error),

    /// No programmes were accepted for the configured window.
    #[error("{0}")]
    Empty(String),

    /// FTS optimize, ANALYZE or VACUUM failed.
    #[error("post-processing failed: {0}")]
    PostProcess(#[source] rusqlite::Error),

    /// Filesystem trouble around temp files and the final rename.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type of ingest operations.
pub type IngestResult<T> = Result<T, IngestError>;
