//! Orchestration of one full conversion run.
//!
//! Temp files for the working database and the compressed output live next
//! to the destination and are removed on every exit path; the final rename
//! of the compressed file is the commit point.

use crate::infra::compress_file;
use crate::ingest::channel::ingest_channel;
use crate::ingest::programme::ingest_programme;
use crate::ingest::finalize::finalize;
use crate::ingest::options::START_FORMAT;
use crate::ingest::xspf::merge_playlist;
use crate::ingest::{
    BuildOptions, IngestContext, IngestError, IngestResult, IngestStats, ScheduleSink,
    XmltvChannel, XmltvProgramme, read_schedule,
};
use crate::storage::{EpgDatabase, IngestStatements};
use chrono::{Local, TimeZone};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One XMLTV source.
#[derive(Debug, Clone)]
pub enum ScheduleInput {
    Stdin,
    File(PathBuf),
}

/// What to convert and where to put it.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// XMLTV inputs, processed in order.
    pub inputs: Vec<ScheduleInput>,
    /// Optional XSPF playlist merged before finalization.
    pub playlist: Option<PathBuf>,
    /// Destination artifact path.
    pub output: PathBuf,
}

/// Counters surfaced to the CLI after a successful run.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub stats: IngestStats,
    pub unique_strings: usize,
}

struct PipelineSink<'a, 'conn> {
    options: &'a BuildOptions,
    ctx: &'a mut IngestContext,
    stmts: &'a mut IngestStatements<'conn>,
}

impl ScheduleSink for PipelineSink<'_, '_> {
    fn channel(&mut self, channel: XmltvChannel) -> IngestResult<bool> {
        ingest_channel(self.options, self.ctx, self.stmts, channel)
    }

    fn programme(&mut self, programme: XmltvProgramme) -> IngestResult<bool> {
        ingest_programme(self.options, self.ctx, self.stmts, programme)
    }
}

/// Runs the whole pipeline and writes the artifact to `request.output`.
pub fn build(options: &BuildOptions, request: &BuildRequest) -> IngestResult<BuildReport> {
    let out_dir = output_dir(&request.output);

    let db_temp = tempfile::Builder::new()
        .prefix("db-")
        .suffix(".sqlite")
        .tempfile_in(out_dir)
        .map_err(|source| io_error(out_dir, source))?;

    let mut ctx = IngestContext::new(options)?;

    {
        let db = EpgDatabase::create(db_temp.path(), options.legacy)
            .map_err(IngestError::StorageSetup)?;

        println!("Copying XMLTV schedule to database");

        for input in &request.inputs {
            let reader = open_input(input)?;
            let tx = db.transaction().map_err(IngestError::StorageSetup)?;
            {
                let mut stmts =
                    IngestStatements::prepare(db.conn()).map_err(IngestError::StorageSetup)?;
                let mut sink = PipelineSink {
                    options,
                    ctx: &mut ctx,
                    stmts: &mut stmts,
                };
                read_schedule(reader, &mut sink)?;
            }
            tx.commit().map_err(IngestError::StorageWrite)?;
        }

        if ctx.stats.programmes == 0 {
            return Err(empty_error(options, &ctx.stats));
        }

        if let Some(playlist) = &request.playlist {
            let file = File::open(playlist).map_err(|source| IngestError::InputOpen {
                path: playlist.clone(),
                source,
            })?;
            merge_playlist(options, &db, BufReader::new(file))?;
        }

        finalize(options, &mut ctx, &db)?;
    }

    println!("Compressing database file");

    let mut gz_temp = tempfile::Builder::new()
        .prefix("db-")
        .suffix(".gz")
        .tempfile_in(out_dir)
        .map_err(|source| io_error(out_dir, source))?;
    if let Err(source) = compress_file(db_temp.path(), gz_temp.as_file_mut(), options.legacy) {
        return Err(io_error(gz_temp.path(), source));
    }

    gz_temp
        .persist(&request.output)
        .map_err(|e| io_error(&request.output, e.error))?;

    Ok(BuildReport {
        unique_strings: ctx.unique_strings(),
        stats: ctx.stats,
    })
}

fn output_dir(output: &Path) -> &Path {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn open_input(input: &ScheduleInput) -> IngestResult<Box<dyn BufRead>> {
    match input {
        ScheduleInput::Stdin => Ok(Box::new(BufReader::new(io::stdin()))),
        ScheduleInput::File(path) => {
            let file = File::open(path).map_err(|source| IngestError::InputOpen {
                path: path.clone(),
                source,
            })?;
            Ok(Box::new(BufReader::new(file)))
        }
    }
}

fn io_error(path: &Path, source: io::Error) -> IngestError {
    IngestError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn empty_error(options: &BuildOptions, stats: &IngestStats) -> IngestError {
    let mut message = format!(
        "no programme entries within specified period ({})",
        format_local(options.start_from)
    );
    if let Some(before) = stats.nearest_before {
        message.push_str(&format!(", last slot is at {}", format_local(before)));
    }
    if let Some(after) = stats.nearest_after {
        message.push_str(&format!(", first slot is at {}", format_local(after)));
    }
    IngestError::Empty(message)
}

fn format_local(epoch: i64) -> String {
    match Local.timestamp_opt(epoch, 0) {
        chrono::LocalResult::Single(dt) => dt.format(START_FORMAT).to_string(),
        _ => epoch.to_string(),
    }
}
