//! Build options for one conversion run.

use crate::infra::ChannelMapping;
use crate::ingest::{IngestError, IngestResult};
use chrono::{Local, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};
use url::Url;

/// Window start format shared with user-facing messages.
pub const START_FORMAT: &str = "%d-%m-%Y %H:%M";

/// Everything that parameterizes a build, assembled by the CLI layer.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Window start, epoch seconds.
    pub start_from: i64,
    /// Window length in seconds; entries after `start_from + span_seconds`
    /// are rejected.
    pub span_seconds: i64,
    /// Description clip length in Unicode scalars; `None` keeps full text.
    pub snippet: Option<usize>,
    /// Build the legacy artifact (contentless FTS, v1 gzip comment).
    pub legacy: bool,
    /// Omit the `tags` column and table from the final schema.
    pub skip_tags: bool,
    /// Omit the `year` column from the final schema.
    pub skip_year: bool,
    /// Interpret all XMLTV dates in this zone, ignoring document offsets.
    pub tz_override: Option<Tz>,
    /// Channel remap rules keyed by source channel id.
    pub channel_map: HashMap<String, ChannelMapping>,
    /// When present, only these channel ids are accepted.
    pub whitelist: Option<HashSet<String>>,
    /// Channel ids rejected when no whitelist is configured.
    pub blacklist: HashSet<String>,
    /// Fleet-wide DVR depth applied when a channel's own is zero.
    pub default_archive_hours: u32,
    /// Optional title template with `Title`, `SubTitle`, `Description` fields.
    pub title_template: Option<String>,
    /// Base URL replacing scheme/host (and prefixing the path) of icon URIs.
    pub image_base: Option<Url>,
    /// Label for the synthetic end-of-day entries; empty disables them.
    pub end_title: Option<String>,
    /// Downgrade XSPF rename conflicts from fatal errors to warnings.
    pub ignore_conflicts: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            start_from: 0,
            span_seconds: 72 * 3600,
            snippet: None,
            legacy: false,
            skip_tags: false,
            skip_year: false,
            tz_override: None,
            channel_map: HashMap::new(),
            whitelist: None,
            blacklist: HashSet::new(),
            default_archive_hours: 0,
            title_template: None,
            image_base: None,
            end_title: None,
            ignore_conflicts: false,
        }
    }
}

impl BuildOptions {
    /// Whether an epoch-seconds start time falls inside the accepted window.
    pub fn window_contains(&self, start_time: i64) -> bool {
        start_time >= self.start_from && start_time <= self.start_from + self.span_seconds
    }
}

/// Parses the `--offset` window start (`DD-MM-YYYY HH:MM`, local time).
pub fn parse_start(value: &str) -> IngestResult<i64> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), START_FORMAT)
        .map_err(|e| IngestError::Config(format!("failed to parse start time '{value}': {e}")))?;
    match Local.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => Ok(dt.timestamp()),
        chrono::LocalResult::Ambiguous(dt, _) => Ok(dt.timestamp()),
        chrono::LocalResult::None => Err(IngestError::Config(format!(
            "start time '{value}' does not exist in the local time zone"
        ))),
    }
}

/// Parses an `--include`/`--exclude` channel list.
///
/// The value must be a non-empty comma-separated list without a trailing
/// comma; anything else is a configuration error, matching the strictness
/// of the original flag handling.
pub fn parse_channel_list(value: &str, flag: &str) -> IngestResult<HashSet<String>> {
    if value.is_empty() {
        return Err(IngestError::Config(format!(
            "bad --{flag} argument: must contain at least one channel ID"
        )));
    }
    if value.ends_with(',') {
        return Err(IngestError::Config(format!(
            "bad --{flag} argument: must be a list of channel IDs without spaces"
        )));
    }
    Ok(value.split(',').map(str::to_string).collect())
}
