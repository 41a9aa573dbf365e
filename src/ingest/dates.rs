//! XMLTV date parsing.
//!
//! XMLTV dates are "loosely based on ISO 8601": a 14-digit
//! `YYYYMMDDhhmmss` stamp, optionally followed by a space and a signed
//! 4-digit zone offset. A configured zone override wins over the
//! document's offset; with neither, the stamp is read in local time.

use crate::ingest::{IngestError, IngestResult};
use chrono::{DateTime, Local, LocalResult, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use regex::Regex;
use std::sync::LazyLock;

static XMLTV_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{14})( (?:.+))?$").expect("xmltv date regex"));

const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Parses an XMLTV date attribute into epoch seconds.
pub fn parse_xmltv_date(source: &str, tz_override: Option<Tz>) -> IngestResult<i64> {
    let caps = XMLTV_DATE
        .captures(source)
        .ok_or_else(|| IngestError::BadDate(source.to_string()))?;

    if let Some(tz) = tz_override {
        let naive = parse_stamp(&caps[1], source)?;
        return resolve(tz.from_local_datetime(&naive), source);
    }

    if caps.get(2).is_some() {
        let matched = caps.get(0).expect("whole match").as_str();
        return DateTime::parse_from_str(matched, "%Y%m%d%H%M%S %z")
            .map(|dt| dt.timestamp())
            .map_err(|_| IngestError::BadDate(source.to_string()));
    }

    let naive = parse_stamp(&caps[1], source)?;
    resolve(Local.from_local_datetime(&naive), source)
}

fn parse_stamp(stamp: &str, source: &str) -> IngestResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
        .map_err(|_| IngestError::BadDate(source.to_string()))
}

fn resolve<T: TimeZone>(result: LocalResult<DateTime<T>>, source: &str) -> IngestResult<i64> {
    match result {
        LocalResult::Single(dt) => Ok(dt.timestamp()),
        // DST fold: take the earlier reading
        LocalResult::Ambiguous(dt, _) => Ok(dt.timestamp()),
        LocalResult::None => Err(IngestError::BadDate(source.to_string())),
    }
}
