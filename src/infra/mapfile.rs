//! Channel-map file loader.
//!
//! Each non-empty, non-`#` line is pipe-delimited with 2-6 fields:
//! `new_id|source_id|archive_hours|image_url_override|channel_page_url|hour_offset`.
//! The map is keyed by `source_id` (the id appearing in the XMLTV input).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A single remap rule from the channel-map file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMapping {
    /// Replacement channel id.
    pub id: String,
    /// Default DVR depth in hours; 0 means none.
    pub archive_hours: u32,
    /// Optional channel image override.
    pub image: Option<String>,
    /// Optional channel page URL.
    pub page: Option<String>,
    /// Hours added to every programme start time of this channel.
    pub hour_offset: i32,
}

/// Errors raised while loading the channel-map file.
#[derive(Debug, Error)]
pub enum MapFileError {
    #[error("cannot read map file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bad format at line {line}: expected at least `new_id|source_id`, got {text:?}")]
    BadLine { line: usize, text: String },
}

/// Loads the channel-map file into a lookup keyed by source channel id.
pub fn load_channel_map(path: &Path) -> Result<HashMap<String, ChannelMapping>, MapFileError> {
    let contents = fs::read_to_string(path).map_err(|source| MapFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut map = HashMap::new();

    for (index, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() < 2 || fields[0].is_empty() || fields[1].is_empty() {
            return Err(MapFileError::BadLine {
                line: index + 1,
                text: line.to_string(),
            });
        }

        let field = |n: usize| fields.get(n).copied().unwrap_or("").trim();

        map.insert(
            fields[1].to_string(),
            ChannelMapping {
                id: fields[0].to_string(),
                archive_hours: field(2).parse().unwrap_or(0),
                image: Some(field(3).to_string()).filter(|s| !s.is_empty()),
                page: Some(field(4).to_string()).filter(|s| !s.is_empty()),
                hour_offset: field(5).parse().unwrap_or(0),
            },
        );
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_map(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn two_field_line_parses_with_defaults() {
        let file = write_map("first.tv|ch-source\n");
        let map = load_channel_map(file.path()).unwrap();

        let mapping = &map["ch-source"];
        assert_eq!(mapping.id, "first.tv");
        assert_eq!(mapping.archive_hours, 0);
        assert_eq!(mapping.image, None);
        assert_eq!(mapping.page, None);
        assert_eq!(mapping.hour_offset, 0);
    }

    #[test]
    fn full_line_parses_all_fields() {
        let file = write_map("first.tv|src|48|http://img/1.png|http://page/1|-2\n");
        let map = load_channel_map(file.path()).unwrap();

        let mapping = &map["src"];
        assert_eq!(mapping.id, "first.tv");
        assert_eq!(mapping.archive_hours, 48);
        assert_eq!(mapping.image.as_deref(), Some("http://img/1.png"));
        assert_eq!(mapping.page.as_deref(), Some("http://page/1"));
        assert_eq!(mapping.hour_offset, -2);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let file = write_map("# header\n\nfirst.tv|src\n");
        let map = load_channel_map(file.path()).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn missing_second_field_is_an_error_with_line_number() {
        let file = write_map("# comment\nonly-one-field\n");
        let err = load_channel_map(file.path()).unwrap_err();
        match err {
            MapFileError::BadLine { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_leading_field_is_an_error() {
        let file = write_map("|src|48\n");
        assert!(load_channel_map(file.path()).is_err());
    }

    #[test]
    fn unparseable_numbers_default_to_zero() {
        let file = write_map("a|b|lots||!|soon\n");
        let map = load_channel_map(file.path()).unwrap();
        let mapping = &map["b"];
        assert_eq!(mapping.archive_hours, 0);
        assert_eq!(mapping.hour_offset, 0);
    }
}
