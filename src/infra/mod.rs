//! Shared low-level helpers: text normalization, map-file parsing, gzip framing.

mod gzip;
mod mapfile;
mod normalize;

pub use gzip::{ARTIFACT_DB_NAME, artifact_comment, compress_file, open_database};
pub use mapfile::{ChannelMapping, MapFileError, load_channel_map};
pub use normalize::{clip_chars, fts_ready_name, legacy_fold, strip_age_marker};
