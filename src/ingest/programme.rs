//! Programme ingestion: the hot path of the pipeline.

use crate::infra::{clip_chars, strip_age_marker};
use crate::ingest::dates::parse_xmltv_date;
use crate::ingest::{BuildOptions, IngestContext, IngestError, IngestResult, XmltvProgramme};
use crate::storage::IngestStatements;
use regex::Regex;
use rusqlite::params;
use std::sync::LazyLock;
use url::Url;

static TRAILING_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{4})$").expect("year regex"));

/// Ingests one `<programme>` element.
///
/// Returns whether a meta row was inserted. Entries outside the configured
/// window, filtered channels, and starts already covered by a previous
/// input are dropped without error.
pub fn ingest_programme(
    options: &BuildOptions,
    ctx: &mut IngestContext,
    stmts: &mut IngestStatements,
    programme: XmltvProgramme,
) -> IngestResult<bool> {
    let mut ch_id = programme.channel.clone();
    let mut hour_offset = 0;

    if let Some(mapping) = options.channel_map.get(&ch_id) {
        ch_id = mapping.id.clone();
        hour_offset = mapping.hour_offset;
        ctx.stats.mapped += 1;
    }

    if !ctx.channel_allowed(options, &ch_id) {
        return Ok(false);
    }

    let mut start_time = parse_xmltv_date(&programme.start, options.tz_override)?;
    start_time += i64::from(hour_offset) * 3600;

    if start_time < options.start_from {
        let nearest = ctx.stats.nearest_before.get_or_insert(start_time);
        *nearest = (*nearest).max(start_time);
        return Ok(false);
    }
    if start_time > options.start_from + options.span_seconds {
        let nearest = ctx.stats.nearest_after.get_or_insert(start_time);
        *nearest = (*nearest).min(start_time);
        return Ok(false);
    }

    if !ctx.window_accepts(&ch_id, start_time, &programme.stop) {
        return Ok(false);
    }

    let mut title = strip_age_marker(&programme.title);
    if let Some(rendered) = ctx.render_title(&title, &programme.sub_title, &programme.description)
    {
        title = rendered;
    }

    let full_length = programme.description.chars().count();
    let (description, trimmed) = match options.snippet {
        Some(limit) => clip_chars(&programme.description, limit),
        None => (programme.description.clone(), 0),
    };

    let (title_id, _) = ctx.intern_text(stmts, &title)?;
    let (description_id, new_description) = ctx.intern_text(stmts, &description)?;
    if new_description {
        if full_length > ctx.stats.longest_description {
            ctx.stats.longest_description = full_length;
        }
        ctx.stats.trimmed_chars += trimmed;
    }

    let mut image_id = None;
    if let Some(first) = programme.icons.first().filter(|uri| !uri.is_empty()) {
        let uri = rewrite_image_uri(first, options.image_base.as_ref());
        image_id = Some(ctx.intern_uri(stmts, &uri)?);
    }

    let mut tag_list = String::new();
    for category in &programme.categories {
        for raw in category.split(',') {
            let tag = raw.trim();
            if tag.is_empty() {
                continue;
            }
            ctx.record_tag(tag);
            tag_list.push_str(tag);
            tag_list.push(',');
        }
    }

    let year: Option<i64> = programme
        .year
        .as_deref()
        .and_then(|value| TRAILING_YEAR.captures(value.trim()))
        .and_then(|caps| caps[1].parse().ok());

    let program_id = stmts
        .insert_meta
        .insert(params![start_time, ch_id, image_id, title_id, description_id, year])
        .map_err(IngestError::StorageWrite)?;

    if !tag_list.is_empty() {
        stmts
            .insert_tag_list
            .execute(params![program_id, tag_list])
            .map_err(IngestError::StorageWrite)?;
    }

    ctx.stats.programmes += 1;
    Ok(true)
}

/// Rewrites an absolute icon URI against the configured base URL.
///
/// Relative URIs pass through untouched. The base path is prepended to the
/// original path unless it is empty or `/`.
fn rewrite_image_uri(original: &str, base: Option<&Url>) -> String {
    let Some(base) = base else {
        return original.to_string();
    };
    let Ok(mut uri) = Url::parse(original) else {
        return original.to_string();
    };
    if uri.cannot_be_a_base() {
        return original.to_string();
    }

    let _ = uri.set_scheme(base.scheme());
    let _ = uri.set_host(base.host_str());
    let _ = uri.set_port(base.port());

    let base_path = base.path();
    if !base_path.is_empty() && base_path != "/" {
        let merged = format!("{}{}", base_path.trim_end_matches('/'), uri.path());
        uri.set_path(&merged);
    }

    uri.to_string()
}
