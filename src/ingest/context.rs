//! Mutable state of one conversion run.
//!
//! One `IngestContext` owns the intern dictionaries, tag frequencies,
//! per-channel temporal windows and all counters, and lives across every
//! input of the run. It never crosses task boundaries; everything here is
//! single-threaded by design.

use crate::infra::legacy_fold;
use crate::ingest::{BuildOptions, IngestError, IngestResult};
use crate::storage::IngestStatements;
use minijinja::{Environment, context};
use rusqlite::params;
use std::collections::HashMap;

/// Per-channel range of starts already accepted, used to drop duplicate
/// entries when several inputs overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelWindow {
    pub min_start: i64,
    pub max_start: i64,
    /// Raw `stop` attribute of the entry holding `max_start`.
    pub last_stop: String,
}

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone)]
pub struct IngestStats {
    pub channels: usize,
    pub archived_channels: usize,
    pub programmes: usize,
    pub mapped: usize,
    pub whitelist_hits: usize,
    pub blacklist_hits: usize,
    pub trimmed_chars: usize,
    pub longest_description: usize,
    /// Latest rejected start before the window, for diagnostics.
    pub nearest_before: Option<i64>,
    /// Earliest rejected start after the window, for diagnostics.
    pub nearest_after: Option<i64>,
}

/// All mutable ingest state for one run.
pub struct IngestContext {
    legacy: bool,
    text_ids: HashMap<String, i64>,
    next_text_id: i64,
    uri_ids: HashMap<String, i64>,
    next_uri_id: i64,
    pub tag_counts: HashMap<String, u64>,
    pub windows: HashMap<String, ChannelWindow>,
    pub stats: IngestStats,
    title_env: Option<Environment<'static>>,
}

impl IngestContext {
    /// Builds a fresh context; compiles the title template if one is set.
    pub fn new(options: &BuildOptions) -> IngestResult<Self> {
        let title_env = match &options.title_template {
            Some(source) => {
                let mut env = Environment::new();
                env.add_template_owned("title".to_string(), source.clone())
                    .map_err(|e| {
                        IngestError::Config(format!("invalid title template: {e}"))
                    })?;
                Some(env)
            }
            None => None,
        };

        Ok(Self {
            legacy: options.legacy,
            text_ids: HashMap::new(),
            next_text_id: 1,
            uri_ids: HashMap::new(),
            next_uri_id: 1,
            tag_counts: HashMap::new(),
            windows: HashMap::new(),
            stats: IngestStats::default(),
            title_env,
        })
    }

    /// Interns a string, returning `(id, newly_interned)`.
    ///
    /// A new string is persisted into the `text` table and indexed in the
    /// FTS table under the same doc id; the legacy tokenizer gets the
    /// case-folded form. The empty string interns like any other value.
    pub fn intern_text(
        &mut self,
        stmts: &mut IngestStatements,
        text: &str,
    ) -> IngestResult<(i64, bool)> {
        if let Some(&id) = self.text_ids.get(text) {
            return Ok((id, false));
        }

        let id = self.next_text_id;
        self.next_text_id += 1;
        self.text_ids.insert(text.to_string(), id);

        stmts
            .insert_text
            .execute(params![id, text])
            .map_err(IngestError::StorageWrite)?;

        if self.legacy {
            let folded = legacy_fold(text);
            stmts
                .insert_fts
                .execute(params![id, folded])
                .map_err(IngestError::StorageWrite)?;
        } else {
            stmts
                .insert_fts
                .execute(params![id, text])
                .map_err(IngestError::StorageWrite)?;
        }

        Ok((id, true))
    }

    /// Interns an image URI, returning its id.
    pub fn intern_uri(&mut self, stmts: &mut IngestStatements, uri: &str) -> IngestResult<i64> {
        if let Some(&id) = self.uri_ids.get(uri) {
            return Ok(id);
        }

        let id = self.next_uri_id;
        self.next_uri_id += 1;
        self.uri_ids.insert(uri.to_string(), id);

        stmts
            .insert_uri
            .execute(params![id, uri])
            .map_err(IngestError::StorageWrite)?;

        Ok(id)
    }

    /// Number of distinct strings interned so far.
    pub fn unique_strings(&self) -> usize {
        self.text_ids.len()
    }

    /// Bumps the frequency counter of a tag name.
    pub fn record_tag(&mut self, name: &str) {
        *self.tag_counts.entry(name.to_string()).or_insert(0) += 1;
    }

    /// Applies the whitelist/blacklist to a (remapped) channel id.
    ///
    /// A configured whitelist wins: everything outside it is rejected and
    /// the blacklist is not consulted.
    pub fn channel_allowed(&mut self, options: &BuildOptions, ch_id: &str) -> bool {
        if let Some(whitelist) = &options.whitelist {
            if whitelist.contains(ch_id) {
                self.stats.whitelist_hits += 1;
                true
            } else {
                false
            }
        } else if options.blacklist.contains(ch_id) {
            self.stats.blacklist_hits += 1;
            false
        } else {
            true
        }
    }

    /// Cross-input temporal deduplication.
    ///
    /// Returns false (drop) when `start` falls inside the closed interval
    /// of starts already seen for this channel; otherwise widens the window
    /// and remembers the `stop` attribute of the latest entry.
    pub fn window_accepts(&mut self, ch_id: &str, start: i64, stop: &str) -> bool {
        match self.windows.get_mut(ch_id) {
            Some(window) => {
                if start >= window.min_start && start <= window.max_start {
                    return false;
                }
                if start > window.max_start {
                    window.max_start = start;
                    window.last_stop = stop.to_string();
                }
                if start < window.min_start {
                    window.min_start = start;
                }
                true
            }
            None => {
                self.windows.insert(
                    ch_id.to_string(),
                    ChannelWindow {
                        min_start: start,
                        max_start: start,
                        last_stop: stop.to_string(),
                    },
                );
                true
            }
        }
    }

    /// Renders the configured title template; `None` means no template or
    /// a render failure (callers keep the pre-template title).
    pub fn render_title(
        &self,
        title: &str,
        sub_title: &str,
        description: &str,
    ) -> Option<String> {
        let env = self.title_env.as_ref()?;
        let template = env.get_template("title").ok()?;
        template
            .render(context! {
                Title => title,
                SubTitle => sub_title,
                Description => description,
            })
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::EpgDatabase;

    fn context_with(options: &BuildOptions) -> IngestContext {
        IngestContext::new(options).unwrap()
    }

    // ===========================================
    // Interning
    // ===========================================

    #[test]
    fn text_ids_start_at_one_and_deduplicate() {
        let db = EpgDatabase::create_in_memory(false).unwrap();
        let mut stmts = IngestStatements::prepare(db.conn()).unwrap();
        let mut ctx = context_with(&BuildOptions::default());

        let (first, new_first) = ctx.intern_text(&mut stmts, "News").unwrap();
        let (second, new_second) = ctx.intern_text(&mut stmts, "Weather").unwrap();
        let (again, new_again) = ctx.intern_text(&mut stmts, "News").unwrap();

        assert_eq!((first, new_first), (1, true));
        assert_eq!((second, new_second), (2, true));
        assert_eq!((again, new_again), (1, false));
        assert_eq!(ctx.unique_strings(), 2);
    }

    #[test]
    fn interning_writes_one_text_and_one_fts_row() {
        let db = EpgDatabase::create_in_memory(false).unwrap();
        let mut stmts = IngestStatements::prepare(db.conn()).unwrap();
        let mut ctx = context_with(&BuildOptions::default());

        ctx.intern_text(&mut stmts, "News").unwrap();
        ctx.intern_text(&mut stmts, "News").unwrap();
        drop(stmts);

        let texts: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM text", [], |r| r.get(0))
            .unwrap();
        let fts: i64 = db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM fts_search WHERE fts_search MATCH 'news'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(texts, 1);
        assert_eq!(fts, 1);
    }

    #[test]
    fn empty_string_is_a_legal_intern() {
        let db = EpgDatabase::create_in_memory(false).unwrap();
        let mut stmts = IngestStatements::prepare(db.conn()).unwrap();
        let mut ctx = context_with(&BuildOptions::default());

        let (id, new) = ctx.intern_text(&mut stmts, "").unwrap();
        assert_eq!((id, new), (1, true));
        let (id_again, new_again) = ctx.intern_text(&mut stmts, "").unwrap();
        assert_eq!((id_again, new_again), (1, false));
    }

    #[test]
    fn legacy_interning_folds_before_indexing() {
        let db = EpgDatabase::create_in_memory(true).unwrap();
        let mut stmts = IngestStatements::prepare(db.conn()).unwrap();
        let options = BuildOptions {
            legacy: true,
            ..Default::default()
        };
        let mut ctx = context_with(&options);

        ctx.intern_text(&mut stmts, "Зелёный ЛЕС").unwrap();
        drop(stmts);

        // The stored text stays raw; the index carries the folded form.
        let raw: String = db
            .conn()
            .query_row("SELECT text FROM text WHERE docid = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(raw, "Зелёный ЛЕС");

        let hits: i64 = db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM fts_search WHERE fts_search MATCH 'зеленый'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);
    }

    #[test]
    fn uri_ids_are_an_independent_space() {
        let db = EpgDatabase::create_in_memory(false).unwrap();
        let mut stmts = IngestStatements::prepare(db.conn()).unwrap();
        let mut ctx = context_with(&BuildOptions::default());

        ctx.intern_text(&mut stmts, "title").unwrap();
        let uri_id = ctx.intern_uri(&mut stmts, "http://img/1.png").unwrap();
        assert_eq!(uri_id, 1);
        let again = ctx.intern_uri(&mut stmts, "http://img/1.png").unwrap();
        assert_eq!(again, 1);
    }

    // ===========================================
    // Temporal windows
    // ===========================================

    #[test]
    fn window_rejects_start_inside_covered_range() {
        let mut ctx = context_with(&BuildOptions::default());

        assert!(ctx.window_accepts("ch", 100, "s1"));
        assert!(ctx.window_accepts("ch", 200, "s2"));
        assert!(!ctx.window_accepts("ch", 100, "s3"));
        assert!(!ctx.window_accepts("ch", 150, "s4"));
        assert!(ctx.window_accepts("ch", 300, "s5"));
    }

    #[test]
    fn window_tracks_stop_of_latest_entry() {
        let mut ctx = context_with(&BuildOptions::default());

        ctx.window_accepts("ch", 100, "stop-a");
        ctx.window_accepts("ch", 300, "stop-b");
        ctx.window_accepts("ch", 50, "stop-c");

        let window = &ctx.windows["ch"];
        assert_eq!(window.min_start, 50);
        assert_eq!(window.max_start, 300);
        assert_eq!(window.last_stop, "stop-b");
    }

    #[test]
    fn windows_are_tracked_per_channel() {
        let mut ctx = context_with(&BuildOptions::default());

        assert!(ctx.window_accepts("a", 100, ""));
        assert!(ctx.window_accepts("b", 100, ""));
    }

    // ===========================================
    // Filters
    // ===========================================

    #[test]
    fn whitelist_wins_over_blacklist() {
        let options = BuildOptions {
            whitelist: Some(["keep".to_string()].into()),
            blacklist: ["keep".to_string()].into(),
            ..Default::default()
        };
        let mut ctx = context_with(&options);
        assert!(ctx.channel_allowed(&options, "keep"));
        assert!(!ctx.channel_allowed(&options, "other"));
    }

    #[test]
    fn blacklist_rejects_without_whitelist() {
        let options = BuildOptions {
            blacklist: ["bad".to_string()].into(),
            ..Default::default()
        };
        let mut ctx = context_with(&options);
        assert!(!ctx.channel_allowed(&options, "bad"));
        assert!(ctx.channel_allowed(&options, "good"));
        assert_eq!(ctx.stats.blacklist_hits, 1);
    }

    // ===========================================
    // Title template
    // ===========================================

    #[test]
    fn template_renders_all_fields() {
        let options = BuildOptions {
            title_template: Some("{{ Title }} - {{ SubTitle }}".to_string()),
            ..Default::default()
        };
        let ctx = context_with(&options);
        let rendered = ctx.render_title("News", "Morning", "desc").unwrap();
        assert_eq!(rendered, "News - Morning");
    }

    #[test]
    fn no_template_renders_nothing() {
        let ctx = context_with(&BuildOptions::default());
        assert!(ctx.render_title("News", "", "").is_none());
    }

    #[test]
    fn bad_template_syntax_is_a_config_error() {
        let options = BuildOptions {
            title_template: Some("{{ unclosed".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            IngestContext::new(&options),
            Err(IngestError::Config(_))
        ));
    }
}
