//! Channel ingestion.

use crate::infra::fts_ready_name;
use crate::ingest::{BuildOptions, IngestContext, IngestError, IngestResult, XmltvChannel};
use crate::storage::IngestStatements;
use rusqlite::params;

/// Ingests one `<channel>` element.
///
/// Returns whether a row was actually inserted; repeats of an already
/// delivered channel id (common when merging several inputs) are ignored
/// without error.
pub fn ingest_channel(
    options: &BuildOptions,
    ctx: &mut IngestContext,
    stmts: &mut IngestStatements,
    channel: XmltvChannel,
) -> IngestResult<bool> {
    if channel.id.is_empty() || channel.name.is_empty() {
        return Ok(false);
    }

    let mut ch_id = channel.id;
    let mut image = channel.icon.filter(|uri| !uri.is_empty());
    let mut archive_hours = 0;
    let mut page = None;

    if let Some(mapping) = options.channel_map.get(&ch_id) {
        ch_id = mapping.id.clone();
        archive_hours = mapping.archive_hours;
        if mapping.image.is_some() {
            image = mapping.image.clone();
        }
        if mapping.page.is_some() {
            page = mapping.page.clone();
        }
    }

    if archive_hours == 0 {
        archive_hours = options.default_archive_hours;
    }

    if !ctx.channel_allowed(options, &ch_id) {
        return Ok(false);
    }

    let archive_seconds = i64::from(archive_hours) * 3600;
    let name = fts_ready_name(&channel.name);

    let inserted = stmts
        .insert_channel
        .execute(params![ch_id, image, name, archive_seconds, page])
        .map_err(IngestError::StorageWrite)?
        > 0;

    if inserted {
        ctx.stats.channels += 1;
        if archive_seconds > 0 {
            ctx.stats.archived_channels += 1;
        }
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::ChannelMapping;
    use crate::storage::EpgDatabase;

    fn channel(id: &str, name: &str) -> XmltvChannel {
        XmltvChannel {
            id: id.to_string(),
            name: name.to_string(),
            icon: None,
        }
    }

    struct Fixture {
        db: EpgDatabase,
        ctx: IngestContext,
    }

    impl Fixture {
        fn new(options: &BuildOptions) -> Self {
            Self {
                db: EpgDatabase::create_in_memory(options.legacy).unwrap(),
                ctx: IngestContext::new(options).unwrap(),
            }
        }

        fn ingest(&mut self, options: &BuildOptions, ch: XmltvChannel) -> bool {
            let mut stmts = IngestStatements::prepare(self.db.conn()).unwrap();
            ingest_channel(options, &mut self.ctx, &mut stmts, ch).unwrap()
        }

        fn row(&self, ch_id: &str) -> (Option<String>, String, i64, Option<String>) {
            self.db
                .conn()
                .query_row(
                    "SELECT image_uri, name, archive_time, ch_page FROM channels WHERE ch_id = ?",
                    [ch_id],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
                )
                .unwrap()
        }
    }

    #[test]
    fn plain_channel_is_inserted_with_normalized_name() {
        let options = BuildOptions::default();
        let mut fixture = Fixture::new(&options);

        assert!(fixture.ingest(&options, channel("ch1", "My Channel 1")));
        let (image, name, archive, page) = fixture.row("ch1");
        assert_eq!(image, None);
        assert_eq!(name, "my channel 1");
        assert_eq!(archive, 0);
        assert_eq!(page, None);
    }

    #[test]
    fn empty_id_or_name_is_skipped() {
        let options = BuildOptions::default();
        let mut fixture = Fixture::new(&options);

        assert!(!fixture.ingest(&options, channel("", "Name")));
        assert!(!fixture.ingest(&options, channel("id", "")));
        assert_eq!(fixture.ctx.stats.channels, 0);
    }

    #[test]
    fn mapping_remaps_id_and_sets_archive_and_overrides() {
        let options = BuildOptions {
            channel_map: [(
                "src".to_string(),
                ChannelMapping {
                    id: "mapped.tv".to_string(),
                    archive_hours: 2,
                    image: Some("http://img/override.png".to_string()),
                    page: Some("http://page".to_string()),
                    hour_offset: 0,
                },
            )]
            .into(),
            ..Default::default()
        };
        let mut fixture = Fixture::new(&options);

        let mut ch = channel("src", "Channel");
        ch.icon = Some("http://img/original.png".to_string());
        assert!(fixture.ingest(&options, ch));

        let (image, _, archive, page) = fixture.row("mapped.tv");
        assert_eq!(image.as_deref(), Some("http://img/override.png"));
        assert_eq!(archive, 2 * 3600);
        assert_eq!(page.as_deref(), Some("http://page"));
        assert_eq!(fixture.ctx.stats.archived_channels, 1);
    }

    #[test]
    fn default_archive_applies_when_mapping_has_none() {
        let options = BuildOptions {
            default_archive_hours: 24,
            ..Default::default()
        };
        let mut fixture = Fixture::new(&options);

        fixture.ingest(&options, channel("ch1", "Name"));
        let (_, _, archive, _) = fixture.row("ch1");
        assert_eq!(archive, 24 * 3600);
        assert_eq!(fixture.ctx.stats.archived_channels, 1);
    }

    #[test]
    fn whitelist_filters_on_remapped_id() {
        let options = BuildOptions {
            channel_map: [(
                "src".to_string(),
                ChannelMapping {
                    id: "mapped".to_string(),
                    archive_hours: 0,
                    image: None,
                    page: None,
                    hour_offset: 0,
                },
            )]
            .into(),
            whitelist: Some(["mapped".to_string()].into()),
            ..Default::default()
        };
        let mut fixture = Fixture::new(&options);

        assert!(fixture.ingest(&options, channel("src", "Name")));
        assert!(!fixture.ingest(&options, channel("other", "Name")));
    }

    #[test]
    fn repeated_channel_does_not_error_or_double_count() {
        let options = BuildOptions::default();
        let mut fixture = Fixture::new(&options);

        assert!(fixture.ingest(&options, channel("ch1", "Name")));
        assert!(!fixture.ingest(&options, channel("ch1", "Name Again")));
        assert_eq!(fixture.ctx.stats.channels, 1);
    }
}
