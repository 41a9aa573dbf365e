//! Build command handler.

use crate::cli::BuildArgs;
use crate::infra::load_channel_map;
use crate::ingest::{
    BuildOptions, BuildRequest, IngestError, ScheduleInput, build, parse_channel_list,
    parse_start,
};
use anyhow::Result;
use chrono::Local;
use chrono_tz::Tz;
use url::Url;

pub fn handle_build(args: &BuildArgs) -> Result<()> {
    let options = assemble_options(args)?;

    println!("Local time zone: {}", Local::now().format("%Z (%:z)"));
    match &args.tz {
        Some(zone) => println!("XMLTV time zone: overridden with {zone}"),
        None => println!("XMLTV time zone: take from XMLTV file"),
    }

    let inputs = if args.inputs.is_empty() {
        println!("No --input argument, reading from standard input...");
        vec![ScheduleInput::Stdin]
    } else {
        args.inputs
            .iter()
            .cloned()
            .map(ScheduleInput::File)
            .collect()
    };

    let request = BuildRequest {
        inputs,
        playlist: args.xspf.clone(),
        output: args.output.clone(),
    };

    let report = build(&options, &request)?;

    println!(
        "Inserted {} channels ({} archived), {} programme entries, {} unique strings",
        report.stats.channels,
        report.stats.archived_channels,
        report.stats.programmes,
        report.unique_strings
    );

    if !options.channel_map.is_empty() && report.stats.mapped == 0 {
        println!(
            "WARNING: none of {} mappings were used!",
            options.channel_map.len()
        );
    }
    if options.whitelist.is_some() && report.stats.whitelist_hits == 0 {
        println!("WARNING: the --include list never matched any channel!");
    }
    if !options.blacklist.is_empty() && report.stats.blacklist_hits == 0 {
        println!("WARNING: the --exclude list never matched any channel!");
    }
    if options.snippet.is_some() {
        println!(
            "Trimmed {} characters. Max length before trimming: {}",
            report.stats.trimmed_chars, report.stats.longest_description
        );
    }

    Ok(())
}

fn assemble_options(args: &BuildArgs) -> Result<BuildOptions> {
    let mut options = BuildOptions::default();

    match &args.offset {
        Some(value) => options.start_from = parse_start(value)?,
        None => eprintln!(
            "Warning: missing --offset argument, EPG start defaults to 1 January 1970"
        ),
    }

    match args.timespan {
        Some(0) => {
            return Err(IngestError::Config("duration must be positive".to_string()).into());
        }
        Some(hours) => options.span_seconds = i64::from(hours) * 3600,
        None => eprintln!(
            "Warning: missing --timespan argument, EPG length defaults to 72 hours"
        ),
    }

    options.snippet = usize::try_from(args.snippet).ok();
    options.legacy = args.legacy;
    options.skip_tags = args.no_tags;
    options.skip_year = args.no_year;
    options.default_archive_hours = args.archive_default.unwrap_or(0);
    options.title_template = args.title_template.clone();
    options.end_title = args.end_title.clone();
    options.ignore_conflicts = args.ignore_conflicts;

    if let Some(zone) = &args.tz {
        let tz: Tz = zone
            .parse()
            .map_err(|_| IngestError::Config(format!("failed to load timezone '{zone}'")))?;
        options.tz_override = Some(tz);
    }

    if let Some(value) = &args.include {
        options.whitelist = Some(parse_channel_list(value, "include")?);
    }
    if let Some(value) = &args.exclude {
        options.blacklist = parse_channel_list(value, "exclude")?;
    }

    if let Some(path) = &args.xmap {
        options.channel_map = load_channel_map(path)
            .map_err(|e| IngestError::Config(format!("failed to parse map file: {e}")))?;
        println!("Parsed {} mappings", options.channel_map.len());
    }

    if let Some(base) = &args.image_base {
        let url = Url::parse(base)
            .map_err(|e| IngestError::Config(format!("bad --image-base argument: {e}")))?;
        options.image_base = Some(url);
    }

    Ok(options)
}
