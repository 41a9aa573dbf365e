//! JTV export command handler.

use crate::cli::JtvArgs;
use crate::export::{JtvOptions, export_jtv};
use crate::infra::open_database;
use anyhow::{Context, Result};

pub fn handle_jtv(args: &JtvArgs) -> Result<()> {
    let (db_path, _guard) = open_database(&args.input)
        .with_context(|| format!("could not open EPGX file {}", args.input.display()))?;

    println!("Copying schedule to JTV archive");

    let options = JtvOptions {
        charset: args.charset.clone(),
        hour_offset: args.offset_time,
    };
    let channels = export_jtv(&db_path, &args.output, &options)?;

    eprintln!("Populated JTV info for {channels} channels");
    Ok(())
}
