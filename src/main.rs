use anyhow::{bail, Context};
use std::fs::File;
use std::io;
use tracing::{info, Level};

use cwa_reader::{CwaCsvStream, ExportOptions};

const USAGE: &str = "usage: axivity_cwa_reader <FILE.CWA> [--first-line N] [--line-skip N] \
[--line-count N] [--light] [--temp] [--batt] [--events] [--metadata] [--metadata-json]";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_writer(io::stderr)
        .init();

    let mut path = None;
    let mut first_line = 0i64;
    let mut line_skip = 1i64;
    let mut line_count = -1i64;
    let mut options = ExportOptions::NONE;
    let mut metadata_json = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--first-line" => first_line = next_int(&mut args, &arg)?,
            "--line-skip" => line_skip = next_int(&mut args, &arg)?,
            "--line-count" => line_count = next_int(&mut args, &arg)?,
            "--light" => options.light = true,
            "--temp" => options.temperature = true,
            "--batt" => options.battery = true,
            "--events" => options.events = true,
            "--metadata" => options.metadata = true,
            "--metadata-json" => metadata_json = true,
            "--help" | "-h" => {
                println!("{}", USAGE);
                return Ok(());
            }
            other if path.is_none() && !other.starts_with('-') => path = Some(other.to_string()),
            other => bail!("unrecognized argument: {}\n{}", other, USAGE),
        }
    }
    let path = match path {
        Some(p) => p,
        None => bail!("missing input file\n{}", USAGE),
    };

    let file = File::open(&path).with_context(|| format!("cannot open {}", path))?;
    let mut stream = CwaCsvStream::new(file, first_line, line_skip, line_count, options);

    if metadata_json {
        println!("{}", serde_json::to_string_pretty(&stream.session_info())?);
        return Ok(());
    }

    info!(
        "converting {} (device {:?}, session {:?})",
        path,
        stream.device_id(),
        stream.session_id()
    );

    let stdout = io::stdout();
    let written = io::copy(&mut stream, &mut stdout.lock()).context("conversion failed")?;
    info!("wrote {} bytes, {} samples decoded", written, stream.line_index());
    Ok(())
}

fn next_int(args: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<i64> {
    let value = args
        .next()
        .with_context(|| format!("{} requires a value", flag))?;
    value
        .parse()
        .with_context(|| format!("{} expects an integer, got {}", flag, value))
}
