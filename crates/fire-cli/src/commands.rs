use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use fire_event::{register_headers, RunHeader};
use fire_io::{
    copy, create_writer, open_reader, read_all, CopyReport, CopySelection, FileSummary,
    SchemaRegistry, StorageFormat, Value, WriterConfig, RUN_HEADER,
};
use fire_process::ProcessConfig;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Inspect(args) => cmd_inspect(args, format),
        Command::Copy(args) => cmd_copy(args, format),
        Command::Dump(args) => cmd_dump(args),
        Command::Check(args) => cmd_check(args, format),
    }
}

/// Only the headers are registered; other aggregates keep their stored
/// layout.
fn registry() -> anyhow::Result<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    register_headers(&mut registry)?;
    Ok(registry)
}

fn cmd_inspect(args: InspectArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut reader =
        open_reader(&args.file).with_context(|| format!("opening {}", args.file.display()))?;
    let summary = reader.summary();
    let events = reader.events();
    if format == OutputFormat::Json {
        let json = serde_json::json!({ "file": summary, "events": events, "runs": reader.runs() });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    print_summary(&summary);
    println!("  Events: {}", events.to_string().bold());
    if args.runs && reader.descriptor(RUN_HEADER).is_some() {
        let runs: Vec<RunHeader> = read_all(&mut *reader, &registry()?, RUN_HEADER)?;
        for run in &runs {
            println!("  {run}");
        }
    }
    Ok(())
}

fn print_summary(summary: &FileSummary) {
    println!(
        "{} ({})",
        summary.path.display().to_string().bold(),
        summary.format.to_string().cyan()
    );
    for stream in &summary.streams {
        let version = stream.version.map(|v| format!(" v{v}")).unwrap_or_default();
        println!(
            "  {:<40} {}{} {} entries, {} chunks",
            stream.name.yellow(),
            stream.type_name,
            version.dimmed(),
            stream.entries,
            stream.chunks
        );
    }
}

fn writer_config(args: &CopyArgs) -> anyhow::Result<WriterConfig> {
    let mut config = WriterConfig::default();
    if let Some(format) = StorageFormat::from_path(&args.dest) {
        config = config.with_format(format);
    }
    if let Some(rows) = args.rows_per_chunk {
        config = config.with_rows_per_chunk(rows);
    }
    if let Some(level) = args.compression {
        config.compression_level = level;
    }
    config.validate()?;
    Ok(config)
}

fn selection(args: &CopyArgs) -> anyhow::Result<CopySelection> {
    let mut selection = CopySelection::all();
    if let Some(pattern) = &args.streams {
        selection = selection.with_streams(pattern)?;
    }
    if args.first > 0 || args.count.is_some() {
        let end = args.count.map_or(u64::MAX, |count| args.first.saturating_add(count));
        selection = selection.with_rows(args.first..end);
    }
    Ok(selection)
}

/// Copy and close the destination.
fn copy_file(args: &CopyArgs) -> anyhow::Result<(CopyReport, FileSummary)> {
    if args.source == args.dest {
        bail!("source and destination are the same file");
    }
    let config = writer_config(args)?;
    let selection = selection(args)?;
    debug!(?config, ?selection, "copying");

    let mut reader =
        open_reader(&args.source).with_context(|| format!("opening {}", args.source.display()))?;
    let mut writer = create_writer(&args.dest, &config)
        .with_context(|| format!("creating {}", args.dest.display()))?;
    let report = copy(&mut *reader, &mut *writer, &selection, &registry()?)?;
    let summary = writer.close()?;
    Ok((report, summary))
}

fn cmd_copy(args: CopyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let (report, summary) = copy_file(&args)?;
    if format == OutputFormat::Json {
        let json = serde_json::json!({ "report": report, "file": summary });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }
    println!(
        "{} Copied {} streams ({} rows) into {}",
        "✓".green().bold(),
        report.streams,
        report.rows,
        args.dest.display().to_string().bold()
    );
    if report.converted > 0 {
        println!("  {} streams upgraded to newer layouts", report.converted.to_string().cyan());
    }
    Ok(())
}

fn dump_rows(file: &Path, stream: &str, row: Option<u64>) -> anyhow::Result<Vec<Value>> {
    let mut reader = open_reader(file).with_context(|| format!("opening {}", file.display()))?;
    let registry = registry()?;
    let rows = match row {
        Some(row) => row..row + 1,
        None => 0..reader.entries(stream)?,
    };
    let mut values = Vec::new();
    for row in rows {
        values.push(Value::read_row(&mut *reader, &registry, stream, row)?);
    }
    Ok(values)
}

fn cmd_dump(args: DumpArgs) -> anyhow::Result<()> {
    for value in dump_rows(&args.file, &args.stream, args.row)? {
        println!("{}", serde_json::to_string(&value)?);
    }
    Ok(())
}

fn cmd_check(args: CheckArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = ProcessConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.validate()?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let mode = if config.is_production() {
        format!("production of {} events", config.event_limit)
    } else {
        format!("reconstruction of {} files", config.input_files.len())
    };
    println!("{} {} is valid", "✓".green().bold(), args.config.display());
    println!("  Pass: {}  Mode: {}", config.pass_name.yellow(), mode);
    println!("  Output: {}", config.output.path.display());
    for processor in &config.sequence {
        println!("  {} {}", processor.name.bold(), format!("({})", processor.class_name).dimmed());
    }
    for provider in &config.conditions.providers {
        println!("  provider {}", provider.class_name.cyan());
    }
    Ok(())
}
