//! Merges implementor fragments the way a marker page would.
//!
//! Fragments are contributed in command-line order, which stands in for the
//! order their loads complete. `--register-at N` decides when the page's
//! consumer shows up: after N fragments (default: after all of them). The
//! merged list is printed as JSON or as a short text summary. Whatever the
//! registration point, the output is the same; that is the point.

use anyhow::{Result, anyhow, bail};
use implmerge::{
    BrokerStats, Contribution, ImplementorList, MarkerKey, Page, broker_options,
    contribute_fragment, marker_from_path,
};
use serde::Serialize;
use std::env;
use std::fmt::Write as _;
use std::path::PathBuf;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse()?;
    let marker = cli
        .marker
        .clone()
        .map(MarkerKey)
        .or_else(|| cli.fragments.first().and_then(|p| marker_from_path(p)))
        .unwrap_or_else(|| MarkerKey("unknown".to_string()));
    let register_at = cli.register_at.unwrap_or(cli.fragments.len());
    if register_at > cli.fragments.len() {
        bail!(
            "--register-at {register_at} exceeds the number of fragments ({})",
            cli.fragments.len()
        );
    }

    let mut page = Page::new(marker, broker_options(cli.schema.as_deref())?);
    let list = ImplementorList::new();
    let mut rejected: Vec<String> = Vec::new();
    let mut errors: Vec<String> = Vec::new();

    for (idx, path) in cli.fragments.iter().enumerate() {
        if idx == register_at {
            page.register_consumer(list.clone())?;
        }
        match contribute_fragment(&mut page, path) {
            Ok(report) => rejected.extend(
                report
                    .rejected
                    .iter()
                    .map(|err| format!("{}: {err}", path.display())),
            ),
            Err(err) => {
                log::warn!("{err:#}");
                errors.push(format!("{err:#}"));
            }
        }
    }
    if register_at == cli.fragments.len() {
        page.register_consumer(list.clone())?;
    }

    let stats = page.navigate_away().unwrap_or_default();
    let report = MergeReport {
        marker: page.marker().clone(),
        contributions: list.contributions(),
        stats,
        rejected,
    };

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", render_text(&report)),
    }

    if !errors.is_empty() {
        bail!(
            "{} fragment(s) could not be loaded:\n{}",
            errors.len(),
            errors.join("\n")
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct MergeReport {
    marker: MarkerKey,
    contributions: Vec<Contribution>,
    stats: BrokerStats,
    rejected: Vec<String>,
}

fn render_text(report: &MergeReport) -> String {
    let mut out = String::new();
    let records: usize = report.contributions.iter().map(|c| c.records.len()).sum();
    let synthetic = report
        .contributions
        .iter()
        .flat_map(|c| &c.records)
        .filter(|r| r.is_synthetic)
        .count();

    let _ = writeln!(out, "implementors of {}", report.marker);
    let _ = writeln!(out, "==========================");
    let _ = writeln!(out, "sources    : {}", report.contributions.len());
    let _ = writeln!(out, "records    : {records} ({synthetic} synthetic)");
    let _ = writeln!(out, "duplicates : {}", report.stats.duplicates);
    let _ = writeln!(out, "rejected   : {}", report.stats.rejected);
    for contribution in &report.contributions {
        let _ = writeln!(
            out,
            "- {} ({} records)",
            contribution.source_id,
            contribution.records.len()
        );
        for record in &contribution.records {
            let _ = write!(
                out,
                "    {}{}",
                if record.is_synthetic { "[auto] " } else { "" },
                record.display_fragment
            );
            if !record.constraint_dependencies.is_empty() {
                let _ = write!(out, " ({})", record.constraint_dependencies.join(", "));
            }
            let _ = writeln!(out);
        }
    }
    for line in &report.rejected {
        let _ = writeln!(out, "! {line}");
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Text,
}

struct Cli {
    fragments: Vec<PathBuf>,
    register_at: Option<usize>,
    schema: Option<PathBuf>,
    marker: Option<String>,
    format: OutputFormat,
}

impl Cli {
    fn parse() -> Result<Self> {
        let mut args = env::args_os();
        let _program = args.next();
        let mut fragments = Vec::new();
        let mut register_at = None;
        let mut schema = None;
        let mut marker = None;
        let mut format = OutputFormat::Json;

        while let Some(arg) = args.next() {
            let arg_str = arg
                .to_str()
                .ok_or_else(|| anyhow!("invalid UTF-8 in argument"))?;
            match arg_str {
                "--fragment" => fragments.push(PathBuf::from(next_value("--fragment", &mut args)?)),
                "--register-at" => {
                    let raw = next_value("--register-at", &mut args)?;
                    let parsed = raw
                        .parse::<usize>()
                        .map_err(|_| anyhow!("--register-at expects a non-negative integer, got {raw}"))?;
                    register_at = Some(parsed);
                }
                "--schema" => schema = Some(PathBuf::from(next_value("--schema", &mut args)?)),
                "--marker" => marker = Some(next_value("--marker", &mut args)?),
                "--format" => {
                    format = match next_value("--format", &mut args)?.as_str() {
                        "json" => OutputFormat::Json,
                        "text" => OutputFormat::Text,
                        other => bail!("unknown format '{other}' (expected json|text)"),
                    }
                }
                "--help" | "-h" => usage(0),
                other => bail!("unknown argument: {other}"),
            }
        }

        if fragments.is_empty() {
            bail!("at least one --fragment is required");
        }

        Ok(Self {
            fragments,
            register_at,
            schema,
            marker,
            format,
        })
    }
}

fn next_value(flag: &str, args: &mut env::ArgsOs) -> Result<String> {
    let value = args
        .next()
        .ok_or_else(|| anyhow!("{flag} requires a value"))?
        .into_string()
        .map_err(|_| anyhow!("{flag} must be valid UTF-8"))?;
    if value.is_empty() {
        bail!("{flag} must not be empty");
    }
    Ok(value)
}

fn usage(code: i32) -> ! {
    eprintln!(
        "Usage: impl-merge --fragment PATH [--fragment PATH]... [--register-at N] [--schema PATH] [--marker NAME] [--format json|text]\n\nOptions:\n  --fragment PATH           Implementor fragment to contribute (repeatable, in arrival order).\n  --register-at N           Register the consumer after N fragments (default: after all).\n  --schema PATH             Override the contribution schema (or set IMPL_MERGE_SCHEMA).\n  --marker NAME             Marker label; defaults to one derived from the first fragment path.\n  --format json|text        Output format (default: json).\n  --help                    Show this help text."
    );
    std::process::exit(code);
}
