use anyhow::{Context, Result, bail};
use implmerge::{Broker, BrokerOptions, Contribution, ContributionSchema, ImplementorRecord, SourceId};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::{Builder, NamedTempFile};

pub fn init_logging() {
    // capture log output with the test harness
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn broker() -> Broker {
    Broker::new(BrokerOptions {
        schema: ContributionSchema::embedded().expect("embedded schema compiles"),
    })
}

pub fn contribution(id: &str, texts: &[&str]) -> Contribution {
    Contribution::new(
        SourceId::new(id).expect("test ids are non-empty"),
        texts.iter().map(|t| ImplementorRecord::new(*t)).collect(),
    )
}

pub fn source_ids(contributions: &[Contribution]) -> Vec<String> {
    contributions
        .iter()
        .map(|c| c.source_id.to_string())
        .collect()
}

pub fn fixture_path(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(relative)
}

/// Write fragment text to a temp file with a `.js` suffix.
pub fn write_fragment(contents: &str) -> Result<NamedTempFile> {
    let mut file = Builder::new()
        .suffix(".js")
        .tempfile()
        .context("failed to allocate fragment file")?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

pub fn impl_merge() -> Command {
    Command::new(env!("CARGO_BIN_EXE_impl-merge"))
}

pub fn run_command(mut cmd: Command) -> Result<Output> {
    let output = cmd
        .output()
        .with_context(|| format!("failed to run command: {:?}", cmd))?;
    if output.status.success() {
        Ok(output)
    } else {
        bail!(
            "command {:?} failed: status {:?}\nstdout: {}\nstderr: {}",
            cmd,
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    }
}
