use std::{
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{bail, Context};
use chrono::{DateTime, NaiveTime, Timelike, Utc};
use tracing::info;

use crate::catalog::stop::StopId;

/// Departure time of a search: the UTC wall-clock time of `dateTime`,
/// truncated to whole seconds.
pub fn departure_time(date_time: &str) -> anyhow::Result<NaiveTime> {
    let at = DateTime::parse_from_rfc3339(date_time)
        .with_context(|| format!("Invalid dateTime {date_time:?}"))?
        .with_timezone(&Utc)
        .time();

    at.with_nanosecond(0).context("Invalid dateTime")
}

/// Resolves `name` inside `dir`, refusing anything that is not a plain file
/// name or does not exist.
pub fn locate_script(dir: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty() || Path::new(name).file_name()? != name {
        return None;
    }

    let path = dir.join(name);
    path.is_file().then_some(path)
}

/// One run of the external heatmap script.
#[derive(Debug, Clone)]
pub struct ScriptInvocation {
    pub interpreter: String,
    pub script: PathBuf,
    pub stop: StopId,
    pub time: NaiveTime,
    pub output: PathBuf,
}

impl ScriptInvocation {
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(&self.script)
            .arg("--stop")
            .arg(self.stop.as_str())
            .arg("--time")
            .arg(self.time.format("%H:%M:%S").to_string())
            .arg("--output")
            .arg(&self.output);
        cmd
    }

    /// Runs the script to completion. Blocks.
    pub fn run(&self) -> anyhow::Result<()> {
        info!(
            script = %self.script.display(),
            stop = %self.stop,
            time = %self.time,
            "Running heatmap script"
        );

        let status = self
            .command()
            .status()
            .with_context(|| format!("Failed to start {}", self.interpreter))?;

        if !status.success() {
            bail!("{} exited with {status}", self.script.display());
        }

        Ok(())
    }
}
