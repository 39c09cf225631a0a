use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::env as stdenv;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Name printed in the prompt and used as the prefix of diagnostics.
pub const SYSNAME: &str = "seashell";

/// Maximum number of bytes the line reader accepts before failing the read.
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

/// Process-wide settings, computed once at startup and handed to every
/// component that needs them.
///
/// Nothing in the crate reads these values from global state; the
/// [`Interpreter`](crate::Interpreter) owns one `Config` inside its
/// [`Environment`](crate::env::Environment).
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory the shell was started in. Association files live here.
    pub startup_dir: PathBuf,
    /// File holding one alias name per line.
    pub alias_names: PathBuf,
    /// File holding one alias target path per line, index-aligned with `alias_names`.
    pub alias_paths: PathBuf,
    /// Directory prefixed to bare command names.
    pub bin_dir: PathBuf,
    /// Tools that live outside `bin_dir` and resolve to a fixed location.
    pub known_tools: BTreeMap<String, PathBuf>,
    /// `PATH` captured at startup; searched when `bin_dir` has no match.
    pub search_path: Option<OsString>,
    /// Input line limit in bytes.
    pub max_line_len: usize,
    /// Where `goodMorning` writes the crontab entry.
    pub cron_job_file: PathBuf,
    /// Program used to register the crontab entry.
    pub crontab: PathBuf,
    /// Audio player named in the crontab entry.
    pub audio_player: String,
}

impl Config {
    /// Build a configuration rooted at `startup_dir` with default locations.
    pub fn new(startup_dir: impl Into<PathBuf>) -> Self {
        let startup_dir = startup_dir.into();
        let mut known_tools = BTreeMap::new();
        known_tools.insert("gcc".to_string(), PathBuf::from("/usr/bin/gcc"));
        Self {
            alias_names: startup_dir.join("name.txt"),
            alias_paths: startup_dir.join("path.txt"),
            startup_dir,
            bin_dir: PathBuf::from("/bin"),
            known_tools,
            search_path: None,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            cron_job_file: stdenv::temp_dir().join("seashell_new_job.sh"),
            crontab: PathBuf::from("/usr/bin/crontab"),
            audio_player: "aplay".to_string(),
        }
    }

    /// Capture the current working directory and `PATH` of this process.
    pub fn from_process() -> Result<Self> {
        let cwd = stdenv::current_dir().context("can't determine startup directory")?;
        let mut config = Self::new(cwd);
        config.search_path = stdenv::var_os("PATH");
        Ok(config)
    }

    /// Fixed location for a tool from the known-tool table, if any.
    pub fn known_tool(&self, name: &str) -> Option<&Path> {
        self.known_tools.get(name).map(PathBuf::as_path)
    }
}
