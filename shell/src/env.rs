use crate::config::Config;
use anyhow::{Context, Result};
use std::env as stdenv;
use std::fs;
use std::path::{Path, PathBuf};

/// Mutable, user-level view of the shell process handed to every builtin.
///
/// The environment contains:
/// - `config`: startup settings, fixed for the life of the shell.
/// - `current_dir`: the working directory, kept in sync with the process.
/// - `should_exit`: set by `exit`; the interpreter stops after the current line.
#[derive(Debug, Clone)]
pub struct Environment {
    pub config: Config,
    pub current_dir: PathBuf,
    pub should_exit: bool,
}

impl Environment {
    /// Wrap `config`, taking the process working directory as the current one.
    pub fn new(config: Config) -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| config.startup_dir.clone());
        Self {
            config,
            current_dir,
            should_exit: false,
        }
    }

    /// Get the value of a process environment variable.
    pub fn get_var(&self, key: &str) -> Option<String> {
        stdenv::var(key).ok()
    }

    /// Change the process working directory.
    ///
    /// Relative targets are resolved against `current_dir`.
    pub fn change_dir(&mut self, target: &Path) -> Result<()> {
        let new_dir = if target.is_absolute() {
            target.to_path_buf()
        } else {
            self.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("can't canonicalize {}", new_dir.display()))?;

        stdenv::set_current_dir(&canonical)
            .with_context(|| format!("can't chdir to {}", canonical.display()))?;
        self.current_dir = canonical;
        Ok(())
    }
}
