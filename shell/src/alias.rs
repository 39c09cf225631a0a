use crate::config::Config;
use anyhow::{Context, Result, bail};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A directory shortcut: `name` stands for `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub name: String,
    pub path: String,
}

/// Persistent name -> directory table backed by two parallel line files.
///
/// Line `i` of the names file pairs with line `i` of the paths file.
/// Both files are rewritten through a temporary sibling and a rename.
#[derive(Debug, Clone)]
pub struct AliasStore {
    names: PathBuf,
    paths: PathBuf,
}

impl AliasStore {
    pub fn new(names: impl Into<PathBuf>, paths: impl Into<PathBuf>) -> Self {
        Self {
            names: names.into(),
            paths: paths.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.alias_names, &config.alias_paths)
    }

    /// All stored associations in insertion order. Missing files mean an empty table.
    pub fn load(&self) -> Result<Vec<Association>> {
        let names = read_lines(&self.names)?;
        let paths = read_lines(&self.paths)?;
        Ok(names
            .into_iter()
            .zip(paths)
            .filter(|(name, _)| !name.is_empty())
            .map(|(name, path)| Association { name, path })
            .collect())
    }

    /// Path associated with `name`.
    pub fn get(&self, name: &str) -> Result<Option<String>> {
        let name = name.trim_end();
        Ok(self
            .load()?
            .into_iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.path))
    }

    /// Associate `name` with `path`.
    ///
    /// Any previous association using the same name or the same path is replaced.
    pub fn set(&self, name: &str, path: &str) -> Result<()> {
        let name = name.trim_end();
        let path = path.trim_end();
        if name.is_empty() {
            bail!("alias name can't be empty");
        }
        if [name, path].iter().any(|s| s.contains(['\n', '\r'])) {
            bail!("alias names and paths can't contain line breaks");
        }

        let mut entries = self.load()?;
        entries.retain(|entry| entry.name != name && entry.path != path);
        entries.push(Association {
            name: name.to_string(),
            path: path.to_string(),
        });
        self.save(&entries)
    }

    /// Remove the association for `name`. Returns whether one existed.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let name = name.trim_end();
        let mut entries = self.load()?;
        let before = entries.len();
        entries.retain(|entry| entry.name != name);
        if entries.len() == before {
            return Ok(false);
        }
        self.save(&entries)?;
        Ok(true)
    }

    /// Forget every association.
    pub fn clear(&self) -> Result<()> {
        for file in [&self.names, &self.paths] {
            match fs::remove_file(file) {
                Err(e) if e.kind() != ErrorKind::NotFound => {
                    return Err(e).with_context(|| format!("can't remove {}", file.display()));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn save(&self, entries: &[Association]) -> Result<()> {
        let names: String = entries.iter().map(|e| format!("{}\n", e.name)).collect();
        let paths: String = entries.iter().map(|e| format!("{}\n", e.path)).collect();
        replace_file(&self.names, &names)?;
        replace_file(&self.paths, &paths)
    }
}

fn read_lines(file: &Path) -> Result<Vec<String>> {
    match fs::read_to_string(file) {
        Ok(text) => Ok(text.lines().map(|line| line.trim_end().to_string()).collect()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e).with_context(|| format!("can't read {}", file.display())),
    }
}

fn replace_file(file: &Path, contents: &str) -> Result<()> {
    let tmp = file.with_extension("tmp");
    fs::write(&tmp, contents).with_context(|| format!("can't write {}", tmp.display()))?;
    fs::rename(&tmp, file).with_context(|| format!("can't replace {}", file.display()))
}
