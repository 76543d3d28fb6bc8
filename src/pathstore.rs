use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::pyenv::Pyenv;
use crate::registry::{normalize_path, Registry};

/// State file colocated with the loader shim in site-packages.
pub const STATE_FILE_NAME: &str = "external-site-packages";

/// Placement of an injected directory on the interpreter search path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveMode {
    Append,
    Prepend,
}

impl DirectiveMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DirectiveMode::Append => "append",
            DirectiveMode::Prepend => "prepend",
        }
    }
}

impl fmt::Display for DirectiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DirectiveMode {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "append" => Ok(DirectiveMode::Append),
            "prepend" => Ok(DirectiveMode::Prepend),
            _ => Err(()),
        }
    }
}

/// One persisted `mode|target` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathDirective {
    pub mode: DirectiveMode,
    pub target: PathBuf,
}

impl PathDirective {
    /// Parse a single state-file line; `None` when the line is malformed.
    pub fn parse(line: &str) -> Option<PathDirective> {
        let (mode, target) = line.split_once('|')?;
        let mode = mode.parse().ok()?;
        if target.is_empty() {
            return None;
        }
        Some(PathDirective {
            mode,
            target: PathBuf::from(target),
        })
    }

    pub fn to_line(&self) -> String {
        format!("{}|{}", self.mode, self.target.display())
    }
}

/// Ordered directive sequence for one environment, backed by its state file.
///
/// Construction performs no I/O; call [`PathStore::load`] before reading and
/// [`PathStore::save`] to persist mutations. The sequence keeps insertion
/// order; the effective search-path ordering is resolved by the loader at
/// interpreter start.
#[derive(Debug, Clone)]
pub struct PathStore {
    path: PathBuf,
    directives: Vec<PathDirective>,
}

impl PathStore {
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            path: state_path.into(),
            directives: Vec::new(),
        }
    }

    /// Store for the state file inside the given site-packages directory.
    pub fn for_site_packages(site_dir: &Path) -> Self {
        Self::new(site_dir.join(STATE_FILE_NAME))
    }

    pub fn state_path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted sequence; an absent file is an empty sequence.
    pub fn load(&mut self) -> Result<()> {
        self.directives.clear();

        if !self.path.exists() {
            return Ok(());
        }

        let contents = fs::read_to_string(&self.path)?;
        for (idx, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let directive = PathDirective::parse(line).ok_or_else(|| Error::PathState {
                path: self.path.clone(),
                line: idx + 1,
                content: line.to_string(),
            })?;
            self.directives.push(directive);
        }

        Ok(())
    }

    /// Rewrite the whole state file from the in-memory sequence.
    pub fn save(&self) -> Result<()> {
        let mut contents = String::new();
        for directive in &self.directives {
            contents.push_str(&directive.to_line());
            contents.push('\n');
        }
        fs::write(&self.path, contents)?;
        Ok(())
    }

    pub fn directives(&self) -> &[PathDirective] {
        &self.directives
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    fn contains(&self, target: &Path) -> bool {
        self.directives.iter().any(|d| d.target == target)
    }

    /// Add a directive at the end of the sequence with mode `append`.
    ///
    /// No-op when the target is already present, whatever its stored mode:
    /// the first write wins and a later call cannot change the mode.
    pub fn append(&mut self, target: PathBuf) {
        self.add(DirectiveMode::Append, target);
    }

    /// Add a directive at the end of the sequence with mode `prepend`.
    ///
    /// The mode is a stored tag, not a position; the loader resolves final
    /// ordering when it replays the sequence.
    pub fn prepend(&mut self, target: PathBuf) {
        self.add(DirectiveMode::Prepend, target);
    }

    fn add(&mut self, mode: DirectiveMode, target: PathBuf) {
        if self.contains(&target) {
            return;
        }
        self.directives.push(PathDirective { mode, target });
    }

    /// Drop every directive with the given target, whatever its mode.
    pub fn remove(&mut self, target: &Path) {
        self.directives.retain(|d| d.target != target);
    }

    pub fn clear(&mut self) {
        self.directives.clear();
    }
}

/// Resolve a raw pythonpath target to a concrete directory.
///
/// An existing directory is used verbatim (after `~` expansion); otherwise
/// the target must name a declared environment, whose site-packages
/// directory is looked up through the interpreter manager.
pub fn resolve_target(registry: &Registry, pyenv: &Pyenv, raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::tilde(raw);
    let candidate = Path::new(expanded.as_ref());
    if candidate.is_dir() {
        let base = std::env::current_dir()?;
        return Ok(normalize_path(raw, &base));
    }

    let environment = registry.find(raw).ok_or_else(|| Error::Resolution {
        target: raw.to_string(),
    })?;
    let handle = pyenv.env(&environment.name)?;
    handle.site_packages()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn target(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[test]
    fn test_append_is_idempotent() {
        let mut store = PathStore::new("/tmp/state");
        store.append(target("/opt/a"));
        let once = store.directives().to_vec();
        store.append(target("/opt/a"));
        assert_eq!(store.directives(), once.as_slice());
    }

    #[test]
    fn test_first_write_wins_for_mode() {
        let mut store = PathStore::new("/tmp/state");
        store.append(target("/opt/a"));
        store.prepend(target("/opt/a"));

        assert_eq!(store.directives().len(), 1);
        assert_eq!(store.directives()[0].mode, DirectiveMode::Append);
    }

    #[test]
    fn test_remove_matches_any_mode() {
        let mut store = PathStore::new("/tmp/state");
        store.prepend(target("/opt/a"));
        store.append(target("/opt/b"));

        store.remove(Path::new("/opt/a"));
        assert_eq!(store.directives().len(), 1);
        assert_eq!(store.directives()[0].target, target("/opt/b"));

        // removing a non-member is a no-op
        store.remove(Path::new("/opt/missing"));
        assert_eq!(store.directives().len(), 1);
    }

    #[test]
    fn test_clear_is_absorbing() {
        let mut store = PathStore::new("/tmp/state");
        store.append(target("/opt/a"));
        store.prepend(target("/opt/b"));

        store.clear();
        store.remove(Path::new("/opt/a"));
        store.remove(Path::new("/opt/b"));

        assert!(store.is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let state = temp.path().join(STATE_FILE_NAME);

        let mut store = PathStore::new(&state);
        store.prepend(target("/opt/first"));
        store.append(target("/opt/second"));
        store.prepend(target("/opt/third"));
        store.save().unwrap();

        let mut reloaded = PathStore::new(&state);
        reloaded.load().unwrap();
        assert_eq!(reloaded.directives(), store.directives());
    }

    #[test]
    fn test_load_absent_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let mut store = PathStore::new(temp.path().join(STATE_FILE_NAME));
        store.load().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_rewrites_whole_file() {
        let temp = TempDir::new().unwrap();
        let state = temp.path().join(STATE_FILE_NAME);

        let mut store = PathStore::new(&state);
        store.append(target("/opt/a"));
        store.append(target("/opt/b"));
        store.save().unwrap();

        store.remove(Path::new("/opt/a"));
        store.save().unwrap();

        let contents = fs::read_to_string(&state).unwrap();
        assert_eq!(contents, "append|/opt/b\n");
    }

    #[test]
    fn test_load_rejects_malformed_line() {
        let temp = TempDir::new().unwrap();
        let state = temp.path().join(STATE_FILE_NAME);
        fs::write(&state, "append|/opt/a\nnot a directive\n").unwrap();

        let mut store = PathStore::new(&state);
        let result = store.load();
        assert!(matches!(result, Err(Error::PathState { line: 2, .. })));
    }

    #[test]
    fn test_resolve_target_directory_verbatim() {
        let temp = TempDir::new().unwrap();
        let registry = Registry::default();
        let pyenv = Pyenv::new();

        let resolved =
            resolve_target(&registry, &pyenv, &temp.path().to_string_lossy()).unwrap();
        assert_eq!(resolved, temp.path());
    }

    #[test]
    fn test_resolve_target_unknown_name_fails() {
        let registry = Registry::default();
        let pyenv = Pyenv::new();

        let result = resolve_target(&registry, &pyenv, "no-such-environment");
        assert!(matches!(result, Err(Error::Resolution { .. })));
    }

    #[test]
    fn test_parse_line() {
        let directive = PathDirective::parse("prepend|/opt/lib").unwrap();
        assert_eq!(directive.mode, DirectiveMode::Prepend);
        assert_eq!(directive.target, target("/opt/lib"));

        assert!(PathDirective::parse("sideways|/opt/lib").is_none());
        assert!(PathDirective::parse("append|").is_none());
        assert!(PathDirective::parse("/opt/bare").is_none());
    }
}
