use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::pathstore::{DirectiveMode, PathDirective, STATE_FILE_NAME};

/// Opt-out switch inspected once at interpreter start.
pub const OPT_OUT_ENV: &str = "DENV_IGNORE_EXTERNAL_SITE_PACKAGES";

/// Auto-imported shim written into site-packages next to the state file.
const SHIM_FILE_NAME: &str = "sitecustomize.py";
const SHIM_TEMPLATE: &str = include_str!("../templates/sitecustomize.py");

/// Install the loader shim into a site-packages directory when absent.
///
/// Returns whether the shim was written.
pub fn ensure_shim_installed(site_dir: &Path) -> Result<bool> {
    let shim_path = site_dir.join(SHIM_FILE_NAME);
    if shim_path.exists() {
        return Ok(false);
    }
    fs::write(&shim_path, SHIM_TEMPLATE)?;
    Ok(true)
}

/// Loader configuration, computed once at process start and passed down
/// explicitly instead of re-reading the environment at arbitrary points.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoaderConfig {
    pub disabled: bool,
}

impl LoaderConfig {
    pub fn from_env() -> Self {
        let disabled = std::env::var(OPT_OUT_ENV)
            .map(|value| !value.is_empty())
            .unwrap_or(false);
        Self { disabled }
    }
}

/// One resolved loader action, in replay order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedEntry {
    /// Place a directory on the search path
    Dir { mode: DirectiveMode, path: PathBuf },
    /// An executable line found in an indirection file, run by the host shim
    Statement(String),
}

/// Read the state file next to the loader and expand it into replay entries.
///
/// Directives are kept in file order. Each directive's target directory is
/// emitted first, then scanned for `*.pth` indirection files (sorted by
/// name) whose listed directories are emitted with the same mode. A broken
/// entry never stops interpreter startup: state-file lines that fail to
/// parse are skipped with a diagnostic, and an unreadable indirection line
/// abandons that one file while remaining directives still load.
pub fn load_entries(site_dir: &Path) -> Vec<LoadedEntry> {
    let state_path = site_dir.join(STATE_FILE_NAME);
    let contents = match fs::read_to_string(&state_path) {
        Ok(contents) => contents,
        Err(_) => return Vec::new(),
    };

    let mut entries = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match PathDirective::parse(line) {
            Some(directive) => {
                add_site_dir(directive.mode, directive.target, &mut seen, &mut entries);
            }
            None => {
                eprintln!(
                    "denv: skipping malformed directive at {}:{}: {:?}",
                    state_path.display(),
                    idx + 1,
                    line
                );
            }
        }
    }

    entries
}

fn add_site_dir(
    mode: DirectiveMode,
    dir: PathBuf,
    seen: &mut HashSet<PathBuf>,
    entries: &mut Vec<LoadedEntry>,
) {
    if seen.insert(dir.clone()) {
        entries.push(LoadedEntry::Dir {
            mode,
            path: dir.clone(),
        });
    }

    let mut names: Vec<String> = match fs::read_dir(&dir) {
        Ok(iter) => iter
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(".pth"))
            .collect(),
        Err(_) => return,
    };
    names.sort();

    for name in names {
        add_indirection_file(&dir, &name, mode, seen, entries);
    }
}

fn add_indirection_file(
    site_dir: &Path,
    name: &str,
    mode: DirectiveMode,
    seen: &mut HashSet<PathBuf>,
    entries: &mut Vec<LoadedEntry>,
) {
    let full_path = site_dir.join(name);
    let bytes = match fs::read(&full_path) {
        Ok(bytes) => bytes,
        Err(_) => return,
    };

    for (n, raw_line) in bytes.split(|b| *b == b'\n').enumerate() {
        let line = match std::str::from_utf8(raw_line) {
            Ok(line) => line,
            Err(_) => {
                eprintln!(
                    "Error processing line {} of {}:\n  invalid UTF-8\nRemainder of file ignored",
                    n + 1,
                    full_path.display()
                );
                return;
            }
        };

        if line.starts_with('#') {
            continue;
        }
        if line.starts_with("import ") || line.starts_with("import\t") {
            entries.push(LoadedEntry::Statement(line.trim_end().to_string()));
            continue;
        }

        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }

        let directory = site_dir.join(trimmed);
        if directory.exists() && seen.insert(directory.clone()) {
            entries.push(LoadedEntry::Dir {
                mode,
                path: directory,
            });
        }
    }
}

/// Replay entries onto a base search path.
///
/// Appends land at the tail in insertion order; each prepend pushes in front
/// of the previous one, so prepends end up at the head in reverse insertion
/// order. Name collisions are won by whichever directory sorts earlier here,
/// which is why replay must happen in original file order.
pub fn replay(entries: &[LoadedEntry], base: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut path = base;
    for entry in entries {
        if let LoadedEntry::Dir { mode, path: dir } = entry {
            match mode {
                DirectiveMode::Prepend => path.insert(0, dir.clone()),
                DirectiveMode::Append => path.push(dir.clone()),
            }
        }
    }
    path
}

/// Wire format consumed by the sitecustomize shim: one action per line,
/// `append|<dir>`, `prepend|<dir>` or `import|<statement>`.
pub fn emit(entries: &[LoadedEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        match entry {
            LoadedEntry::Dir { mode, path } => {
                out.push_str(&format!("{}|{}\n", mode, path.display()));
            }
            LoadedEntry::Statement(statement) => {
                out.push_str(&format!("import|{}\n", statement));
            }
        }
    }
    out
}
