use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::pathstore::DirectiveMode;

const DEFAULT_VERSION: &str = "3.8.2";

/// Strategy used to populate an environment's packages.
///
/// `Auto` is only a configuration value; it resolves to a concrete method by
/// inspecting marker files in the environment root before any install runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum InstallMethod {
    #[default]
    Auto,
    Pip,
    Poetry,
    MonoRepo,
    Requirements,
    External,
}

impl fmt::Display for InstallMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallMethod::Auto => write!(f, "auto"),
            InstallMethod::Pip => write!(f, "pip"),
            InstallMethod::Poetry => write!(f, "poetry"),
            InstallMethod::MonoRepo => write!(f, "mono-repo"),
            InstallMethod::Requirements => write!(f, "requirements"),
            InstallMethod::External => write!(f, "external"),
        }
    }
}

impl InstallMethod {
    /// Inspect marker files in `root` to pick a concrete install method.
    ///
    /// Priority: mono-repo marker > poetry lockfile > setup.py > requirements
    /// file. No marker at all is a detection error.
    pub fn detect(root: &Path) -> Result<InstallMethod> {
        if root.join("prod-internal-requirements.txt").exists() {
            Ok(InstallMethod::MonoRepo)
        } else if root.join("poetry.lock").exists() {
            Ok(InstallMethod::Poetry)
        } else if root.join("setup.py").exists() {
            Ok(InstallMethod::Pip)
        } else if root.join("requirements.txt").exists() {
            Ok(InstallMethod::Requirements)
        } else {
            Err(Error::Detection {
                root: root.to_path_buf(),
            })
        }
    }

    /// Resolve `Auto` against the environment root; concrete methods pass through.
    pub fn resolve(self, root: &Path) -> Result<InstallMethod> {
        match self {
            InstallMethod::Auto => Self::detect(root),
            other => Ok(other),
        }
    }
}

/// One search-path instruction as declared in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeclaredDirective {
    pub mode: DirectiveMode,
    /// Directory path or the name of another declared environment
    pub target: String,
}

/// Raw per-environment table as written in `config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEnvConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub install_method: Option<InstallMethod>,
    #[serde(default)]
    pub pythonpath: Vec<DeclaredDirective>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub export: Vec<String>,
}

/// Raw top-level config file shape.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    #[serde(default = "default_version")]
    pub default_version: String,
    #[serde(default)]
    pub default_install_method: InstallMethod,
    /// Extra variables injected into every install command
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    /// Directories scanned by `pythonpath infer` for sibling environments
    #[serde(default)]
    pub pythonpath_lookup_dirs: Vec<String>,
    /// Environment root path -> declaration, insertion order significant
    #[serde(default)]
    pub envs: IndexMap<String, RawEnvConfig>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            default_version: default_version(),
            default_install_method: InstallMethod::default(),
            env_vars: BTreeMap::new(),
            pythonpath_lookup_dirs: Vec::new(),
            envs: IndexMap::new(),
        }
    }
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

/// One declared development environment, normalized and with defaults applied.
///
/// Identity is the canonical absolute path of the root directory. Constructed
/// once per run from the parsed configuration and immutable afterwards; only
/// its effects (state files, registry entries, symlinks) are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub root: PathBuf,
    pub name: String,
    pub version: String,
    pub install_method: InstallMethod,
    pub pythonpath: Vec<DeclaredDirective>,
    pub requirements: Vec<String>,
    pub exports: Vec<String>,
}

/// Normalized view of the declarative configuration.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    envs: IndexMap<PathBuf, Environment>,
    env_vars: BTreeMap<String, String>,
    default_version: String,
    lookup_dirs: Vec<PathBuf>,
}

impl Registry {
    /// Normalize the raw configuration, keyed by canonical root path.
    ///
    /// Relative environment keys resolve against the current directory.
    pub fn load(raw: RawConfig) -> Result<Registry> {
        let cwd = env::current_dir()?;
        Self::load_in(raw, &cwd)
    }

    /// Same as [`Registry::load`] with an explicit base for relative keys.
    pub fn load_in(raw: RawConfig, base: &Path) -> Result<Registry> {
        let mut envs = IndexMap::new();

        for (key, conf) in raw.envs {
            let root = normalize_path(&key, base);
            let name = conf
                .name
                .unwrap_or_else(|| root_basename(&root).to_string());

            let environment = Environment {
                root: root.clone(),
                name,
                version: conf.version.unwrap_or_else(|| raw.default_version.clone()),
                install_method: conf.install_method.unwrap_or(raw.default_install_method),
                pythonpath: conf.pythonpath,
                requirements: conf.requirements,
                exports: conf.export,
            };

            if envs.insert(root.clone(), environment).is_some() {
                return Err(Error::configuration(format!(
                    "duplicate environment root {}",
                    root.display()
                )));
            }
        }

        Ok(Registry {
            envs,
            env_vars: raw.env_vars,
            default_version: raw.default_version,
            lookup_dirs: raw
                .pythonpath_lookup_dirs
                .iter()
                .map(|d| normalize_path(d, base))
                .collect(),
        })
    }

    /// Look up an environment by display name.
    pub fn find(&self, name: &str) -> Option<&Environment> {
        self.envs.values().find(|env| env.name == name)
    }

    /// Look up an environment by canonical root path.
    pub fn find_by_root(&self, root: &Path) -> Option<&Environment> {
        self.envs.get(root)
    }

    /// Iterate environments in declaration order.
    pub fn environments(&self) -> impl Iterator<Item = &Environment> {
        self.envs.values()
    }

    pub fn is_empty(&self) -> bool {
        self.envs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.envs.len()
    }

    pub fn env_vars(&self) -> &BTreeMap<String, String> {
        &self.env_vars
    }

    pub fn default_version(&self) -> &str {
        &self.default_version
    }

    pub fn lookup_dirs(&self) -> &[PathBuf] {
        &self.lookup_dirs
    }
}

/// Read and parse the config file; an absent file is an empty configuration.
pub fn load_config_file(path: &Path) -> Result<RawConfig> {
    if !path.exists() {
        return Ok(RawConfig::default());
    }

    let contents = fs::read_to_string(path)?;
    toml::from_str(&contents).map_err(|err| {
        Error::configuration(format!("failed to parse {}: {err}", path.display()))
    })
}

/// Expand `~`, resolve against `base`, and strip `.`/`..` segments lexically.
///
/// Purely lexical so declared roots do not have to exist at load time.
pub fn normalize_path(raw: &str, base: &Path) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    let path = Path::new(expanded.as_ref());
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn root_basename(root: &Path) -> &str {
    root.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
}
