use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::registry::InstallMethod;
use crate::sync::SyncAction;

/// denv - Declarative development environment manager
///
/// denv keeps a registry of pyenv-backed Python environments
/// (`~/.config/denv/config.toml`) reconciled against the filesystem:
/// injected interpreter search paths, JetBrains interpreter registry
/// entries, and exported binaries on a shared lookup path.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile declared environments against the filesystem
    ///
    /// Runs install, search-path injection and export phases for every
    /// declared environment (or a single one with --directory). Failures
    /// are reported per environment and do not stop the run.
    Sync {
        /// Restrict the run to a single phase
        #[arg(value_name = "ACTION", default_value = "all")]
        action: SyncAction,

        /// Environment root directory (default: every declared environment)
        #[arg(short, long, value_name = "DIR")]
        directory: Option<String>,

        /// Export directory for binary symlinks
        #[arg(long, value_name = "DIR")]
        bin_dir: Option<PathBuf>,

        /// IDE product prefix to locate the interpreter registry
        #[arg(
            long,
            value_name = "PREFIX",
            default_value = "PyCharm",
            env = "DENV_IDE_PREFIX"
        )]
        ide_prefix: String,

        /// Skip IDE registry updates
        #[arg(long)]
        no_ide: bool,
    },

    /// Provision one environment (virtualenv, packages, IDE entry)
    Setup {
        /// Interpreter version (default: whatever `python --version` reports)
        #[arg(value_name = "VERSION")]
        version: Option<String>,

        /// Environment root directory (default: current directory)
        #[arg(short, long, value_name = "DIR")]
        directory: Option<String>,

        /// How to install the environment's packages
        #[arg(long, value_name = "METHOD", default_value = "auto")]
        install_method: InstallMethod,

        /// Skip IDE registry updates
        #[arg(long)]
        no_ide: bool,

        /// IDE product prefix to locate the interpreter registry
        #[arg(
            long,
            value_name = "PREFIX",
            default_value = "PyCharm",
            env = "DENV_IDE_PREFIX"
        )]
        ide_prefix: String,
    },

    /// Manage injected search-path directives for an environment
    Pythonpath {
        #[arg(value_name = "ACTION")]
        action: PathAction,

        /// Directories or environment names to operate on
        #[arg(value_name = "TARGET")]
        targets: Vec<String>,

        /// Source environment name (default: the current directory's)
        #[arg(short, long, value_name = "ENV")]
        env: Option<String>,

        /// With `show`: print the effective search-path extras in replay order
        #[arg(long)]
        effective: bool,
    },

    /// Export an environment binary onto the shared lookup path
    Export {
        /// Environment name
        #[arg(value_name = "ENV")]
        env: String,

        /// Binary name inside the environment's bin directory
        #[arg(value_name = "BIN")]
        bin_name: String,

        /// Export directory for binary symlinks
        #[arg(long, value_name = "DIR")]
        bin_dir: Option<PathBuf>,
    },

    /// Remove an environment's derived state
    ///
    /// Deletes the .idea directory, the interpreter pin file, the
    /// virtualenv and the IDE registry entry.
    Teardown {
        /// Environment root directory (default: current directory)
        #[arg(value_name = "DIR")]
        directory: Option<String>,

        /// Interpreter version of the registry entry (default: recovered
        /// from .idea/misc.xml or the virtualenv list)
        #[arg(long, value_name = "VERSION")]
        version: Option<String>,

        /// IDE product prefix to locate the interpreter registry
        #[arg(
            long,
            value_name = "PREFIX",
            default_value = "PyCharm",
            env = "DENV_IDE_PREFIX"
        )]
        ide_prefix: String,
    },

    /// Emit loader actions for a site directory (used by the loader shim)
    #[command(name = "site-load", hide = true)]
    SiteLoad {
        /// Site-packages directory holding the state file
        #[arg(long, value_name = "DIR")]
        site_dir: PathBuf,
    },
}

/// Operations on an environment's directive sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PathAction {
    /// Add targets at the tail of the search path
    Append,
    /// Add targets at the head of the search path
    Prepend,
    /// Remove targets, whatever their stored mode
    Remove,
    /// Empty the directive sequence
    Clear,
    /// Print the stored directives
    Show,
    /// Derive directives from installed sibling packages
    Infer,
}
