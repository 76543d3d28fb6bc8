// Public API
pub mod cli;
pub mod commands;

// Core domain types
mod error;
mod export;
mod ide;
mod pathstore;
mod pyenv;
mod registry;
mod setup;
mod siteload;
mod sync;
mod ui;
mod util;

// Re-export main types
pub use error::{Error, Result};
pub use export::{export_binary, ExportStatus};
pub use ide::{IdeRegistry, RegistryDocument};
pub use pathstore::{DirectiveMode, PathDirective, PathStore};
pub use pyenv::{EnvHandle, Pyenv};
pub use registry::{Environment, InstallMethod, RawConfig, Registry};
pub use setup::{Setup, SetupOptions};
pub use siteload::{LoadedEntry, LoaderConfig};
pub use sync::{SyncAction, SyncReport, SyncRunner};
