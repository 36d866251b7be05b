pub mod toml_config;

use crate::core::ConfigProvider;
use crate::domain::ports::{ArchiveBackend, LedgerBackend, RegisterPolicy};
use crate::utils::error::Result;
use crate::utils::validation::{validate_path, validate_socket_addr, Validate};
use clap::Parser;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BIND: &str = "127.0.0.1:3001";
pub const DEFAULT_ARCHIVE_PATH: &str = "./data/archive.jsonl";
pub const DEFAULT_STORE_PATH: &str = "./data/submissions";

/// Command line flags. Unset options fall back to the config file, then to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Parser)]
#[command(name = "live-appraisal")]
#[command(about = "Live group appraisal session server")]
pub struct ServerConfig {
    #[arg(long, help = "TOML configuration file")]
    pub config: Option<String>,

    #[arg(long, help = "Address to listen on [default: 127.0.0.1:3001]")]
    pub bind: Option<String>,

    #[arg(long, value_enum, help = "Submission ledger backend [default: memory]")]
    pub ledger: Option<LedgerBackend>,

    #[arg(long, value_enum, help = "History archive backend [default: jsonl]")]
    pub archive: Option<ArchiveBackend>,

    #[arg(long)]
    pub archive_path: Option<String>,

    #[arg(long)]
    pub store_path: Option<String>,

    #[arg(long, value_enum, help = "What registering an item does to an open round [default: archive]")]
    pub register_policy: Option<RegisterPolicy>,

    #[arg(long, help = "Disable the midnight counter reset")]
    pub no_daily_reset: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit JSON log lines")]
    pub json_logs: bool,
}

impl ConfigProvider for ServerConfig {
    fn bind_addr(&self) -> &str {
        self.bind.as_deref().unwrap_or(DEFAULT_BIND)
    }

    fn ledger_backend(&self) -> LedgerBackend {
        self.ledger.unwrap_or(LedgerBackend::Memory)
    }

    fn archive_backend(&self) -> ArchiveBackend {
        self.archive.unwrap_or(ArchiveBackend::Jsonl)
    }

    fn archive_path(&self) -> Option<&str> {
        match self.archive_backend() {
            ArchiveBackend::Memory => None,
            ArchiveBackend::Jsonl => Some(self.archive_path.as_deref().unwrap_or(DEFAULT_ARCHIVE_PATH)),
        }
    }

    fn store_path(&self) -> Option<&str> {
        match self.ledger_backend() {
            LedgerBackend::Memory => None,
            LedgerBackend::Store => Some(self.store_path.as_deref().unwrap_or(DEFAULT_STORE_PATH)),
        }
    }

    fn register_policy(&self) -> RegisterPolicy {
        self.register_policy.unwrap_or_default()
    }

    fn daily_reset(&self) -> bool {
        !self.no_daily_reset
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> Result<()> {
        validate_provider(self)
    }
}

/// Checks shared by every [`ConfigProvider`].
pub fn validate_provider(config: &dyn ConfigProvider) -> Result<()> {
    validate_socket_addr("server.bind", config.bind_addr())?;
    if let Some(path) = config.archive_path() {
        validate_path("storage.archive_path", path)?;
    }
    if let Some(path) = config.store_path() {
        validate_path("storage.store_path", path)?;
    }
    Ok(())
}
