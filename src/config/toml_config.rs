use crate::config::{validate_provider, ServerConfig, DEFAULT_ARCHIVE_PATH, DEFAULT_BIND, DEFAULT_STORE_PATH};
use crate::core::ConfigProvider;
use crate::domain::ports::{ArchiveBackend, LedgerBackend, RegisterPolicy};
use crate::utils::error::{AppraisalError, Result};
use crate::utils::validation::Validate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSection {
    pub bind: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSection {
    pub register_policy: Option<RegisterPolicy>,
    pub daily_reset: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSection {
    pub ledger: Option<LedgerBackend>,
    pub archive: Option<ArchiveBackend>,
    pub archive_path: Option<String>,
    pub store_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    pub verbose: Option<bool>,
    pub json: Option<bool>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(AppraisalError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| AppraisalError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${ARCHIVE_PATH})，未設定的保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| AppraisalError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// Command line flags win over file values.
    pub fn with_overrides(mut self, cli: &ServerConfig) -> Self {
        if cli.bind.is_some() {
            self.server.bind = cli.bind.clone();
        }
        if cli.register_policy.is_some() {
            self.session.register_policy = cli.register_policy;
        }
        if cli.no_daily_reset {
            self.session.daily_reset = Some(false);
        }
        if cli.ledger.is_some() {
            self.storage.ledger = cli.ledger;
        }
        if cli.archive.is_some() {
            self.storage.archive = cli.archive;
        }
        if cli.archive_path.is_some() {
            self.storage.archive_path = cli.archive_path.clone();
        }
        if cli.store_path.is_some() {
            self.storage.store_path = cli.store_path.clone();
        }
        if cli.verbose {
            self.logging.verbose = Some(true);
        }
        if cli.json_logs {
            self.logging.json = Some(true);
        }
        self
    }

    pub fn verbose(&self) -> bool {
        self.logging.verbose.unwrap_or(false)
    }

    pub fn json_logs(&self) -> bool {
        self.logging.json.unwrap_or(false)
    }
}

impl ConfigProvider for TomlConfig {
    fn bind_addr(&self) -> &str {
        self.server.bind.as_deref().unwrap_or(DEFAULT_BIND)
    }

    fn ledger_backend(&self) -> LedgerBackend {
        self.storage.ledger.unwrap_or(LedgerBackend::Memory)
    }

    fn archive_backend(&self) -> ArchiveBackend {
        self.storage.archive.unwrap_or(ArchiveBackend::Jsonl)
    }

    fn archive_path(&self) -> Option<&str> {
        match self.archive_backend() {
            ArchiveBackend::Memory => None,
            ArchiveBackend::Jsonl => Some(
                self.storage
                    .archive_path
                    .as_deref()
                    .unwrap_or(DEFAULT_ARCHIVE_PATH),
            ),
        }
    }

    fn store_path(&self) -> Option<&str> {
        match self.ledger_backend() {
            LedgerBackend::Memory => None,
            LedgerBackend::Store => Some(self.storage.store_path.as_deref().unwrap_or(DEFAULT_STORE_PATH)),
        }
    }

    fn register_policy(&self) -> RegisterPolicy {
        self.session.register_policy.unwrap_or_default()
    }

    fn daily_reset(&self) -> bool {
        self.session.daily_reset.unwrap_or(true)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        validate_provider(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_toml_config() {
        let toml_content = r#"
[server]
bind = "0.0.0.0:4000"

[session]
register_policy = "discard"
daily_reset = false

[storage]
ledger = "store"
archive = "jsonl"
archive_path = "/srv/appraisal/archive.jsonl"
store_path = "/srv/appraisal/submissions"

[logging]
json = true
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.bind_addr(), "0.0.0.0:4000");
        assert_eq!(config.register_policy(), RegisterPolicy::Discard);
        assert!(!config.daily_reset());
        assert_eq!(config.ledger_backend(), LedgerBackend::Store);
        assert_eq!(config.store_path(), Some("/srv/appraisal/submissions"));
        assert_eq!(config.archive_path(), Some("/srv/appraisal/archive.jsonl"));
        assert!(config.json_logs());
        assert!(!config.verbose());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.bind_addr(), DEFAULT_BIND);
        assert_eq!(config.archive_backend(), ArchiveBackend::Jsonl);
        assert_eq!(config.store_path(), None);
        assert!(config.daily_reset());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("LIVE_APPRAISAL_TEST_ARCHIVE", "/tmp/appraisal-archive.jsonl");

        let toml_content = r#"
[storage]
archive_path = "${LIVE_APPRAISAL_TEST_ARCHIVE}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.archive_path(), Some("/tmp/appraisal-archive.jsonl"));

        std::env::remove_var("LIVE_APPRAISAL_TEST_ARCHIVE");
    }

    #[test]
    fn test_cli_overrides_file() {
        let config = TomlConfig::from_toml_str(
            r#"
[server]
bind = "0.0.0.0:4000"

[storage]
ledger = "store"
"#,
        )
        .unwrap();
        let cli = ServerConfig::parse_from(["live-appraisal", "--bind", "127.0.0.1:5000", "--verbose"]);

        let merged = config.with_overrides(&cli);
        assert_eq!(merged.bind_addr(), "127.0.0.1:5000");
        assert_eq!(merged.ledger_backend(), LedgerBackend::Store);
        assert!(merged.verbose());
    }

    #[test]
    fn test_config_validation() {
        let config = TomlConfig::from_toml_str(
            r#"
[server]
bind = "nowhere"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config = TomlConfig::from_toml_str(
            r#"
[storage]
archive_path = ""
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_backend_is_a_parse_error() {
        let err = TomlConfig::from_toml_str(
            r#"
[storage]
ledger = "postgres"
"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[server]\nbind = \"127.0.0.1:7000\"\n")
            .unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:7000");
    }
}
