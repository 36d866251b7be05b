use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppraisalError {
    #[error("No item is registered")]
    NoActiveItem,

    #[error("No round is open")]
    NoOpenRound,

    #[error("Round is not accepting submissions")]
    RoundNotOpen,

    #[error("Invalid estimate value: {value}")]
    InvalidValue { value: String },

    #[error("Invalid item: {reason}")]
    InvalidItem { reason: String },

    #[error("Invalid participant identity: {reason}")]
    InvalidParticipant { reason: String },

    #[error("Archive write failed: {message}")]
    ArchiveWriteFailed { message: String },

    #[error("Storage unavailable: {message}")]
    StorageUnavailable { message: String },

    #[error("Malformed command: {message}")]
    MalformedCommand { message: String },

    #[error("Session engine is not running")]
    EngineStopped,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// 命令被拒絕，狀態未改變
    Validation,
    Storage,
    Protocol,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AppraisalError {
    /// Stable identifier sent to clients in `error` events.
    pub fn kind(&self) -> &'static str {
        match self {
            AppraisalError::NoActiveItem => "NoActiveItem",
            AppraisalError::NoOpenRound => "NoOpenRound",
            AppraisalError::RoundNotOpen => "RoundNotOpen",
            AppraisalError::InvalidValue { .. } => "InvalidValue",
            AppraisalError::InvalidItem { .. } => "InvalidItem",
            AppraisalError::InvalidParticipant { .. } => "InvalidParticipant",
            AppraisalError::ArchiveWriteFailed { .. } => "ArchiveWriteFailed",
            AppraisalError::StorageUnavailable { .. } => "StorageUnavailable",
            AppraisalError::MalformedCommand { .. } => "MalformedCommand",
            AppraisalError::EngineStopped => "EngineStopped",
            AppraisalError::IoError(_) => "IoError",
            AppraisalError::SerializationError(_) => "SerializationError",
            AppraisalError::ConfigError { .. }
            | AppraisalError::InvalidConfigValueError { .. }
            | AppraisalError::ConfigValidationError { .. } => "ConfigError",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            AppraisalError::NoActiveItem
            | AppraisalError::NoOpenRound
            | AppraisalError::RoundNotOpen
            | AppraisalError::InvalidValue { .. }
            | AppraisalError::InvalidItem { .. }
            | AppraisalError::InvalidParticipant { .. } => ErrorCategory::Validation,
            AppraisalError::ArchiveWriteFailed { .. } | AppraisalError::StorageUnavailable { .. } => {
                ErrorCategory::Storage
            }
            AppraisalError::MalformedCommand { .. } | AppraisalError::SerializationError(_) => {
                ErrorCategory::Protocol
            }
            AppraisalError::ConfigError { .. }
            | AppraisalError::InvalidConfigValueError { .. }
            | AppraisalError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            AppraisalError::IoError(_) | AppraisalError::EngineStopped => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Validation | ErrorCategory::Protocol => ErrorSeverity::Low,
            ErrorCategory::Storage => match self {
                AppraisalError::ArchiveWriteFailed { .. } => ErrorSeverity::Medium,
                _ => ErrorSeverity::Critical,
            },
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            AppraisalError::NoActiveItem => "Register an item before opening a round",
            AppraisalError::NoOpenRound => "Open a round before trying to close it",
            AppraisalError::RoundNotOpen => "Wait for the moderator to open a round",
            AppraisalError::InvalidValue { .. } => "Submit a positive number",
            AppraisalError::InvalidItem { .. } => {
                "Provide a non-empty name and one of the supported categories"
            }
            AppraisalError::InvalidParticipant { .. } => "Identify with a non-empty name",
            AppraisalError::ArchiveWriteFailed { .. } => {
                "The round is still open; check the archive storage and close it again"
            }
            AppraisalError::StorageUnavailable { .. } => {
                "Check the storage paths and permissions, then restart the server"
            }
            AppraisalError::MalformedCommand { .. } | AppraisalError::SerializationError(_) => {
                "Send a JSON object with a known \"type\" field"
            }
            AppraisalError::IoError(_) => "Check file system permissions and free space",
            AppraisalError::EngineStopped => "Restart the server",
            AppraisalError::ConfigError { .. }
            | AppraisalError::InvalidConfigValueError { .. }
            | AppraisalError::ConfigValidationError { .. } => {
                "Review the configuration file and command line flags"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Validation => self.to_string(),
            ErrorCategory::Storage => format!("Storage problem: {}", self),
            ErrorCategory::Protocol => format!("Could not understand the request: {}", self),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::System => format!("Unexpected system error: {}", self),
        }
    }

    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        AppraisalError::StorageUnavailable {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppraisalError>;
