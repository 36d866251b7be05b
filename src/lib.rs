pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod server;
pub mod utils;

pub use app::{build_session, Bootstrap};
pub use config::{toml_config::TomlConfig, ServerConfig};
pub use core::{SessionEngine, SessionHandle, SessionStateMachine};
pub use utils::error::{AppraisalError, Result};
