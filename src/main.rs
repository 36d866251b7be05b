use clap::Parser;
use live_appraisal::core::daily_reset::spawn_daily_reset;
use live_appraisal::core::ConfigProvider;
use live_appraisal::server::{self, AppState};
use live_appraisal::utils::error::ErrorSeverity;
use live_appraisal::utils::{logger, validation::Validate};
use live_appraisal::{build_session, ServerConfig, TomlConfig};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = ServerConfig::parse();

    // 載入 TOML 配置 (若有指定)，命令列參數優先
    let file_config = match &cli.config {
        Some(path) => match TomlConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("❌ Failed to load config file '{}': {}", path, e);
                eprintln!("💡 Make sure the file exists and is valid TOML format");
                std::process::exit(1);
            }
        },
        None => TomlConfig::default(),
    };
    let config = file_config.with_overrides(&cli);

    // 初始化日誌
    if config.json_logs() {
        logger::init_json_logger(config.verbose());
    } else {
        logger::init_cli_logger(config.verbose());
    }

    tracing::info!("Starting live-appraisal {}", env!("CARGO_PKG_VERSION"));
    if config.verbose() {
        tracing::debug!("Effective config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }
    let addr: SocketAddr = config.bind_addr().parse()?;

    let boot = build_session(&config).await?;
    let state = AppState::new(boot.handle.clone(), boot.archive.clone());
    let engine_task = boot.engine.spawn();

    if config.daily_reset() {
        spawn_daily_reset(boot.handle.clone());
        tracing::info!("🌙 Daily counter resets at local midnight");
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("❌ Could not listen for shutdown signal: {}", e);
        }
        tracing::info!("Shutting down");
    };

    if let Err(e) = server::serve(addr, state, shutdown).await {
        tracing::error!(
            "❌ Server failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());

        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    // 排程任務仍持有 handle，engine 不會自行結束
    engine_task.abort();
    Ok(())
}
