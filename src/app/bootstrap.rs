use crate::adapters::{FileSubmissionStore, JsonlArchive, MemoryArchive, MemorySubmissionStore};
use crate::core::ledger::{InMemoryLedger, StoreLedger, SubmissionLedger};
use crate::core::{ConfigProvider, HistoryArchive, SessionEngine, SessionHandle, SessionStateMachine, SubmissionStore};
use crate::domain::ports::{ArchiveBackend, LedgerBackend};
use crate::utils::error::Result;
use chrono::Local;
use std::sync::Arc;

/// A wired-up engine ready to be spawned.
pub struct Bootstrap {
    pub engine: SessionEngine,
    pub handle: SessionHandle,
    pub archive: Arc<dyn HistoryArchive>,
}

/// Builds the session from config: picks the backends, health-checks the
/// persistent ones and restores today's rounds. A failed check does not abort startup;
/// the engine comes up refusing mutating commands instead.
pub async fn build_session(config: &dyn ConfigProvider) -> Result<Bootstrap> {
    let mut problems: Vec<String> = Vec::new();

    let archive: Arc<dyn HistoryArchive> = match (config.archive_backend(), config.archive_path()) {
        (ArchiveBackend::Jsonl, Some(path)) => {
            tracing::info!("📚 History archive: {}", path);
            Arc::new(JsonlArchive::new(path))
        }
        _ => {
            tracing::warn!("⚠️ History archive kept in memory, closed rounds are lost on restart");
            Arc::new(MemoryArchive::new())
        }
    };
    if archive.is_persistent() {
        if let Err(e) = archive.health_check().await {
            problems.push(format!("history archive: {}", e));
        }
    }

    let ledger: Box<dyn SubmissionLedger> = match (config.ledger_backend(), config.store_path()) {
        (LedgerBackend::Store, Some(path)) => {
            tracing::info!("🗂️ Submission store: {}", path);
            let store = FileSubmissionStore::new(path);
            if let Err(e) = store.health_check().await {
                problems.push(format!("submission store: {}", e));
            }
            Box::new(StoreLedger::new(store))
        }
        (LedgerBackend::Store, None) => Box::new(StoreLedger::new(MemorySubmissionStore::new())),
        (LedgerBackend::Memory, _) => Box::new(InMemoryLedger::new()),
    };

    let mut session = SessionStateMachine::new(ledger, archive.clone(), config.register_policy());
    if problems.is_empty() {
        match session.restore(Local::now().date_naive()).await {
            Ok(0) => {}
            Ok(count) => tracing::info!("♻️ Restored {} round(s) archived today", count),
            Err(e) => problems.push(format!("restoring today's history: {}", e)),
        }
    }

    let (mut engine, handle) = SessionEngine::new(session);
    if !problems.is_empty() {
        engine.refuse_mutations(problems.join("; "));
    }

    Ok(Bootstrap {
        engine,
        handle,
        archive,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use clap::Parser;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_backends_accept_commands() {
        let config = ServerConfig::parse_from(["live-appraisal", "--archive", "memory"]);
        let boot = build_session(&config).await.unwrap();
        assert!(boot.engine.is_accepting());
        assert!(!boot.archive.is_persistent());
    }

    #[tokio::test]
    async fn test_file_backends_restore_today() {
        let dir = TempDir::new().unwrap();
        let archive_path = dir.path().join("archive.jsonl");
        let store_path = dir.path().join("submissions");
        let args = [
            "live-appraisal",
            "--ledger",
            "store",
            "--archive-path",
            archive_path.to_str().unwrap(),
            "--store-path",
            store_path.to_str().unwrap(),
        ];

        let config = ServerConfig::parse_from(args);
        let boot = build_session(&config).await.unwrap();
        assert!(boot.engine.is_accepting());
        boot.engine.spawn();
        assert_eq!(boot.handle.snapshot().await.unwrap().daily_counter, 0);
    }

    #[tokio::test]
    async fn test_unwritable_archive_refuses_mutations() {
        let dir = TempDir::new().unwrap();
        // 以目錄當作檔案路徑，無法開啟寫入
        let config = ServerConfig::parse_from([
            "live-appraisal",
            "--archive-path",
            dir.path().to_str().unwrap(),
        ]);
        let boot = build_session(&config).await.unwrap();
        assert!(!boot.engine.is_accepting());
    }
}
