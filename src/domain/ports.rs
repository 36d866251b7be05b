use crate::domain::model::{
    ArchivedRoundSummary, ItemId, ParticipantId, Submission, UpsertOutcome,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Durable, append-only record of closed rounds.
#[async_trait]
pub trait HistoryArchive: Send + Sync {
    async fn append_archived_round(&self, summary: &ArchivedRoundSummary) -> Result<()>;

    /// Rounds whose `session_date` is on or after `since`, oldest first.
    async fn list_archived_rounds(&self, since: NaiveDate) -> Result<Vec<ArchivedRoundSummary>>;

    async fn health_check(&self) -> Result<()>;

    /// Whether losing the process loses the data.
    fn is_persistent(&self) -> bool;
}

/// External backing for the submission ledger, keyed by `(item_id, participant_id)`.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Last write wins; `submitted_at` of an existing entry is kept.
    async fn upsert_submission(
        &self,
        item_id: &ItemId,
        submission: &Submission,
    ) -> Result<(Submission, UpsertOutcome)>;

    async fn remove_submission(
        &self,
        item_id: &ItemId,
        participant_id: &ParticipantId,
    ) -> Result<Option<Submission>>;

    /// Ordered by first submission time.
    async fn list_submissions(&self, item_id: &ItemId) -> Result<Vec<Submission>>;

    async fn clear_submissions(&self, item_id: &ItemId) -> Result<()>;

    async fn health_check(&self) -> Result<()>;

    fn is_persistent(&self) -> bool;
}

pub trait ConfigProvider: Send + Sync {
    fn bind_addr(&self) -> &str;
    fn ledger_backend(&self) -> LedgerBackend;
    fn archive_backend(&self) -> ArchiveBackend;
    fn archive_path(&self) -> Option<&str>;
    fn store_path(&self) -> Option<&str>;
    fn register_policy(&self) -> RegisterPolicy;
    fn daily_reset(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Memory,
    Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveBackend {
    Memory,
    Jsonl,
}

/// What `register_item` does with a round that is still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RegisterPolicy {
    /// Close and archive the open round first.
    #[default]
    Archive,
    /// Drop the open round's submissions without an archive record.
    Discard,
}
