use crate::domain::model::{average_of, ItemId, ParticipantId, Submission, UpsertOutcome};
use crate::domain::ports::SubmissionStore;
use crate::utils::error::{AppraisalError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Estimates of the round that is currently open.
///
/// The session state machine is the only caller and only calls the mutating
/// methods while a round is open, so implementations do not check round state.
#[async_trait]
pub trait SubmissionLedger: Send + Sync {
    /// Starts a fresh, empty ledger scoped to `item_id`.
    async fn begin_round(&mut self, item_id: ItemId) -> Result<()>;

    async fn upsert(
        &mut self,
        participant_id: &ParticipantId,
        value: f64,
        at: DateTime<Utc>,
    ) -> Result<(Submission, UpsertOutcome)>;

    async fn remove(&mut self, participant_id: &ParticipantId) -> Result<Option<Submission>>;

    /// Copy of the entries, ordered by first submission time.
    async fn snapshot(&self) -> Result<Vec<Submission>>;

    async fn average(&self) -> Result<f64> {
        let submissions = self.snapshot().await?;
        Ok(average_of(&submissions))
    }

    async fn clear(&mut self) -> Result<()>;

    fn backend_name(&self) -> &'static str;
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    entries: Vec<Submission>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubmissionLedger for InMemoryLedger {
    async fn begin_round(&mut self, _item_id: ItemId) -> Result<()> {
        self.entries.clear();
        Ok(())
    }

    async fn upsert(
        &mut self,
        participant_id: &ParticipantId,
        value: f64,
        at: DateTime<Utc>,
    ) -> Result<(Submission, UpsertOutcome)> {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|s| &s.participant_id == participant_id)
        {
            existing.value = value;
            existing.updated_at = at;
            return Ok((existing.clone(), UpsertOutcome::Replaced));
        }

        let submission = Submission {
            participant_id: participant_id.clone(),
            value,
            submitted_at: at,
            updated_at: at,
        };
        self.entries.push(submission.clone());
        Ok((submission, UpsertOutcome::Created))
    }

    async fn remove(&mut self, participant_id: &ParticipantId) -> Result<Option<Submission>> {
        let position = self
            .entries
            .iter()
            .position(|s| &s.participant_id == participant_id);
        Ok(position.map(|idx| self.entries.remove(idx)))
    }

    async fn snapshot(&self) -> Result<Vec<Submission>> {
        Ok(self.entries.clone())
    }

    async fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Ledger whose entries live in an external [`SubmissionStore`].
pub struct StoreLedger<S: SubmissionStore> {
    store: S,
    item_id: Option<ItemId>,
}

impl<S: SubmissionStore> StoreLedger<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            item_id: None,
        }
    }
}

#[async_trait]
impl<S: SubmissionStore> SubmissionLedger for StoreLedger<S> {
    async fn begin_round(&mut self, item_id: ItemId) -> Result<()> {
        // 清除失敗時保留原本的範圍
        if let Some(previous) = self.item_id {
            self.store.clear_submissions(&previous).await?;
            self.item_id = None;
        }
        // 同一物件重新開啟時也要清掉舊的估價
        self.store.clear_submissions(&item_id).await?;
        self.item_id = Some(item_id);
        Ok(())
    }

    async fn upsert(
        &mut self,
        participant_id: &ParticipantId,
        value: f64,
        at: DateTime<Utc>,
    ) -> Result<(Submission, UpsertOutcome)> {
        let item_id = self.item_id.ok_or(AppraisalError::RoundNotOpen)?;
        let submission = Submission {
            participant_id: participant_id.clone(),
            value,
            submitted_at: at,
            updated_at: at,
        };
        self.store.upsert_submission(&item_id, &submission).await
    }

    async fn remove(&mut self, participant_id: &ParticipantId) -> Result<Option<Submission>> {
        match self.item_id {
            Some(item_id) => self.store.remove_submission(&item_id, participant_id).await,
            None => Ok(None),
        }
    }

    async fn snapshot(&self) -> Result<Vec<Submission>> {
        match self.item_id {
            Some(item_id) => self.store.list_submissions(&item_id).await,
            None => Ok(Vec::new()),
        }
    }

    async fn clear(&mut self) -> Result<()> {
        if let Some(item_id) = self.item_id {
            self.store.clear_submissions(&item_id).await?;
            self.item_id = None;
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "store"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemorySubmissionStore;
    use chrono::Duration;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Store whose `clear_submissions` can be switched into failing.
    #[derive(Clone, Default)]
    struct FailingClearStore {
        inner: MemorySubmissionStore,
        failing: Arc<AtomicBool>,
    }

    #[async_trait]
    impl SubmissionStore for FailingClearStore {
        async fn upsert_submission(
            &self,
            item_id: &ItemId,
            submission: &Submission,
        ) -> Result<(Submission, UpsertOutcome)> {
            self.inner.upsert_submission(item_id, submission).await
        }

        async fn remove_submission(
            &self,
            item_id: &ItemId,
            participant_id: &ParticipantId,
        ) -> Result<Option<Submission>> {
            self.inner.remove_submission(item_id, participant_id).await
        }

        async fn list_submissions(&self, item_id: &ItemId) -> Result<Vec<Submission>> {
            self.inner.list_submissions(item_id).await
        }

        async fn clear_submissions(&self, item_id: &ItemId) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(AppraisalError::storage_unavailable("store offline"));
            }
            self.inner.clear_submissions(item_id).await
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }

        fn is_persistent(&self) -> bool {
            true
        }
    }

    fn pid(name: &str) -> ParticipantId {
        ParticipantId::parse(name).unwrap()
    }

    async fn exercise_replace_by_identity(ledger: &mut dyn SubmissionLedger) {
        let t0 = Utc::now();
        ledger.begin_round(ItemId::new()).await.unwrap();

        let (_, first) = ledger.upsert(&pid("p1"), 100000.0, t0).await.unwrap();
        let (_, second) = ledger
            .upsert(&pid("p2"), 120000.0, t0 + Duration::seconds(1))
            .await
            .unwrap();
        let (updated, third) = ledger
            .upsert(&pid("p1"), 110000.0, t0 + Duration::seconds(2))
            .await
            .unwrap();

        assert_eq!(first, UpsertOutcome::Created);
        assert_eq!(second, UpsertOutcome::Created);
        assert_eq!(third, UpsertOutcome::Replaced);
        assert_eq!(updated.submitted_at, t0);
        assert_eq!(updated.updated_at, t0 + Duration::seconds(2));

        let snapshot = ledger.snapshot().await.unwrap();
        let pairs: Vec<(&str, f64)> = snapshot
            .iter()
            .map(|s| (s.participant_id.as_str(), s.value))
            .collect();
        assert_eq!(pairs, vec![("p1", 110000.0), ("p2", 120000.0)]);
        assert_eq!(ledger.average().await.unwrap(), 115000.0);
    }

    #[tokio::test]
    async fn test_in_memory_replace_by_identity() {
        let mut ledger = InMemoryLedger::new();
        exercise_replace_by_identity(&mut ledger).await;
    }

    #[tokio::test]
    async fn test_store_ledger_replace_by_identity() {
        let mut ledger = StoreLedger::new(MemorySubmissionStore::new());
        exercise_replace_by_identity(&mut ledger).await;
    }

    #[tokio::test]
    async fn test_remove_and_empty_average() {
        let mut ledger = InMemoryLedger::new();
        ledger.begin_round(ItemId::new()).await.unwrap();
        assert_eq!(ledger.average().await.unwrap(), 0.0);

        ledger.upsert(&pid("p1"), 10.0, Utc::now()).await.unwrap();
        let removed = ledger.remove(&pid("p1")).await.unwrap();
        assert_eq!(removed.map(|s| s.value), Some(10.0));
        assert!(ledger.remove(&pid("p1")).await.unwrap().is_none());
        assert!(ledger.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_ledger_begin_round_drops_previous_item() {
        let store = MemorySubmissionStore::new();
        let mut ledger = StoreLedger::new(store.clone());
        let first_item = ItemId::new();

        ledger.begin_round(first_item).await.unwrap();
        ledger.upsert(&pid("p1"), 10.0, Utc::now()).await.unwrap();
        ledger.begin_round(ItemId::new()).await.unwrap();

        assert!(store.list_submissions(&first_item).await.unwrap().is_empty());
        assert!(ledger.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_ledger_keeps_scope_when_clear_fails() {
        let store = FailingClearStore::default();
        let mut ledger = StoreLedger::new(store.clone());
        let item = ItemId::new();
        ledger.begin_round(item).await.unwrap();
        ledger.upsert(&pid("p1"), 10.0, Utc::now()).await.unwrap();

        store.failing.store(true, Ordering::SeqCst);
        assert_eq!(ledger.clear().await.unwrap_err().kind(), "StorageUnavailable");
        assert!(ledger.begin_round(ItemId::new()).await.is_err());

        // 仍綁定原物件，可繼續收估價
        let (_, outcome) = ledger.upsert(&pid("p2"), 20.0, Utc::now()).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);
        assert_eq!(ledger.snapshot().await.unwrap().len(), 2);

        store.failing.store(false, Ordering::SeqCst);
        ledger.clear().await.unwrap();
        assert!(store.list_submissions(&item).await.unwrap().is_empty());
        assert!(ledger.snapshot().await.unwrap().is_empty());
    }
}
