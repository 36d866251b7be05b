use crate::domain::model::{ArchivedRoundSummary, ItemId, ParticipantId, Submission, UpsertOutcome};
use crate::domain::ports::{HistoryArchive, SubmissionStore};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Archive held in process memory; lost on restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    rounds: Arc<Mutex<Vec<ArchivedRoundSummary>>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rounds.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rounds.lock().await.is_empty()
    }
}

#[async_trait]
impl HistoryArchive for MemoryArchive {
    async fn append_archived_round(&self, summary: &ArchivedRoundSummary) -> Result<()> {
        let mut rounds = self.rounds.lock().await;
        rounds.push(summary.clone());
        Ok(())
    }

    async fn list_archived_rounds(&self, since: NaiveDate) -> Result<Vec<ArchivedRoundSummary>> {
        let rounds = self.rounds.lock().await;
        Ok(rounds
            .iter()
            .filter(|r| r.session_date >= since)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

/// In-memory stand-in for an external submission table with a
/// `(item_id, participant_id)` uniqueness key.
#[derive(Debug, Clone, Default)]
pub struct MemorySubmissionStore {
    rows: Arc<Mutex<HashMap<ItemId, Vec<Submission>>>>,
}

impl MemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Shared upsert rule for the store adapters: replace in place, keep first-submission time.
pub(crate) fn upsert_row(rows: &mut Vec<Submission>, submission: &Submission) -> (Submission, UpsertOutcome) {
    match rows
        .iter_mut()
        .find(|s| s.participant_id == submission.participant_id)
    {
        Some(existing) => {
            existing.value = submission.value;
            existing.updated_at = submission.updated_at;
            (existing.clone(), UpsertOutcome::Replaced)
        }
        None => {
            rows.push(submission.clone());
            rows.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
            (submission.clone(), UpsertOutcome::Created)
        }
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn upsert_submission(
        &self,
        item_id: &ItemId,
        submission: &Submission,
    ) -> Result<(Submission, UpsertOutcome)> {
        let mut rows = self.rows.lock().await;
        Ok(upsert_row(rows.entry(*item_id).or_default(), submission))
    }

    async fn remove_submission(
        &self,
        item_id: &ItemId,
        participant_id: &ParticipantId,
    ) -> Result<Option<Submission>> {
        let mut rows = self.rows.lock().await;
        let Some(entries) = rows.get_mut(item_id) else {
            return Ok(None);
        };
        let position = entries.iter().position(|s| &s.participant_id == participant_id);
        Ok(position.map(|idx| entries.remove(idx)))
    }

    async fn list_submissions(&self, item_id: &ItemId) -> Result<Vec<Submission>> {
        let rows = self.rows.lock().await;
        Ok(rows.get(item_id).cloned().unwrap_or_default())
    }

    async fn clear_submissions(&self, item_id: &ItemId) -> Result<()> {
        let mut rows = self.rows.lock().await;
        rows.remove(item_id);
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Category, RoundId};
    use chrono::{Duration, Utc};

    fn summary(day: NaiveDate) -> ArchivedRoundSummary {
        ArchivedRoundSummary {
            round_id: RoundId(1),
            item_id: ItemId::new(),
            item_name: "Casa A".to_string(),
            category: Category::Casa,
            average: 0.0,
            submissions: vec![],
            closed_at: Utc::now(),
            session_date: day,
        }
    }

    #[tokio::test]
    async fn test_memory_archive_filters_by_date() {
        let archive = MemoryArchive::new();
        let today = Utc::now().date_naive();
        let yesterday = today - Duration::days(1);

        archive.append_archived_round(&summary(yesterday)).await.unwrap();
        archive.append_archived_round(&summary(today)).await.unwrap();

        assert_eq!(archive.len().await, 2);
        assert_eq!(archive.list_archived_rounds(today).await.unwrap().len(), 1);
        assert_eq!(archive.list_archived_rounds(yesterday).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_racing_upserts_converge_to_last_write() {
        let store = MemorySubmissionStore::new();
        let item = ItemId::new();
        let participant = ParticipantId::parse("p1").unwrap();
        let t0 = Utc::now();

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            let participant = participant.clone();
            handles.push(tokio::spawn(async move {
                let at = t0 + Duration::milliseconds(i);
                let submission = Submission {
                    participant_id: participant,
                    value: 100.0 + i as f64,
                    submitted_at: at,
                    updated_at: at,
                };
                store.upsert_submission(&item, &submission).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let rows = store.list_submissions(&item).await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
