use crate::core::ledger::SubmissionLedger;
use crate::domain::model::{
    validate_estimate, average_of, ArchivedRoundSummary, Category, Item, ParticipantId, RoundId,
    RoundResult, SessionSnapshot, Submission, UpsertOutcome,
};
use crate::domain::ports::{HistoryArchive, RegisterPolicy};
use crate::utils::error::{AppraisalError, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    ItemSet {
        item: Item,
    },
    RoundOpen {
        item: Item,
        round_id: RoundId,
        opened_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ItemSet,
    RoundOpen,
}

#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    pub item: Item,
    /// Round that was archived because it was still open.
    pub closed: Option<RoundResult>,
    /// Number of submissions dropped under [`RegisterPolicy::Discard`].
    pub discarded: usize,
}

/// Result of `open_round`. When a round was already open, `closed` holds its
/// archived result even if starting the new round then failed.
#[derive(Debug)]
pub struct OpenOutcome {
    pub item: Item,
    pub closed: Option<RoundResult>,
    pub round: Result<RoundId>,
}

/// The single global appraisal session.
///
/// Owns the active item, the round-open flag, the daily counter and the
/// ledger of the open round. Every method either commits a complete
/// transition or returns an error with the state untouched. The one split
/// transition is re-opening: the archived close is kept and reported in
/// [`OpenOutcome`] even if the new round cannot start.
pub struct SessionStateMachine {
    state: SessionState,
    ledger: Box<dyn SubmissionLedger>,
    archive: Arc<dyn HistoryArchive>,
    register_policy: RegisterPolicy,
    daily_counter: u32,
    history: Vec<ArchivedRoundSummary>,
    next_round: u64,
}

impl SessionStateMachine {
    pub fn new(
        ledger: Box<dyn SubmissionLedger>,
        archive: Arc<dyn HistoryArchive>,
        register_policy: RegisterPolicy,
    ) -> Self {
        Self {
            state: SessionState::Idle,
            ledger,
            archive,
            register_policy,
            daily_counter: 0,
            history: Vec::new(),
            next_round: 1,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            SessionState::Idle => Phase::Idle,
            SessionState::ItemSet { .. } => Phase::ItemSet,
            SessionState::RoundOpen { .. } => Phase::RoundOpen,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn active_item(&self) -> Option<&Item> {
        match &self.state {
            SessionState::Idle => None,
            SessionState::ItemSet { item } | SessionState::RoundOpen { item, .. } => Some(item),
        }
    }

    pub fn current_round(&self) -> Option<RoundId> {
        match self.state {
            SessionState::RoundOpen { round_id, .. } => Some(round_id),
            _ => None,
        }
    }

    pub fn daily_counter(&self) -> u32 {
        self.daily_counter
    }

    pub fn history(&self) -> &[ArchivedRoundSummary] {
        &self.history
    }

    pub fn ledger_backend(&self) -> &'static str {
        self.ledger.backend_name()
    }

    /// Loads the rounds already archived on `today` so the counter survives a restart.
    /// Round ids continue after the highest id in the whole archive.
    pub async fn restore(&mut self, today: NaiveDate) -> Result<usize> {
        let all_rounds = self.archive.list_archived_rounds(NaiveDate::MIN).await?;
        if let Some(max_round) = all_rounds.iter().map(|r| r.round_id.0).max() {
            self.next_round = self.next_round.max(max_round + 1);
        }
        let rounds: Vec<ArchivedRoundSummary> = all_rounds
            .into_iter()
            .filter(|r| r.session_date >= today)
            .collect();
        self.daily_counter = rounds.len() as u32;
        self.history = rounds;
        Ok(self.history.len())
    }

    pub async fn register_item(&mut self, name: &str, category: &str) -> Result<RegisterOutcome> {
        let category: Category = category.parse()?;
        let item = Item::new(name, category)?;

        let mut closed = None;
        let mut discarded = 0;
        if self.phase() == Phase::RoundOpen {
            match self.register_policy {
                RegisterPolicy::Archive => {
                    closed = Some(self.finish_round().await?);
                }
                RegisterPolicy::Discard => {
                    let dropped = self.ledger.snapshot().await.map_err(ledger_failure)?;
                    self.ledger.clear().await.map_err(ledger_failure)?;
                    discarded = dropped.len();
                    tracing::warn!(
                        "⚠️ Discarded {} unarchived submission(s) while registering a new item",
                        discarded
                    );
                }
            }
        }

        tracing::info!("🏠 Item registered: {} ({})", item.name, item.category);
        self.state = SessionState::ItemSet { item: item.clone() };
        Ok(RegisterOutcome {
            item,
            closed,
            discarded,
        })
    }

    pub async fn open_round(&mut self) -> Result<OpenOutcome> {
        let (item, closed) = match &self.state {
            SessionState::Idle => return Err(AppraisalError::NoActiveItem),
            SessionState::ItemSet { item } => (item.clone(), None),
            SessionState::RoundOpen { item, .. } => {
                let item = item.clone();
                tracing::info!("🔁 Round already open for {}, closing it first", item.name);
                let closed = self.finish_round().await?;
                (item, Some(closed))
            }
        };

        if let Err(e) = self.ledger.begin_round(item.id).await {
            let err = ledger_failure(e);
            if closed.is_none() {
                return Err(err);
            }
            // 前一輪已歸檔，退回 ItemSet 讓主持人可以重試
            tracing::error!("❌ Prior round archived but the new round could not start: {}", err);
            self.state = SessionState::ItemSet { item: item.clone() };
            return Ok(OpenOutcome {
                item,
                closed,
                round: Err(err),
            });
        }

        let round_id = RoundId(self.next_round);
        self.next_round += 1;
        self.state = SessionState::RoundOpen {
            item: item.clone(),
            round_id,
            opened_at: Utc::now(),
        };
        tracing::info!("🟢 Round {} opened for {}", round_id.0, item.name);

        Ok(OpenOutcome {
            item,
            closed,
            round: Ok(round_id),
        })
    }

    pub async fn close_round(&mut self) -> Result<RoundResult> {
        if self.phase() != Phase::RoundOpen {
            return Err(AppraisalError::NoOpenRound);
        }
        let result = self.finish_round().await?;
        self.state = SessionState::Idle;
        Ok(result)
    }

    pub async fn submit(&mut self, participant: &str, value: f64) -> Result<(Submission, UpsertOutcome)> {
        if self.phase() != Phase::RoundOpen {
            return Err(AppraisalError::RoundNotOpen);
        }
        let participant_id = ParticipantId::parse(participant)?;
        let value = validate_estimate(value)?;

        let (submission, outcome) = self
            .ledger
            .upsert(&participant_id, value, Utc::now())
            .await
            .map_err(ledger_failure)?;
        tracing::info!(
            "🗳️ Estimate from {}: {:.2} ({:?})",
            submission.participant_id,
            submission.value,
            outcome
        );
        Ok((submission, outcome))
    }

    /// Withdraws the participant's estimate from the open round.
    pub async fn retract(&mut self, participant_id: &ParticipantId) -> Result<Option<Submission>> {
        if self.phase() != Phase::RoundOpen {
            return Err(AppraisalError::RoundNotOpen);
        }
        let removed = self
            .ledger
            .remove(participant_id)
            .await
            .map_err(ledger_failure)?;
        if removed.is_some() {
            tracing::info!("↩️ Estimate from {} retracted", participant_id);
        }
        Ok(removed)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let submissions = if self.phase() == Phase::RoundOpen {
            self.ledger.snapshot().await.map_err(ledger_failure)?
        } else {
            Vec::new()
        };
        Ok(SessionSnapshot {
            active_item: self.active_item().cloned(),
            round_open: self.phase() == Phase::RoundOpen,
            submissions,
            daily_counter: self.daily_counter,
            history: self.history.clone(),
        })
    }

    /// Starts a new day: counter back to zero, running history emptied.
    pub fn reset_daily(&mut self) -> u32 {
        let previous = self.daily_counter;
        self.daily_counter = 0;
        self.history.clear();
        tracing::info!("🌙 Daily counter reset (was {})", previous);
        previous
    }

    /// Archives the open round and clears its ledger. Leaves `self.state` as is;
    /// callers decide the next state. Nothing changes if the archive write fails.
    async fn finish_round(&mut self) -> Result<RoundResult> {
        let (item, round_id) = match &self.state {
            SessionState::RoundOpen { item, round_id, .. } => (item.clone(), *round_id),
            _ => return Err(AppraisalError::NoOpenRound),
        };

        let submissions = self.ledger.snapshot().await.map_err(ledger_failure)?;
        let average = average_of(&submissions);
        let closed_at = Utc::now();
        let summary = ArchivedRoundSummary {
            round_id,
            item_id: item.id,
            item_name: item.name.clone(),
            category: item.category,
            average,
            submissions: submissions.clone(),
            closed_at,
            session_date: closed_at.with_timezone(&Local).date_naive(),
        };

        if let Err(e) = self.archive.append_archived_round(&summary).await {
            tracing::error!("❌ Failed to archive round {}: {}", round_id.0, e);
            return Err(AppraisalError::ArchiveWriteFailed {
                message: e.to_string(),
            });
        }

        self.daily_counter += 1;
        self.history.push(summary);
        if let Err(e) = self.ledger.clear().await {
            // begin_round 會再清一次
            tracing::warn!("⚠️ Round {} archived but ledger clear failed: {}", round_id.0, e);
        }

        tracing::info!(
            "🔒 Round {} closed for {}: {} estimate(s), average {:.2}, counter {}",
            round_id.0,
            item.name,
            submissions.len(),
            average,
            self.daily_counter
        );
        Ok(RoundResult {
            item,
            submissions,
            average,
        })
    }
}

fn ledger_failure(err: AppraisalError) -> AppraisalError {
    match err {
        AppraisalError::StorageUnavailable { .. } | AppraisalError::RoundNotOpen => err,
        other => AppraisalError::storage_unavailable(other.to_string()),
    }
}
