use crate::adapters::memory::upsert_row;
use crate::domain::model::{ArchivedRoundSummary, ItemId, ParticipantId, Submission, UpsertOutcome};
use crate::domain::ports::{HistoryArchive, SubmissionStore};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Append-only archive, one JSON document per line.
#[derive(Debug, Clone)]
pub struct JsonlArchive {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl JsonlArchive {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryArchive for JsonlArchive {
    async fn append_archived_round(&self, summary: &ArchivedRoundSummary) -> Result<()> {
        let mut line = serde_json::to_string(summary)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        self.ensure_parent().await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_data().await?;

        tracing::debug!(
            "Archived round {} to {}",
            summary.round_id.0,
            self.path.display()
        );
        Ok(())
    }

    async fn list_archived_rounds(&self, since: NaiveDate) -> Result<Vec<ArchivedRoundSummary>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut rounds = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ArchivedRoundSummary>(line) {
                Ok(summary) if summary.session_date >= since => rounds.push(summary),
                Ok(_) => {}
                // 崩潰時可能留下寫一半的最後一行
                Err(e) => tracing::warn!(
                    "⚠️ Skipping unreadable archive line {} in {}: {}",
                    line_no + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(rounds)
    }

    async fn health_check(&self) -> Result<()> {
        self.ensure_parent().await?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        true
    }
}

/// Submission store keeping one JSON file per item, rewritten atomically.
#[derive(Debug, Clone)]
pub struct FileSubmissionStore {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileSubmissionStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn item_path(&self, item_id: &ItemId) -> PathBuf {
        self.dir.join(format!("{}.json", item_id))
    }

    async fn load(&self, item_id: &ItemId) -> Result<Vec<Submission>> {
        match fs::read(self.item_path(item_id)).await {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// tmp 檔寫入後 rename，避免讀到寫一半的內容
    async fn save(&self, item_id: &ItemId, rows: &[Submission]) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.item_path(item_id);
        let tmp_path = path.with_extension("json.tmp");

        let data = serde_json::to_vec_pretty(rows)?;
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl SubmissionStore for FileSubmissionStore {
    async fn upsert_submission(
        &self,
        item_id: &ItemId,
        submission: &Submission,
    ) -> Result<(Submission, UpsertOutcome)> {
        let _guard = self.write_lock.lock().await;
        let mut rows = self.load(item_id).await?;
        let outcome = upsert_row(&mut rows, submission);
        self.save(item_id, &rows).await?;
        Ok(outcome)
    }

    async fn remove_submission(
        &self,
        item_id: &ItemId,
        participant_id: &ParticipantId,
    ) -> Result<Option<Submission>> {
        let _guard = self.write_lock.lock().await;
        let mut rows = self.load(item_id).await?;
        let Some(idx) = rows.iter().position(|s| &s.participant_id == participant_id) else {
            return Ok(None);
        };
        let removed = rows.remove(idx);
        self.save(item_id, &rows).await?;
        Ok(Some(removed))
    }

    async fn list_submissions(&self, item_id: &ItemId) -> Result<Vec<Submission>> {
        self.load(item_id).await
    }

    async fn clear_submissions(&self, item_id: &ItemId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(self.item_path(item_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn health_check(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let marker = self.dir.join(".health");
        fs::write(&marker, b"ok").await?;
        fs::remove_file(&marker).await?;
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        true
    }
}
