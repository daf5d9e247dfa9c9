//! Append-only execution history

use async_trait::async_trait;
use cmdfleet_shared::{DeviceId, HistoryEntry, NewHistoryEntry};
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::warn;

/// History storage errors
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("History I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to encode history entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Persistence sink for history entries
#[async_trait]
pub trait HistorySink: Send + Sync {
    /// Persist one entry and return it with its assigned id
    async fn create_history_entry(
        &self,
        entry: NewHistoryEntry,
    ) -> Result<HistoryEntry, HistoryError>;

    /// Entries of one device, newest first
    async fn for_device(
        &self,
        device: DeviceId,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, HistoryError>;

    /// Entries across all devices, newest first
    async fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError>;
}

fn newest_first<'a>(
    entries: impl DoubleEndedIterator<Item = &'a HistoryEntry>,
    device: Option<DeviceId>,
    limit: usize,
) -> Vec<HistoryEntry> {
    entries
        .rev()
        .filter(|e| device.map_or(true, |id| e.device.id == id))
        .take(limit)
        .cloned()
        .collect()
}

/// In-memory history
#[derive(Debug, Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry, oldest first
    pub async fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl HistorySink for MemoryHistory {
    async fn create_history_entry(
        &self,
        entry: NewHistoryEntry,
    ) -> Result<HistoryEntry, HistoryError> {
        let mut entries = self.entries.lock().await;
        let entry = HistoryEntry::from_new(entries.len() as u64 + 1, entry);
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn for_device(
        &self,
        device: DeviceId,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, HistoryError> {
        Ok(newest_first(self.entries.lock().await.iter(), Some(device), limit))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
        Ok(newest_first(self.entries.lock().await.iter(), None, limit))
    }
}

/// History stored as one JSON object per line, appended only
#[derive(Debug)]
pub struct JsonlHistory {
    path: PathBuf,
    /// Next id to assign, loaded from the file on first write
    next_id: Mutex<Option<u64>>,
}

impl JsonlHistory {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            next_id: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        // A crash mid-append leaves a torn record; skip it rather than lose the file
        let mut entries = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    "[RECORDER] Skipping corrupt history record at {}:{}: {}",
                    self.path.display(),
                    index + 1,
                    e
                ),
            }
        }
        Ok(entries)
    }

    /// Whether the file has content that does not end with a newline
    async fn ends_torn(file: &mut tokio::fs::File) -> io::Result<bool> {
        let len = file.metadata().await?.len();
        if len == 0 {
            return Ok(false);
        }
        file.seek(SeekFrom::Start(len - 1)).await?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last).await?;
        Ok(last[0] != b'\n')
    }
}

#[async_trait]
impl HistorySink for JsonlHistory {
    async fn create_history_entry(
        &self,
        entry: NewHistoryEntry,
    ) -> Result<HistoryEntry, HistoryError> {
        // Held for the whole append so ids stay unique and lines never interleave
        let mut next_id = self.next_id.lock().await;
        let id = match *next_id {
            Some(id) => id,
            None => {
                self.read_all()
                    .await?
                    .iter()
                    .map(|e| e.id)
                    .max()
                    .unwrap_or(0)
                    + 1
            }
        };

        let entry = HistoryEntry::from_new(id, entry);
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await?;
        if Self::ends_torn(&mut file).await? {
            line.insert(0, '\n');
        }
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        *next_id = Some(id + 1);
        Ok(entry)
    }

    async fn for_device(
        &self,
        device: DeviceId,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, HistoryError> {
        let entries = self.read_all().await?;
        Ok(newest_first(entries.iter(), Some(device), limit))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
        let entries = self.read_all().await?;
        Ok(newest_first(entries.iter(), None, limit))
    }
}
