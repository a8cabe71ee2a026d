use async_trait::async_trait;
use dashmap::DashSet;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::error::RelayError;

pub const DEFAULT_MEMORY_CAPACITY: usize = 50_000;

/// Idempotency guard keyed by deposit.
#[async_trait]
pub trait ProcessedStore: Send + Sync {
    /// True only for the first claim of `key`.
    async fn claim(&self, key: &str) -> Result<bool, RelayError>;

    async fn release(&self, key: &str) -> Result<(), RelayError>;
}

/// Bounded in-memory set; the oldest keys fall out at capacity.
pub struct MemoryProcessedStore {
    seen: DashSet<String>,
    seen_order: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl MemoryProcessedStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: DashSet::new(),
            seen_order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for MemoryProcessedStore {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }
}

#[async_trait]
impl ProcessedStore for MemoryProcessedStore {
    // Both methods update the set only while holding `seen_order`.
    async fn claim(&self, key: &str) -> Result<bool, RelayError> {
        let mut order = self.seen_order.lock().await;
        if !self.seen.insert(key.to_string()) {
            return Ok(false);
        }
        order.push_back(key.to_string());
        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        Ok(true)
    }

    async fn release(&self, key: &str) -> Result<(), RelayError> {
        let mut order = self.seen_order.lock().await;
        if self.seen.remove(key).is_some() {
            order.retain(|k| k != key);
        }
        Ok(())
    }
}

/// Append-only journal of `+key` / `-key` lines, replayed on open.
pub struct FileProcessedStore {
    path: PathBuf,
    seen: DashSet<String>,
    journal: Mutex<File>,
}

impl FileProcessedStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref().to_path_buf();
        let seen = DashSet::new();

        match File::open(&path).await {
            Ok(file) => {
                let mut lines = BufReader::new(file).lines();
                while let Some(line) = lines.next_line().await? {
                    if let Some(key) = line.strip_prefix('+') {
                        seen.insert(key.to_string());
                    } else if let Some(key) = line.strip_prefix('-') {
                        seen.remove(key);
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            seen,
            journal: Mutex::new(journal),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

async fn append_line(journal: &mut File, line: &str) -> Result<(), RelayError> {
    journal.write_all(line.as_bytes()).await?;
    journal.flush().await?;
    journal.sync_data().await?;
    Ok(())
}

#[async_trait]
impl ProcessedStore for FileProcessedStore {
    async fn claim(&self, key: &str) -> Result<bool, RelayError> {
        if key.contains('\n') {
            return Err(RelayError::Config(format!("invalid deposit key {key:?}")));
        }
        let mut journal = self.journal.lock().await;
        if !self.seen.insert(key.to_string()) {
            return Ok(false);
        }
        if let Err(e) = append_line(&mut journal, &format!("+{key}\n")).await {
            self.seen.remove(key);
            return Err(e);
        }
        Ok(true)
    }

    async fn release(&self, key: &str) -> Result<(), RelayError> {
        let mut journal = self.journal.lock().await;
        if self.seen.remove(key).is_some() {
            append_line(&mut journal, &format!("-{key}\n")).await?;
        }
        Ok(())
    }
}
