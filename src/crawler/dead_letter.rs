//! Dead-letter log
//!
//! Ids that exhaust their fetch attempts and entities that exhaust their
//! upsert attempts are recorded here so a later run (or an operator) can
//! repair the gap. With a file configured, each record is appended as one
//! JSON line; records are always logged at `error` level as well.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::crawler::CrawlError;
use crate::{Entity, ItemId};

/// Stage at which an item was given up on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadLetterStage {
    /// Fetch attempts exhausted
    Fetch,
    /// Upsert attempts exhausted
    Persist,
}

impl DeadLetterStage {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterStage::Fetch => "fetch",
            DeadLetterStage::Persist => "persist",
        }
    }
}

/// One dead-lettered item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Stage that gave up
    pub stage: DeadLetterStage,
    /// Item id
    pub id: ItemId,
    /// Attempts made
    pub attempts: u32,
    /// Last error
    pub error: String,
    /// When the item was given up on
    pub recorded_at: DateTime<Utc>,
    /// Entity that could not be persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<Entity>,
}

impl DeadLetter {
    /// Record for an id whose fetches kept failing
    pub fn fetch(id: ItemId, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            stage: DeadLetterStage::Fetch,
            id,
            attempts,
            error: error.into(),
            recorded_at: Utc::now(),
            entity: None,
        }
    }

    /// Record for an entity whose upserts kept failing
    pub fn persist(entity: Entity, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            stage: DeadLetterStage::Persist,
            id: entity.id(),
            attempts,
            error: error.into(),
            recorded_at: Utc::now(),
            entity: Some(entity),
        }
    }
}

/// Sink for dead letters
#[derive(Debug)]
pub struct DeadLetterLog {
    path: Option<PathBuf>,
    file: Option<Mutex<File>>,
}

impl DeadLetterLog {
    /// Log-only sink
    pub fn disabled() -> Self {
        Self {
            path: None,
            file: None,
        }
    }

    /// Append-mode JSON-lines sink at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CrawlError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| CrawlError::DeadLetter(format!("cannot open {}: {e}", path.display())))?;

        Ok(Self {
            path: Some(path),
            file: Some(Mutex::new(file)),
        })
    }

    /// File backing the log, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record one dead letter. Write failures are logged, never propagated.
    pub async fn record(&self, letter: DeadLetter) {
        error!(
            stage = letter.stage.as_str(),
            id = letter.id,
            attempts = letter.attempts,
            error = %letter.error,
            "Giving up on item"
        );

        let Some(file) = &self.file else {
            return;
        };

        let mut line = match serde_json::to_vec(&letter) {
            Ok(line) => line,
            Err(e) => {
                warn!(id = letter.id, error = %e, "Failed to encode dead letter");
                return;
            }
        };
        line.push(b'\n');

        let mut file = file.lock().await;
        let written = async {
            file.write_all(&line).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            warn!(id = letter.id, error = %e, "Failed to append dead letter");
        }
    }
}

/// Read back every record of a dead-letter file
pub fn read_dead_letters(path: impl AsRef<Path>) -> Result<Vec<DeadLetter>, CrawlError> {
    let content = std::fs::read_to_string(path.as_ref())
        .map_err(|e| CrawlError::DeadLetter(e.to_string()))?;

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str)
        .collect::<Result<Vec<DeadLetter>, _>>()
        .map_err(|e| CrawlError::DeadLetter(e.to_string()))
}
