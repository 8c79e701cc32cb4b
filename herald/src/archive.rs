//! Archival of completed notifications.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::Result;
use crate::notification::NotificationSummary;

/// Persists summaries of completed notifications.
#[async_trait]
pub trait Archiver: Send + Sync {
    async fn archive(&self, summary: &NotificationSummary) -> Result<()>;
}

/// Writes each summary to `<dir>/<id>.json`.
pub struct JsonFileArchiver {
    dir: PathBuf,
}

impl JsonFileArchiver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl Archiver for JsonFileArchiver {
    async fn archive(&self, summary: &NotificationSummary) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&summary.id);
        let json = serde_json::to_vec_pretty(summary)?;
        tokio::fs::write(&path, json).await?;
        debug!(path = %path.display(), "Notification archived");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Priority;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_archive_writes_summary() {
        let dir = tempfile::tempdir().unwrap();
        let archiver = JsonFileArchiver::new(dir.path().join("archive"));
        let summary = NotificationSummary {
            id: "abc".to_string(),
            created_at: chrono::Utc::now(),
            priority: Priority::Low,
            title: None,
            message: Some("hello".to_string()),
            selected_scenarios: vec![],
            selection: vec!["email".to_string()],
            delivered: 1,
            failed: 0,
            suppressed: 0,
            errors: 0,
            dupe: false,
            suppression: None,
            deliveries: BTreeMap::new(),
        };

        archiver.archive(&summary).await.unwrap();

        let written = std::fs::read_to_string(archiver.path_for("abc")).unwrap();
        let parsed: NotificationSummary = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, summary);
    }
}
