use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::error::StoreError;

/// Bounded size of the persisted highscore list.
pub const MAX_ENTRIES: usize = 5;
pub const DEFAULT_NAME: &str = "Anonymous";

const HIGHSCORES_FILE: &str = "highscores.json";
const PLAYER_NAME_FILE: &str = "player_name.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighscoreEntry {
    pub name: String,
    pub score: u32,
    pub total: usize,
    pub date: DateTime<Utc>,
    pub topics: Vec<String>,
}

/// Durable result storage: two key/value entries under a data directory, a
/// bounded sorted highscore list and the last-used player name. Read/parse
/// failures degrade to "empty", never to an error the caller must handle.
pub struct HighscoreStore {
    data_dir: PathBuf,
    /// Serializes the read-sort-trim-write cycle in `record`; without it two
    /// concurrent finishes can each read the old list and one entry is lost.
    write_lock: Mutex<()>,
}

impl HighscoreStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn scores_path(&self) -> PathBuf {
        self.data_dir.join(HIGHSCORES_FILE)
    }

    fn name_path(&self) -> PathBuf {
        self.data_dir.join(PLAYER_NAME_FILE)
    }

    /// Appends an entry, re-sorts by score then recency, trims to the top
    /// five, persists, and returns the new list.
    #[tracing::instrument(skip(self, entry), fields(entry.name = %entry.name, entry.score = entry.score))]
    pub async fn record(&self, mut entry: HighscoreEntry) -> Result<Vec<HighscoreEntry>, StoreError> {
        entry.name = normalize_name(&entry.name);

        let _guard = self.write_lock.lock().await;
        let mut entries = self.list().await;
        entries.push(entry);
        entries.sort_by(|a, b| b.score.cmp(&a.score).then(b.date.cmp(&a.date)));
        entries.truncate(MAX_ENTRIES);

        self.persist(&self.scores_path(), &serde_json::to_string_pretty(&entries)?)
            .await?;
        tracing::info!(entries.count = entries.len(), "Recorded highscore entry");
        Ok(entries)
    }

    /// Current top entries, best first. Missing or corrupt storage reads as
    /// an empty list.
    pub async fn list(&self) -> Vec<HighscoreEntry> {
        match tokio::fs::read_to_string(self.scores_path()).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Corrupt highscore data; treating store as empty");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        }
    }

    /// Most recently used player name, if one was ever remembered.
    pub async fn last_name(&self) -> Option<String> {
        let raw = tokio::fs::read_to_string(self.name_path()).await.ok()?;
        serde_json::from_str::<String>(&raw)
            .ok()
            .filter(|name| !name.trim().is_empty())
    }

    pub async fn remember_name(&self, name: &str) -> Result<(), StoreError> {
        let normalized = normalize_name(name);
        self.persist(&self.name_path(), &serde_json::to_string(&normalized)?)
            .await
    }

    async fn persist(&self, path: &PathBuf, contents: &str) -> Result<(), StoreError> {
        if let Err(e) = tokio::fs::create_dir_all(&self.data_dir).await {
            return Err(StoreError::Write {
                path: self.data_dir.display().to_string(),
                source: e,
            });
        }
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| StoreError::Write {
                path: path.display().to_string(),
                source: e,
            })
    }
}

fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn temp_store() -> HighscoreStore {
        let dir = std::env::temp_dir().join(format!("quizdeck-scores-{}", Uuid::new_v4()));
        HighscoreStore::new(dir)
    }

    fn entry(name: &str, score: u32, date_secs: i64) -> HighscoreEntry {
        HighscoreEntry {
            name: name.to_string(),
            score,
            total: 5,
            date: Utc.timestamp_opt(date_secs, 0).unwrap(),
            topics: vec!["science".to_string()],
        }
    }

    #[tokio::test]
    async fn missing_store_lists_empty() {
        let store = temp_store();
        assert!(store.list().await.is_empty());
        assert!(store.last_name().await.is_none());
    }

    #[tokio::test]
    async fn records_are_sorted_and_trimmed_to_five() {
        let store = temp_store();
        for i in 0..8u32 {
            store.record(entry(&format!("p{}", i), i, 1000 + i as i64)).await.unwrap();
        }

        let listed = store.list().await;
        assert_eq!(listed.len(), MAX_ENTRIES);
        assert_eq!(listed[0].score, 7);
        assert_eq!(listed[4].score, 3);
        for pair in listed.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn ties_break_by_most_recent_date() {
        let store = temp_store();
        store.record(entry("older", 3, 1_000)).await.unwrap();
        store.record(entry("newer", 3, 2_000)).await.unwrap();

        let listed = store.list().await;
        assert_eq!(listed[0].name, "newer");
        assert_eq!(listed[1].name, "older");
    }

    #[tokio::test]
    async fn concurrent_records_keep_every_entry() {
        let store = temp_store();
        let (first, second) = tokio::join!(
            store.record(entry("first", 1, 1_000)),
            store.record(entry("second", 2, 2_000)),
        );
        first.unwrap();
        second.unwrap();

        let listed = store.list().await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "second");
        assert_eq!(listed[1].name, "first");
    }

    #[tokio::test]
    async fn corrupt_store_degrades_to_empty() {
        let store = temp_store();
        store.record(entry("keep", 1, 1_000)).await.unwrap();
        tokio::fs::write(store.scores_path(), "not json at all")
            .await
            .unwrap();
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn blank_names_become_anonymous() {
        let store = temp_store();
        let listed = store.record(entry("   ", 2, 1_000)).await.unwrap();
        assert_eq!(listed[0].name, DEFAULT_NAME);
    }

    #[tokio::test]
    async fn remembers_the_last_used_name() {
        let store = temp_store();
        assert!(store.last_name().await.is_none());
        store.remember_name("  Ada ").await.unwrap();
        assert_eq!(store.last_name().await.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn persisted_entry_round_trips_topics_and_total() {
        let store = temp_store();
        let recorded = HighscoreEntry {
            name: "Ada".to_string(),
            score: 3,
            total: 5,
            date: Utc::now(),
            topics: vec!["history".to_string(), "science".to_string()],
        };
        store.record(recorded).await.unwrap();

        let listed = store.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].total, 5);
        assert_eq!(listed[0].score, 3);
        assert_eq!(listed[0].topics, vec!["history", "science"]);
    }
}
