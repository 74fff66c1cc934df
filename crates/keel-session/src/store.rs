//! Persistent session storage backed by JSON files.

use crate::error::SessionError;
use crate::policy::{PolicyConfig, PolicyOutcome, apply_policy};
use crate::types::{Session, SessionSummary};
use std::path::PathBuf;

/// File-based session store. Each session is a JSON file in `sessions_dir`.
pub struct SessionStore {
    sessions_dir: PathBuf,
}

impl SessionStore {
    /// Create a new store, ensuring the sessions directory exists.
    pub async fn new(config_dir: PathBuf) -> Result<Self, SessionError> {
        let sessions_dir = config_dir.join("sessions");
        tokio::fs::create_dir_all(&sessions_dir).await?;
        Ok(Self { sessions_dir })
    }

    /// Save a session to disk (atomic write: .tmp → rename).
    pub async fn save(&self, session: &Session) -> Result<(), SessionError> {
        let path = self.session_path(&session.id)?;
        let tmp_path = path.with_extension("tmp");
        let json = serde_json::to_string_pretty(session)?;
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    /// Load a session by exact ID.
    pub async fn load(&self, id: &str) -> Result<Session, SessionError> {
        let path = self.session_path(id)?;
        if !path.exists() {
            return Err(SessionError::NotFound { id: id.to_string() });
        }
        let data = tokio::fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Load a session by ID prefix. Errors if ambiguous (multiple matches).
    pub async fn load_by_prefix(&self, prefix: &str) -> Result<Session, SessionError> {
        let prefix_lower = prefix.to_lowercase();
        let mut matches: Vec<String> = self
            .session_ids()
            .await?
            .into_iter()
            .filter(|id| id.to_lowercase().starts_with(&prefix_lower))
            .collect();

        match matches.len() {
            0 => Err(SessionError::PrefixNotFound {
                prefix: prefix.to_string(),
            }),
            1 => self.load(&matches.remove(0)).await,
            count => Err(SessionError::AmbiguousPrefix {
                prefix: prefix.to_string(),
                count,
            }),
        }
    }

    /// Load every readable session. Unreadable files are logged and skipped.
    pub async fn load_all(&self) -> Result<Vec<Session>, SessionError> {
        let mut sessions = Vec::new();
        for id in self.session_ids().await? {
            let path = self.sessions_dir.join(format!("{id}.json"));
            match tokio::fs::read_to_string(&path).await {
                Ok(data) => match serde_json::from_str::<Session>(&data) {
                    Ok(session) => sessions.push(session),
                    Err(e) => {
                        tracing::warn!("Failed to parse session {}: {}", id, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read session {}: {}", id, e);
                }
            }
        }
        Ok(sessions)
    }

    /// List all sessions, most recent first.
    pub async fn list(&self) -> Result<Vec<SessionSummary>, SessionError> {
        let mut summaries: Vec<SessionSummary> = self
            .load_all()
            .await?
            .iter()
            .map(Session::to_summary)
            .collect();
        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(summaries)
    }

    /// Delete a session file.
    pub async fn delete(&self, id: &str) -> Result<(), SessionError> {
        let path = self.session_path(id)?;
        if !path.exists() {
            return Err(SessionError::NotFound { id: id.to_string() });
        }
        tokio::fs::remove_file(&path).await?;
        Ok(())
    }

    /// Apply the storage policy to the stored snapshot and delete every
    /// evicted session. Retained sessions are left untouched on disk.
    pub async fn enforce_policy(
        &self,
        config: &PolicyConfig,
    ) -> Result<PolicyOutcome, SessionError> {
        let snapshot = self.load_all().await?;
        let outcome = apply_policy(snapshot, config)?;
        for id in &outcome.evicted {
            match self.delete(id).await {
                Ok(()) | Err(SessionError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(outcome)
    }

    async fn session_ids(&self) -> Result<Vec<String>, SessionError> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.sessions_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(stem) = name_str.strip_suffix(".json") {
                ids.push(stem.to_string());
            }
        }
        Ok(ids)
    }

    fn session_path(&self, id: &str) -> Result<PathBuf, SessionError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(SessionError::InvalidId { id: id.to_string() });
        }
        Ok(self.sessions_dir.join(format!("{id}.json")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_types::Message;
    use tempfile::TempDir;

    async fn test_store() -> (SessionStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path().to_path_buf()).await.unwrap();
        (store, tmp)
    }

    fn test_session(id: &str, timestamp: i64) -> Session {
        let mut session = Session::with_timestamp(id, timestamp);
        session.messages.push(Message::user("Hello"));
        session
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let (store, _tmp) = test_store().await;
        let session = Session::new();
        let id = session.id.clone();

        store.save(&session).await.unwrap();
        let loaded = store.load(&id).await.unwrap();

        assert_eq!(loaded.id, id);
        assert_eq!(loaded.timestamp, session.timestamp);
    }

    #[tokio::test]
    async fn load_nonexistent_returns_not_found() {
        let (store, _tmp) = test_store().await;
        let result = store.load("missing").await;
        assert!(matches!(result, Err(SessionError::NotFound { .. })));
    }

    #[tokio::test]
    async fn path_traversal_ids_rejected() {
        let (store, _tmp) = test_store().await;
        let result = store.load("../secrets").await;
        assert!(matches!(result, Err(SessionError::InvalidId { .. })));
        let result = store.save(&test_session("a/b", 1)).await;
        assert!(matches!(result, Err(SessionError::InvalidId { .. })));
    }

    #[tokio::test]
    async fn load_by_prefix_short() {
        let (store, _tmp) = test_store().await;
        let session = Session::new();
        store.save(&session).await.unwrap();

        let loaded = store.load_by_prefix(session.short_id()).await.unwrap();
        assert_eq!(loaded.id, session.id);
    }

    #[tokio::test]
    async fn load_by_prefix_ambiguous() {
        let (store, _tmp) = test_store().await;
        store.save(&test_session("abc-1", 1)).await.unwrap();
        store.save(&test_session("abc-2", 2)).await.unwrap();
        let result = store.load_by_prefix("abc").await;
        assert!(matches!(
            result,
            Err(SessionError::AmbiguousPrefix { count: 2, .. })
        ));
    }

    #[tokio::test]
    async fn load_by_prefix_not_found() {
        let (store, _tmp) = test_store().await;
        let result = store.load_by_prefix("ffffffff").await;
        assert!(matches!(result, Err(SessionError::PrefixNotFound { .. })));
    }

    #[tokio::test]
    async fn list_empty() {
        let (store, _tmp) = test_store().await;
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_sorted_newest_first() {
        let (store, _tmp) = test_store().await;
        store.save(&test_session("older", 10)).await.unwrap();
        store.save(&test_session("newer", 20)).await.unwrap();

        let summaries = store.list().await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, "newer");
    }

    #[tokio::test]
    async fn load_all_skips_corrupt_files() {
        let (store, tmp) = test_store().await;
        store.save(&test_session("good", 1)).await.unwrap();
        tokio::fs::write(tmp.path().join("sessions").join("bad.json"), "{not json")
            .await
            .unwrap();

        let sessions = store.load_all().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "good");
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let (store, _tmp) = test_store().await;
        store.save(&test_session("gone", 1)).await.unwrap();
        store.delete("gone").await.unwrap();
        assert!(matches!(
            store.load("gone").await,
            Err(SessionError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn enforce_policy_deletes_evicted() {
        let (store, _tmp) = test_store().await;
        for i in 1..=5 {
            store.save(&test_session(&format!("s{i}"), i)).await.unwrap();
        }
        let config = PolicyConfig {
            max_sessions: 3,
            soft_limit_ratio: 1.0,
            cleanup_target_ratio: 1.0,
            storage_threshold_bytes: None,
        };

        let outcome = store.enforce_policy(&config).await.unwrap();
        assert_eq!(outcome.evicted_count(), 2);

        let remaining: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(remaining, ["s5", "s4", "s3"]);
    }

    #[tokio::test]
    async fn enforce_policy_invalid_config_touches_nothing() {
        let (store, _tmp) = test_store().await;
        store.save(&test_session("keep", 1)).await.unwrap();
        let config = PolicyConfig {
            max_sessions: 0,
            soft_limit_ratio: 0.5,
            cleanup_target_ratio: 0.9,
            storage_threshold_bytes: None,
        };

        let result = store.enforce_policy(&config).await;
        assert!(matches!(result, Err(SessionError::Policy(_))));
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }
}
