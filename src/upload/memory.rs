//! In-memory session store.
//!
//! Sessions live only as long as the process. Used by tests and by
//! deployments that do not need uploads to survive a restart.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::session::{MarkOutcome, NewUploadSession, UploadSession};
use super::store::SessionStore;
use crate::{HoardError, Result};

struct Entry {
    session: UploadSession,
    received: BTreeSet<u32>,
}

/// Session store backed by a mutex-guarded map.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: &NewUploadSession) -> Result<UploadSession> {
        let mut entries = self.entries();
        if entries.contains_key(&session.id) {
            return Err(HoardError::Conflict(format!("upload session {}", session.id)));
        }
        let stored = UploadSession::from(session.clone());
        entries.insert(
            session.id.clone(),
            Entry {
                session: stored.clone(),
                received: BTreeSet::new(),
            },
        );
        Ok(stored)
    }

    async fn get(&self, id: &str) -> Result<Option<UploadSession>> {
        Ok(self.entries().get(id).map(|e| e.session.clone()))
    }

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<UploadSession>> {
        let mut sessions: Vec<UploadSession> = self
            .entries()
            .values()
            .filter(|e| e.session.owner_id == owner_id)
            .map(|e| e.session.clone())
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(sessions)
    }

    async fn list_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<UploadSession>> {
        let mut sessions: Vec<UploadSession> = self
            .entries()
            .values()
            .filter(|e| e.session.created_at <= cutoff)
            .map(|e| e.session.clone())
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    async fn mark_received(&self, id: &str, index: u32) -> Result<MarkOutcome> {
        let mut entries = self.entries();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| HoardError::NotFound("upload session".to_string()))?;

        if index >= entry.session.total_chunks {
            return Err(HoardError::OutOfRange {
                index: u64::from(index),
                total: u64::from(entry.session.total_chunks),
            });
        }

        let newly_received = entry.received.insert(index);
        let uploaded = entry.received.len() as u32;
        entry.session.uploaded_chunks = uploaded;
        Ok(MarkOutcome {
            newly_received,
            uploaded,
        })
    }

    async fn received_indices(&self, id: &str) -> Result<Vec<u32>> {
        Ok(self
            .entries()
            .get(id)
            .map(|e| e.received.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.entries().remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn new_session(id: &str, owner_id: i64, age_hours: i64) -> NewUploadSession {
        NewUploadSession {
            id: id.to_string(),
            owner_id,
            filename: "a.bin".to_string(),
            total_size: 9,
            total_chunks: 3,
            temp_path: PathBuf::from(format!("/tmp/{id}")),
            target_path: PathBuf::from("/data/a.bin"),
            created_at: Utc::now() - Duration::hours(age_hours),
        }
    }

    #[tokio::test]
    async fn test_insert_get_delete() {
        let store = MemorySessionStore::new();
        store.insert(&new_session("s1", 1, 0)).await.unwrap();
        assert!(matches!(
            store.insert(&new_session("s1", 1, 0)).await,
            Err(HoardError::Conflict(_))
        ));

        assert_eq!(store.get("s1").await.unwrap().unwrap().owner_id, 1);
        assert!(store.delete("s1").await.unwrap());
        assert!(store.get("s1").await.unwrap().is_none());
        assert!(!store.delete("s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_received_counts_distinct() {
        let store = MemorySessionStore::new();
        store.insert(&new_session("s1", 1, 0)).await.unwrap();

        assert!(store.mark_received("s1", 2).await.unwrap().newly_received);
        let dup = store.mark_received("s1", 2).await.unwrap();
        assert!(!dup.newly_received);
        assert_eq!(dup.uploaded, 1);
        assert!(matches!(
            store.mark_received("s1", 3).await,
            Err(HoardError::OutOfRange { .. })
        ));
        assert_eq!(store.received_indices("s1").await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_concurrent_marks() {
        let store = Arc::new(MemorySessionStore::new());
        let mut session = new_session("s1", 1, 0);
        session.total_chunks = 64;
        store.insert(&session).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            for index in 0..64u32 {
                let store = Arc::clone(&store);
                handles.push(tokio::spawn(async move {
                    store.mark_received("s1", index).await.unwrap()
                }));
            }
        }
        let mut newly = 0;
        for handle in handles {
            if handle.await.unwrap().newly_received {
                newly += 1;
            }
        }

        assert_eq!(newly, 64);
        assert_eq!(store.get("s1").await.unwrap().unwrap().uploaded_chunks, 64);
    }

    #[tokio::test]
    async fn test_listing() {
        let store = MemorySessionStore::new();
        store.insert(&new_session("old", 1, 30)).await.unwrap();
        store.insert(&new_session("new", 1, 1)).await.unwrap();
        store.insert(&new_session("other", 2, 1)).await.unwrap();

        let mine: Vec<String> = store
            .list_by_owner(1)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(mine, vec!["new", "old"]);

        let expired = store
            .list_created_before(Utc::now() - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, "old");
    }
}
