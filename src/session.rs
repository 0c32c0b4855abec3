//! Per-user session storage
//!
//! Process-local and volatile. Each user's record is independent; the runtime
//! guarantees a single writer per user, so the store only needs per-call
//! atomicity.

use crate::state_machine::{Session, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Storage failures; fatal for the request that hit them
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Session store is closed")]
    Closed,
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Download failed: {0}")]
    Download(String),
}

impl StorageError {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Storage for conversation sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Current session, `None` when the user is idle
    async fn get(&self, user_id: UserId) -> Result<Option<Session>, StorageError>;

    /// Create or overwrite the user's session
    async fn set(&self, user_id: UserId, session: Session) -> Result<(), StorageError>;

    /// Drop the user's session; clearing an absent session is not an error
    async fn clear(&self, user_id: UserId) -> Result<(), StorageError>;

    /// Release the store; later calls fail with `StorageError::Closed`
    async fn close(&self) -> Result<(), StorageError>;
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn get(&self, user_id: UserId) -> Result<Option<Session>, StorageError> {
        (**self).get(user_id).await
    }

    async fn set(&self, user_id: UserId, session: Session) -> Result<(), StorageError> {
        (**self).set(user_id, session).await
    }

    async fn clear(&self, user_id: UserId) -> Result<(), StorageError> {
        (**self).clear(user_id).await
    }

    async fn close(&self) -> Result<(), StorageError> {
        (**self).close().await
    }
}

/// In-memory session store
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<UserId, Session>>,
    closed: AtomicBool,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users with a session in progress
    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user_id: UserId) -> Result<Option<Session>, StorageError> {
        self.ensure_open()?;
        Ok(self.sessions.read().await.get(&user_id).cloned())
    }

    async fn set(&self, user_id: UserId, session: Session) -> Result<(), StorageError> {
        self.ensure_open()?;
        self.sessions.write().await.insert(user_id, session);
        Ok(())
    }

    async fn clear(&self, user_id: UserId) -> Result<(), StorageError> {
        self.ensure_open()?;
        self.sessions.write().await.remove(&user_id);
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.closed.store(true, Ordering::SeqCst);
        let dropped = {
            let mut sessions = self.sessions.write().await;
            let n = sessions.len();
            sessions.clear();
            n
        };
        tracing::info!(dropped, "Session store closed");
        Ok(())
    }
}
