use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{FlowError, Result};

/// Session information together with its typed, in-memory state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session<S> {
    pub id: String,
    pub state: S,
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<S: Default> Session<S> {
    /// Start a session with a fresh random id and default state
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            state: S::default(),
            status_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl<S: Default> Default for Session<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Session<S> {
    /// Mark the session as modified, optionally replacing its status message
    pub fn touch(&mut self, status_message: Option<String>) {
        self.updated_at = Utc::now();
        if status_message.is_some() {
            self.status_message = status_message;
        }
    }
}

/// Trait for storing and retrieving sessions
#[async_trait]
pub trait SessionStorage<S>: Send + Sync
where
    S: Clone + Send + Sync + 'static,
{
    async fn save(&self, session: Session<S>) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Session<S>>>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn len(&self) -> usize;

    /// Like `get`, but a missing session is an error
    async fn require(&self, id: &str) -> Result<Session<S>> {
        self.get(id)
            .await?
            .ok_or_else(|| FlowError::SessionNotFound(id.to_string()))
    }
}

/// In-memory implementation of SessionStorage
pub struct InMemorySessionStorage<S> {
    sessions: Arc<DashMap<String, Session<S>>>,
}

impl<S> InMemorySessionStorage<S> {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }
}

impl<S> Default for InMemorySessionStorage<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S> SessionStorage<S> for InMemorySessionStorage<S>
where
    S: Clone + Send + Sync + 'static,
{
    async fn save(&self, session: Session<S>) -> Result<()> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session<S>>> {
        Ok(self.sessions.get(id).map(|entry| entry.clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| FlowError::SessionNotFound(id.to_string()))
    }

    async fn len(&self) -> usize {
        self.sessions.len()
    }
}
