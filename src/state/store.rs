//! Conversation state persistence seam.
//!
//! The store is injected so a durable/shared backend can be swapped in
//! without touching the orchestration core.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::StateError;
use crate::state::model::ConversationState;

/// Backend-agnostic conversation state store.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, contact_id: &str) -> Result<Option<ConversationState>, StateError>;

    async fn put(&self, state: ConversationState) -> Result<(), StateError>;

    /// Fetch the contact's record, creating a fresh one if absent.
    async fn load_or_new(
        &self,
        contact_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ConversationState, StateError> {
        Ok(self
            .get(contact_id)
            .await?
            .unwrap_or_else(|| ConversationState::new(contact_id, now)))
    }
}

/// In-memory store for single-instance deployments and tests.
#[derive(Default)]
pub struct MemoryStateStore {
    records: Arc<RwLock<HashMap<String, ConversationState>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked contacts.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, contact_id: &str) -> Result<Option<ConversationState>, StateError> {
        Ok(self.records.read().await.get(contact_id).cloned())
    }

    async fn put(&self, state: ConversationState) -> Result<(), StateError> {
        self.records
            .write()
            .await
            .insert(state.contact_id.clone(), state);
        Ok(())
    }
}
