//! Silence reminders.
//!
//! Every prompt that expects a reply arms the first reminder. Arming is
//! last-write-wins per contact and nothing is ever cancelled: each pending
//! entry remembers the activity baseline it was armed against, and the
//! fire path drops the entry as stale if the contact has spoken since.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::clock::Clock;
use crate::config::FlowConfig;

/// Which reminder in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpKind {
    /// Short nudge with a "✅ Yes" button.
    FollowUp1,
    /// Final plain-text goodbye; exhausts the chain.
    FollowUp2,
}

impl FollowUpKind {
    pub fn delay(&self, config: &FlowConfig) -> Duration {
        match self {
            Self::FollowUp1 => config.follow_up1_delay,
            Self::FollowUp2 => config.follow_up2_delay,
        }
    }
}

impl std::fmt::Display for FollowUpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FollowUp1 => write!(f, "follow_up_1"),
            Self::FollowUp2 => write!(f, "follow_up_2"),
        }
    }
}

/// One armed reminder for one contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingFollowUp {
    pub kind: FollowUpKind,
    /// The contact's `last_activity_at` when this was armed. If activity
    /// has moved past this by fire time, the reminder is stale.
    pub baseline: DateTime<Utc>,
    pub fire_at: DateTime<Utc>,
}

/// Pending-reminder registry, at most one entry per contact.
pub struct FollowUpScheduler {
    clock: Arc<dyn Clock>,
    pending: RwLock<HashMap<String, PendingFollowUp>>,
}

impl FollowUpScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Arm a reminder, replacing any pending one for this contact.
    ///
    /// Returns the entry so the caller can schedule a wake-up for
    /// `fire_at`.
    pub async fn arm(
        &self,
        contact_id: &str,
        kind: FollowUpKind,
        baseline: DateTime<Utc>,
        config: &FlowConfig,
    ) -> PendingFollowUp {
        let now = self.clock.now();
        let delay = chrono::Duration::from_std(kind.delay(config))
            .unwrap_or_else(|_| chrono::Duration::zero());
        let entry = PendingFollowUp {
            kind,
            baseline,
            fire_at: now + delay,
        };
        let mut pending = self.pending.write().await;
        pending.insert(contact_id.to_string(), entry);
        tracing::debug!(contact_id, kind = %kind, fire_at = %entry.fire_at, "reminder armed");
        entry
    }

    /// Sleep until the given entry is due, then report whether it is still
    /// the live entry for the contact. A newer arm supersedes it.
    pub async fn wait(&self, contact_id: &str, armed: PendingFollowUp) -> bool {
        let now = self.clock.now();
        if let Ok(delay) = (armed.fire_at - now).to_std() {
            self.clock.sleep(delay).await;
        }
        self.pending.read().await.get(contact_id).copied() == Some(armed)
    }

    /// Remove and return the contact's pending entry if it is due.
    ///
    /// The fire path calls this, then re-validates the baseline against
    /// the contact's current state before sending anything.
    pub async fn take_due(&self, contact_id: &str, now: DateTime<Utc>) -> Option<PendingFollowUp> {
        let mut pending = self.pending.write().await;
        match pending.get(contact_id) {
            Some(entry) if entry.fire_at <= now => pending.remove(contact_id),
            _ => None,
        }
    }

    /// The contact's pending entry, due or not.
    pub async fn peek(&self, contact_id: &str) -> Option<PendingFollowUp> {
        self.pending.read().await.get(contact_id).copied()
    }

    /// Drop the contact's pending entry without firing it.
    pub async fn clear(&self, contact_id: &str) {
        self.pending.write().await.remove(contact_id);
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }
}
