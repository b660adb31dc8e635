//! Conversation state — one record per contact address.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::steps::{ConcernCategory, FlowKind, LeadStep, TreatmentStep};

/// Soft-lock names used by the flow engine.
pub mod locks {
    /// Swallows duplicate welcome sends from retried start triggers.
    pub const WELCOME: &str = "welcome";
    /// Rate-limits the generic "pick one of the options" prompt.
    pub const CORRECTIVE: &str = "corrective";
}

/// The active flow together with its flow-specific step.
///
/// Keeping the step inside the variant makes a LeadAppointment record with
/// a treatment step unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum ActiveFlow {
    LeadAppointment { step: LeadStep },
    Treatment { step: TreatmentStep },
}

impl ActiveFlow {
    pub fn kind(&self) -> FlowKind {
        match self {
            Self::LeadAppointment { .. } => FlowKind::LeadAppointment,
            Self::Treatment { .. } => FlowKind::Treatment,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            Self::LeadAppointment { step } => step.is_terminal(),
            Self::Treatment { step } => step.is_terminal(),
        }
    }
}

/// Flow-local selections accumulated while walking a flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selections {
    pub city: Option<String>,
    pub clinic: Option<String>,
    pub location: Option<String>,
    pub concern_category: Option<ConcernCategory>,
    pub concern: Option<String>,
    pub preferred_week: Option<String>,
    pub preferred_time: Option<String>,
    pub corrected_phone: Option<String>,
    pub corrected_name: Option<String>,
}

/// How the last flow for this contact ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowOutcome {
    Completed,
    /// Explicit "Not Now" decline.
    Declined,
    /// Went silent through both reminders.
    Abandoned,
}

/// Per-contact mutable conversation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub contact_id: String,
    pub active_flow: Option<ActiveFlow>,
    pub selections: Selections,
    /// Channel this conversation's outbound sends are pinned to.
    pub pinned_channel: Option<String>,
    /// Short-TTL re-entrancy guards keyed by lock name.
    pub soft_locks: HashMap<String, DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub abandoned_at: Option<DateTime<Utc>>,
    /// Set when a same-day decline happened; a later completion that day
    /// syncs with `allow_duplicate_same_day`.
    pub declined_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<FlowOutcome>,
}

impl ConversationState {
    pub fn new(contact_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            contact_id: contact_id.into(),
            active_flow: None,
            selections: Selections::default(),
            pinned_channel: None,
            soft_locks: HashMap::new(),
            last_activity_at: now,
            completed_at: None,
            abandoned_at: None,
            declined_at: None,
            last_outcome: None,
        }
    }

    pub fn flow_kind(&self) -> Option<FlowKind> {
        self.active_flow.as_ref().map(ActiveFlow::kind)
    }

    pub fn lead_step(&self) -> Option<LeadStep> {
        match &self.active_flow {
            Some(ActiveFlow::LeadAppointment { step }) => Some(*step),
            _ => None,
        }
    }

    pub fn treatment_step(&self) -> Option<TreatmentStep> {
        match &self.active_flow {
            Some(ActiveFlow::Treatment { step }) => Some(*step),
            _ => None,
        }
    }

    /// Whether the current flow has reached a terminal marker.
    pub fn is_finished(&self) -> bool {
        self.completed_at.is_some() || self.abandoned_at.is_some()
    }

    /// Record inbound activity (used by the follow-up baseline check).
    pub fn touch_activity(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }

    /// Acquire a named soft lock.
    ///
    /// Returns false while a previous acquisition is still inside `ttl` —
    /// the caller must swallow its send. On success the lock timestamp is
    /// refreshed to `now`.
    pub fn try_lock(&mut self, name: &str, ttl: Duration, now: DateTime<Utc>) -> bool {
        if let Some(acquired_at) = self.soft_locks.get(name) {
            let age = now.signed_duration_since(*acquired_at);
            if age < chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero()) {
                return false;
            }
        }
        self.soft_locks.insert(name.to_string(), now);
        true
    }

    pub fn clear_locks(&mut self) {
        self.soft_locks.clear();
    }

    /// Reset flow-local fields for an explicit restart or a flow switch.
    ///
    /// Keeps `pinned_channel` as a routing preference hint and keeps
    /// `declined_at` so a same-day re-engagement can request a duplicate
    /// lead.
    pub fn reset_for_restart(&mut self) {
        self.active_flow = None;
        self.selections = Selections::default();
        self.soft_locks.clear();
        self.completed_at = None;
        self.abandoned_at = None;
    }

    /// Mark the flow completed and clear re-entrancy guards.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.completed_at = Some(now);
        self.last_outcome = Some(FlowOutcome::Completed);
        self.clear_locks();
    }

    /// Mark the flow declined ("Not Now"). Terminal; remembers the decline
    /// for same-day duplicate-lead handling.
    pub fn mark_declined(&mut self, now: DateTime<Utc>) {
        self.completed_at = Some(now);
        self.declined_at = Some(now);
        self.last_outcome = Some(FlowOutcome::Declined);
        self.clear_locks();
    }

    /// Mark the flow abandoned (reminder chain exhausted).
    pub fn mark_abandoned(&mut self, now: DateTime<Utc>) {
        self.abandoned_at = Some(now);
        self.last_outcome = Some(FlowOutcome::Abandoned);
        self.clear_locks();
    }

    /// Whether a decline was recorded on the same calendar day as `now`
    /// in the given timezone offset.
    pub fn declined_same_day(&self, now: DateTime<Utc>, offset: chrono::FixedOffset) -> bool {
        match self.declined_at {
            Some(declined) => {
                declined.with_timezone(&offset).date_naive()
                    == now.with_timezone(&offset).date_naive()
            }
            None => false,
        }
    }
}
