//! Flow state machines — pure decision logic.
//!
//! Given the contact's conversation state and one classified inbound event,
//! the engine mutates the state record and returns the outbound actions for
//! the caller to execute. No I/O happens here.
//!
//! A single dispatcher owns `active_flow` and routes every event to exactly
//! one machine, so neither machine ever inspects the other's state.

pub mod lead_appointment;
pub mod prompts;
pub mod steps;
pub mod treatment;
pub mod validators;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::FlowConfig;
use crate::event::{EventClass, TriggerKind};
use crate::followup::FollowUpKind;
use crate::sender::{Button, ListSection};
use crate::state::model::{locks, ActiveFlow, ConversationState};
use crate::sync::model::LeadStatus;
use steps::FlowKind;

/// One side effect for the orchestrator to execute, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundAction {
    SendText {
        text: String,
    },
    SendButtons {
        body: String,
        buttons: Vec<Button>,
    },
    SendList {
        body: String,
        button_label: String,
        sections: Vec<ListSection>,
    },
    SendTemplate {
        name: String,
        language: String,
        components: Option<Value>,
    },
    /// (Re-)arm the silence reminder for this contact.
    ArmFollowUp {
        kind: FollowUpKind,
    },
    /// Push a lead to the CRM. Runs after all sends; failures are isolated.
    SyncLead {
        status: LeadStatus,
        reason: String,
        allow_duplicate_same_day: bool,
    },
}

impl OutboundAction {
    pub fn text(text: impl Into<String>) -> Self {
        Self::SendText { text: text.into() }
    }

    /// Whether this action sends a user-visible message.
    pub fn is_send(&self) -> bool {
        matches!(
            self,
            Self::SendText { .. }
                | Self::SendButtons { .. }
                | Self::SendList { .. }
                | Self::SendTemplate { .. }
        )
    }
}

/// Event-level context the dispatcher needs beyond the state record.
#[derive(Debug, Clone, Copy)]
pub struct EventContext {
    /// Whether the event arrived on a channel allowed to run the
    /// treatment flow.
    pub treatment_channel: bool,
}

/// Routes classified events to the owning state machine.
pub struct FlowEngine {
    config: FlowConfig,
}

impl FlowEngine {
    pub fn new(config: FlowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Handle one classified event for one contact. The caller has already
    /// serialized access to this contact's state.
    pub fn handle(
        &self,
        state: &mut ConversationState,
        event: &EventClass,
        ctx: EventContext,
        now: DateTime<Utc>,
    ) -> Vec<OutboundAction> {
        state.touch_activity(now);

        match event {
            EventClass::StructuredReply { id, .. } => self.handle_reply(state, id, now),
            EventClass::PricingQuery | EventClass::JobQuery => {
                self.handle_keyword_query(state, event)
            }
            EventClass::StartTrigger(kind) => self.handle_start(state, kind, ctx, now),
            EventClass::PlainText(text) => self.handle_plain_text(state, text, ctx, now),
        }
    }

    fn handle_reply(
        &self,
        state: &mut ConversationState,
        reply_id: &str,
        now: DateTime<Utc>,
    ) -> Vec<OutboundAction> {
        if state.is_finished() {
            // Stale button tap after the flow ended; the next text restarts.
            tracing::debug!(contact_id = %state.contact_id, reply_id, "reply after terminal state ignored");
            return Vec::new();
        }
        match &state.active_flow {
            Some(ActiveFlow::LeadAppointment { .. }) => {
                lead_appointment::handle_reply(state, reply_id, now, &self.config)
            }
            Some(ActiveFlow::Treatment { .. }) => {
                treatment::handle_reply(state, reply_id, now, &self.config)
            }
            None => self.corrective(state, now),
        }
    }

    fn handle_start(
        &self,
        state: &mut ConversationState,
        kind: &TriggerKind,
        ctx: EventContext,
        now: DateTime<Utc>,
    ) -> Vec<OutboundAction> {
        if state.is_finished() {
            state.reset_for_restart();
        }

        match kind {
            TriggerKind::Booking => {
                if state.active_flow.is_some() {
                    // Mid-flow "book" text: stay where we are.
                    return Vec::new();
                }
                lead_appointment::start(state, now, &self.config)
            }
            TriggerKind::Greeting => {
                if !ctx.treatment_channel {
                    return Vec::new();
                }
                if state.active_flow.is_some() {
                    return Vec::new();
                }
                treatment::start(state, None, None, now, &self.config)
            }
            TriggerKind::AdPrefill { location, city } => {
                if !ctx.treatment_channel {
                    return Vec::new();
                }
                if state.active_flow.is_some() {
                    // A repeated prefill while a flow is live restarts only
                    // after terminal; mid-flow it is ignored.
                    return Vec::new();
                }
                treatment::start(state, city.clone(), location.clone(), now, &self.config)
            }
        }
    }

    /// Pricing / job questions get a canned answer, but only before a flow
    /// has properly begun — once the user is choosing options, their texts
    /// no longer short-circuit.
    fn handle_keyword_query(
        &self,
        state: &mut ConversationState,
        event: &EventClass,
    ) -> Vec<OutboundAction> {
        let answerable = match &state.active_flow {
            None => true,
            Some(ActiveFlow::Treatment { step }) => {
                // Welcome just went out; nothing has been selected yet.
                *step <= steps::TreatmentStep::AwaitingCityChoice
            }
            Some(ActiveFlow::LeadAppointment { .. }) => false,
        };
        if !answerable {
            return Vec::new();
        }
        let reply = match event {
            EventClass::PricingQuery => prompts::PRICING_REPLY,
            _ => prompts::JOB_REPLY,
        };
        // Informational only: no state advance, no reminder armed.
        vec![OutboundAction::text(reply)]
    }

    fn handle_plain_text(
        &self,
        state: &mut ConversationState,
        text: &str,
        ctx: EventContext,
        now: DateTime<Utc>,
    ) -> Vec<OutboundAction> {
        if state.is_finished() {
            // Explicit re-entry: any text after a terminal state restarts
            // the same flow from the top.
            let previous = state.flow_kind();
            state.reset_for_restart();
            return match previous {
                Some(FlowKind::Treatment) if ctx.treatment_channel => {
                    treatment::start(state, None, None, now, &self.config)
                }
                Some(FlowKind::LeadAppointment) | Some(FlowKind::Treatment) => {
                    lead_appointment::start(state, now, &self.config)
                }
                None => Vec::new(),
            };
        }
        // Free text mid-flow: opportunistically capture typed contact
        // details, otherwise do nothing (the armed reminder recovers
        // stalls; corrective prompts are reserved for structured replies).
        if state.active_flow.is_some() && capture_contact_details(state, text) {
            tracing::debug!(contact_id = %state.contact_id, "captured corrected contact details");
        }
        Vec::new()
    }

    /// Rate-limited generic corrective prompt.
    pub(crate) fn corrective(
        &self,
        state: &mut ConversationState,
        now: DateTime<Utc>,
    ) -> Vec<OutboundAction> {
        corrective(state, now, &self.config)
    }
}

/// Emit the corrective prompt unless one went out within the configured
/// interval (double-delivery guard when both flows could claim an event).
pub(crate) fn corrective(
    state: &mut ConversationState,
    now: DateTime<Utc>,
    config: &FlowConfig,
) -> Vec<OutboundAction> {
    if state.try_lock(locks::CORRECTIVE, config.corrective_prompt_interval, now) {
        vec![OutboundAction::text(prompts::CORRECTIVE_PROMPT)]
    } else {
        tracing::debug!(contact_id = %state.contact_id, "corrective prompt suppressed by rate limit");
        Vec::new()
    }
}

/// Capture a typed phone or name correction into the selections.
///
/// Returns true when something was stored. Used by flows at steps where
/// free text is expected to carry contact details.
pub(crate) fn capture_contact_details(state: &mut ConversationState, text: &str) -> bool {
    if let Some(phone) = validators::normalize_indian_phone(text) {
        state.selections.corrected_phone = Some(phone);
        return true;
    }
    if text.len() <= 60
        && let Some(name) = validators::extract_name(text)
    {
        state.selections.corrected_name = Some(name);
        return true;
    }
    false
}

/// Arm the first reminder — attached to every prompt that expects a reply.
pub(crate) fn arm_follow_up() -> OutboundAction {
    OutboundAction::ArmFollowUp {
        kind: FollowUpKind::FollowUp1,
    }
}
