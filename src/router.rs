//! Channel routing — which business number (credential) a send goes out on.
//!
//! Resolution priority: explicit webhook hint > the conversation's pinned
//! channel > the flow's configured default > global fallback. Pinning only
//! changes at flow boundaries so a contact mid-flow never silently hops
//! between business numbers.

use std::collections::HashMap;

use secrecy::SecretString;
use serde::Deserialize;

use crate::config::FlowConfig;
use crate::error::ConfigError;
use crate::flow::steps::FlowKind;
use crate::state::model::ConversationState;

/// One registered business number.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelRoute {
    /// Provider phone-number id (the webhook's `phone_number_id`).
    pub channel_id: String,
    /// Human-readable display address, e.g. "+91 82978 82978".
    pub display_address: String,
    /// Long-lived access token for this number.
    pub credential: SecretString,
}

/// A route resolved for one outbound send.
#[derive(Debug, Clone)]
pub struct ResolvedChannel {
    pub channel_id: String,
    pub display_address: String,
    pub credential: SecretString,
}

impl From<&ChannelRoute> for ResolvedChannel {
    fn from(route: &ChannelRoute) -> Self {
        Self {
            channel_id: route.channel_id.clone(),
            display_address: route.display_address.clone(),
            credential: route.credential.clone(),
        }
    }
}

fn digits(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}

fn last10(text: &str) -> String {
    let d = digits(text);
    if d.len() > 10 {
        d[d.len() - 10..].to_string()
    } else {
        d
    }
}

/// Static routing table plus per-flow defaults.
pub struct ChannelRouter {
    routes: HashMap<String, ChannelRoute>,
    default_appointment: Option<String>,
    default_treatment: Option<String>,
    fallback: Option<String>,
    treatment_allowed: Vec<String>,
}

impl ChannelRouter {
    pub fn new(routes: Vec<ChannelRoute>, config: &FlowConfig) -> Self {
        Self {
            routes: routes
                .into_iter()
                .map(|r| (r.channel_id.clone(), r))
                .collect(),
            default_appointment: config.default_appointment_channel.clone(),
            default_treatment: config.default_treatment_channel.clone(),
            fallback: config.fallback_channel.clone(),
            treatment_allowed: config.treatment_channel_ids.clone(),
        }
    }

    /// Resolve the channel id carried by a webhook, accepting either the
    /// provider phone-number id or a display address (matched on the last
    /// ten digits, the number without country code).
    pub fn resolve_hint(&self, hint: &str) -> Option<&ChannelRoute> {
        if let Some(route) = self.routes.get(hint) {
            return Some(route);
        }
        let hint_suffix = last10(hint);
        if hint_suffix.is_empty() {
            return None;
        }
        self.routes
            .values()
            .find(|r| last10(&r.display_address) == hint_suffix)
    }

    /// Whether the treatment flow runs on every number (empty allow-list).
    pub fn treatment_open(&self) -> bool {
        self.treatment_allowed.is_empty()
    }

    /// Whether this channel may start the treatment flow. An empty
    /// allow-list permits every registered number.
    pub fn allows_treatment(&self, channel_id: &str) -> bool {
        if self.treatment_allowed.is_empty() {
            return true;
        }
        let Some(route) = self.resolve_hint(channel_id) else {
            return false;
        };
        self.treatment_allowed.contains(&route.channel_id)
    }

    /// Resolve the send channel for a contact.
    pub fn resolve(
        &self,
        state: &ConversationState,
        hint: Option<&str>,
        flow: Option<FlowKind>,
    ) -> Result<ResolvedChannel, ConfigError> {
        if let Some(route) = hint.and_then(|h| self.resolve_hint(h)) {
            return Ok(route.into());
        }
        if let Some(pinned) = state.pinned_channel.as_deref()
            && let Some(route) = self.routes.get(pinned)
        {
            return Ok(route.into());
        }
        let default = match flow {
            Some(FlowKind::LeadAppointment) => self.default_appointment.as_deref(),
            Some(FlowKind::Treatment) => self.default_treatment.as_deref(),
            None => None,
        };
        if let Some(route) = default.and_then(|id| self.routes.get(id)) {
            return Ok(route.into());
        }
        if let Some(route) = self.fallback.as_deref().and_then(|id| self.routes.get(id)) {
            return Ok(route.into());
        }
        Err(ConfigError::NoChannelResolved {
            contact_id: state.contact_id.clone(),
        })
    }

    /// Whether a pin change is allowed: pins only move at flow boundaries.
    pub fn may_repin(state: &ConversationState) -> bool {
        match &state.active_flow {
            None => true,
            Some(flow) => flow.is_terminal() || state.is_finished(),
        }
    }
}
