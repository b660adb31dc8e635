//! Lead-to-appointment booking flow.
//!
//! Welcome → city → clinic → week → time slot → callback confirmation.
//! Selections are matched by structured-reply id only; anything else at an
//! awaiting step draws the rate-limited corrective prompt.

use chrono::{DateTime, Utc};

use crate::config::FlowConfig;
use crate::flow::steps::LeadStep;
use crate::flow::{arm_follow_up, corrective, prompts, OutboundAction};
use crate::state::model::{locks, ActiveFlow, ConversationState};
use crate::sync::model::LeadStatus;

fn set_step(state: &mut ConversationState, step: LeadStep) {
    state.active_flow = Some(ActiveFlow::LeadAppointment { step });
}

fn city_list_action() -> OutboundAction {
    OutboundAction::SendList {
        body: prompts::CITY_PROMPT.to_string(),
        button_label: prompts::CITY_LIST_BUTTON.to_string(),
        sections: prompts::city_sections(),
    }
}

fn clinic_list_action(city_label: &str) -> OutboundAction {
    let city_id = prompts::city_id(city_label).unwrap_or("city_other");
    OutboundAction::SendList {
        body: prompts::clinic_prompt(city_label),
        button_label: prompts::CLINIC_LIST_BUTTON.to_string(),
        sections: prompts::clinic_sections(city_id, city_label),
    }
}

fn week_list_action(now: DateTime<Utc>, config: &FlowConfig) -> OutboundAction {
    OutboundAction::SendList {
        body: prompts::WEEK_PROMPT.to_string(),
        button_label: prompts::WEEK_LIST_BUTTON.to_string(),
        sections: prompts::week_sections(now, config.dedup_day_offset),
    }
}

fn slot_buttons_action() -> OutboundAction {
    OutboundAction::SendButtons {
        body: prompts::SLOT_PROMPT.to_string(),
        buttons: prompts::slot_buttons(),
    }
}

fn callback_buttons_action() -> OutboundAction {
    OutboundAction::SendButtons {
        body: prompts::CALLBACK_PROMPT.to_string(),
        buttons: prompts::callback_buttons(),
    }
}

/// Enter the flow from a booking start trigger.
///
/// A duplicate trigger inside the welcome soft-lock TTL is swallowed so
/// provider webhook retries never double-send the welcome.
pub(crate) fn start(
    state: &mut ConversationState,
    now: DateTime<Utc>,
    config: &FlowConfig,
) -> Vec<OutboundAction> {
    if !state.try_lock(locks::WELCOME, config.welcome_lock_ttl, now) {
        tracing::debug!(contact_id = %state.contact_id, "duplicate welcome trigger swallowed");
        return Vec::new();
    }
    set_step(state, LeadStep::WelcomeSent);
    tracing::info!(contact_id = %state.contact_id, flow = "lead_appointment", "flow started");
    vec![
        OutboundAction::SendButtons {
            body: prompts::WELCOME_BODY.to_string(),
            buttons: prompts::welcome_buttons(),
        },
        arm_follow_up(),
    ]
}

/// Handle a structured reply while this flow is active.
pub(crate) fn handle_reply(
    state: &mut ConversationState,
    reply_id: &str,
    now: DateTime<Utc>,
    config: &FlowConfig,
) -> Vec<OutboundAction> {
    let Some(step) = state.lead_step() else {
        return Vec::new();
    };

    if reply_id == prompts::REPLY_FOLLOW_UP_YES {
        // Re-engagement from the first reminder: repeat the pending prompt.
        return reprompt(state, now, config);
    }

    match step {
        LeadStep::WelcomeSent => match reply_id {
            prompts::REPLY_BOOK => {
                set_step(state, LeadStep::AwaitingCityChoice);
                vec![city_list_action(), arm_follow_up()]
            }
            prompts::REPLY_NOT_NOW => {
                state.mark_declined(now);
                tracing::info!(contact_id = %state.contact_id, "welcome declined");
                vec![
                    OutboundAction::text(prompts::NOT_NOW_ACK),
                    OutboundAction::SyncLead {
                        status: LeadStatus::NoCallback,
                        reason: "declined_welcome".to_string(),
                        allow_duplicate_same_day: false,
                    },
                ]
            }
            _ => corrective(state, now, config),
        },

        LeadStep::AwaitingCityChoice => {
            if reply_id == prompts::REPLY_CITY_MORE {
                return vec![
                    OutboundAction::SendList {
                        body: prompts::CITY_PROMPT.to_string(),
                        button_label: prompts::CITY_LIST_BUTTON.to_string(),
                        sections: prompts::city_sections_page2(),
                    },
                    arm_follow_up(),
                ];
            }
            match prompts::city_label(reply_id) {
                Some(city) => {
                    state.selections.city = Some(city.to_string());
                    // Passes through CitySelected to the next prompt.
                    set_step(state, LeadStep::AwaitingClinicChoice);
                    vec![clinic_list_action(city), arm_follow_up()]
                }
                None => corrective(state, now, config),
            }
        }

        LeadStep::AwaitingClinicChoice => match prompts::clinic_label(reply_id) {
            Some(clinic) => {
                state.selections.clinic = Some(clinic.clone());
                set_step(state, LeadStep::AwaitingWeekChoice);
                vec![
                    OutboundAction::text(prompts::clinic_ack(&clinic)),
                    week_list_action(now, config),
                    arm_follow_up(),
                ]
            }
            None => corrective(state, now, config),
        },

        LeadStep::AwaitingWeekChoice => match prompts::week_label(reply_id) {
            Some(week) => {
                state.selections.preferred_week = Some(week);
                set_step(state, LeadStep::AwaitingTimeSlot);
                vec![slot_buttons_action(), arm_follow_up()]
            }
            None => corrective(state, now, config),
        },

        LeadStep::AwaitingTimeSlot => match prompts::slot_label(reply_id) {
            Some(slot) => {
                state.selections.preferred_time = Some(slot.to_string());
                set_step(state, LeadStep::AwaitingCallbackAnswer);
                vec![callback_buttons_action(), arm_follow_up()]
            }
            None => corrective(state, now, config),
        },

        LeadStep::AwaitingCallbackAnswer => match reply_id {
            prompts::REPLY_CALLBACK_YES => {
                set_step(state, LeadStep::CallbackYes);
                let allow_duplicate = state.declined_same_day(now, config.dedup_day_offset);
                state.mark_completed(now);
                tracing::info!(contact_id = %state.contact_id, "appointment flow completed, callback confirmed");
                vec![
                    OutboundAction::text(prompts::CALLBACK_YES_ACK),
                    OutboundAction::SyncLead {
                        status: LeadStatus::Pending,
                        reason: "callback_confirmed".to_string(),
                        allow_duplicate_same_day: allow_duplicate,
                    },
                ]
            }
            prompts::REPLY_CALLBACK_NO => {
                set_step(state, LeadStep::CallbackNo);
                let allow_duplicate = state.declined_same_day(now, config.dedup_day_offset);
                state.mark_completed(now);
                vec![
                    OutboundAction::text(prompts::CALLBACK_NO_ACK),
                    OutboundAction::SyncLead {
                        status: LeadStatus::NoCallback,
                        reason: "negative_callback_response".to_string(),
                        allow_duplicate_same_day: allow_duplicate,
                    },
                ]
            }
            _ => corrective(state, now, config),
        },

        // Terminal and transient markers never rest; nothing to consume.
        LeadStep::Idle
        | LeadStep::CitySelected
        | LeadStep::ClinicSelected
        | LeadStep::WeekSelected
        | LeadStep::TimeSelected
        | LeadStep::CallbackYes
        | LeadStep::CallbackNo => Vec::new(),
    }
}

/// Repeat the prompt for the step the contact is currently waiting on.
pub(crate) fn reprompt(
    state: &mut ConversationState,
    now: DateTime<Utc>,
    config: &FlowConfig,
) -> Vec<OutboundAction> {
    let Some(step) = state.lead_step() else {
        return Vec::new();
    };
    let prompt = match step {
        LeadStep::WelcomeSent => OutboundAction::SendButtons {
            body: prompts::WELCOME_BODY.to_string(),
            buttons: prompts::welcome_buttons(),
        },
        LeadStep::AwaitingCityChoice => city_list_action(),
        LeadStep::AwaitingClinicChoice => {
            let city = state.selections.city.clone().unwrap_or_default();
            clinic_list_action(&city)
        }
        LeadStep::AwaitingWeekChoice => week_list_action(now, config),
        LeadStep::AwaitingTimeSlot => slot_buttons_action(),
        LeadStep::AwaitingCallbackAnswer => callback_buttons_action(),
        _ => return Vec::new(),
    };
    vec![prompt, arm_follow_up()]
}
