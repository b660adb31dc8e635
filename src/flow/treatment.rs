//! Treatment-concern triage flow.
//!
//! Runs only on dedicated marketing numbers. Welcome template + city list
//! go out together, then city → concern category → specific concern, and
//! the flow completes with a call-initiated lead.

use chrono::{DateTime, Utc};

use crate::config::FlowConfig;
use crate::flow::steps::{ConcernCategory, TreatmentStep};
use crate::flow::{arm_follow_up, corrective, prompts, OutboundAction};
use crate::state::model::{locks, ActiveFlow, ConversationState};
use crate::sync::model::LeadStatus;

fn set_step(state: &mut ConversationState, step: TreatmentStep) {
    state.active_flow = Some(ActiveFlow::Treatment { step });
}

fn city_list_action() -> OutboundAction {
    OutboundAction::SendList {
        body: prompts::CITY_PROMPT.to_string(),
        button_label: prompts::CITY_LIST_BUTTON.to_string(),
        sections: prompts::city_sections(),
    }
}

fn category_actions() -> Vec<OutboundAction> {
    vec![
        OutboundAction::SendTemplate {
            name: prompts::TREATMENT_OPTIONS_TEMPLATE.to_string(),
            language: prompts::TEMPLATE_LANGUAGE.to_string(),
            components: None,
        },
        OutboundAction::SendButtons {
            body: prompts::CONCERN_CATEGORY_PROMPT.to_string(),
            buttons: prompts::concern_category_buttons(),
        },
        arm_follow_up(),
    ]
}

fn concern_actions(category: ConcernCategory) -> Vec<OutboundAction> {
    vec![
        OutboundAction::SendTemplate {
            name: prompts::concern_template(category).to_string(),
            language: prompts::TEMPLATE_LANGUAGE.to_string(),
            components: None,
        },
        OutboundAction::SendList {
            body: prompts::concern_prompt(category),
            button_label: prompts::CONCERN_LIST_BUTTON.to_string(),
            sections: prompts::concern_sections(category),
        },
        arm_follow_up(),
    ]
}

/// Enter the flow from a greeting or an ad-click prefill phrase.
///
/// The prefill phrase may already name a city and clinic location; both
/// are stored, but the city list still goes out so the contact confirms.
pub(crate) fn start(
    state: &mut ConversationState,
    city: Option<String>,
    location: Option<String>,
    now: DateTime<Utc>,
    config: &FlowConfig,
) -> Vec<OutboundAction> {
    if !state.try_lock(locks::WELCOME, config.welcome_lock_ttl, now) {
        tracing::debug!(contact_id = %state.contact_id, "duplicate welcome trigger swallowed");
        return Vec::new();
    }
    state.selections.city = city;
    state.selections.location = location;
    set_step(state, TreatmentStep::AwaitingCityChoice);
    tracing::info!(contact_id = %state.contact_id, flow = "treatment", "flow started");
    vec![
        OutboundAction::SendTemplate {
            name: prompts::TREATMENT_WELCOME_TEMPLATE.to_string(),
            language: prompts::TEMPLATE_LANGUAGE.to_string(),
            components: None,
        },
        city_list_action(),
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
    let Some(step) = state.treatment_step() else {
        return Vec::new();
    };

    if reply_id == prompts::REPLY_FOLLOW_UP_YES {
        return reprompt(state);
    }

    match step {
        TreatmentStep::AwaitingCityChoice => {
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
                    set_step(state, TreatmentStep::AwaitingConcernCategory);
                    category_actions()
                }
                None => corrective(state, now, config),
            }
        }

        TreatmentStep::AwaitingConcernCategory => match ConcernCategory::from_reply_id(reply_id) {
            Some(category) => {
                state.selections.concern_category = Some(category);
                set_step(state, TreatmentStep::AwaitingSpecificConcern);
                concern_actions(category)
            }
            None => corrective(state, now, config),
        },

        TreatmentStep::AwaitingSpecificConcern => {
            let Some(category) = state.selections.concern_category else {
                return corrective(state, now, config);
            };
            match prompts::concern_label(category, reply_id) {
                Some(concern) => {
                    state.selections.concern = Some(concern.to_string());
                    set_step(state, TreatmentStep::ConcernSelected);
                    let allow_duplicate = state.declined_same_day(now, config.dedup_day_offset);
                    state.mark_completed(now);
                    tracing::info!(contact_id = %state.contact_id, concern, "treatment flow completed");
                    vec![
                        OutboundAction::text(prompts::CONCERN_ACK),
                        OutboundAction::SyncLead {
                            status: LeadStatus::CallInitiated,
                            reason: "treatment_concern_selected".to_string(),
                            allow_duplicate_same_day: allow_duplicate,
                        },
                    ]
                }
                None => corrective(state, now, config),
            }
        }

        TreatmentStep::Idle
        | TreatmentStep::WelcomeSent
        | TreatmentStep::CitySelected
        | TreatmentStep::ConcernSelected => Vec::new(),
    }
}

/// Repeat the prompt for the step the contact is currently waiting on.
pub(crate) fn reprompt(state: &mut ConversationState) -> Vec<OutboundAction> {
    let Some(step) = state.treatment_step() else {
        return Vec::new();
    };
    match step {
        TreatmentStep::AwaitingCityChoice => vec![city_list_action(), arm_follow_up()],
        TreatmentStep::AwaitingConcernCategory => category_actions(),
        TreatmentStep::AwaitingSpecificConcern => match state.selections.concern_category {
            Some(category) => concern_actions(category),
            None => Vec::new(),
        },
        _ => Vec::new(),
    }
}
