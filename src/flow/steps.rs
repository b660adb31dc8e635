//! Flow step enums — each flow is a fixed, linear sequence.

use serde::{Deserialize, Serialize};

/// Which guided conversation a contact is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    LeadAppointment,
    Treatment,
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LeadAppointment => write!(f, "lead_appointment"),
            Self::Treatment => write!(f, "treatment"),
        }
    }
}

/// Steps of the lead-to-appointment booking flow.
///
/// Linear, no branching back except via explicit restart:
/// Idle → WelcomeSent → AwaitingCityChoice → CitySelected →
/// AwaitingClinicChoice → ClinicSelected → AwaitingWeekChoice →
/// WeekSelected → AwaitingTimeSlot → TimeSelected →
/// AwaitingCallbackAnswer → {CallbackYes | CallbackNo}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStep {
    Idle,
    WelcomeSent,
    AwaitingCityChoice,
    CitySelected,
    AwaitingClinicChoice,
    ClinicSelected,
    AwaitingWeekChoice,
    WeekSelected,
    AwaitingTimeSlot,
    TimeSelected,
    AwaitingCallbackAnswer,
    CallbackYes,
    CallbackNo,
}

impl LeadStep {
    /// The next step in the fixed sequence, if any.
    pub fn next(&self) -> Option<LeadStep> {
        use LeadStep::*;
        match self {
            Idle => Some(WelcomeSent),
            WelcomeSent => Some(AwaitingCityChoice),
            AwaitingCityChoice => Some(CitySelected),
            CitySelected => Some(AwaitingClinicChoice),
            AwaitingClinicChoice => Some(ClinicSelected),
            ClinicSelected => Some(AwaitingWeekChoice),
            AwaitingWeekChoice => Some(WeekSelected),
            WeekSelected => Some(AwaitingTimeSlot),
            AwaitingTimeSlot => Some(TimeSelected),
            TimeSelected => Some(AwaitingCallbackAnswer),
            AwaitingCallbackAnswer => Some(CallbackYes),
            CallbackYes | CallbackNo => None,
        }
    }

    pub fn can_transition_to(&self, target: LeadStep) -> bool {
        // The callback question has two valid answers.
        if *self == LeadStep::AwaitingCallbackAnswer {
            return matches!(target, LeadStep::CallbackYes | LeadStep::CallbackNo);
        }
        self.next() == Some(target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::CallbackYes | Self::CallbackNo)
    }
}

impl std::fmt::Display for LeadStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::WelcomeSent => "welcome_sent",
            Self::AwaitingCityChoice => "awaiting_city_choice",
            Self::CitySelected => "city_selected",
            Self::AwaitingClinicChoice => "awaiting_clinic_choice",
            Self::ClinicSelected => "clinic_selected",
            Self::AwaitingWeekChoice => "awaiting_week_choice",
            Self::WeekSelected => "week_selected",
            Self::AwaitingTimeSlot => "awaiting_time_slot",
            Self::TimeSelected => "time_selected",
            Self::AwaitingCallbackAnswer => "awaiting_callback_answer",
            Self::CallbackYes => "callback_yes",
            Self::CallbackNo => "callback_no",
        };
        write!(f, "{s}")
    }
}

/// Treatment-concern category (which list of concerns to offer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcernCategory {
    Skin,
    Hair,
    Body,
}

impl ConcernCategory {
    pub fn from_reply_id(id: &str) -> Option<Self> {
        match id {
            "skin" => Some(Self::Skin),
            "hair" => Some(Self::Hair),
            "body" => Some(Self::Body),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Skin => "Skin",
            Self::Hair => "Hair",
            Self::Body => "Body",
        }
    }
}

/// Steps of the treatment-concern triage flow.
///
/// Idle → WelcomeSent → AwaitingCityChoice → CitySelected →
/// AwaitingConcernCategory → AwaitingSpecificConcern → ConcernSelected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreatmentStep {
    Idle,
    WelcomeSent,
    AwaitingCityChoice,
    CitySelected,
    AwaitingConcernCategory,
    AwaitingSpecificConcern,
    ConcernSelected,
}

impl TreatmentStep {
    pub fn next(&self) -> Option<TreatmentStep> {
        use TreatmentStep::*;
        match self {
            Idle => Some(WelcomeSent),
            WelcomeSent => Some(AwaitingCityChoice),
            AwaitingCityChoice => Some(CitySelected),
            CitySelected => Some(AwaitingConcernCategory),
            AwaitingConcernCategory => Some(AwaitingSpecificConcern),
            AwaitingSpecificConcern => Some(ConcernSelected),
            ConcernSelected => None,
        }
    }

    pub fn can_transition_to(&self, target: TreatmentStep) -> bool {
        self.next() == Some(target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ConcernSelected)
    }
}

impl std::fmt::Display for TreatmentStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::WelcomeSent => "welcome_sent",
            Self::AwaitingCityChoice => "awaiting_city_choice",
            Self::CitySelected => "city_selected",
            Self::AwaitingConcernCategory => "awaiting_concern_category",
            Self::AwaitingSpecificConcern => "awaiting_specific_concern",
            Self::ConcernSelected => "concern_selected",
        };
        write!(f, "{s}")
    }
}
