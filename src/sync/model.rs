//! CRM lead model, phone canonicalization, and the dedup key.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::FlowConfig;
use crate::flow::steps::FlowKind;
use crate::state::model::ConversationState;

/// CRM lead status set by the flow outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadStatus {
    /// Callback confirmed; an agent will call.
    Pending,
    /// Treatment concern captured; outbound call queued.
    CallInitiated,
    /// Declined or went silent.
    NoCallback,
}

impl LeadStatus {
    /// The literal status string the CRM expects.
    pub fn as_crm_value(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::CallInitiated => "Call Initiated",
            Self::NoCallback => "No Callback",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_crm_value())
    }
}

/// Canonical phone: the last 10 digits of whatever the channel or the
/// user supplied. Indian numbers arrive as `9198…`, `+91 98…`, or bare.
pub fn canonical_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 10 {
        return None;
    }
    Some(digits[digits.len() - 10..].to_string())
}

/// Split a free-text name into CRM first/last fields.
///
/// First token becomes `First_Name`; everything after it joins into
/// `Last_Name`. The CRM requires `Last_Name`, so a single token lands
/// there with an empty first name.
pub fn split_name(full: &str) -> (String, String) {
    let tokens: Vec<&str> = full.split_whitespace().collect();
    match tokens.as_slice() {
        [] => (String::new(), String::new()),
        [only] => (String::new(), (*only).to_string()),
        [first, rest @ ..] => ((*first).to_string(), rest.join(" ")),
    }
}

/// At most one lead per phone + source + calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    pub phone: String,
    pub source: String,
    pub day: NaiveDate,
}

impl DedupKey {
    pub fn new(phone: impl Into<String>, source: impl Into<String>, day: NaiveDate) -> Self {
        Self {
            phone: phone.into(),
            source: source.into(),
            day,
        }
    }

    /// Key for a lead created at `created_at`, with the day computed in
    /// the business timezone.
    pub fn for_time(
        phone: &str,
        source: &str,
        created_at: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Self {
        Self::new(phone, source, created_at.with_timezone(&offset).date_naive())
    }
}

/// One lead as pushed to the CRM and recorded locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub lead_source: String,
    pub sub_source: Option<String>,
    pub status: LeadStatus,
    /// Why this lead was created ("callback_confirmed", …).
    pub reason: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    /// CRM-side record id, once the create succeeded.
    pub crm_record_id: Option<String>,
}

impl Lead {
    pub fn dedup_key(&self, offset: FixedOffset) -> DedupKey {
        DedupKey::for_time(&self.phone, &self.lead_source, self.created_at, offset)
    }
}

/// Build the lead for a finished flow from the contact's state.
///
/// Returns `None` when no usable phone can be derived, which the caller
/// turns into [`crate::error::SyncError::NoPhone`].
pub fn build_lead(
    state: &ConversationState,
    status: LeadStatus,
    reason: &str,
    config: &FlowConfig,
    now: DateTime<Utc>,
) -> Option<Lead> {
    let phone = state
        .selections
        .corrected_phone
        .as_deref()
        .and_then(canonical_phone)
        .or_else(|| canonical_phone(&state.contact_id))?;

    let full_name = state
        .selections
        .corrected_name
        .clone()
        .unwrap_or_else(|| format!("WhatsApp User {phone}"));
    let (first_name, last_name) = split_name(&full_name);

    let treatment = matches!(state.flow_kind(), Some(FlowKind::Treatment))
        || state.selections.concern_category.is_some();
    let (lead_source, sub_source) = if treatment {
        (
            config.treatment_lead_source.clone(),
            Some(config.treatment_sub_source.clone()),
        )
    } else {
        (config.appointment_lead_source.clone(), None)
    };

    Some(Lead {
        id: Uuid::new_v4(),
        phone,
        first_name,
        last_name,
        company: config.company.clone(),
        lead_source,
        sub_source,
        status,
        reason: reason.to_string(),
        description: describe(state),
        created_at: now,
        crm_record_id: None,
    })
}

/// `Label: value` pairs joined with ` | `, skipping absent selections.
fn describe(state: &ConversationState) -> String {
    let s = &state.selections;
    let mut parts: Vec<String> = Vec::new();
    if let Some(city) = &s.city {
        parts.push(format!("City: {city}"));
    }
    if let Some(location) = &s.location {
        parts.push(format!("Location: {location}"));
    }
    if let Some(clinic) = &s.clinic {
        parts.push(format!("Clinic: {clinic}"));
    }
    if let Some(week) = &s.preferred_week {
        parts.push(format!("Preferred Date: {week}"));
    }
    if let Some(time) = &s.preferred_time {
        parts.push(format!("Preferred Time: {time}"));
    }
    if let Some(category) = &s.concern_category {
        parts.push(format!("Concern Category: {}", category.label()));
    }
    if let Some(concern) = &s.concern {
        parts.push(format!("Concern: {concern}"));
    }
    parts.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
    }

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(5 * 3600 + 1800).unwrap()
    }

    #[test]
    fn canonical_phone_takes_last_ten_digits() {
        assert_eq!(canonical_phone("919876543210").as_deref(), Some("9876543210"));
        assert_eq!(
            canonical_phone("+91 98765 43210").as_deref(),
            Some("9876543210")
        );
        assert_eq!(canonical_phone("9876543210").as_deref(), Some("9876543210"));
        assert_eq!(canonical_phone("12345"), None);
    }

    #[test]
    fn name_split_keeps_first_token_as_first_name() {
        assert_eq!(split_name("Anil"), (String::new(), "Anil".to_string()));
        assert_eq!(
            split_name("Anil Kumar Sharma"),
            ("Anil".to_string(), "Kumar Sharma".to_string())
        );
        assert_eq!(
            split_name("Priya Nair"),
            ("Priya".to_string(), "Nair".to_string())
        );
    }

    #[test]
    fn dedup_day_uses_business_timezone() {
        // 20:00 UTC on Jun 2 is already Jun 3 in IST.
        let evening = Utc.with_ymd_and_hms(2025, 6, 2, 20, 0, 0).unwrap();
        let key = DedupKey::for_time("9876543210", "Business Listing", evening, ist());
        assert_eq!(key.day, NaiveDate::from_ymd_opt(2025, 6, 3).unwrap());
    }

    #[test]
    fn appointment_lead_carries_flow_source_and_description() {
        let config = FlowConfig::default();
        let mut state = ConversationState::new("919876543210", t0());
        state.selections.city = Some("Hyderabad".to_string());
        state.selections.clinic = Some("Banjara Hills".to_string());
        state.selections.preferred_week = Some("2025-06-09 to 2025-06-15".to_string());
        state.selections.preferred_time = Some("Morning (9-11 AM)".to_string());

        let lead = build_lead(&state, LeadStatus::Pending, "callback_confirmed", &config, t0())
            .expect("phone derivable from contact id");
        assert_eq!(lead.phone, "9876543210");
        assert_eq!(lead.lead_source, "WhatsApp Lead-to-Appointment Flow");
        assert_eq!(lead.sub_source, None);
        assert_eq!(
            lead.description,
            "City: Hyderabad | Clinic: Banjara Hills | Preferred Date: 2025-06-09 to 2025-06-15 | Preferred Time: Morning (9-11 AM)"
        );
    }

    #[test]
    fn treatment_lead_uses_listing_source_with_sub_source() {
        let config = FlowConfig::default();
        let mut state = ConversationState::new("919876543210", t0());
        state.selections.city = Some("Pune".to_string());
        state.selections.concern_category = Some(crate::flow::steps::ConcernCategory::Hair);
        state.selections.concern = Some("Hair Transplant".to_string());

        let lead = build_lead(
            &state,
            LeadStatus::CallInitiated,
            "treatment_concern_selected",
            &config,
            t0(),
        )
        .unwrap();
        assert_eq!(lead.lead_source, "Business Listing");
        assert_eq!(lead.sub_source.as_deref(), Some("WhatsApp"));
        assert!(lead.description.contains("Concern: Hair Transplant"));
    }

    #[test]
    fn corrected_details_override_channel_identity() {
        let config = FlowConfig::default();
        let mut state = ConversationState::new("919876543210", t0());
        state.selections.corrected_phone = Some("9123456789".to_string());
        state.selections.corrected_name = Some("Priya Nair".to_string());

        let lead =
            build_lead(&state, LeadStatus::Pending, "callback_confirmed", &config, t0()).unwrap();
        assert_eq!(lead.phone, "9123456789");
        assert_eq!(lead.first_name, "Priya");
        assert_eq!(lead.last_name, "Nair");
    }
}
