//! Configuration types.

use std::time::Duration;

use chrono::FixedOffset;

/// Orchestration core configuration.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Delay before the first "still there?" reminder.
    pub follow_up1_delay: Duration,
    /// Delay between the first and the second reminder.
    pub follow_up2_delay: Duration,
    /// TTL of the welcome soft lock — duplicate start triggers inside this
    /// window are swallowed instead of re-sending the welcome.
    pub welcome_lock_ttl: Duration,
    /// Minimum spacing between corrective "pick one of the options" prompts
    /// for one contact.
    pub corrective_prompt_interval: Duration,
    /// UTC offset used for the lead dedup calendar day.
    pub dedup_day_offset: FixedOffset,
    /// `Lead_Source` for leads produced by the appointment-booking flow.
    pub appointment_lead_source: String,
    /// `Lead_Source` for leads produced by the treatment triage flow.
    pub treatment_lead_source: String,
    /// `Sub_Source` attached to treatment-flow leads.
    pub treatment_sub_source: String,
    /// Company name stamped on every CRM lead.
    pub company: String,
    /// Channel ids allowed to start the treatment flow. Empty = any.
    pub treatment_channel_ids: Vec<String>,
    /// Default channel id for appointment-flow sends when nothing is pinned.
    pub default_appointment_channel: Option<String>,
    /// Default channel id for treatment-flow sends when nothing is pinned.
    pub default_treatment_channel: Option<String>,
    /// Global fallback channel id.
    pub fallback_channel: Option<String>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            follow_up1_delay: Duration::from_secs(2 * 60),
            follow_up2_delay: Duration::from_secs(30 * 60),
            welcome_lock_ttl: Duration::from_secs(10),
            corrective_prompt_interval: Duration::from_secs(15),
            // IST — the deployment's server timezone.
            dedup_day_offset: FixedOffset::east_opt(5 * 3600 + 1800)
                .expect("IST offset is in range"),
            appointment_lead_source: "WhatsApp Lead-to-Appointment Flow".to_string(),
            treatment_lead_source: "Business Listing".to_string(),
            treatment_sub_source: "WhatsApp".to_string(),
            company: "Oliva Skin & Hair Clinic".to_string(),
            treatment_channel_ids: Vec::new(),
            default_appointment_channel: None,
            default_treatment_channel: None,
            fallback_channel: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delays_match_reminder_chain() {
        let cfg = FlowConfig::default();
        assert!(cfg.follow_up1_delay < cfg.follow_up2_delay);
        assert_eq!(cfg.dedup_day_offset.local_minus_utc(), 5 * 3600 + 1800);
    }
}
