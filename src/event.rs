//! Inbound event model and classification.
//!
//! Every webhook event is classified exactly once into a tagged
//! [`EventClass`] before any flow-specific logic runs, so the two state
//! machines never re-derive "is this a trigger?" from raw text.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Whether a structured reply came from a button or a list row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Button,
    List,
}

/// Payload of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPayload {
    Text(String),
    Reply {
        kind: ReplyKind,
        id: String,
        title: String,
    },
}

/// One inbound webhook event, as handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// The end-user's channel address (WhatsApp id).
    pub contact_id: String,
    /// Destination channel id from the webhook metadata, if present.
    pub channel_hint: Option<String>,
    pub payload: InboundPayload,
    pub timestamp: DateTime<Utc>,
}

/// What kind of start trigger a text message was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerKind {
    /// Booking keyword ("book", "appointment", …) — appointment flow.
    Booking,
    /// Plain greeting ("hi", "hello") — treatment flow on a dedicated
    /// channel.
    Greeting,
    /// Meta ad click-to-WhatsApp prefill phrase, optionally carrying a
    /// location and city extracted from the phrase.
    AdPrefill {
        location: Option<String>,
        city: Option<String>,
    },
}

/// Classification of one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventClass {
    StartTrigger(TriggerKind),
    PricingQuery,
    JobQuery,
    StructuredReply { kind: ReplyKind, id: String },
    /// Free text that matched nothing above; carries the original text so
    /// flows can capture typed contact details.
    PlainText(String),
}

static PREFILL_WITH_CLINIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^hi,?\s*oliva\s+i\s+want\s+to\s+know\s+more\s+about\s+services\s+in\s+([a-z\s]+),\s*([a-z\s]+)\s+clinic$")
        .expect("prefill regex is valid")
});

static PREFILL_GENERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^hi,?\s*oliva\s+i\s+want\s+to\s+know\s+more\s+about\s+your\s+services$")
        .expect("prefill regex is valid")
});

static GREETINGS: &[&str] = &["hi", "hello", "hlo"];

static BOOKING_KEYWORDS: &[&str] = &[
    "book",
    "appointment",
    "inquire",
    "inquiry",
    "consultation",
    "visit",
    "schedule",
];

static PRICING_KEYWORDS: &[&str] = &[
    "price",
    "pricing",
    "cost",
    "fee",
    "charges",
    "how much",
];

static JOB_KEYWORDS: &[&str] = &["job", "vacancy", "vacancies", "career", "hiring"];

/// Lowercase, trim, straighten curly quotes, collapse whitespace.
fn normalize(text: &str) -> String {
    let replaced = text
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201c}', '\u{201d}'], "\"");
    let lowered = replaced.to_lowercase();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn contains_keyword(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| text.contains(kw))
}

fn title_case(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Classify one inbound event. Evaluated once, before any flow logic.
///
/// Precedence: structured replies pass through untouched; for text,
/// domain keyword queries (job, pricing) win over start triggers so that
/// "consultation fee" is answered with the fee blurb instead of starting
/// the booking flow.
pub fn classify(payload: &InboundPayload) -> EventClass {
    let raw = match payload {
        InboundPayload::Reply { kind, id, .. } => {
            return EventClass::StructuredReply {
                kind: *kind,
                id: id.clone(),
            };
        }
        InboundPayload::Text(text) => text,
    };
    let text = normalize(raw);

    if contains_keyword(&text, JOB_KEYWORDS) {
        return EventClass::JobQuery;
    }
    if contains_keyword(&text, PRICING_KEYWORDS) {
        return EventClass::PricingQuery;
    }

    if let Some(caps) = PREFILL_WITH_CLINIC.captures(&text) {
        let location = caps.get(1).map(|m| title_case(m.as_str().trim()));
        let city = caps.get(2).map(|m| title_case(m.as_str().trim()));
        return EventClass::StartTrigger(TriggerKind::AdPrefill { location, city });
    }
    if PREFILL_GENERIC.is_match(&text) {
        return EventClass::StartTrigger(TriggerKind::AdPrefill {
            location: None,
            city: None,
        });
    }
    if GREETINGS.contains(&text.as_str()) {
        return EventClass::StartTrigger(TriggerKind::Greeting);
    }
    if contains_keyword(&text, BOOKING_KEYWORDS) {
        return EventClass::StartTrigger(TriggerKind::Booking);
    }

    EventClass::PlainText(raw.trim().to_string())
}
