//! Prompt catalog — every outbound message body, button id, and list row
//! the two flows can send. Selections are matched by these structured-reply
//! ids, never by free-text fuzzy matching.

use chrono::{DateTime, Datelike, FixedOffset, Utc};

use crate::flow::steps::ConcernCategory;
use crate::sender::{Button, ListRow, ListSection};

// ── Welcome ─────────────────────────────────────────────────────────

pub const WELCOME_BODY: &str = "Thank you for your interest in Oliva Skin & Hair Clinic — India's most trusted dermatology chain. 🌿\n\nWe're happy to assist you! Would you like to book an appointment with us today?";

pub const REPLY_BOOK: &str = "yes_book_appointment";
pub const REPLY_NOT_NOW: &str = "not_now";

pub fn welcome_buttons() -> Vec<Button> {
    vec![
        Button::new(REPLY_BOOK, "Yes, Book Now"),
        Button::new(REPLY_NOT_NOW, "Not Now"),
    ]
}

/// Template sent at the top of the treatment flow on dedicated numbers.
pub const TREATMENT_WELCOME_TEMPLATE: &str = "mr_welcome_temp";
pub const TEMPLATE_LANGUAGE: &str = "en";

// ── City selection ──────────────────────────────────────────────────

pub const CITY_PROMPT: &str = "Please select your city from the list below 👇";
pub const CITY_LIST_BUTTON: &str = "Select City";
pub const REPLY_CITY_MORE: &str = "city_more";

const CITIES_PAGE1: &[(&str, &str)] = &[
    ("city_hyderabad", "Hyderabad"),
    ("city_bangalore", "Bangalore"),
    ("city_chennai", "Chennai"),
    ("city_kolkata", "Kolkata"),
    ("city_pune", "Pune"),
    ("city_kochi", "Kochi"),
    ("city_ahmedabad", "Ahmedabad"),
    ("city_ludhiana", "Ludhiana"),
    ("city_vizag", "Vizag"),
];

const CITIES_PAGE2: &[(&str, &str)] = &[
    ("city_vizag", "Vizag"),
    ("city_vijayawada", "Vijayawada"),
    ("city_other", "Other"),
];

pub fn city_sections() -> Vec<ListSection> {
    let mut rows: Vec<ListRow> = CITIES_PAGE1
        .iter()
        .map(|(id, title)| ListRow::new(*id, *title))
        .collect();
    rows.push(ListRow::new(REPLY_CITY_MORE, "More Cities"));
    vec![ListSection {
        title: "Available Cities".to_string(),
        rows,
    }]
}

pub fn city_sections_page2() -> Vec<ListSection> {
    vec![ListSection {
        title: "More Cities".to_string(),
        rows: CITIES_PAGE2
            .iter()
            .map(|(id, title)| ListRow::new(*id, *title))
            .collect(),
    }]
}

/// Reverse lookup: structured-reply id for a stored city label.
pub fn city_id(label: &str) -> Option<&'static str> {
    CITIES_PAGE1
        .iter()
        .chain(CITIES_PAGE2.iter())
        .find(|(_, title)| title.eq_ignore_ascii_case(label))
        .map(|(id, _)| *id)
}

/// Look up a city label by structured-reply id.
pub fn city_label(reply_id: &str) -> Option<&'static str> {
    CITIES_PAGE1
        .iter()
        .chain(CITIES_PAGE2.iter())
        .find(|(id, _)| *id == reply_id)
        .map(|(_, title)| *title)
}

// ── Clinic selection ────────────────────────────────────────────────

pub const CLINIC_LIST_BUTTON: &str = "Select Clinic";

const CLINICS: &[(&str, &str, &str)] = &[
    ("city_hyderabad", "clinic_hyderabad_banjara", "Banjara Hills"),
    ("city_hyderabad", "clinic_hyderabad_jubilee", "Jubilee Hills"),
    ("city_hyderabad", "clinic_hyderabad_hitec", "HITEC City"),
    (
        "city_hyderabad",
        "clinic_hyderabad_secunderabad",
        "Secunderabad",
    ),
    ("city_bangalore", "clinic_bengaluru_koramangala", "Koramangala"),
    ("city_bangalore", "clinic_bengaluru_indiranagar", "Indiranagar"),
    ("city_bangalore", "clinic_bengaluru_whitefield", "Whitefield"),
    ("city_bangalore", "clinic_bengaluru_jayanagar", "Jayanagar"),
    ("city_chennai", "clinic_chennai_tnagar", "T. Nagar"),
    ("city_chennai", "clinic_chennai_adyar", "Adyar"),
    ("city_chennai", "clinic_chennai_anna_nagar", "Anna Nagar"),
    ("city_chennai", "clinic_chennai_velachery", "Velachery"),
    ("city_pune", "clinic_pune_koregaon", "Koregaon Park"),
    ("city_pune", "clinic_pune_baner", "Baner"),
    ("city_pune", "clinic_pune_hadapsar", "Hadapsar"),
    ("city_pune", "clinic_pune_viman_nagar", "Viman Nagar"),
    ("city_kochi", "clinic_kochi_kaloor", "Kaloor"),
    ("city_kochi", "clinic_kochi_kakkanad", "Kakkanad"),
    ("city_kochi", "clinic_kochi_edapally", "Edapally"),
];

/// Clinics offered to every city without a dedicated list.
const CLINICS_FALLBACK: &[(&str, &str)] = &[
    ("clinic_other_consultation", "Online Consultation"),
    ("clinic_other_callback", "Call Back Required"),
];

pub fn clinic_prompt(city: &str) -> String {
    format!("Great! Please choose your preferred clinic location in {city}.")
}

pub fn clinic_sections(city_reply_id: &str, city_label: &str) -> Vec<ListSection> {
    let mut rows: Vec<ListRow> = CLINICS
        .iter()
        .filter(|(city, _, _)| *city == city_reply_id)
        .map(|(_, id, title)| ListRow::new(*id, *title))
        .collect();
    if rows.is_empty() {
        rows = CLINICS_FALLBACK
            .iter()
            .map(|(id, title)| ListRow::new(*id, *title))
            .collect();
    }
    vec![ListSection {
        title: format!("{city_label} Clinics"),
        rows,
    }]
}

/// Look up a clinic label by structured-reply id, falling back to the id
/// with its prefix stripped and title-cased.
pub fn clinic_label(reply_id: &str) -> Option<String> {
    if let Some((_, _, title)) = CLINICS.iter().find(|(_, id, _)| *id == reply_id) {
        return Some((*title).to_string());
    }
    if let Some((_, title)) = CLINICS_FALLBACK.iter().find(|(id, _)| *id == reply_id) {
        return Some((*title).to_string());
    }
    if let Some(rest) = reply_id.strip_prefix("clinic_") {
        let label = rest
            .split('_')
            .skip(1)
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        if !label.is_empty() {
            return Some(label);
        }
    }
    None
}

pub fn clinic_ack(clinic: &str) -> String {
    format!("✅ Perfect! You selected {clinic}.")
}

// ── Week / time-slot selection ──────────────────────────────────────

pub const WEEK_PROMPT: &str = "When would you like to visit us? Please pick a week 👇";
pub const WEEK_LIST_BUTTON: &str = "Select Week";
pub const SLOT_PROMPT: &str = "Great! Which time of day works best for you?";

fn format_week_label(start: chrono::NaiveDate, end: chrono::NaiveDate) -> String {
    if start.month() == end.month() {
        format!("{} {}–{}", start.format("%b"), start.day(), end.day())
    } else {
        format!("{}–{}", start.format("%b %d"), end.format("%b %d"))
    }
}

/// Week options for the next four weeks, computed in the business timezone.
pub fn week_sections(now: DateTime<Utc>, offset: FixedOffset) -> Vec<ListSection> {
    let today = now.with_timezone(&offset).date_naive();
    let rows = (0..4)
        .map(|i| {
            let start = today + chrono::Duration::days(7 * i);
            let end = start + chrono::Duration::days(6);
            ListRow {
                id: format!("week_{}", start.format("%Y%m%d")),
                title: format_week_label(start, end),
                description: Some(format!("{} - {}", start.format("%b %d"), end.format("%b %d"))),
            }
        })
        .collect();
    vec![ListSection {
        title: "Available Weeks".to_string(),
        rows,
    }]
}

/// Validate a week reply id (`week_YYYYMMDD`) and render the stored label.
pub fn week_label(reply_id: &str) -> Option<String> {
    let raw = reply_id.strip_prefix("week_")?;
    let start = chrono::NaiveDate::parse_from_str(raw, "%Y%m%d").ok()?;
    let end = start + chrono::Duration::days(6);
    Some(format!("{} to {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d")))
}

const SLOTS: &[(&str, &str)] = &[
    ("slot_morning", "Morning (9-11 AM)"),
    ("slot_afternoon", "Afternoon (12-4 PM)"),
    ("slot_evening", "Evening (5-7 PM)"),
];

pub fn slot_buttons() -> Vec<Button> {
    SLOTS
        .iter()
        .map(|(id, label)| Button::new(*id, *label))
        .collect()
}

pub fn slot_label(reply_id: &str) -> Option<&'static str> {
    SLOTS
        .iter()
        .find(|(id, _)| *id == reply_id)
        .map(|(_, label)| *label)
}

// ── Callback confirmation ───────────────────────────────────────────

pub const CALLBACK_PROMPT: &str =
    "Would you like one of our agents to call you back to confirm your appointment?";
pub const REPLY_CALLBACK_YES: &str = "yes_callback";
pub const REPLY_CALLBACK_NO: &str = "no_callback";

pub fn callback_buttons() -> Vec<Button> {
    vec![
        Button::new(REPLY_CALLBACK_YES, "Yes, Call Me"),
        Button::new(REPLY_CALLBACK_NO, "No, Keep Details"),
    ]
}

pub const CALLBACK_YES_ACK: &str = "✅ Perfect! We've noted your appointment details and one of our agents will call you shortly to confirm your appointment. Thank you! 😊";
pub const CALLBACK_NO_ACK: &str = "✅ Thank you! We've saved your appointment details. You can reach out to us anytime if you need any assistance. 😊";
pub const NOT_NOW_ACK: &str = "No problem! You can reach out to us anytime to schedule your appointment. 😊";

// ── Treatment concern triage ────────────────────────────────────────

pub const CONCERN_CATEGORY_PROMPT: &str = "Which area would you like help with?";
pub const CONCERN_LIST_BUTTON: &str = "Select Concern";

/// Template shown alongside the concern-category buttons.
pub const TREATMENT_OPTIONS_TEMPLATE: &str = "treat_options_flow";

pub fn concern_category_buttons() -> Vec<Button> {
    vec![
        Button::new("skin", "Skin"),
        Button::new("hair", "Hair"),
        Button::new("body", "Body"),
    ]
}

const SKIN_CONCERNS: &[(&str, &str)] = &[
    ("acne", "Acne / Acne Scars"),
    ("pigmentation", "Pigmentation & Uneven Skin Tone"),
    ("antiaging", "Anti-Aging & Skin Rejuvenation"),
    ("laser_hair_removal", "Laser Hair Removal"),
    ("other_skin", "Other Skin Concerns"),
];

const HAIR_CONCERNS: &[(&str, &str)] = &[
    ("hair_loss", "Hair Loss / Hair Fall"),
    ("hair_transplant", "Hair Transplant"),
    ("dandruff", "Dandruff & Scalp Care"),
    ("other_hair", "Other Hair Concerns"),
];

const BODY_CONCERNS: &[(&str, &str)] = &[
    ("weight_management", "Weight Management"),
    ("body_contouring", "Body Contouring"),
    ("weight_loss", "Weight Loss"),
    ("other_body", "Other Body Concerns"),
];

fn concerns_for(category: ConcernCategory) -> &'static [(&'static str, &'static str)] {
    match category {
        ConcernCategory::Skin => SKIN_CONCERNS,
        ConcernCategory::Hair => HAIR_CONCERNS,
        ConcernCategory::Body => BODY_CONCERNS,
    }
}

pub fn concern_prompt(category: ConcernCategory) -> String {
    format!("Please select your {} concern:", category.label())
}

pub fn concern_sections(category: ConcernCategory) -> Vec<ListSection> {
    vec![ListSection {
        title: format!("{} Concerns", category.label()),
        rows: concerns_for(category)
            .iter()
            .map(|(id, title)| ListRow::new(*id, *title))
            .collect(),
    }]
}

pub fn concern_label(category: ConcernCategory, reply_id: &str) -> Option<&'static str> {
    concerns_for(category)
        .iter()
        .find(|(id, _)| *id == reply_id)
        .map(|(_, title)| *title)
}

/// Template shown before the concern list for each category.
pub fn concern_template(category: ConcernCategory) -> &'static str {
    match category {
        ConcernCategory::Skin => "skin_treat_flow",
        ConcernCategory::Hair => "hair_treat_flow",
        ConcernCategory::Body => "body_treat_flow",
    }
}

pub const CONCERN_ACK: &str = "✅ Thank you! Our team will reach out shortly to discuss your concern and guide you on the next steps. 😊";

// ── Canned replies and reminders ────────────────────────────────────

pub const CORRECTIVE_PROMPT: &str = "Please pick one of the options above so we can help you further. 🙏";

pub const PRICING_REPLY: &str = "Our consultation fee varies by clinic and treatment. Your first consultation includes a detailed skin/hair analysis by a dermatologist. Reply \"book\" and we'll help you schedule one at your nearest clinic!";

pub const JOB_REPLY: &str = "Thank you for your interest in working with Oliva! Please share your resume at careers@olivaclinic.com and our HR team will get in touch. 🌿";

pub const FOLLOW_UP_1_BODY: &str =
    "👋 Hi! Just checking in — are we still connected?\n\nReply to continue. 💬";
pub const REPLY_FOLLOW_UP_YES: &str = "followup_yes";

pub fn follow_up1_buttons() -> Vec<Button> {
    vec![Button::new(REPLY_FOLLOW_UP_YES, "✅ Yes")]
}

pub const FOLLOW_UP_2_BODY: &str = "No problem! You can reach out anytime to schedule your appointment.\n\n✅ 8 lakh+ clients have trusted Oliva & experienced visible transformation\n\nWe'll be right here whenever you're ready to start your journey. 🌿";
