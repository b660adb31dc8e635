//! End-to-end conversation scenarios through the orchestrator, with the
//! provider, CRM, and clock replaced by test doubles.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use leadflow::clock::Clock;
use chrono::{TimeZone, Utc};
use secrecy::SecretString;
use tokio::sync::{Mutex, RwLock};

use leadflow::clock::test_support::ManualClock;
use leadflow::config::FlowConfig;
use leadflow::error::{CrmError, SendError};
use leadflow::event::{InboundMessage, InboundPayload, ReplyKind};
use leadflow::flow::FlowEngine;
use leadflow::followup::{FollowUpKind, FollowUpScheduler};
use leadflow::orchestrator::Orchestrator;
use leadflow::router::{ChannelRoute, ChannelRouter, ResolvedChannel};
use leadflow::sender::{Button, ListSection, MessageId, Sender};
use leadflow::state::store::{MemoryStateStore, StateStore};
use leadflow::sync::model::{DedupKey, Lead, LeadStatus};
use leadflow::sync::{CrmClient, LeadSyncService, MemoryLeadStore};

const TREATMENT_CHANNEL: &str = "848542381673826";
const APPOINTMENT_CHANNEL: &str = "859830643878412";
const CONTACT: &str = "919876543210";

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Sent {
    Text { channel: String, text: String },
    Buttons { channel: String, ids: Vec<String> },
    List { channel: String, row_ids: Vec<String> },
    Template { channel: String, name: String },
}

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<Sent>>,
    fail_next: AtomicBool,
}

impl RecordingSender {
    async fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.sent.lock().await)
    }

    async fn record(&self, message: Sent) -> Result<MessageId, SendError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(SendError::Transient {
                channel: "test".to_string(),
                reason: "provider timeout".to_string(),
            });
        }
        self.sent.lock().await.push(message);
        Ok("wamid.test".to_string())
    }
}

#[async_trait]
impl Sender for RecordingSender {
    async fn send_text(
        &self,
        channel: &ResolvedChannel,
        _to: &str,
        text: &str,
    ) -> Result<MessageId, SendError> {
        self.record(Sent::Text {
            channel: channel.channel_id.clone(),
            text: text.to_string(),
        })
        .await
    }

    async fn send_buttons(
        &self,
        channel: &ResolvedChannel,
        _to: &str,
        _body: &str,
        buttons: &[Button],
    ) -> Result<MessageId, SendError> {
        self.record(Sent::Buttons {
            channel: channel.channel_id.clone(),
            ids: buttons.iter().map(|b| b.id.clone()).collect(),
        })
        .await
    }

    async fn send_list(
        &self,
        channel: &ResolvedChannel,
        _to: &str,
        _body: &str,
        _button_label: &str,
        sections: &[ListSection],
    ) -> Result<MessageId, SendError> {
        self.record(Sent::List {
            channel: channel.channel_id.clone(),
            row_ids: sections
                .iter()
                .flat_map(|s| s.rows.iter().map(|r| r.id.clone()))
                .collect(),
        })
        .await
    }

    async fn send_template(
        &self,
        channel: &ResolvedChannel,
        _to: &str,
        name: &str,
        _language: &str,
        _components: Option<&serde_json::Value>,
    ) -> Result<MessageId, SendError> {
        self.record(Sent::Template {
            channel: channel.channel_id.clone(),
            name: name.to_string(),
        })
        .await
    }
}

#[derive(Default)]
struct FakeCrm {
    creates: AtomicUsize,
    leads: RwLock<Vec<Lead>>,
}

#[async_trait]
impl CrmClient for FakeCrm {
    async fn find_lead(&self, _key: &DedupKey) -> Result<Option<String>, CrmError> {
        Ok(None)
    }

    async fn create_lead(&self, lead: &Lead) -> Result<String, CrmError> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst);
        self.leads.write().await.push(lead.clone());
        Ok(format!("crm-{}", n + 1))
    }

    async fn refresh_token(&self) -> Result<(), CrmError> {
        Ok(())
    }
}

struct Harness {
    orchestrator: Arc<Orchestrator>,
    clock: Arc<ManualClock>,
    sender: Arc<RecordingSender>,
    crm: Arc<FakeCrm>,
    store: Arc<MemoryStateStore>,
    scheduler: Arc<FollowUpScheduler>,
}

/// Capture tracing output per test; `RUST_LOG` controls verbosity.
fn init_tracing() {
    static TRACING: Once = Once::new();
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn harness() -> Harness {
    init_tracing();
    let config = FlowConfig {
        treatment_channel_ids: vec![TREATMENT_CHANNEL.to_string()],
        default_treatment_channel: Some(TREATMENT_CHANNEL.to_string()),
        default_appointment_channel: Some(APPOINTMENT_CHANNEL.to_string()),
        fallback_channel: Some(APPOINTMENT_CHANNEL.to_string()),
        ..FlowConfig::default()
    };
    let routes = vec![
        ChannelRoute {
            channel_id: TREATMENT_CHANNEL.to_string(),
            display_address: "+91 82978 82978".to_string(),
            credential: SecretString::from("token-a"),
        },
        ChannelRoute {
            channel_id: APPOINTMENT_CHANNEL.to_string(),
            display_address: "+91 76176 13030".to_string(),
            credential: SecretString::from("token-b"),
        },
    ];

    let clock = Arc::new(ManualClock::at(t0()));
    let sender = Arc::new(RecordingSender::default());
    let crm = Arc::new(FakeCrm::default());
    let store = Arc::new(MemoryStateStore::new());
    let lead_store = Arc::new(MemoryLeadStore::new(config.dedup_day_offset));
    let router = Arc::new(ChannelRouter::new(routes, &config));
    let sync = Arc::new(LeadSyncService::new(
        lead_store,
        crm.clone(),
        config.clone(),
    ));
    let scheduler = Arc::new(FollowUpScheduler::new(clock.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        FlowEngine::new(config),
        store.clone(),
        sender.clone(),
        router,
        sync,
        scheduler.clone(),
        clock.clone(),
    ));
    Harness {
        orchestrator,
        clock,
        sender,
        crm,
        store,
        scheduler,
    }
}

impl Harness {
    async fn text(&self, text: &str, hint: &str) {
        self.orchestrator
            .handle_inbound(InboundMessage {
                contact_id: CONTACT.to_string(),
                channel_hint: Some(hint.to_string()),
                payload: InboundPayload::Text(text.to_string()),
                timestamp: self.clock.now(),
            })
            .await
            .unwrap();
    }

    async fn reply(&self, id: &str, hint: &str) {
        self.orchestrator
            .handle_inbound(InboundMessage {
                contact_id: CONTACT.to_string(),
                channel_hint: Some(hint.to_string()),
                payload: InboundPayload::Reply {
                    kind: ReplyKind::Button,
                    id: id.to_string(),
                    title: String::new(),
                },
                timestamp: self.clock.now(),
            })
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn treatment_flow_end_to_end() {
    let h = harness();

    h.text("Hi", TREATMENT_CHANNEL).await;
    let sent = h.sender.take().await;
    assert_eq!(sent.len(), 2);
    assert_eq!(
        sent[0],
        Sent::Template {
            channel: TREATMENT_CHANNEL.to_string(),
            name: "mr_welcome_temp".to_string(),
        }
    );
    assert!(matches!(&sent[1], Sent::List { row_ids, .. } if row_ids.contains(&"city_hyderabad".to_string())));

    h.reply("city_hyderabad", TREATMENT_CHANNEL).await;
    let sent = h.sender.take().await;
    assert!(matches!(&sent[0], Sent::Template { name, .. } if name == "treat_options_flow"));
    assert!(matches!(&sent[1], Sent::Buttons { ids, .. } if ids == &["skin", "hair", "body"]));

    h.reply("hair", TREATMENT_CHANNEL).await;
    let sent = h.sender.take().await;
    assert!(matches!(&sent[0], Sent::Template { name, .. } if name == "hair_treat_flow"));
    assert!(matches!(&sent[1], Sent::List { row_ids, .. } if row_ids.contains(&"hair_transplant".to_string())));

    h.reply("hair_transplant", TREATMENT_CHANNEL).await;
    let sent = h.sender.take().await;
    assert!(matches!(&sent[0], Sent::Text { .. }));

    assert_eq!(h.crm.creates.load(Ordering::SeqCst), 1);
    let leads = h.crm.leads.read().await;
    assert_eq!(leads[0].status, LeadStatus::CallInitiated);
    assert_eq!(leads[0].lead_source, "Business Listing");
    assert_eq!(leads[0].sub_source.as_deref(), Some("WhatsApp"));
    assert_eq!(leads[0].phone, "9876543210");
    assert!(leads[0].description.contains("Concern: Hair Transplant"));
}

#[tokio::test]
async fn greeting_on_non_treatment_channel_does_nothing() {
    let h = harness();
    h.text("Hi", APPOINTMENT_CHANNEL).await;
    assert!(h.sender.take().await.is_empty());
}

#[tokio::test]
async fn appointment_flow_creates_pending_lead() {
    let h = harness();

    h.text("I want to book an appointment", APPOINTMENT_CHANNEL).await;
    let sent = h.sender.take().await;
    assert!(matches!(&sent[0], Sent::Buttons { ids, .. } if ids == &["yes_book_appointment", "not_now"]));

    h.reply("yes_book_appointment", APPOINTMENT_CHANNEL).await;
    h.reply("city_pune", APPOINTMENT_CHANNEL).await;
    h.reply("clinic_pune_baner", APPOINTMENT_CHANNEL).await;
    h.reply("week_20250609", APPOINTMENT_CHANNEL).await;
    h.reply("slot_evening", APPOINTMENT_CHANNEL).await;
    h.reply("yes_callback", APPOINTMENT_CHANNEL).await;

    assert_eq!(h.crm.creates.load(Ordering::SeqCst), 1);
    let leads = h.crm.leads.read().await;
    assert_eq!(leads[0].status, LeadStatus::Pending);
    assert_eq!(leads[0].lead_source, "WhatsApp Lead-to-Appointment Flow");
    assert_eq!(
        leads[0].description,
        "City: Pune | Clinic: Baner | Preferred Date: 2025-06-09 to 2025-06-15 | Preferred Time: Evening (5-7 PM)"
    );
}

#[tokio::test]
async fn duplicate_start_trigger_sends_one_welcome() {
    let h = harness();
    h.text("book", APPOINTMENT_CHANNEL).await;
    h.clock.advance(Duration::from_secs(2));
    h.text("book", APPOINTMENT_CHANNEL).await;

    let sent = h.sender.take().await;
    assert_eq!(sent.len(), 1);
}

#[tokio::test]
async fn reminder_chain_fires_then_abandons() {
    let h = harness();
    h.text("Hi", TREATMENT_CHANNEL).await;
    h.sender.take().await;

    // First reminder after two silent minutes.
    h.clock.advance(Duration::from_secs(2 * 60));
    h.orchestrator.on_follow_up_timer(CONTACT).await.unwrap();
    let sent = h.sender.take().await;
    assert!(matches!(&sent[0], Sent::Buttons { ids, .. } if ids == &["followup_yes"]));

    // Second reminder 30 silent minutes later closes the conversation.
    h.clock.advance(Duration::from_secs(30 * 60));
    h.orchestrator.on_follow_up_timer(CONTACT).await.unwrap();
    let sent = h.sender.take().await;
    assert!(matches!(&sent[0], Sent::Text { .. }));

    let state = h.store.get(CONTACT).await.unwrap().unwrap();
    assert!(state.abandoned_at.is_some());
    assert_eq!(h.crm.creates.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.crm.leads.read().await[0].status,
        LeadStatus::NoCallback
    );
}

#[tokio::test]
async fn second_reminder_measures_silence_from_first_send() {
    let h = harness();
    h.text("Hi", TREATMENT_CHANNEL).await;
    h.sender.take().await;

    let fired_at = t0() + chrono::Duration::minutes(2);
    h.clock.advance(Duration::from_secs(2 * 60));
    h.orchestrator.on_follow_up_timer(CONTACT).await.unwrap();
    h.sender.take().await;

    // The second reminder is baselined at the moment the first one went
    // out, not at the contact's last message.
    let pending = h.scheduler.peek(CONTACT).await.unwrap();
    assert_eq!(pending.kind, FollowUpKind::FollowUp2);
    assert_eq!(pending.baseline, fired_at);
    assert_eq!(pending.fire_at, fired_at + chrono::Duration::minutes(30));
}

#[tokio::test]
async fn contact_locks_are_evicted_when_idle() {
    let h = harness();
    h.text("Hi", TREATMENT_CHANNEL).await;
    h.reply("city_kochi", TREATMENT_CHANNEL).await;
    h.sender.take().await;

    // No handler is running, so the keyed-mutex map must be empty.
    assert_eq!(h.orchestrator.contact_lock_count().await, 0);

    h.clock.advance(Duration::from_secs(2 * 60));
    h.orchestrator.on_follow_up_timer(CONTACT).await.unwrap();
    assert_eq!(h.orchestrator.contact_lock_count().await, 0);
}

#[tokio::test]
async fn reply_before_fire_time_makes_reminder_stale() {
    let h = harness();
    h.text("Hi", TREATMENT_CHANNEL).await;
    h.sender.take().await;

    // The city reply re-arms the reminder against fresh activity.
    h.clock.advance(Duration::from_secs(60));
    h.reply("city_kochi", TREATMENT_CHANNEL).await;
    h.sender.take().await;

    // The original fire time passes; nothing goes out.
    h.clock.advance(Duration::from_secs(60));
    h.orchestrator.on_follow_up_timer(CONTACT).await.unwrap();
    assert!(h.sender.take().await.is_empty());

    // The re-armed reminder still fires on its own schedule.
    h.clock.advance(Duration::from_secs(60));
    h.orchestrator.on_follow_up_timer(CONTACT).await.unwrap();
    let sent = h.sender.take().await;
    assert!(matches!(&sent[0], Sent::Buttons { ids, .. } if ids == &["followup_yes"]));
}

#[tokio::test]
async fn followup_yes_replays_pending_prompt() {
    let h = harness();
    h.text("Hi", TREATMENT_CHANNEL).await;
    h.sender.take().await;

    h.clock.advance(Duration::from_secs(2 * 60));
    h.orchestrator.on_follow_up_timer(CONTACT).await.unwrap();
    h.sender.take().await;

    h.reply("followup_yes", TREATMENT_CHANNEL).await;
    let sent = h.sender.take().await;
    assert!(matches!(&sent[0], Sent::List { row_ids, .. } if row_ids.contains(&"city_hyderabad".to_string())));
}

#[tokio::test]
async fn declined_then_completed_same_day_creates_two_leads() {
    let h = harness();

    h.text("book", APPOINTMENT_CHANNEL).await;
    h.reply("not_now", APPOINTMENT_CHANNEL).await;
    assert_eq!(h.crm.creates.load(Ordering::SeqCst), 1);
    assert_eq!(h.crm.leads.read().await[0].status, LeadStatus::NoCallback);
    h.sender.take().await;

    // Re-engages two hours later the same day and completes.
    h.clock.advance(Duration::from_secs(2 * 3600));
    h.text("book", APPOINTMENT_CHANNEL).await;
    h.reply("yes_book_appointment", APPOINTMENT_CHANNEL).await;
    h.reply("city_chennai", APPOINTMENT_CHANNEL).await;
    h.reply("clinic_chennai_adyar", APPOINTMENT_CHANNEL).await;
    h.reply("week_20250602", APPOINTMENT_CHANNEL).await;
    h.reply("slot_morning", APPOINTMENT_CHANNEL).await;
    h.reply("yes_callback", APPOINTMENT_CHANNEL).await;

    // The same-day dedup is bypassed for the post-decline completion.
    assert_eq!(h.crm.creates.load(Ordering::SeqCst), 2);
    assert_eq!(h.crm.leads.read().await[1].status, LeadStatus::Pending);
}

#[tokio::test]
async fn completing_twice_same_day_syncs_once() {
    let h = harness();

    for _ in 0..2 {
        h.text("Hi", TREATMENT_CHANNEL).await;
        h.reply("city_kolkata", TREATMENT_CHANNEL).await;
        h.reply("skin", TREATMENT_CHANNEL).await;
        h.reply("acne", TREATMENT_CHANNEL).await;
        h.sender.take().await;
        h.clock.advance(Duration::from_secs(3600));
    }

    assert_eq!(h.crm.creates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stale_reply_after_terminal_is_ignored() {
    let h = harness();
    h.text("Hi", TREATMENT_CHANNEL).await;
    h.reply("city_vizag", TREATMENT_CHANNEL).await;
    h.reply("body", TREATMENT_CHANNEL).await;
    h.reply("weight_loss", TREATMENT_CHANNEL).await;
    h.sender.take().await;

    // A second tap on the already-consumed list row.
    h.reply("weight_loss", TREATMENT_CHANNEL).await;
    assert!(h.sender.take().await.is_empty());
    assert_eq!(h.crm.creates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn text_after_terminal_restarts_the_flow() {
    let h = harness();
    h.text("Hi", TREATMENT_CHANNEL).await;
    h.reply("city_vizag", TREATMENT_CHANNEL).await;
    h.reply("skin", TREATMENT_CHANNEL).await;
    h.reply("pigmentation", TREATMENT_CHANNEL).await;
    h.sender.take().await;

    h.clock.advance(Duration::from_secs(60));
    h.text("ok one more question", TREATMENT_CHANNEL).await;
    let sent = h.sender.take().await;
    assert!(matches!(&sent[0], Sent::Template { name, .. } if name == "mr_welcome_temp"));

    let state = h.store.get(CONTACT).await.unwrap().unwrap();
    assert!(state.completed_at.is_none());
    assert!(state.selections.city.is_none());
}

#[tokio::test]
async fn channel_stays_pinned_mid_flow() {
    let h = harness();
    h.text("Hi", TREATMENT_CHANNEL).await;
    h.sender.take().await;

    let state = h.store.get(CONTACT).await.unwrap().unwrap();
    assert_eq!(state.pinned_channel.as_deref(), Some(TREATMENT_CHANNEL));

    // Mid-flow the pin must not move even if a hint names another number.
    h.reply("city_kochi", APPOINTMENT_CHANNEL).await;
    let state = h.store.get(CONTACT).await.unwrap().unwrap();
    assert_eq!(state.pinned_channel.as_deref(), Some(TREATMENT_CHANNEL));
}

#[tokio::test]
async fn failed_send_leaves_state_unchanged() {
    let h = harness();
    h.sender.fail_next.store(true, Ordering::SeqCst);

    let result = h
        .orchestrator
        .handle_inbound(InboundMessage {
            contact_id: CONTACT.to_string(),
            channel_hint: Some(TREATMENT_CHANNEL.to_string()),
            payload: InboundPayload::Text("Hi".to_string()),
            timestamp: t0(),
        })
        .await;
    assert!(result.is_err());

    // The flow did not advance, so the next greeting starts clean.
    assert!(h.store.get(CONTACT).await.unwrap().is_none());
    h.clock.advance(Duration::from_secs(15));
    h.text("Hi", TREATMENT_CHANNEL).await;
    let sent = h.sender.take().await;
    assert_eq!(sent.len(), 2);
}

#[tokio::test]
async fn pricing_question_gets_canned_answer_without_starting_flow() {
    let h = harness();
    h.text("what is the consultation fee?", APPOINTMENT_CHANNEL).await;
    let sent = h.sender.take().await;
    assert!(matches!(&sent[0], Sent::Text { text, .. } if text.contains("consultation fee")));

    let state = h.store.get(CONTACT).await.unwrap().unwrap();
    assert!(state.active_flow.is_none());
}

#[tokio::test]
async fn ad_prefill_seeds_city_and_location() {
    let h = harness();
    h.text(
        "Hi Oliva I want to know more about services in Banjara Hills, Hyderabad clinic",
        TREATMENT_CHANNEL,
    )
    .await;
    let sent = h.sender.take().await;
    assert_eq!(sent.len(), 2);

    let state = h.store.get(CONTACT).await.unwrap().unwrap();
    assert_eq!(state.selections.city.as_deref(), Some("Hyderabad"));
    assert_eq!(state.selections.location.as_deref(), Some("Banjara Hills"));
}
