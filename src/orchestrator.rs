//! Webhook-to-flow orchestration.
//!
//! One entry point per stimulus: an inbound message, or a follow-up timer
//! firing. Per-contact processing is serialized with a keyed mutex so a
//! rapid double-tap or a timer racing an inbound message can never
//! interleave on one conversation record.
//!
//! Execution order per event: run the state machine, execute the sends,
//! then persist the mutated record. A failed send drops the mutation, so
//! the stored state never claims a prompt the contact did not receive.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::error::Result;
use crate::event::{classify, InboundMessage};
use crate::flow::prompts;
use crate::flow::{EventContext, FlowEngine, OutboundAction};
use crate::followup::{FollowUpKind, FollowUpScheduler, PendingFollowUp};
use crate::router::{ChannelRouter, ResolvedChannel};
use crate::sender::Sender;
use crate::state::model::ConversationState;
use crate::state::store::StateStore;
use crate::sync::model::LeadStatus;
use crate::sync::{LeadSyncService, SyncOutcome};

pub struct Orchestrator {
    engine: FlowEngine,
    store: Arc<dyn StateStore>,
    sender: Arc<dyn Sender>,
    router: Arc<ChannelRouter>,
    sync: Arc<LeadSyncService>,
    scheduler: Arc<FollowUpScheduler>,
    clock: Arc<dyn Clock>,
    contact_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: FlowEngine,
        store: Arc<dyn StateStore>,
        sender: Arc<dyn Sender>,
        router: Arc<ChannelRouter>,
        sync: Arc<LeadSyncService>,
        scheduler: Arc<FollowUpScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine,
            store,
            sender,
            router,
            sync,
            scheduler,
            clock,
            contact_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, contact_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.contact_locks.lock().await;
        locks.entry(contact_id.to_string()).or_default().clone()
    }

    /// Drop the contact's keyed mutex when no other task holds or awaits
    /// it, so the map does not grow with every contact ever seen. Clones
    /// are only handed out under the map lock, making the count check
    /// race-free.
    async fn evict_lock(&self, contact_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.contact_locks.lock().await;
        // Two strong refs: the map's entry and ours.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(contact_id);
        }
    }

    /// Number of per-contact locks currently retained (idle conversations
    /// are evicted).
    pub async fn contact_lock_count(&self) -> usize {
        self.contact_locks.lock().await.len()
    }

    /// Process one inbound webhook message end to end.
    pub async fn handle_inbound(self: &Arc<Self>, message: InboundMessage) -> Result<()> {
        let contact_id = message.contact_id.clone();
        let contact_lock = self.lock_for(&contact_id).await;
        let result = {
            let _guard = contact_lock.lock().await;
            self.process_inbound(&message).await
        };
        self.evict_lock(&contact_id, contact_lock).await;
        result
    }

    async fn process_inbound(self: &Arc<Self>, message: &InboundMessage) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.store.load_or_new(&message.contact_id, now).await?;

        let hint_owned = message
            .channel_hint
            .clone()
            .or_else(|| state.pinned_channel.clone());
        let hint = hint_owned.as_deref();
        let ctx = EventContext {
            treatment_channel: match hint {
                Some(h) => self.router.allows_treatment(h),
                None => self.router.treatment_open(),
            },
        };
        let may_pin = ChannelRouter::may_repin(&state);

        let event = classify(&message.payload);
        tracing::debug!(
            contact_id = %message.contact_id,
            event = ?event,
            treatment_channel = ctx.treatment_channel,
            "inbound classified"
        );

        let actions = self.engine.handle(&mut state, &event, ctx, now);
        if actions.is_empty() {
            self.store.put(state).await?;
            return Ok(());
        }

        let channel = self.router.resolve(&state, hint, state.flow_kind())?;
        if may_pin && state.pinned_channel.as_deref() != Some(channel.channel_id.as_str()) {
            state.pinned_channel = Some(channel.channel_id.clone());
        }

        self.execute(&state, &channel, actions).await?;
        self.store.put(state).await?;
        Ok(())
    }

    /// Fire path for an armed reminder. Called by the spawned timer task;
    /// also callable directly by a driver that owns its own timers.
    pub async fn on_follow_up_timer(self: &Arc<Self>, contact_id: &str) -> Result<()> {
        let contact_lock = self.lock_for(contact_id).await;
        let result = {
            let _guard = contact_lock.lock().await;
            self.fire_follow_up(contact_id).await
        };
        self.evict_lock(contact_id, contact_lock).await;
        result
    }

    async fn fire_follow_up(self: &Arc<Self>, contact_id: &str) -> Result<()> {
        let now = self.clock.now();
        let Some(entry) = self.scheduler.take_due(contact_id, now).await else {
            return Ok(());
        };
        let Some(mut state) = self.store.get(contact_id).await? else {
            return Ok(());
        };

        // The contact spoke after this was armed, or the flow already
        // ended; the reminder is stale.
        if state.last_activity_at > entry.baseline
            || state.is_finished()
            || state.active_flow.is_none()
        {
            tracing::debug!(contact_id, kind = %entry.kind, "stale reminder dropped");
            return Ok(());
        }

        let channel = self.router.resolve(&state, None, state.flow_kind())?;
        match entry.kind {
            FollowUpKind::FollowUp1 => {
                self.sender
                    .send_buttons(
                        &channel,
                        contact_id,
                        prompts::FOLLOW_UP_1_BODY,
                        &prompts::follow_up1_buttons(),
                    )
                    .await?;
                tracing::info!(contact_id, "first reminder sent");
                // Fresh baseline: the second reminder measures silence
                // from the moment the first one went out.
                let next = self
                    .scheduler
                    .arm(contact_id, FollowUpKind::FollowUp2, now, self.engine.config())
                    .await;
                self.spawn_timer(contact_id.to_string(), next);
            }
            FollowUpKind::FollowUp2 => {
                self.sender
                    .send_text(&channel, contact_id, prompts::FOLLOW_UP_2_BODY)
                    .await?;
                state.mark_abandoned(now);
                tracing::info!(contact_id, "second reminder sent; conversation abandoned");
                let allow_duplicate =
                    state.declined_same_day(now, self.engine.config().dedup_day_offset);
                self.sync_lead(
                    &state,
                    LeadStatus::NoCallback,
                    "no_response_after_two_reminders",
                    allow_duplicate,
                )
                .await;
                self.store.put(state).await?;
            }
        }
        Ok(())
    }

    /// Execute the state machine's actions in order. Sends go through the
    /// resolved channel; a send error aborts so state is not persisted.
    async fn execute(
        self: &Arc<Self>,
        state: &ConversationState,
        channel: &ResolvedChannel,
        actions: Vec<OutboundAction>,
    ) -> Result<()> {
        let to = state.contact_id.clone();
        for action in actions {
            match action {
                OutboundAction::SendText { text } => {
                    self.sender.send_text(channel, &to, &text).await?;
                }
                OutboundAction::SendButtons { body, buttons } => {
                    self.sender
                        .send_buttons(channel, &to, &body, &buttons)
                        .await?;
                }
                OutboundAction::SendList {
                    body,
                    button_label,
                    sections,
                } => {
                    self.sender
                        .send_list(channel, &to, &body, &button_label, &sections)
                        .await?;
                }
                OutboundAction::SendTemplate {
                    name,
                    language,
                    components,
                } => {
                    self.sender
                        .send_template(channel, &to, &name, &language, components.as_ref())
                        .await?;
                }
                OutboundAction::ArmFollowUp { kind } => {
                    let entry = self
                        .scheduler
                        .arm(&to, kind, state.last_activity_at, self.engine.config())
                        .await;
                    self.spawn_timer(to.clone(), entry);
                }
                OutboundAction::SyncLead {
                    status,
                    reason,
                    allow_duplicate_same_day,
                } => {
                    self.sync_lead(state, status, &reason, allow_duplicate_same_day)
                        .await;
                }
            }
        }
        if state.is_finished() {
            // Terminal: any still-pending reminder is dead.
            self.scheduler.clear(&to).await;
        }
        Ok(())
    }

    /// CRM sync is best-effort: failures are logged and never surface to
    /// the conversation path.
    async fn sync_lead(
        &self,
        state: &ConversationState,
        status: LeadStatus,
        reason: &str,
        allow_duplicate_same_day: bool,
    ) {
        let now = self.clock.now();
        match self
            .sync
            .sync(state, status, reason, allow_duplicate_same_day, now)
            .await
        {
            Ok(SyncOutcome::Created { crm_record_id }) => {
                tracing::info!(contact_id = %state.contact_id, crm_record_id, "lead synced");
            }
            Ok(SyncOutcome::DuplicateSkipped { existing }) => {
                tracing::info!(contact_id = %state.contact_id, existing, "lead already synced today");
            }
            Err(error) => {
                tracing::warn!(contact_id = %state.contact_id, %error, "lead sync failed");
            }
        }
    }

    fn spawn_timer(self: &Arc<Self>, contact_id: String, entry: PendingFollowUp) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if this.scheduler.wait(&contact_id, entry).await
                && let Err(error) = this.on_follow_up_timer(&contact_id).await
            {
                tracing::warn!(contact_id, %error, "follow-up timer handling failed");
            }
        });
    }
}
