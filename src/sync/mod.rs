//! CRM lead sync — dedup, create, token-refresh retry.
//!
//! The sync service is the only component that talks to the CRM. It is
//! called after a flow reaches a terminal step and never blocks or fails
//! the user-facing conversation path; the orchestrator logs and swallows
//! its errors.

pub mod model;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::config::FlowConfig;
use crate::error::{CrmError, SyncError};
use crate::state::model::ConversationState;
use model::{build_lead, DedupKey, Lead, LeadStatus};

/// Local record of leads already pushed, for same-day dedup.
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn find(&self, key: &DedupKey) -> Result<Option<Lead>, SyncError>;
    async fn insert(&self, lead: Lead) -> Result<(), SyncError>;
}

/// In-memory lead store keyed by dedup key.
pub struct MemoryLeadStore {
    /// Offset used to compute the dedup calendar day.
    day_offset: chrono::FixedOffset,
    leads: RwLock<HashMap<DedupKey, Lead>>,
}

impl MemoryLeadStore {
    pub fn new(day_offset: chrono::FixedOffset) -> Self {
        Self {
            day_offset,
            leads: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.leads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.leads.read().await.is_empty()
    }
}

#[async_trait]
impl LeadStore for MemoryLeadStore {
    async fn find(&self, key: &DedupKey) -> Result<Option<Lead>, SyncError> {
        Ok(self.leads.read().await.get(key).cloned())
    }

    async fn insert(&self, lead: Lead) -> Result<(), SyncError> {
        let key = lead.dedup_key(self.day_offset);
        self.leads.write().await.insert(key, lead);
        Ok(())
    }
}

/// External CRM surface the sync service drives.
#[async_trait]
pub trait CrmClient: Send + Sync {
    /// Whether the CRM already holds a lead for this phone + source + day.
    async fn find_lead(&self, key: &DedupKey) -> Result<Option<String>, CrmError>;

    /// Create the lead; returns the CRM-side record id.
    async fn create_lead(&self, lead: &Lead) -> Result<String, CrmError>;

    /// Refresh the access token after an `AuthExpired`.
    async fn refresh_token(&self) -> Result<(), CrmError>;
}

/// What one sync attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Created { crm_record_id: String },
    /// A lead for this phone + source + day already exists.
    DuplicateSkipped { existing: String },
}

/// Orchestrates dedup + create + retry for one lead at a time.
pub struct LeadSyncService {
    store: Arc<dyn LeadStore>,
    crm: Arc<dyn CrmClient>,
    config: FlowConfig,
    /// Serializes concurrent syncs for the same dedup key.
    in_flight: Mutex<HashMap<DedupKey, Arc<Mutex<()>>>>,
}

impl LeadSyncService {
    pub fn new(store: Arc<dyn LeadStore>, crm: Arc<dyn CrmClient>, config: FlowConfig) -> Self {
        Self {
            store,
            crm,
            config,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Push one lead for a finished flow.
    ///
    /// `allow_duplicate_same_day` bypasses the dedup check for the
    /// declined-then-completed-again-today case.
    pub async fn sync(
        &self,
        state: &ConversationState,
        status: LeadStatus,
        reason: &str,
        allow_duplicate_same_day: bool,
        now: DateTime<Utc>,
    ) -> Result<SyncOutcome, SyncError> {
        let lead =
            build_lead(state, status, reason, &self.config, now).ok_or_else(|| {
                SyncError::NoPhone {
                    contact_id: state.contact_id.clone(),
                }
            })?;
        let key = lead.dedup_key(self.config.dedup_day_offset);

        let key_lock = self.lock_for(&key).await;
        let result = {
            let _guard = key_lock.lock().await;
            self.sync_locked(lead, &key, allow_duplicate_same_day).await
        };
        self.evict(&key, key_lock).await;
        result
    }

    /// Dedup check + create, run under the key's mutex so check-then-write
    /// is atomic for concurrent terminal triggers.
    async fn sync_locked(
        &self,
        mut lead: Lead,
        key: &DedupKey,
        allow_duplicate_same_day: bool,
    ) -> Result<SyncOutcome, SyncError> {
        if !allow_duplicate_same_day {
            if let Some(existing) = self.store.find(key).await? {
                tracing::info!(
                    phone = %key.phone,
                    source = %key.source,
                    "duplicate same-day lead skipped (local)"
                );
                return Ok(SyncOutcome::DuplicateSkipped {
                    existing: existing.crm_record_id.unwrap_or_else(|| existing.id.to_string()),
                });
            }
            if let Some(existing) = self.crm_find(key, &lead).await? {
                tracing::info!(
                    phone = %key.phone,
                    source = %key.source,
                    "duplicate same-day lead skipped (crm)"
                );
                return Ok(SyncOutcome::DuplicateSkipped { existing });
            }
        }

        let crm_record_id = self.crm_create(&lead).await?;
        lead.crm_record_id = Some(crm_record_id.clone());
        tracing::info!(
            phone = %key.phone,
            source = %key.source,
            status = %lead.status,
            crm_record_id,
            "lead created"
        );
        self.store.insert(lead).await?;
        Ok(SyncOutcome::Created { crm_record_id })
    }

    async fn lock_for(&self, key: &DedupKey) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().await;
        in_flight.entry(key.clone()).or_default().clone()
    }

    /// Drop the key's mutex when no other sync holds or awaits it; clones
    /// are only handed out under the map lock, so the count check cannot
    /// race a new acquisition.
    async fn evict(&self, key: &DedupKey, lock: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().await;
        // Two strong refs: the map's entry and ours.
        if Arc::strong_count(&lock) == 2 {
            in_flight.remove(key);
        }
    }

    /// CRM-side dedup lookup, with one token refresh on auth expiry.
    async fn crm_find(&self, key: &DedupKey, lead: &Lead) -> Result<Option<String>, SyncError> {
        match self.crm.find_lead(key).await {
            Ok(found) => Ok(found),
            Err(CrmError::AuthExpired) => {
                self.refresh(lead).await?;
                self.crm
                    .find_lead(key)
                    .await
                    .map_err(|e| self.failed(lead, e))
            }
            Err(e) => Err(self.failed(lead, e)),
        }
    }

    /// CRM create, with one token refresh on auth expiry.
    async fn crm_create(&self, lead: &Lead) -> Result<String, SyncError> {
        match self.crm.create_lead(lead).await {
            Ok(id) => Ok(id),
            Err(CrmError::AuthExpired) => {
                self.refresh(lead).await?;
                self.crm
                    .create_lead(lead)
                    .await
                    .map_err(|e| self.failed(lead, e))
            }
            Err(e) => Err(self.failed(lead, e)),
        }
    }

    async fn refresh(&self, lead: &Lead) -> Result<(), SyncError> {
        tracing::warn!(record_id = %lead.id, "crm token expired; refreshing");
        self.crm
            .refresh_token()
            .await
            .map_err(|e| self.failed(lead, e))
    }

    fn failed(&self, lead: &Lead, source: CrmError) -> SyncError {
        SyncError::Failed {
            record_id: lead.id,
            reason: source.to_string(),
        }
    }

    /// Number of dedup keys with a sync currently in flight.
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
    }

    /// CRM double: counts calls, optionally fails the first create with an
    /// expired token.
    #[derive(Default)]
    struct FakeCrm {
        creates: AtomicUsize,
        finds: AtomicUsize,
        refreshes: AtomicUsize,
        expire_first_create: AtomicBool,
        known_lead: RwLock<Option<String>>,
    }

    #[async_trait]
    impl CrmClient for FakeCrm {
        async fn find_lead(&self, _key: &DedupKey) -> Result<Option<String>, CrmError> {
            self.finds.fetch_add(1, Ordering::SeqCst);
            Ok(self.known_lead.read().await.clone())
        }

        async fn create_lead(&self, _lead: &Lead) -> Result<String, CrmError> {
            // Yield so a concurrent sync for the same key gets a chance to
            // run mid-create.
            tokio::task::yield_now().await;
            let n = self.creates.fetch_add(1, Ordering::SeqCst);
            if n == 0 && self.expire_first_create.load(Ordering::SeqCst) {
                return Err(CrmError::AuthExpired);
            }
            Ok(format!("crm-{}", n + 1))
        }

        async fn refresh_token(&self) -> Result<(), CrmError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn service(crm: Arc<FakeCrm>) -> (LeadSyncService, Arc<MemoryLeadStore>) {
        let config = FlowConfig::default();
        let store = Arc::new(MemoryLeadStore::new(config.dedup_day_offset));
        (
            LeadSyncService::new(store.clone(), crm, config),
            store,
        )
    }

    fn completed_state() -> ConversationState {
        let mut state = ConversationState::new("919876543210", t0());
        state.selections.city = Some("Hyderabad".to_string());
        state.selections.clinic = Some("Banjara Hills".to_string());
        state
    }

    #[tokio::test]
    async fn creates_and_records_lead() {
        let crm = Arc::new(FakeCrm::default());
        let (service, store) = service(crm.clone());

        let outcome = service
            .sync(&completed_state(), LeadStatus::Pending, "callback_confirmed", false, t0())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Created {
                crm_record_id: "crm-1".to_string()
            }
        );
        assert_eq!(store.len().await, 1);
        assert_eq!(crm.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn same_day_second_sync_is_skipped() {
        let crm = Arc::new(FakeCrm::default());
        let (service, store) = service(crm.clone());
        let state = completed_state();

        service
            .sync(&state, LeadStatus::Pending, "callback_confirmed", false, t0())
            .await
            .unwrap();
        let second = service
            .sync(
                &state,
                LeadStatus::Pending,
                "callback_confirmed",
                false,
                t0() + chrono::Duration::hours(3),
            )
            .await
            .unwrap();

        assert!(matches!(second, SyncOutcome::DuplicateSkipped { .. }));
        assert_eq!(store.len().await, 1);
        assert_eq!(crm.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn allow_duplicate_bypasses_dedup() {
        let crm = Arc::new(FakeCrm::default());
        let (service, _store) = service(crm.clone());
        let state = completed_state();

        service
            .sync(&state, LeadStatus::NoCallback, "declined_welcome", false, t0())
            .await
            .unwrap();
        let second = service
            .sync(
                &state,
                LeadStatus::Pending,
                "callback_confirmed",
                true,
                t0() + chrono::Duration::hours(2),
            )
            .await
            .unwrap();

        assert!(matches!(second, SyncOutcome::Created { .. }));
        assert_eq!(crm.creates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn crm_side_duplicate_is_respected() {
        let crm = Arc::new(FakeCrm::default());
        *crm.known_lead.write().await = Some("crm-existing".to_string());
        let (service, store) = service(crm.clone());

        let outcome = service
            .sync(&completed_state(), LeadStatus::Pending, "callback_confirmed", false, t0())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::DuplicateSkipped {
                existing: "crm-existing".to_string()
            }
        );
        assert!(store.is_empty().await);
        assert_eq!(crm.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_token_refreshes_once_and_retries() {
        let crm = Arc::new(FakeCrm::default());
        crm.expire_first_create.store(true, Ordering::SeqCst);
        let (service, _store) = service(crm.clone());

        let outcome = service
            .sync(&completed_state(), LeadStatus::Pending, "callback_confirmed", false, t0())
            .await
            .unwrap();
        assert!(matches!(outcome, SyncOutcome::Created { .. }));
        assert_eq!(crm.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(crm.creates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn next_day_creates_fresh_lead() {
        let crm = Arc::new(FakeCrm::default());
        let (service, store) = service(crm.clone());
        let state = completed_state();

        service
            .sync(&state, LeadStatus::Pending, "callback_confirmed", false, t0())
            .await
            .unwrap();
        let next_day = service
            .sync(
                &state,
                LeadStatus::Pending,
                "callback_confirmed",
                false,
                t0() + chrono::Duration::days(1),
            )
            .await
            .unwrap();

        assert!(matches!(next_day, SyncOutcome::Created { .. }));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn concurrent_syncs_for_one_key_create_exactly_one_lead() {
        let crm = Arc::new(FakeCrm::default());
        let (service, store) = service(crm.clone());
        let service = Arc::new(service);
        let state = completed_state();

        let spawn_sync = |service: Arc<LeadSyncService>, state: ConversationState| {
            tokio::spawn(async move {
                service
                    .sync(&state, LeadStatus::Pending, "callback_confirmed", false, t0())
                    .await
                    .unwrap()
            })
        };
        let a = spawn_sync(Arc::clone(&service), state.clone());
        let b = spawn_sync(Arc::clone(&service), state.clone());
        let outcomes = [a.await.unwrap(), b.await.unwrap()];

        let created = outcomes
            .iter()
            .filter(|o| matches!(o, SyncOutcome::Created { .. }))
            .count();
        let skipped = outcomes
            .iter()
            .filter(|o| matches!(o, SyncOutcome::DuplicateSkipped { .. }))
            .count();
        assert_eq!(created, 1);
        assert_eq!(skipped, 1);
        assert_eq!(crm.creates.load(Ordering::SeqCst), 1);
        assert_eq!(store.len().await, 1);
        // Both syncs finished; the key's mutex must be gone.
        assert_eq!(service.in_flight_count().await, 0);
    }

    #[tokio::test]
    async fn contact_without_digits_is_rejected() {
        let crm = Arc::new(FakeCrm::default());
        let (service, _store) = service(crm);

        let state = ConversationState::new("anonymous", t0());
        let err = service
            .sync(&state, LeadStatus::Pending, "callback_confirmed", false, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NoPhone { .. }));
    }
}
