//! In-memory intervention log with optional SQLite write-through.
//!
//! Each incident's record sits behind its own `tokio::sync::Mutex`, so appends
//! from different incidents never contend and appends within one incident are
//! persisted in the order they were made.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{ActionOutcome, InterventionRecord, LogError};
use crate::detect::{Concern, Severity};
use crate::escalation::Resolution;
use crate::storage::{self, Pool};

#[derive(Default)]
pub struct InterventionLog {
    records: RwLock<HashMap<Uuid, Arc<Mutex<InterventionRecord>>>>,
    pool: Option<Pool>,
}

impl InterventionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist every change to `pool` as well as keeping it in memory.
    pub fn with_pool(pool: Pool) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            pool: Some(pool),
        }
    }

    /// Create the record for a new incident.
    pub async fn open(
        &self,
        incident_id: Uuid,
        severity: Severity,
        concerns: BTreeSet<Concern>,
        detected_at: DateTime<Utc>,
    ) -> Result<(), LogError> {
        let record = InterventionRecord::new(incident_id, severity, concerns, detected_at);
        let snapshot = record.clone();
        {
            let mut records = self.records.write().await;
            if records.contains_key(&incident_id) {
                return Err(LogError::AlreadyOpen(incident_id));
            }
            records.insert(incident_id, Arc::new(Mutex::new(record)));
        }
        debug!(%incident_id, %severity, "intervention record opened");
        self.persist(move |pool| storage::save_record(pool, &snapshot)).await;
        Ok(())
    }

    /// Append one outcome. Rejected once the record is finalized.
    pub async fn append(&self, incident_id: Uuid, outcome: ActionOutcome) -> Result<(), LogError> {
        let entry = self.entry(incident_id).await?;
        let mut record = entry.lock().await;
        if record.is_finalized() {
            return Err(LogError::Finalized(incident_id));
        }

        debug!(
            %incident_id,
            action = %outcome.action,
            result = outcome.result.as_str(),
            responder_id = outcome.responder_id.as_deref().unwrap_or("-"),
            "action outcome recorded"
        );

        let seq = record.outcomes.len();
        record.push(outcome.clone());
        self.persist(move |pool| storage::save_outcome(pool, incident_id, seq, &outcome))
            .await;
        Ok(())
    }

    /// Close the record. Later appends fail with [`LogError::Finalized`].
    pub async fn finalize(
        &self,
        incident_id: Uuid,
        resolution: Option<Resolution>,
        at: DateTime<Utc>,
    ) -> Result<InterventionRecord, LogError> {
        let entry = self.entry(incident_id).await?;
        let mut record = entry.lock().await;
        if record.is_finalized() {
            return Err(LogError::Finalized(incident_id));
        }
        record.resolved = resolution.is_some();
        record.resolution = resolution;
        record.finalized_at = Some(at);

        info!(
            %incident_id,
            resolved = record.resolved,
            outcomes = record.outcomes.len(),
            response_time_secs = record.total_response_time_seconds,
            "intervention record finalized"
        );

        let snapshot = record.clone();
        let persisted = snapshot.clone();
        self.persist(move |pool| storage::save_record(pool, &persisted)).await;
        Ok(snapshot)
    }

    /// Current record, falling back to storage for incidents from earlier runs.
    pub async fn get(&self, incident_id: Uuid) -> Option<InterventionRecord> {
        if let Ok(entry) = self.entry(incident_id).await {
            return Some(entry.lock().await.clone());
        }

        let pool = self.pool.clone()?;
        match tokio::task::spawn_blocking(move || storage::load_record(&pool, incident_id)).await {
            Ok(Ok(record)) => record,
            Ok(Err(e)) => {
                error!(%incident_id, error = %e, "failed to load intervention record");
                None
            }
            Err(e) => {
                error!(%incident_id, error = %e, "record loader task failed");
                None
            }
        }
    }

    async fn entry(&self, incident_id: Uuid) -> Result<Arc<Mutex<InterventionRecord>>, LogError> {
        self.records
            .read()
            .await
            .get(&incident_id)
            .cloned()
            .ok_or(LogError::UnknownIncident(incident_id))
    }

    /// Run a blocking storage write if a pool is configured. Storage errors
    /// are logged; the in-memory record stays authoritative.
    async fn persist<F>(&self, write: F)
    where
        F: FnOnce(&Pool) -> anyhow::Result<()> + Send + 'static,
    {
        let Some(pool) = self.pool.clone() else {
            return;
        };
        match tokio::task::spawn_blocking(move || write(&pool)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "failed to persist intervention data"),
            Err(e) => error!(error = %e, "intervention persistence task failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::ActionKind;
    use crate::intervention::OutcomeResult;

    fn outcome(action: ActionKind) -> ActionOutcome {
        ActionOutcome::new(action, Some(0), Utc::now(), OutcomeResult::Completed)
    }

    #[tokio::test]
    async fn test_append_and_finalize() {
        let log = InterventionLog::new();
        let id = Uuid::new_v4();
        log.open(id, Severity::Medium, BTreeSet::new(), Utc::now()).await.unwrap();
        log.append(id, outcome(ActionKind::LocalSupportMessage)).await.unwrap();
        log.append(id, outcome(ActionKind::CrisisMode)).await.unwrap();

        let record = log
            .finalize(id, Some(Resolution::ConfirmedSafe), Utc::now())
            .await
            .unwrap();
        assert!(record.resolved);
        assert_eq!(record.outcomes.len(), 2);

        assert_eq!(
            log.append(id, outcome(ActionKind::ProvideResources)).await,
            Err(LogError::Finalized(id))
        );
        assert!(log.finalize(id, None, Utc::now()).await.is_err());
        assert_eq!(log.get(id).await.unwrap().outcomes.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_and_duplicate_incidents() {
        let log = InterventionLog::new();
        let id = Uuid::new_v4();
        assert_eq!(
            log.append(id, outcome(ActionKind::CrisisMode)).await,
            Err(LogError::UnknownIncident(id))
        );
        assert!(log.get(id).await.is_none());

        log.open(id, Severity::Low, BTreeSet::new(), Utc::now()).await.unwrap();
        assert_eq!(
            log.open(id, Severity::Low, BTreeSet::new(), Utc::now()).await,
            Err(LogError::AlreadyOpen(id))
        );
    }

    #[tokio::test]
    async fn test_concurrent_appends_across_incidents() {
        let log = Arc::new(InterventionLog::new());
        let ids: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            log.open(*id, Severity::High, BTreeSet::new(), Utc::now()).await.unwrap();
        }

        let mut tasks = tokio::task::JoinSet::new();
        for id in ids.clone() {
            let log = log.clone();
            tasks.spawn(async move {
                for _ in 0..50 {
                    log.append(id, outcome(ActionKind::ProvideResources)).await.unwrap();
                }
            });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap();
        }

        for id in ids {
            assert_eq!(log.get(id).await.unwrap().outcomes.len(), 50);
        }
    }

    #[tokio::test]
    async fn test_write_through_survives_restart() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("lifeline.db");
        let id = Uuid::new_v4();

        {
            let pool = storage::open_pool(path.to_str().unwrap()).unwrap();
            let log = InterventionLog::with_pool(pool);
            log.open(id, Severity::Critical, BTreeSet::new(), Utc::now()).await.unwrap();
            log.append(id, outcome(ActionKind::ContactEmergencyServices)).await.unwrap();
            log.finalize(id, Some(Resolution::PlanExhausted), Utc::now()).await.unwrap();
        }

        let pool = storage::open_pool(path.to_str().unwrap()).unwrap();
        let log = InterventionLog::with_pool(pool);
        let record = log.get(id).await.unwrap();
        assert_eq!(record.severity, Severity::Critical);
        assert_eq!(record.resolution, Some(Resolution::PlanExhausted));
        assert_eq!(record.outcomes.len(), 1);
    }
}
