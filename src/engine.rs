//! Inbound facade: the calls the journaling app makes.
//!
//! `assess_and_escalate` scores synchronously and hands any non-empty plan to
//! the coordinator, returning as soon as the incident's driver is running.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::LifelineConfig;
use crate::detect::{RiskAssessment, RiskScorer, Severity, UserRiskContext};
use crate::dispatch::{AckRegistry, AckStatus, ChannelRouter, ChannelSender, NotificationDispatcher};
use crate::escalation::coordinator::CoordinatorError;
use crate::escalation::incident::IncidentId;
use crate::escalation::local::LocalActions;
use crate::escalation::{EscalationCoordinator, EscalationPlan, EscalationPlanner, Incident};
use crate::intervention::{InterventionLog, InterventionRecord};
use crate::resources::{ResourceProvider, StaticResources};
use crate::responders::{Channel, ResponderDirectory};
use crate::storage::{self, Pool};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown incident {0}")]
    UnknownIncident(IncidentId),
    #[error(transparent)]
    Coordinator(CoordinatorError),
}

impl From<CoordinatorError> for EngineError {
    fn from(e: CoordinatorError) -> Self {
        match e {
            CoordinatorError::UnknownIncident(id) => EngineError::UnknownIncident(id),
            other => EngineError::Coordinator(other),
        }
    }
}

/// A journal submission to assess.
#[derive(Clone, Serialize, Deserialize)]
pub struct RiskAssessmentRequest {
    pub user_id: String,
    pub text: String,
    /// BCP-47 tag; the scorer's default language when absent.
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub context: UserRiskContext,
}

// Hand-written so the journal text can never reach a log line via `{:?}`.
impl fmt::Debug for RiskAssessmentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RiskAssessmentRequest")
            .field("user_id", &self.user_id)
            .field("text_len", &self.text.chars().count())
            .field("language", &self.language)
            .field("context", &self.context)
            .finish()
    }
}

/// Result of a submission: the assessment, its plan, and the incident if one
/// was opened.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub incident_id: Option<IncidentId>,
    pub assessment: RiskAssessment,
    pub plan: EscalationPlan,
}

pub struct Engine {
    config: LifelineConfig,
    scorer: RiskScorer,
    planner: EscalationPlanner,
    directory: Arc<ResponderDirectory>,
    coordinator: Arc<EscalationCoordinator>,
    log: Arc<InterventionLog>,
    acks: Arc<AckRegistry>,
    clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn builder(config: LifelineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &LifelineConfig {
        &self.config
    }

    pub fn planner(&self) -> &EscalationPlanner {
        &self.planner
    }

    pub fn directory(&self) -> &Arc<ResponderDirectory> {
        &self.directory
    }

    /// Score and plan without starting anything.
    pub fn assess_only(
        &self,
        text: &str,
        language: Option<&str>,
        context: &UserRiskContext,
    ) -> (RiskAssessment, EscalationPlan) {
        let language = language.unwrap_or(&self.config.scorer.default_language);
        let assessment = self.scorer.score(text, language, context);
        let plan = self.planner.plan_for_assessment(&assessment);
        (assessment, plan)
    }

    /// Score `request` and, when severity is above `None`, open an incident
    /// and start escalating.
    pub async fn submit(&self, request: RiskAssessmentRequest) -> Result<Submission, EngineError> {
        let (assessment, plan) =
            self.assess_only(&request.text, request.language.as_deref(), &request.context);
        debug!(
            text_len = request.text.chars().count(),
            severity = %assessment.severity,
            language = %assessment.language,
            degraded = assessment.degraded,
            "journal entry assessed"
        );

        if assessment.severity == Severity::None || plan.is_empty() {
            return Ok(Submission {
                incident_id: None,
                assessment,
                plan,
            });
        }

        let incident = Incident::new(
            request.user_id,
            self.clock.now(),
            assessment.clone(),
            plan.clone(),
        );
        let id = self.coordinator.start(incident).await?;
        info!(
            incident_id = %id,
            severity = %assessment.severity,
            emergency = assessment.emergency_services_required,
            "escalation started"
        );
        Ok(Submission {
            incident_id: Some(id),
            assessment,
            plan,
        })
    }

    pub async fn assess_and_escalate(
        &self,
        request: RiskAssessmentRequest,
    ) -> Result<Option<IncidentId>, EngineError> {
        Ok(self.submit(request).await?.incident_id)
    }

    /// Returns true the first time the incident is resolved.
    pub async fn resolve(&self, id: IncidentId) -> Result<bool, EngineError> {
        Ok(self.coordinator.resolve(id).await?)
    }

    pub async fn incident_status(&self, id: IncidentId) -> Option<Incident> {
        self.coordinator.status(id).await
    }

    pub async fn intervention_record(&self, id: IncidentId) -> Option<InterventionRecord> {
        self.log.get(id).await
    }

    pub async fn acknowledge(&self, delivery_id: Uuid) -> AckStatus {
        let status = self.acks.acknowledge(delivery_id).await;
        debug!(%delivery_id, ?status, "acknowledgment received");
        status
    }

    /// Wait for an incident's escalation to finish.
    pub async fn wait(&self, id: IncidentId) -> Result<(), EngineError> {
        Ok(self.coordinator.wait(id).await?)
    }

    pub async fn active_incidents(&self) -> Vec<IncidentId> {
        self.coordinator.active().await
    }
}

/// Wires an [`Engine`] from configuration, with optional overrides for tests
/// and embedding applications.
pub struct EngineBuilder {
    config: LifelineConfig,
    router: Option<ChannelRouter>,
    clock: Option<Arc<dyn Clock>>,
    pool: Option<Pool>,
    resources: Option<Arc<dyn ResourceProvider>>,
}

impl EngineBuilder {
    pub fn new(config: LifelineConfig) -> Self {
        Self {
            config,
            router: None,
            clock: None,
            pool: None,
            resources: None,
        }
    }

    /// Replace the senders built from `[[channels]]`.
    pub fn with_router(mut self, router: ChannelRouter) -> Self {
        self.router = Some(router);
        self
    }

    /// Register one sender, starting from an empty router.
    pub fn with_sender(mut self, channel: Channel, sender: Arc<dyn ChannelSender>) -> Self {
        self.router
            .get_or_insert_with(ChannelRouter::new)
            .register(channel, sender);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_pool(mut self, pool: Pool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceProvider>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn build(self) -> Result<Engine> {
        let config = self.config;
        let policy = config.validate()?;

        let router = match self.router {
            Some(router) => router,
            None => ChannelRouter::from_config(&config.channels, config.dispatch.send_timeout())?,
        };

        let pool = match (self.pool, &config.storage.db_path) {
            (Some(pool), _) => Some(pool),
            (None, Some(path)) => {
                let path = path.to_str().context("db_path is not valid UTF-8")?;
                info!(%path, "initializing database");
                Some(storage::open_pool(path)?)
            }
            (None, None) => None,
        };

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let resources = self.resources.unwrap_or_else(|| {
            Arc::new(StaticResources::with_overrides(
                &config.resources,
                config.scorer.default_language.clone(),
            ))
        });

        let log = Arc::new(match &pool {
            Some(pool) => InterventionLog::with_pool(pool.clone()),
            None => InterventionLog::new(),
        });
        let directory = Arc::new(ResponderDirectory::new(config.responders.clone()));
        let acks = Arc::new(AckRegistry::new());

        let dispatcher = Arc::new(NotificationDispatcher::new(
            directory.clone(),
            router,
            acks.clone(),
            log.clone(),
            clock.clone(),
            config.dispatch.clone(),
        ));
        let local = Arc::new(LocalActions::new(resources, clock.clone()));
        let coordinator = Arc::new(EscalationCoordinator::new(
            dispatcher,
            local,
            log.clone(),
            clock.clone(),
            pool,
        ));

        Ok(Engine {
            scorer: RiskScorer::new(&config.scorer),
            planner: EscalationPlanner::new(policy),
            directory,
            coordinator,
            log,
            acks,
            clock,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use crate::escalation::ActionKind;

    fn engine() -> Engine {
        Engine::builder(LifelineConfig::default())
            .with_clock(Arc::new(TokioClock::new()))
            .build()
            .unwrap()
    }

    fn request(text: &str) -> RiskAssessmentRequest {
        RiskAssessmentRequest {
            user_id: "u1".into(),
            text: text.into(),
            language: Some("en".into()),
            context: UserRiskContext::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_incident_for_benign_text() {
        let e = engine();
        let id = e.assess_and_escalate(request("Had a lovely walk today")).await.unwrap();
        assert!(id.is_none());
        assert!(e.active_incidents().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_submission_opens_incident() {
        let e = engine();
        let submission = e
            .submit(request("I want to kill myself tonight, I have a plan"))
            .await
            .unwrap();
        assert_eq!(submission.assessment.severity, Severity::Critical);
        assert!(submission.plan.phases[0]
            .actions
            .contains(&ActionKind::ContactEmergencyServices));

        let id = submission.incident_id.unwrap();
        assert_eq!(e.active_incidents().await, vec![id]);
        assert!(e.resolve(id).await.unwrap());
        e.wait(id).await.unwrap();
        assert!(e.incident_status(id).await.unwrap().resolved);
        assert!(e.intervention_record(id).await.unwrap().is_finalized());
    }

    #[tokio::test]
    async fn test_unknown_incident_and_delivery() {
        let e = engine();
        let id = Uuid::new_v4();
        assert!(matches!(e.resolve(id).await, Err(EngineError::UnknownIncident(_))));
        assert!(e.incident_status(id).await.is_none());
        assert_eq!(e.acknowledge(Uuid::new_v4()).await, AckStatus::Unknown);
    }

    #[test]
    fn test_request_debug_hides_text() {
        let r = request("something very private");
        let shown = format!("{r:?}");
        assert!(!shown.contains("private"));
        assert!(shown.contains("text_len"));
    }
}
