//! Per-incident escalation driver.
//!
//! Each incident gets a driver task that spawns one timer task per plan phase.
//! A phase fires at `detection + delay` (never relative to the previous
//! phase), claims itself under the incident lock, runs its actions
//! concurrently, and settles. Resolution flips the incident under the same
//! lock and cancels the incident's token, so every phase is either executed
//! or skipped, exactly once. The driver finalizes the intervention record
//! after all phase tasks have returned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::incident::{Incident, IncidentId};
use super::local::LocalActions;
use super::{ActionKind, Phase};
use crate::clock::Clock;
use crate::dispatch::{DispatchContext, DispatchError, NotificationDispatcher};
use crate::intervention::{ActionOutcome, FailureReason, InterventionLog, LogError, OutcomeResult};
use crate::storage::{self, Pool};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("unknown incident {0}")]
    UnknownIncident(IncidentId),
    #[error(transparent)]
    Log(#[from] LogError),
}

struct Slot {
    id: IncidentId,
    incident: Mutex<Incident>,
    cancel: CancellationToken,
    /// Detection time on tokio's clock; phase timers are measured from here.
    origin: Instant,
    driver: Mutex<Option<JoinHandle<()>>>,
}

enum ActionResult {
    Done,
    /// Dispatch could not reach anyone; show the static fallback.
    NeedsFallback,
    /// A handler returned a hard error.
    Faulted,
}

pub struct EscalationCoordinator {
    dispatcher: Arc<NotificationDispatcher>,
    local: Arc<LocalActions>,
    log: Arc<InterventionLog>,
    clock: Arc<dyn Clock>,
    pool: Option<Pool>,
    incidents: RwLock<HashMap<IncidentId, Arc<Slot>>>,
}

impl EscalationCoordinator {
    pub fn new(
        dispatcher: Arc<NotificationDispatcher>,
        local: Arc<LocalActions>,
        log: Arc<InterventionLog>,
        clock: Arc<dyn Clock>,
        pool: Option<Pool>,
    ) -> Self {
        Self {
            dispatcher,
            local,
            log,
            clock,
            pool,
            incidents: RwLock::new(HashMap::new()),
        }
    }

    /// Open the incident's record and start driving its plan. Returns once the
    /// driver is spawned; phase 0 runs immediately on it.
    pub async fn start(
        self: &Arc<Self>,
        incident: Incident,
    ) -> Result<IncidentId, CoordinatorError> {
        let id = incident.id;
        self.log
            .open(
                id,
                incident.assessment.severity,
                incident.assessment.matched_concerns.clone(),
                incident.detected_at,
            )
            .await?;

        info!(
            incident_id = %id,
            severity = %incident.assessment.severity,
            phases = incident.plan.phases.len(),
            "incident opened"
        );
        self.persist(&incident).await;

        let slot = Arc::new(Slot {
            id,
            incident: Mutex::new(incident),
            cancel: CancellationToken::new(),
            origin: Instant::now(),
            driver: Mutex::new(None),
        });

        let this = self.clone();
        let driver_slot = slot.clone();
        let handle = tokio::spawn(async move { this.drive(driver_slot).await });
        *slot.driver.lock().await = Some(handle);

        self.incidents.write().await.insert(id, slot);
        Ok(id)
    }

    /// External "user is safe" signal. Idempotent; true on the first call
    /// that actually resolved the incident.
    pub async fn resolve(&self, id: IncidentId) -> Result<bool, CoordinatorError> {
        let slot = self.slot(id).await.ok_or(CoordinatorError::UnknownIncident(id))?;
        let first = {
            let mut incident = slot.incident.lock().await;
            incident.resolve(self.clock.now())
        };
        // Cancel after the flag is set so a timer woken by the cancellation
        // observes the resolution when it tries to claim its phase.
        slot.cancel.cancel();
        if first {
            info!(incident_id = %id, "incident resolved by confirmation");
        }
        Ok(first)
    }

    /// Current incident snapshot, falling back to storage.
    pub async fn status(&self, id: IncidentId) -> Option<Incident> {
        if let Some(slot) = self.slot(id).await {
            return Some(slot.incident.lock().await.clone());
        }
        let pool = self.pool.clone()?;
        match tokio::task::spawn_blocking(move || storage::load_incident(&pool, id)).await {
            Ok(Ok(incident)) => incident,
            Ok(Err(e)) => {
                error!(incident_id = %id, error = %e, "failed to load incident");
                None
            }
            Err(e) => {
                error!(incident_id = %id, error = %e, "incident loader task failed");
                None
            }
        }
    }

    /// Wait for the incident's driver to finish.
    pub async fn wait(&self, id: IncidentId) -> Result<(), CoordinatorError> {
        let slot = self.slot(id).await.ok_or(CoordinatorError::UnknownIncident(id))?;
        let handle = slot.driver.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(incident_id = %id, error = %e, "incident driver panicked");
            }
        }
        Ok(())
    }

    /// Incidents that have not reached a terminal state.
    pub async fn active(&self) -> Vec<IncidentId> {
        let slots: Vec<Arc<Slot>> = self.incidents.read().await.values().cloned().collect();
        let mut active = Vec::new();
        for slot in slots {
            if !slot.incident.lock().await.is_terminal() {
                active.push(slot.id);
            }
        }
        active.sort();
        active
    }

    async fn slot(&self, id: IncidentId) -> Option<Arc<Slot>> {
        self.incidents.read().await.get(&id).cloned()
    }

    async fn drive(self: Arc<Self>, slot: Arc<Slot>) {
        let phases = slot.incident.lock().await.plan.phases.clone();

        let mut tasks = JoinSet::new();
        for (index, phase) in phases.iter().cloned().enumerate() {
            let this = self.clone();
            let slot = slot.clone();
            tasks.spawn(async move { this.run_phase(slot, index, phase).await });
        }
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!(incident_id = %slot.id, error = %e, "phase task panicked");
            }
        }

        self.finish(&slot, &phases).await;
    }

    async fn run_phase(self: Arc<Self>, slot: Arc<Slot>, index: usize, phase: Phase) {
        let Some(fire_at) = slot.origin.checked_add(phase.delay()) else {
            error!(
                incident_id = %slot.id,
                phase = index,
                delay_secs = phase.delay_secs,
                "phase delay out of range"
            );
            return self.fail_phase(&slot, index, &phase).await;
        };
        tokio::select! {
            biased;
            _ = slot.cancel.cancelled() => return,
            _ = tokio::time::sleep_until(fire_at) => {}
        }

        // Checked at fire time: a resolution that raced the timer wins here.
        let ctx = {
            let mut incident = slot.incident.lock().await;
            if !incident.claim_phase(index) {
                debug!(incident_id = %slot.id, phase = index, "phase not claimed");
                return;
            }
            self.context(&slot, &incident, index)
        };
        info!(
            incident_id = %slot.id,
            phase = index,
            name = %phase.name,
            actions = phase.actions.len(),
            "executing phase"
        );

        let fallback_shown = Arc::new(AtomicBool::new(false));
        let mut actions = JoinSet::new();
        for action in phase.actions.iter().copied() {
            let this = self.clone();
            let slot = slot.clone();
            let ctx = ctx.clone();
            let fallback_shown = fallback_shown.clone();
            actions.spawn(async move {
                this.run_action(&slot, action, ctx, &fallback_shown).await
            });
        }

        let mut faulted = false;
        while let Some(res) = actions.join_next().await {
            match res {
                Ok(ActionResult::Done) | Ok(ActionResult::NeedsFallback) => {}
                Ok(ActionResult::Faulted) => faulted = true,
                Err(e) => {
                    error!(
                        incident_id = %slot.id,
                        phase = index,
                        error = %e,
                        "action task panicked"
                    );
                    faulted = true;
                    self.show_fallback(&slot, &ctx, &fallback_shown).await;
                }
            }
        }

        let snapshot = {
            let mut incident = slot.incident.lock().await;
            incident.finish_phase(index, faulted);
            incident.clone()
        };
        self.persist(&snapshot).await;
    }

    /// Settle a phase that cannot be scheduled: every action is a fault and
    /// the user gets the emergency fallback.
    async fn fail_phase(&self, slot: &Slot, index: usize, phase: &Phase) {
        let ctx = {
            let mut incident = slot.incident.lock().await;
            if !incident.claim_phase(index) {
                return;
            }
            self.context(slot, &incident, index)
        };
        for action in &phase.actions {
            self.record_fault(*action, &ctx).await;
        }
        self.show_fallback(slot, &ctx, &AtomicBool::new(false)).await;
        let snapshot = {
            let mut incident = slot.incident.lock().await;
            incident.finish_phase(index, true);
            incident.clone()
        };
        self.persist(&snapshot).await;
    }

    fn context(&self, slot: &Slot, incident: &Incident, index: usize) -> DispatchContext {
        DispatchContext {
            incident_id: slot.id,
            severity: incident.assessment.severity,
            language: incident.assessment.language.clone(),
            concerns: incident.assessment.matched_concerns.clone(),
            phase: Some(index),
            detected_at: incident.detected_at,
            cancel: slot.cancel.clone(),
        }
    }

    /// Run one action and apply its effect to the incident as soon as it
    /// returns, so local content is visible while other actions in the same
    /// phase are still waiting on responders.
    async fn run_action(
        self: Arc<Self>,
        slot: &Slot,
        action: ActionKind,
        ctx: DispatchContext,
        fallback_shown: &AtomicBool,
    ) -> ActionResult {
        let result = if action.is_human_contact() {
            self.dispatch_action(action, &ctx).await
        } else {
            match self.local.execute(action, &ctx.language, ctx.phase) {
                Ok((outcome, effect)) => {
                    self.record(ctx.incident_id, outcome).await;
                    slot.incident.lock().await.apply(effect);
                    ActionResult::Done
                }
                Err(e) => {
                    error!(
                        incident_id = %ctx.incident_id,
                        %action,
                        error = %e,
                        "local action fault"
                    );
                    self.record_fault(action, &ctx).await;
                    ActionResult::Faulted
                }
            }
        };

        if !matches!(result, ActionResult::Done) {
            self.show_fallback(slot, &ctx, fallback_shown).await;
        }
        result
    }

    async fn dispatch_action(&self, action: ActionKind, ctx: &DispatchContext) -> ActionResult {
        match self.dispatcher.dispatch(action, ctx).await {
            Ok(outcome) if outcome.result == OutcomeResult::Failed => ActionResult::NeedsFallback,
            Ok(_) => ActionResult::Done,
            Err(DispatchError::NoResponders { .. }) => {
                let outcome =
                    ActionOutcome::new(action, ctx.phase, self.clock.now(), OutcomeResult::Failed)
                        .with_failure(FailureReason::NoResponders);
                self.record(ctx.incident_id, outcome).await;
                ActionResult::NeedsFallback
            }
            Err(e) => {
                error!(incident_id = %ctx.incident_id, %action, error = %e, "dispatch fault");
                self.record_fault(action, ctx).await;
                ActionResult::Faulted
            }
        }
    }

    /// Show the static emergency fallback, at most once per phase.
    async fn show_fallback(&self, slot: &Slot, ctx: &DispatchContext, shown: &AtomicBool) {
        if shown.swap(true, Ordering::AcqRel) {
            return;
        }
        warn!(incident_id = %slot.id, phase = ?ctx.phase, "showing emergency fallback");
        let (outcome, effect) = self.local.emergency_fallback(&ctx.language, ctx.phase);
        self.record(slot.id, outcome).await;
        slot.incident.lock().await.apply(effect);
    }

    /// Skip whatever never ran, terminate the incident and finalize its record.
    async fn finish(&self, slot: &Slot, phases: &[Phase]) {
        let now = self.clock.now();
        let (skipped, snapshot) = {
            let mut incident = slot.incident.lock().await;
            let skipped = incident.skip_pending();
            incident.exhaust(now);
            (skipped, incident.clone())
        };

        for index in &skipped {
            if let Some(phase) = phases.get(*index) {
                for action in &phase.actions {
                    let outcome =
                        ActionOutcome::new(*action, Some(*index), now, OutcomeResult::Skipped);
                    self.record(slot.id, outcome).await;
                }
            }
        }

        if let Err(e) = self.log.finalize(slot.id, snapshot.resolution(), now).await {
            error!(incident_id = %slot.id, error = %e, "failed to finalize intervention record");
        }
        self.dispatcher.acks().forget_incident(slot.id).await;
        self.persist(&snapshot).await;

        info!(
            incident_id = %slot.id,
            resolution = ?snapshot.resolution(),
            skipped_phases = skipped.len(),
            "incident closed"
        );
    }

    async fn record(&self, incident_id: IncidentId, outcome: ActionOutcome) {
        if let Err(e) = self.log.append(incident_id, outcome).await {
            error!(%incident_id, error = %e, "failed to append action outcome");
        }
    }

    async fn record_fault(&self, action: ActionKind, ctx: &DispatchContext) {
        let outcome = ActionOutcome::new(action, ctx.phase, self.clock.now(), OutcomeResult::Failed)
            .with_failure(FailureReason::HandlerFault);
        self.record(ctx.incident_id, outcome).await;
    }

    async fn persist(&self, incident: &Incident) {
        let Some(pool) = self.pool.clone() else {
            return;
        };
        let snapshot = incident.clone();
        match tokio::task::spawn_blocking(move || storage::save_incident(&pool, &snapshot)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(incident_id = %incident.id, error = %e, "failed to persist incident")
            }
            Err(e) => {
                error!(incident_id = %incident.id, error = %e, "incident persistence task failed")
            }
        }
    }
}
