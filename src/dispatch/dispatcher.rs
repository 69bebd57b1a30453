use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    AckRegistry, ChannelRouter, DispatchContext, DispatchError, Notification,
    NotificationTemplate,
};
use crate::clock::Clock;
use crate::config::DispatchConfig;
use crate::detect::Severity;
use crate::escalation::ActionKind;
use crate::intervention::{ActionOutcome, FailureReason, InterventionLog, OutcomeResult};
use crate::responders::{Channel, ContactPoint, Responder, ResponderDirectory};

/// How an acknowledgment wait ended.
enum AckWait {
    Acknowledged(f64),
    DeadlineExceeded,
    Cancelled,
}

/// Delivers human-contact actions with bounded fallback across responders.
///
/// Stateless apart from its collaborators; one instance serves every incident.
pub struct NotificationDispatcher {
    directory: Arc<ResponderDirectory>,
    router: ChannelRouter,
    acks: Arc<AckRegistry>,
    log: Arc<InterventionLog>,
    clock: Arc<dyn Clock>,
    config: DispatchConfig,
}

impl NotificationDispatcher {
    pub fn new(
        directory: Arc<ResponderDirectory>,
        router: ChannelRouter,
        acks: Arc<AckRegistry>,
        log: Arc<InterventionLog>,
        clock: Arc<dyn Clock>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            directory,
            router,
            acks,
            log,
            clock,
            config,
        }
    }

    pub fn acks(&self) -> &Arc<AckRegistry> {
        &self.acks
    }

    /// Deliver `action` for the incident described by `ctx`.
    ///
    /// Every attempt is appended to the intervention log. The returned outcome
    /// is the final one: `Acknowledged`, `Delivered`, `AlreadyAcknowledged`,
    /// `Cancelled`, or `Failed` with `AttemptsExhausted` once `max_attempts`
    /// responders were tried. Send errors and missed deadlines never surface
    /// as `Err`; only a configuration fault or a log failure does.
    pub async fn dispatch(
        &self,
        action: ActionKind,
        ctx: &DispatchContext,
    ) -> Result<ActionOutcome, DispatchError> {
        let template =
            NotificationTemplate::for_action(action).ok_or(DispatchError::NotDispatchable(action))?;

        if self.acks.is_satisfied(ctx.incident_id, action).await {
            debug!(
                incident_id = %ctx.incident_id,
                %action,
                "action already acknowledged, not re-sending"
            );
            let outcome = self.outcome(action, ctx, OutcomeResult::AlreadyAcknowledged);
            self.log.append(ctx.incident_id, outcome.clone()).await?;
            return Ok(outcome);
        }

        let candidates: Vec<(Responder, ContactPoint)> = self
            .directory
            .candidates(action.target_kinds(), &ctx.language, self.clock.now())
            .await
            .into_iter()
            .filter_map(|r| {
                let contact = self.choose_contact(&r, ctx.severity)?.clone();
                Some((r, contact))
            })
            .collect();

        if candidates.is_empty() {
            error!(
                alert = "operational",
                incident_id = %ctx.incident_id,
                %action,
                language = %ctx.language,
                severity = %ctx.severity,
                "no responder available for required language"
            );
            return Err(DispatchError::NoResponders {
                action,
                language: ctx.language.clone(),
            });
        }

        let max_attempts = self.config.max_attempts.max(1) as usize;
        for (attempt, (responder, contact)) in candidates.iter().take(max_attempts).enumerate() {
            if ctx.cancel.is_cancelled() {
                let outcome = self.outcome(action, ctx, OutcomeResult::Cancelled);
                self.log.append(ctx.incident_id, outcome.clone()).await?;
                return Ok(outcome);
            }

            let attempt = attempt as u32 + 1;
            let delivery_id = Uuid::new_v4();
            let notification = Notification {
                delivery_id,
                incident_id: ctx.incident_id,
                action,
                severity: ctx.severity,
                concerns: ctx.concerns.clone(),
                language: ctx.language.clone(),
                summary: template.summary.to_string(),
                requires_response: template.requires_response,
                attempt,
            };

            let notify = if template.requires_response {
                Some(self.acks.register(delivery_id, ctx.incident_id, action).await)
            } else {
                None
            };

            let attempted_at = self.clock.now();
            let base = ActionOutcome::new(action, ctx.phase, attempted_at, OutcomeResult::Failed)
                .with_responder(responder, contact.channel)
                .with_delivery(delivery_id);

            if let Err(reason) = self.send(responder, contact, &notification).await {
                if notify.is_some() {
                    self.acks.close(delivery_id).await;
                }
                warn!(
                    incident_id = %ctx.incident_id,
                    responder_id = %responder.id,
                    channel = %contact.channel,
                    attempt,
                    ?reason,
                    "send failed, trying next responder"
                );
                self.log
                    .append(ctx.incident_id, base.with_failure(reason))
                    .await?;
                continue;
            }

            let Some(notify) = notify else {
                let outcome = ActionOutcome {
                    result: OutcomeResult::Delivered,
                    ..base
                };
                self.log.append(ctx.incident_id, outcome.clone()).await?;
                return Ok(outcome);
            };

            self.acks.mark_sent(delivery_id).await;
            let deadline = self.config.ack_deadline(ctx.severity);
            let wait = tokio::select! {
                _ = notify.notified() => None,
                _ = tokio::time::sleep(deadline) => Some(AckWait::DeadlineExceeded),
                _ = ctx.cancel.cancelled() => Some(AckWait::Cancelled),
            };
            // The registry is authoritative: an acknowledgment that landed just
            // before the deadline or the cancellation still counts.
            let wait = match self.acks.close(delivery_id).await {
                Some(rt) => AckWait::Acknowledged(rt.as_secs_f64()),
                None => wait.unwrap_or(AckWait::DeadlineExceeded),
            };

            match wait {
                AckWait::Acknowledged(secs) => {
                    info!(
                        incident_id = %ctx.incident_id,
                        responder_id = %responder.id,
                        channel = %contact.channel,
                        response_time_secs = secs,
                        "responder acknowledged"
                    );
                    let outcome = ActionOutcome {
                        result: OutcomeResult::Acknowledged,
                        ..base
                    }
                    .with_response_time(secs);
                    self.log.append(ctx.incident_id, outcome.clone()).await?;
                    return Ok(outcome);
                }
                AckWait::Cancelled => {
                    debug!(
                        incident_id = %ctx.incident_id,
                        responder_id = %responder.id,
                        "ack wait cancelled by resolution"
                    );
                    let outcome = ActionOutcome {
                        result: OutcomeResult::Cancelled,
                        ..base
                    };
                    self.log.append(ctx.incident_id, outcome.clone()).await?;
                    return Ok(outcome);
                }
                AckWait::DeadlineExceeded => {
                    warn!(
                        incident_id = %ctx.incident_id,
                        responder_id = %responder.id,
                        channel = %contact.channel,
                        deadline_secs = deadline.as_secs(),
                        "acknowledgment deadline exceeded, escalating to next responder"
                    );
                    let outcome = ActionOutcome {
                        result: OutcomeResult::Unacknowledged,
                        ..base
                    }
                    .with_failure(FailureReason::DeadlineExceeded);
                    self.log.append(ctx.incident_id, outcome).await?;
                }
            }
        }

        warn!(
            incident_id = %ctx.incident_id,
            %action,
            attempts = max_attempts.min(candidates.len()),
            "all dispatch attempts exhausted"
        );
        let outcome = self
            .outcome(action, ctx, OutcomeResult::Failed)
            .with_failure(FailureReason::AttemptsExhausted);
        self.log.append(ctx.incident_id, outcome.clone()).await?;
        Ok(outcome)
    }

    /// Channel policy: Critical prefers voice then SMS, High prefers push then
    /// SMS, anything else takes the responder's first contact. Only channels
    /// with a registered sender are eligible.
    fn choose_contact<'r>(
        &self,
        responder: &'r Responder,
        severity: Severity,
    ) -> Option<&'r ContactPoint> {
        let preferred: &[Channel] = match severity {
            Severity::Critical => &[Channel::Voice, Channel::Sms],
            Severity::High => &[Channel::Push, Channel::Sms],
            _ => &[],
        };
        preferred
            .iter()
            .filter_map(|&channel| responder.contact_for(channel))
            .find(|c| self.router.supports(c.channel))
            .or_else(|| {
                responder
                    .contacts
                    .iter()
                    .find(|c| self.router.supports(c.channel))
            })
    }

    async fn send(
        &self,
        responder: &Responder,
        contact: &ContactPoint,
        notification: &Notification,
    ) -> Result<String, FailureReason> {
        let sender = self
            .router
            .get(contact.channel)
            .ok_or(FailureReason::NoSenderForChannel)?;
        match tokio::time::timeout(
            self.config.send_timeout(),
            sender.send(responder, contact, notification),
        )
        .await
        {
            Ok(Ok(receipt)) => {
                debug!(
                    delivery_id = %notification.delivery_id,
                    sender = sender.name(),
                    %receipt,
                    "notification sent"
                );
                Ok(receipt)
            }
            Ok(Err(e)) => {
                debug!(delivery_id = %notification.delivery_id, error = %e, "sender error");
                Err(FailureReason::SendError)
            }
            Err(_) => Err(FailureReason::SendTimeout),
        }
    }

    fn outcome(
        &self,
        action: ActionKind,
        ctx: &DispatchContext,
        result: OutcomeResult,
    ) -> ActionOutcome {
        ActionOutcome::new(action, ctx.phase, self.clock.now(), result)
    }
}
