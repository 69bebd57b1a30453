//! Handlers for actions that run inside the app rather than reaching a person:
//! support messages, crisis mode, resource lists, offline coping content and
//! follow-up scheduling.
//!
//! Handlers only ever read from the resource provider. Their output is
//! attached to the incident for the app to display; none of it derives from
//! the user's text.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::ActionKind;
use crate::clock::Clock;
use crate::intervention::{ActionOutcome, FailureReason, OutcomeResult};
use crate::resources::{ResourceBundle, ResourceError, ResourceProvider};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("resource content unavailable: {0}")]
    Resources(#[from] ResourceError),
    #[error("action {0} has no local handler")]
    NotLocal(ActionKind),
    #[error("follow-up {0} minutes out is not a representable time")]
    FollowUpOutOfRange(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    SupportMessage,
    CrisisMode,
    Resources,
    OfflineResources,
    EmergencyFallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeContact {
    pub label: String,
    pub number: String,
}

/// Support content for the app to show the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserNotice {
    pub kind: NoticeKind,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub contacts: Vec<NoticeContact>,
}

/// Change a local action makes to its incident.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalEffect {
    None,
    Notice(UserNotice),
    CrisisMode(UserNotice),
    FollowUp(DateTime<Utc>),
}

pub struct LocalActions {
    resources: Arc<dyn ResourceProvider>,
    clock: Arc<dyn Clock>,
}

impl LocalActions {
    pub fn new(resources: Arc<dyn ResourceProvider>, clock: Arc<dyn Clock>) -> Self {
        Self { resources, clock }
    }

    pub fn execute(
        &self,
        action: ActionKind,
        language: &str,
        phase: Option<usize>,
    ) -> Result<(ActionOutcome, LocalEffect), ActionError> {
        let now = self.clock.now();
        let effect = match action {
            ActionKind::ScheduleFollowUp { after_mins } => {
                let at = i64::try_from(after_mins)
                    .ok()
                    .and_then(chrono::Duration::try_minutes)
                    .and_then(|after| now.checked_add_signed(after))
                    .ok_or(ActionError::FollowUpOutOfRange(after_mins))?;
                debug!(follow_up_at = %at, "follow-up scheduled");
                LocalEffect::FollowUp(at)
            }
            ActionKind::LocalSupportMessage => {
                let bundle = self.resources.bundle(language)?;
                LocalEffect::Notice(UserNotice {
                    kind: NoticeKind::SupportMessage,
                    title: bundle.hotline_name.clone(),
                    body: bundle.support_message.clone(),
                    contacts: vec![hotline(&bundle)],
                })
            }
            ActionKind::CrisisMode => {
                let bundle = self.resources.bundle(language)?;
                LocalEffect::CrisisMode(UserNotice {
                    kind: NoticeKind::CrisisMode,
                    title: bundle.hotline_name.clone(),
                    body: bundle.grounding_exercise.clone(),
                    contacts: vec![hotline(&bundle), emergency(&bundle)],
                })
            }
            ActionKind::ProvideResources => {
                let bundle = self.resources.bundle(language)?;
                let mut contacts = vec![hotline(&bundle)];
                if let Some(text_line) = &bundle.text_line {
                    contacts.push(NoticeContact {
                        label: "text".to_string(),
                        number: text_line.clone(),
                    });
                }
                contacts.push(emergency(&bundle));
                LocalEffect::Notice(UserNotice {
                    kind: NoticeKind::Resources,
                    title: bundle.hotline_name.clone(),
                    body: bundle.support_message.clone(),
                    contacts,
                })
            }
            ActionKind::ActivateOfflineResources => {
                let bundle = self.resources.bundle(language)?;
                LocalEffect::Notice(UserNotice {
                    kind: NoticeKind::OfflineResources,
                    title: bundle.hotline_name.clone(),
                    body: bundle.offline_tips.join("\n"),
                    contacts: vec![hotline(&bundle), emergency(&bundle)],
                })
            }
            ActionKind::EmergencyFallback => return Ok(self.emergency_fallback(language, phase)),
            ActionKind::AlertCounselor
            | ActionKind::ContactEmergencyServices
            | ActionKind::ConsiderFamilyNotification => return Err(ActionError::NotLocal(action)),
        };

        Ok((
            ActionOutcome::new(action, phase, now, OutcomeResult::Completed),
            effect,
        ))
    }

    /// Show the hotline and emergency numbers with no further automation.
    ///
    /// Never fails: if the resource provider does, compiled-in numbers are used
    /// and the outcome records `ResourcesUnavailable`.
    pub fn emergency_fallback(
        &self,
        language: &str,
        phase: Option<usize>,
    ) -> (ActionOutcome, LocalEffect) {
        let mut outcome = ActionOutcome::new(
            ActionKind::EmergencyFallback,
            phase,
            self.clock.now(),
            OutcomeResult::Completed,
        );
        let bundle = match self.resources.bundle(language) {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!(error = %e, "resource provider failed, using built-in emergency numbers");
                outcome = outcome.with_failure(FailureReason::ResourcesUnavailable);
                ResourceBundle::emergency_fallback()
            }
        };
        let notice = UserNotice {
            kind: NoticeKind::EmergencyFallback,
            title: bundle.hotline_name.clone(),
            body: bundle.support_message.clone(),
            contacts: vec![hotline(&bundle), emergency(&bundle)],
        };
        (outcome, LocalEffect::Notice(notice))
    }
}

fn hotline(bundle: &ResourceBundle) -> NoticeContact {
    NoticeContact {
        label: "hotline".to_string(),
        number: bundle.hotline_number.clone(),
    }
}

fn emergency(bundle: &ResourceBundle) -> NoticeContact {
    NoticeContact {
        label: "emergency".to_string(),
        number: bundle.emergency_number.clone(),
    }
}
