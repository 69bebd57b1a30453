//! Read-mostly store of known responders.
//!
//! Dispatch takes shared read locks concurrently; operator updates (priority,
//! availability, roster changes) take a brief exclusive lock.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use super::{Availability, Responder, ResponderKind};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("unknown responder '{0}'")]
    UnknownResponder(String),
    #[error("responder '{0}' has no contact points")]
    NoContactPoints(String),
}

pub struct ResponderDirectory {
    responders: RwLock<Vec<Responder>>,
}

impl ResponderDirectory {
    pub fn new(responders: Vec<Responder>) -> Self {
        let mut responders = responders;
        sort(&mut responders);
        Self {
            responders: RwLock::new(responders),
        }
    }

    /// Responders of any of `kinds` that speak `language` and are reachable at
    /// `at`, lowest priority value first.
    pub async fn candidates(
        &self,
        kinds: &[ResponderKind],
        language: &str,
        at: DateTime<Utc>,
    ) -> Vec<Responder> {
        let responders = self.responders.read().await;
        responders
            .iter()
            .filter(|r| kinds.contains(&r.kind))
            .filter(|r| r.speaks(language))
            .filter(|r| r.availability.is_available_at(at))
            .filter(|r| !r.contacts.is_empty())
            .cloned()
            .collect()
    }

    pub async fn list(&self) -> Vec<Responder> {
        self.responders.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<Responder> {
        self.responders.read().await.iter().find(|r| r.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.responders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Insert or replace a responder by id.
    pub async fn upsert(&self, responder: Responder) -> Result<(), DirectoryError> {
        if responder.contacts.is_empty() {
            return Err(DirectoryError::NoContactPoints(responder.id));
        }
        let mut responders = self.responders.write().await;
        info!(responder_id = %responder.id, priority = responder.priority, "responder upserted");
        responders.retain(|r| r.id != responder.id);
        responders.push(responder);
        sort(&mut responders);
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> Result<Responder, DirectoryError> {
        let mut responders = self.responders.write().await;
        let pos = responders
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| DirectoryError::UnknownResponder(id.to_string()))?;
        info!(responder_id = %id, "responder removed");
        Ok(responders.remove(pos))
    }

    pub async fn set_availability(
        &self,
        id: &str,
        availability: Availability,
    ) -> Result<(), DirectoryError> {
        let mut responders = self.responders.write().await;
        let responder = responders
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| DirectoryError::UnknownResponder(id.to_string()))?;
        responder.availability = availability;
        info!(responder_id = %id, "responder availability updated");
        Ok(())
    }

    pub async fn set_priority(&self, id: &str, priority: u32) -> Result<(), DirectoryError> {
        let mut responders = self.responders.write().await;
        let responder = responders
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| DirectoryError::UnknownResponder(id.to_string()))?;
        responder.priority = priority;
        sort(&mut responders);
        info!(responder_id = %id, priority, "responder priority updated");
        Ok(())
    }
}

fn sort(responders: &mut [Responder]) {
    responders.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
}
