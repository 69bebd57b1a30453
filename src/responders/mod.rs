//! Responder reference data: hotlines, emergency services, counselors and
//! trusted contacts, with the channels and hours they can be reached on.

pub mod availability;
pub mod directory;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use self::availability::Availability;
pub use self::directory::ResponderDirectory;

/// What sort of responder this is; drives which actions may target it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderKind {
    Hotline,
    EmergencyServices,
    Counselor,
    TrustedContact,
}

/// Delivery channel for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Voice,
    Sms,
    Push,
    AppNotification,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Voice,
        Channel::Sms,
        Channel::Push,
        Channel::AppNotification,
    ];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Voice => write!(f, "voice"),
            Channel::Sms => write!(f, "sms"),
            Channel::Push => write!(f, "push"),
            Channel::AppNotification => write!(f, "app_notification"),
        }
    }
}

/// One way of reaching a responder, e.g. an SMS number or a push token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPoint {
    pub channel: Channel,
    pub address: String,
}

/// A human or service that can be contacted for crisis support.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Responder {
    pub id: String,
    pub display_name: String,
    pub kind: ResponderKind,
    /// Contact points in the responder's own order of preference.
    pub contacts: Vec<ContactPoint>,
    /// Primary language subtags, e.g. `["en", "es"]`.
    pub languages: BTreeSet<String>,
    #[serde(default)]
    pub availability: Availability,
    /// Lower is contacted first.
    pub priority: u32,
    #[serde(default)]
    pub avg_response_secs: Option<u64>,
    #[serde(default)]
    pub specialties: Vec<String>,
}

impl Responder {
    pub fn speaks(&self, language: &str) -> bool {
        self.languages.iter().any(|l| l.eq_ignore_ascii_case(language))
    }

    pub fn contact_for(&self, channel: Channel) -> Option<&ContactPoint> {
        self.contacts.iter().find(|c| c.channel == channel)
    }
}
