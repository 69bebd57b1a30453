//! TOML configuration for the lifeline engine.
//!
//! Resolution order: an explicit path, the `LIFELINE_CONFIG` environment
//! variable, `/etc/lifeline/lifeline.toml`, then compiled-in defaults.
//! Every section is optional.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::detect::Severity;
use crate::escalation::{EscalationPolicy, PolicyConfig};
use crate::resources::ResourceBundle;
use crate::responders::{Availability, Channel, ContactPoint, Responder, ResponderKind};

pub const CONFIG_ENV_VAR: &str = "LIFELINE_CONFIG";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/lifeline/lifeline.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifelineConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default = "default_responders")]
    pub responders: Vec<Responder>,
    /// Per-language overrides of the built-in support content.
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceBundle>,
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,
}

impl Default for LifelineConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            storage: StorageConfig::default(),
            scorer: ScorerConfig::default(),
            dispatch: DispatchConfig::default(),
            policy: PolicyConfig::default(),
            responders: default_responders(),
            resources: BTreeMap::new(),
            channels: default_channels(),
        }
    }
}

impl LifelineConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded lifeline configuration");
        Ok(config)
    }

    /// Try, in order: `$LIFELINE_CONFIG`, `/etc/lifeline/lifeline.toml`,
    /// compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "LIFELINE_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// `path` when given, otherwise [`load_or_default`](Self::load_or_default).
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::load_or_default()),
        }
    }

    /// Semantic checks beyond what deserialization enforces.
    pub fn validate(&self) -> Result<EscalationPolicy> {
        let policy = EscalationPolicy::try_from(&self.policy).context("invalid [policy] table")?;

        if self.dispatch.max_attempts == 0 {
            bail!("dispatch.max_attempts must be at least 1");
        }
        if self.dispatch.send_timeout_secs == 0 {
            bail!("dispatch.send_timeout_secs must be at least 1");
        }

        for channel in &self.channels {
            if channel.sender == SenderKind::Webhook && channel.url.is_none() {
                bail!("webhook sender for channel '{}' has no url", channel.channel);
            }
        }

        let mut seen = std::collections::HashSet::new();
        for responder in &self.responders {
            if !seen.insert(responder.id.as_str()) {
                bail!("responder '{}' is defined more than once", responder.id);
            }
            if responder.contacts.is_empty() {
                bail!("responder '{}' has no contact points", responder.id);
            }
        }

        Ok(policy)
    }
}

// ---------------------------------------------------------------------------
// Server / logging / storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file for incidents and intervention records. In-memory only when unset.
    pub db_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Lexicon used when the submitted language is unsupported.
    pub default_language: String,
    /// A crisis within this many days raises severity one step.
    pub recent_crisis_window_days: u32,
    /// Longer input is a detection fault.
    pub max_input_chars: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            default_language: "en".to_string(),
            recent_crisis_window_days: 7,
            max_input_chars: 20_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Responders tried per action before giving up. Send failures and
    /// missed acknowledgment deadlines both count.
    pub max_attempts: u32,
    pub send_timeout_secs: u64,
    pub ack_deadline_mins: AckDeadlines,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            send_timeout_secs: 10,
            ack_deadline_mins: AckDeadlines::default(),
        }
    }
}

impl DispatchConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn ack_deadline(&self, severity: Severity) -> Duration {
        let mins = match severity {
            Severity::Critical => self.ack_deadline_mins.critical,
            Severity::High => self.ack_deadline_mins.high,
            Severity::Medium => self.ack_deadline_mins.medium,
            Severity::Low | Severity::None => self.ack_deadline_mins.low,
        };
        Duration::from_secs(mins * 60)
    }
}

/// Minutes a responder has to acknowledge, per severity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AckDeadlines {
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

impl Default for AckDeadlines {
    fn default() -> Self {
        Self {
            critical: 10,
            high: 30,
            medium: 120,
            low: 240,
        }
    }
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderKind {
    /// Write the notification to the tracing log only.
    Log,
    /// POST the notification as JSON to `url`.
    Webhook,
}

/// Which sender delivers a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub channel: Channel,
    pub sender: SenderKind,
    #[serde(default)]
    pub url: Option<String>,
}

fn default_channels() -> Vec<ChannelConfig> {
    Channel::ALL
        .iter()
        .map(|&channel| ChannelConfig {
            channel,
            sender: SenderKind::Log,
            url: None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Responders
// ---------------------------------------------------------------------------

fn default_responders() -> Vec<Responder> {
    fn contact(channel: Channel, address: &str) -> ContactPoint {
        ContactPoint {
            channel,
            address: address.to_string(),
        }
    }
    fn langs(list: &[&str]) -> std::collections::BTreeSet<String> {
        list.iter().map(|l| l.to_string()).collect()
    }

    vec![
        Responder {
            id: "hotline-988".to_string(),
            display_name: "988 Suicide & Crisis Lifeline".to_string(),
            kind: ResponderKind::Hotline,
            contacts: vec![contact(Channel::Voice, "988"), contact(Channel::Sms, "988")],
            languages: langs(&["en", "es"]),
            availability: Availability::Always,
            priority: 10,
            avg_response_secs: Some(60),
            specialties: vec!["suicide_prevention".to_string()],
        },
        Responder {
            id: "hotline-3114".to_string(),
            display_name: "3114 Prévention du suicide".to_string(),
            kind: ResponderKind::Hotline,
            contacts: vec![contact(Channel::Voice, "3114")],
            languages: langs(&["fr"]),
            availability: Availability::Always,
            priority: 10,
            avg_response_secs: Some(120),
            specialties: vec!["suicide_prevention".to_string()],
        },
        Responder {
            id: "ems-911".to_string(),
            display_name: "Emergency Services (911)".to_string(),
            kind: ResponderKind::EmergencyServices,
            contacts: vec![contact(Channel::Voice, "911")],
            languages: langs(&["en", "es"]),
            availability: Availability::Always,
            priority: 1,
            avg_response_secs: Some(30),
            specialties: Vec::new(),
        },
        Responder {
            id: "ems-112".to_string(),
            display_name: "Emergency Services (112)".to_string(),
            kind: ResponderKind::EmergencyServices,
            contacts: vec![contact(Channel::Voice, "112")],
            languages: langs(&["fr", "en"]),
            availability: Availability::Always,
            priority: 2,
            avg_response_secs: Some(30),
            specialties: Vec::new(),
        },
        Responder {
            id: "counselor-on-call".to_string(),
            display_name: "On-call Counselor".to_string(),
            kind: ResponderKind::Counselor,
            contacts: vec![
                contact(Channel::Push, "counselor-on-call"),
                contact(Channel::Sms, "+15550100"),
            ],
            languages: langs(&["en", "es", "fr"]),
            availability: Availability::Always,
            priority: 20,
            avg_response_secs: Some(300),
            specialties: vec!["crisis".to_string()],
        },
        Responder {
            id: "trusted-contact-relay".to_string(),
            display_name: "Trusted Contact Relay".to_string(),
            kind: ResponderKind::TrustedContact,
            contacts: vec![contact(Channel::AppNotification, "trusted-contacts")],
            languages: langs(&["en", "es", "fr"]),
            availability: Availability::Always,
            priority: 50,
            avg_response_secs: None,
            specialties: Vec::new(),
        },
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = LifelineConfig::default();
        assert_eq!(cfg.server.bind, "0.0.0.0:8080");
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.logging.format, LogFormat::Pretty);
        assert!(cfg.storage.db_path.is_none());
        assert_eq!(cfg.scorer.default_language, "en");
        assert_eq!(cfg.scorer.recent_crisis_window_days, 7);
        assert_eq!(cfg.dispatch.max_attempts, 2);
        assert_eq!(cfg.channels.len(), 4);
        assert!(cfg.responders.iter().any(|r| r.kind == ResponderKind::TrustedContact));
        cfg.validate().unwrap();
    }

    #[test]
    fn test_ack_deadlines_per_severity() {
        let d = DispatchConfig::default();
        assert_eq!(d.ack_deadline(Severity::Critical), Duration::from_secs(600));
        assert_eq!(d.ack_deadline(Severity::High), Duration::from_secs(1800));
        assert_eq!(d.ack_deadline(Severity::Medium), Duration::from_secs(7200));
        assert_eq!(d.ack_deadline(Severity::Low), Duration::from_secs(14400));
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
[server]
bind = "127.0.0.1:9000"

[logging]
level = "debug"
format = "json"

[storage]
db_path = "/var/lib/lifeline/lifeline.db"

[dispatch]
max_attempts = 3
ack_deadline_mins = { critical = 5 }

[[responders]]
id = "c1"
display_name = "Counselor One"
kind = "counselor"
contacts = [{ channel = "sms", address = "+1555" }]
languages = ["en"]
priority = 1
availability = { mode = "business_hours", start_hour = 9, end_hour = 17, utc_offset_minutes = -300, weekdays_only = true }

[resources.en]
hotline_name = "Local Line"
hotline_number = "555"
emergency_number = "911"
support_message = "We're here."
grounding_exercise = "Breathe."

[[channels]]
channel = "sms"
sender = "webhook"
url = "http://localhost:9999/sms"
"#;
        let cfg: LifelineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:9000");
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(
            cfg.storage.db_path,
            Some(PathBuf::from("/var/lib/lifeline/lifeline.db"))
        );
        assert_eq!(cfg.dispatch.max_attempts, 3);
        assert_eq!(cfg.dispatch.ack_deadline_mins.critical, 5);
        assert_eq!(cfg.dispatch.ack_deadline_mins.high, 30);
        assert_eq!(cfg.responders.len(), 1);
        assert!(matches!(
            cfg.responders[0].availability,
            Availability::BusinessHours { start_hour: 9, .. }
        ));
        assert_eq!(cfg.resources["en"].hotline_number, "555");
        assert_eq!(cfg.channels.len(), 1);
        assert_eq!(cfg.channels[0].sender, SenderKind::Webhook);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_policy_override() {
        let toml_str = r#"
[policy]
phases = [{ name = "now", delay_secs = 0 }, { name = "later", delay_secs = 60 }]

[policy.tiers.critical]
now = ["crisis_mode", "contact_emergency_services"]
later = [{ schedule_follow_up = { after_mins = 15 } }]
"#;
        let cfg: LifelineConfig = toml::from_str(toml_str).unwrap();
        let policy = cfg.validate().unwrap();
        assert_eq!(policy.windows().len(), 2);
        assert!(policy.actions_for(Severity::Low).is_none());
    }

    #[test]
    fn test_validation_errors() {
        let mut cfg = LifelineConfig::default();
        cfg.dispatch.max_attempts = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = LifelineConfig::default();
        cfg.channels = vec![ChannelConfig {
            channel: Channel::Sms,
            sender: SenderKind::Webhook,
            url: None,
        }];
        assert!(cfg.validate().is_err());

        let mut cfg = LifelineConfig::default();
        let dup = cfg.responders[0].clone();
        cfg.responders.push(dup);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("lifeline.toml");
        std::fs::write(&path, "[server]\nbind = \"127.0.0.1:1\"\n").unwrap();
        let cfg = LifelineConfig::load(&path).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:1");
        assert_eq!(cfg.responders.len(), default_responders().len());

        assert!(LifelineConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
