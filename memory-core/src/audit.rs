//! Audit trail for provider downgrades, forgets/restores, and behavioral
//! corrections (SPEC_FULL §4 "Audit trail for downgrades and forgets").
//!
//! Grounded on the teacher's `security::audit` module: the same shape
//! (an event-type enum, a structured entry with before/after state, an
//! async-buffered logger backed by `tracing`), trimmed to the event types
//! this crate actually raises instead of the teacher's episode/step
//! vocabulary. Disabled by default — spec §7 only requires that
//! downgrades *are* logged with a correlation id, not that every
//! deployment pays for a buffered audit channel.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Kind of event recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AuditEventType {
    /// A memory write's embedding or vector upsert degraded to
    /// `pending_vector_retry`, or LLM extraction fell back to heuristics.
    ProviderDowngrade,
    /// `forget`/`forgetPerson` changed a memory's `forgottenState`.
    MemoryForgotten,
    /// `restore` returned a memory to `Active`.
    MemoryRestored,
    /// `behavioralFeedback` confirmed or corrected an identification.
    BehavioralFeedback,
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ProviderDowngrade => "provider_downgrade",
            Self::MemoryForgotten => "memory_forgotten",
            Self::MemoryRestored => "memory_restored",
            Self::BehavioralFeedback => "behavioral_feedback",
        };
        f.write_str(s)
    }
}

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique id for this entry.
    pub entry_id: Uuid,
    /// Correlation id tying this entry to the enrichment call that raised
    /// it, so a reconciler retry and its original downgrade can be joined
    /// in a log search.
    pub correlation_id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// What kind of event this is.
    pub event_type: AuditEventType,
    /// The user the event concerns, if any.
    pub user: Option<String>,
    /// The resource the event concerns (memory id, prediction id, ...).
    pub resource_id: Option<String>,
    /// Event-specific structured detail (provider kind, forget mode, ...).
    pub detail: HashMap<String, String>,
}

impl AuditEntry {
    /// Start a new entry for `event_type`, stamped with the current time.
    #[must_use]
    pub fn new(event_type: AuditEventType, correlation_id: Uuid) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            correlation_id,
            timestamp: Utc::now(),
            event_type,
            user: None,
            resource_id: None,
            detail: HashMap::new(),
        }
    }

    /// Attach the user this event concerns.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Attach the resource id this event concerns.
    #[must_use]
    pub fn with_resource(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    /// Attach a detail field.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.detail.insert(key.into(), value.into());
        self
    }
}

/// Async-buffered audit logger. Cheap to clone; the background drain task
/// is shared via the channel sender.
#[derive(Clone)]
pub struct AuditLogger {
    enabled: bool,
    sender: Option<mpsc::UnboundedSender<AuditEntry>>,
}

impl AuditLogger {
    /// Construct an enabled logger that writes every entry to `tracing`
    /// (target `"audit"`) from a background task.
    #[must_use]
    pub fn enabled() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditEntry>();
        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                Self::write(&entry);
            }
        });
        Self { enabled: true, sender: Some(tx) }
    }

    /// Construct a no-op logger (default).
    #[must_use]
    pub fn disabled() -> Self {
        Self { enabled: false, sender: None }
    }

    /// Whether this logger actually records entries.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Queue an entry. Non-blocking; silently dropped (with a debug log)
    /// if the logger is disabled or the drain task has gone away.
    pub fn log(&self, entry: AuditEntry) {
        if !self.enabled {
            return;
        }
        if let Some(sender) = &self.sender {
            if let Err(err) = sender.send(entry) {
                debug!(%err, "failed to queue audit entry");
            }
        }
    }

    fn write(entry: &AuditEntry) {
        match entry.event_type {
            AuditEventType::ProviderDowngrade => warn!(
                target: "audit",
                correlation_id = %entry.correlation_id,
                resource_id = ?entry.resource_id,
                detail = ?entry.detail,
                "{}", entry.event_type
            ),
            _ => info!(
                target: "audit",
                correlation_id = %entry.correlation_id,
                user = ?entry.user,
                resource_id = ?entry.resource_id,
                detail = ?entry.detail,
                "{}", entry.event_type
            ),
        }
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_logger_is_noop() {
        let logger = AuditLogger::disabled();
        assert!(!logger.is_enabled());
        logger.log(AuditEntry::new(AuditEventType::MemoryForgotten, Uuid::new_v4()));
    }

    #[test]
    fn entry_builder_sets_fields() {
        let correlation_id = Uuid::new_v4();
        let entry = AuditEntry::new(AuditEventType::MemoryForgotten, correlation_id)
            .with_user("alice")
            .with_resource("mem-1")
            .with_detail("mode", "archive");
        assert_eq!(entry.correlation_id, correlation_id);
        assert_eq!(entry.user.as_deref(), Some("alice"));
        assert_eq!(entry.resource_id.as_deref(), Some("mem-1"));
        assert_eq!(entry.detail.get("mode").map(String::as_str), Some("archive"));
    }
}
