//! Invalidation after domain mutations
//!
//! Mutations do not go through the cache, so whatever changed the data must
//! clear the keys derived from it. Invalidation is best-effort: keys and
//! patterns are removed one after another and a failure on one does not
//! stop the rest. What was not removed expires by TTL.

use crate::cache::keys::{self, Role};
use crate::store::SharedStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Why entries were invalidated
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidationReason {
    /// Explicit invalidation by key or pattern
    Manual,

    /// A submission was graded
    SubmissionGraded { class_id: String, student_id: String },

    /// A class was archived
    ClassArchived { class_id: String },

    /// Class details or membership changed
    ClassUpdated { class_id: String },

    /// An activity was created, edited or removed
    ActivityChanged { class_id: String },
}

impl fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidationReason::Manual => write!(f, "manual invalidation"),
            InvalidationReason::SubmissionGraded {
                class_id,
                student_id,
            } => write!(f, "submission graded: {} in class {}", student_id, class_id),
            InvalidationReason::ClassArchived { class_id } => {
                write!(f, "class archived: {}", class_id)
            }
            InvalidationReason::ClassUpdated { class_id } => {
                write!(f, "class updated: {}", class_id)
            }
            InvalidationReason::ActivityChanged { class_id } => {
                write!(f, "activity changed in class {}", class_id)
            }
        }
    }
}

/// Record of one invalidation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationEvent {
    /// Reason for invalidation
    pub reason: InvalidationReason,

    /// When the invalidation occurred
    pub timestamp: DateTime<Utc>,

    /// Patterns passed to `delete_pattern`
    pub patterns: Vec<String>,

    /// Keys passed to `delete`
    pub keys: Vec<String>,

    /// Whether the store acknowledged every removal
    pub succeeded: bool,

    /// Additional context
    pub context: Option<String>,
}

impl InvalidationEvent {
    fn new(reason: InvalidationReason, keys: Vec<String>, patterns: Vec<String>) -> Self {
        Self {
            reason,
            timestamp: Utc::now(),
            patterns,
            keys,
            succeeded: true,
            context: None,
        }
    }

    /// Add context to the event
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Clears cache entries when the data behind them changes
#[derive(Clone)]
pub struct Invalidator {
    store: SharedStore,
}

impl fmt::Debug for Invalidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invalidator")
            .field("store", &self.store.name())
            .finish()
    }
}

impl Invalidator {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Remove one key
    pub async fn invalidate_key(&self, key: &str) -> InvalidationEvent {
        self.run(InvalidationReason::Manual, vec![key.to_string()], Vec::new())
            .await
    }

    /// Remove every key matching a glob pattern
    pub async fn invalidate_pattern(&self, pattern: &str) -> InvalidationEvent {
        self.run(InvalidationReason::Manual, Vec::new(), vec![pattern.to_string()])
            .await
    }

    /// A grade changes the teacher's pending count, the student's view of
    /// the class and their evolution, and the class aggregates
    pub async fn on_submission_graded(
        &self,
        class_id: &str,
        student_id: &str,
        teacher_id: &str,
    ) -> InvalidationEvent {
        let reason = InvalidationReason::SubmissionGraded {
            class_id: class_id.to_string(),
            student_id: student_id.to_string(),
        };
        let keys = vec![
            keys::teacher_dashboard_stats(teacher_id),
            keys::student_class(student_id, class_id),
            keys::student_evolution(student_id, class_id),
        ];
        let patterns = vec![keys::class_namespace(class_id)];
        self.run(reason, keys, patterns).await
    }

    /// Everything derived from an archived class goes, as does the
    /// teacher's class count
    pub async fn on_class_archived(&self, class_id: &str, teacher_id: &str) -> InvalidationEvent {
        let reason = InvalidationReason::ClassArchived {
            class_id: class_id.to_string(),
        };
        let keys = vec![keys::teacher_dashboard_stats(teacher_id)];
        let patterns = vec![
            keys::class_namespace(class_id),
            keys::students_in_class(class_id),
            keys::evolution_in_class(class_id),
        ];
        self.run(reason, keys, patterns).await
    }

    pub async fn on_class_updated(&self, class_id: &str) -> InvalidationEvent {
        let reason = InvalidationReason::ClassUpdated {
            class_id: class_id.to_string(),
        };
        let patterns = vec![
            keys::class_namespace(class_id),
            keys::students_in_class(class_id),
        ];
        self.run(reason, Vec::new(), patterns).await
    }

    /// New or changed activities move pending counts and class reports
    pub async fn on_activity_changed(&self, class_id: &str, teacher_id: &str) -> InvalidationEvent {
        let reason = InvalidationReason::ActivityChanged {
            class_id: class_id.to_string(),
        };
        let patterns = vec![
            keys::class_namespace(class_id),
            keys::students_in_class(class_id),
            keys::user_namespace(Role::Teacher, teacher_id),
        ];
        self.run(reason, Vec::new(), patterns).await
    }

    async fn run(
        &self,
        reason: InvalidationReason,
        keys: Vec<String>,
        patterns: Vec<String>,
    ) -> InvalidationEvent {
        let mut event = InvalidationEvent::new(reason, keys, patterns);
        let mut failed = Vec::new();

        for key in &event.keys {
            if !self.store.delete(key).await {
                failed.push(key.as_str());
            }
        }
        for pattern in &event.patterns {
            if !self.store.delete_pattern(pattern).await {
                failed.push(pattern.as_str());
            }
        }

        if failed.is_empty() {
            info!(
                "Invalidated {} keys and {} patterns ({})",
                event.keys.len(),
                event.patterns.len(),
                event.reason
            );
        } else {
            warn!(
                "Partial invalidation ({}): could not remove {}",
                event.reason,
                failed.join(", ")
            );
            event.succeeded = false;
        }
        event
    }
}
