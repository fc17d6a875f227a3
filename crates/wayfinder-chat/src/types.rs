//! Conversation data types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;
use wayfinder_core::{Capability, LocationPoint, Timestamp};

/// Context key holding the user's last known location.
pub const CURRENT_LOCATION_KEY: &str = "current_location";
/// Context key holding the user's stated preferences object.
pub const PREFERENCES_KEY: &str = "preferences";

// =============================================================================
// UserContext
// =============================================================================

/// Per-user key/value context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserContext(Map<String, Value>);

impl UserContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Shallow merge: top-level keys of `partial` replace existing ones.
    pub fn merge(&mut self, partial: Map<String, Value>) {
        for (key, value) in partial {
            self.0.insert(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Stored location, if present and valid.
    pub fn current_location(&self) -> Option<LocationPoint> {
        self.0
            .get(CURRENT_LOCATION_KEY)
            .and_then(LocationPoint::from_json)
    }

    /// Stored preferences object (empty when absent or not an object).
    pub fn preferences(&self) -> Map<String, Value> {
        match self.0.get(PREFERENCES_KEY) {
            Some(Value::Object(prefs)) => prefs.clone(),
            _ => Map::new(),
        }
    }
}

// =============================================================================
// Replies
// =============================================================================

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyOutcome {
    /// A capability returned data.
    Answered,
    /// A capability succeeded but found nothing.
    Empty,
    /// Required parameters were missing; no capability was called.
    Clarification,
    /// The capability call failed upstream.
    UpstreamError,
    /// Something failed inside the dispatcher.
    InternalError,
}

impl fmt::Display for ReplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyOutcome::Answered => write!(f, "answered"),
            ReplyOutcome::Empty => write!(f, "empty"),
            ReplyOutcome::Clarification => write!(f, "clarification"),
            ReplyOutcome::UpstreamError => write!(f, "upstream_error"),
            ReplyOutcome::InternalError => write!(f, "internal_error"),
        }
    }
}

/// Result of one dispatch turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyBundle {
    pub reply: String,
    /// Capability actually invoked. `None` when nothing was called.
    pub capability_used: Option<Capability>,
    /// Label the classifier (or context command detection) chose.
    pub classification_label: Capability,
    pub confidence: f32,
    pub outcome: ReplyOutcome,
}

impl ReplyBundle {
    /// Reply for a turn that failed inside the dispatcher.
    pub fn failure(reply: String) -> Self {
        Self {
            reply,
            capability_used: None,
            classification_label: Capability::General,
            confidence: 0.0,
            outcome: ReplyOutcome::InternalError,
        }
    }
}

// =============================================================================
// Conversation log
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry of a user's append-only conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub id: Uuid,
    pub timestamp: Timestamp,
    pub user_id: String,
    pub role: Role,
    pub text: String,
    /// Classification label, assistant entries only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification_label: Option<Capability>,
}

impl ConversationEntry {
    pub fn user(user_id: &str, text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Timestamp::now(),
            user_id: user_id.to_string(),
            role: Role::User,
            text: text.to_string(),
            classification_label: None,
        }
    }

    pub fn assistant(user_id: &str, bundle: &ReplyBundle) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Timestamp::now(),
            user_id: user_id.to_string(),
            role: Role::Assistant,
            text: bundle.reply.clone(),
            classification_label: Some(bundle.classification_label),
        }
    }
}
