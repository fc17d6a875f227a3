//! Per-user session store.
//!
//! Each user owns a context map and an append-only conversation log behind
//! their own lock. The user table is locked only to look up or insert a
//! session, so users never contend on each other's state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use serde_json::{Map, Value};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::ChatError;
use crate::types::{ConversationEntry, UserContext};

#[derive(Debug, Default)]
struct UserState {
    context: UserContext,
    log: Vec<ConversationEntry>,
}

#[derive(Debug, Default)]
struct UserSession {
    state: Mutex<UserState>,
    /// Serializes a user's turns in arrival order (tokio mutexes are FIFO).
    turn_gate: Arc<AsyncMutex<()>>,
}

impl UserSession {
    fn lock(&self) -> Result<MutexGuard<'_, UserState>, ChatError> {
        self.state
            .lock()
            .map_err(|e| ChatError::LockPoisoned(format!("user state: {}", e)))
    }
}

/// Held for the duration of one user turn.
pub type TurnGuard = OwnedMutexGuard<()>;

/// In-memory context and conversation log for every user.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<UserSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn existing(&self, user_id: &str) -> Result<Option<Arc<UserSession>>, ChatError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| ChatError::LockPoisoned(format!("session table: {}", e)))?;
        Ok(sessions.get(user_id).cloned())
    }

    fn session(&self, user_id: &str) -> Result<Arc<UserSession>, ChatError> {
        if let Some(session) = self.existing(user_id)? {
            return Ok(session);
        }
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| ChatError::LockPoisoned(format!("session table: {}", e)))?;
        Ok(sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(user_id, "Created user session");
                Arc::new(UserSession::default())
            })
            .clone())
    }

    /// Wait for this user's previous turns to finish, then hold the gate.
    pub async fn begin_turn(&self, user_id: &str) -> Result<TurnGuard, ChatError> {
        let gate = self.session(user_id)?.turn_gate.clone();
        Ok(gate.lock_owned().await)
    }

    /// Shallow-merge `partial` into the user's context; returns the result.
    pub fn set_context(
        &self,
        user_id: &str,
        partial: Map<String, Value>,
    ) -> Result<UserContext, ChatError> {
        let session = self.session(user_id)?;
        let mut state = session.lock()?;
        let keys: Vec<String> = partial.keys().cloned().collect();
        state.context.merge(partial);
        tracing::debug!(user_id, keys = ?keys, "Context updated");
        Ok(state.context.clone())
    }

    /// Current context, or an empty one for unknown users.
    pub fn get_context(&self, user_id: &str) -> Result<UserContext, ChatError> {
        let Some(session) = self.existing(user_id)? else {
            return Ok(UserContext::new());
        };
        let state = session.lock()?;
        Ok(state.context.clone())
    }

    /// Remove one context key. Returns whether it was present.
    pub fn remove_context_key(&self, user_id: &str, key: &str) -> Result<bool, ChatError> {
        let Some(session) = self.existing(user_id)? else {
            return Ok(false);
        };
        let mut state = session.lock()?;
        Ok(state.context.remove(key).is_some())
    }

    /// Drop every context key. The conversation log is kept.
    pub fn clear_context(&self, user_id: &str) -> Result<(), ChatError> {
        if let Some(session) = self.existing(user_id)? {
            session.lock()?.context = UserContext::new();
        }
        Ok(())
    }

    pub fn append_log(&self, user_id: &str, entry: ConversationEntry) -> Result<(), ChatError> {
        let session = self.session(user_id)?;
        session.lock()?.log.push(entry);
        Ok(())
    }

    /// The `limit` most recent entries in chronological order. `None` or
    /// `Some(0)` returns the whole log.
    pub fn get_log(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationEntry>, ChatError> {
        let Some(session) = self.existing(user_id)? else {
            return Ok(vec![]);
        };
        let state = session.lock()?;
        let start = match limit {
            Some(n) if n > 0 => state.log.len().saturating_sub(n),
            _ => 0,
        };
        Ok(state.log[start..].to_vec())
    }

    pub fn log_len(&self, user_id: &str) -> Result<usize, ChatError> {
        let Some(session) = self.existing(user_id)? else {
            return Ok(0);
        };
        let state = session.lock()?;
        Ok(state.log.len())
    }

    pub fn user_count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ReplyBundle, ReplyOutcome, Role};
    use serde_json::json;
    use std::time::Duration;
    use wayfinder_core::Capability;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    fn user_entry(text: &str) -> ConversationEntry {
        ConversationEntry::user("u1", text)
    }

    #[test]
    fn test_set_context_merges() {
        let store = SessionStore::new();
        store.set_context("u1", obj(json!({"a": 1}))).unwrap();
        let merged = store.set_context("u1", obj(json!({"b": 2}))).unwrap();
        assert_eq!(serde_json::to_value(&merged).unwrap(), json!({"a": 1, "b": 2}));

        store.set_context("u1", obj(json!({"a": 3}))).unwrap();
        let ctx = store.get_context("u1").unwrap();
        assert_eq!(serde_json::to_value(&ctx).unwrap(), json!({"a": 3, "b": 2}));
    }

    #[test]
    fn test_get_context_unknown_user_is_empty_and_not_created() {
        let store = SessionStore::new();
        assert!(store.get_context("ghost").unwrap().is_empty());
        assert_eq!(store.user_count(), 0);
    }

    #[test]
    fn test_users_are_isolated() {
        let store = SessionStore::new();
        store.set_context("u1", obj(json!({"a": 1}))).unwrap();
        store.append_log("u1", user_entry("hello")).unwrap();
        assert!(store.get_context("u2").unwrap().is_empty());
        assert!(store.get_log("u2", None).unwrap().is_empty());
    }

    #[test]
    fn test_remove_and_clear_context() {
        let store = SessionStore::new();
        store.set_context("u1", obj(json!({"a": 1, "b": 2}))).unwrap();
        assert!(store.remove_context_key("u1", "a").unwrap());
        assert!(!store.remove_context_key("u1", "a").unwrap());
        store.append_log("u1", user_entry("kept")).unwrap();

        store.clear_context("u1").unwrap();
        assert!(store.get_context("u1").unwrap().is_empty());
        assert_eq!(store.log_len("u1").unwrap(), 1);
    }

    #[test]
    fn test_get_log_limit() {
        let store = SessionStore::new();
        for i in 0..5 {
            store.append_log("u1", user_entry(&format!("m{i}"))).unwrap();
        }

        let last_two = store.get_log("u1", Some(2)).unwrap();
        let texts: Vec<&str> = last_two.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["m3", "m4"]);

        assert_eq!(store.get_log("u1", Some(50)).unwrap().len(), 5);
        assert_eq!(store.get_log("u1", Some(0)).unwrap().len(), 5);
        assert_eq!(store.get_log("u1", None).unwrap()[0].text, "m0");
    }

    #[test]
    fn test_log_keeps_roles() {
        let store = SessionStore::new();
        let bundle = ReplyBundle {
            reply: "Hi there".to_string(),
            capability_used: Some(Capability::General),
            classification_label: Capability::General,
            confidence: 1.0,
            outcome: ReplyOutcome::Answered,
        };
        store.append_log("u1", user_entry("hello")).unwrap();
        store
            .append_log("u1", ConversationEntry::assistant("u1", &bundle))
            .unwrap();
        let log = store.get_log("u1", None).unwrap();
        assert_eq!(log[0].role, Role::User);
        assert_eq!(log[1].role, Role::Assistant);
        assert_eq!(log[1].classification_label, Some(Capability::General));
    }

    #[tokio::test]
    async fn test_turn_gate_serializes_same_user() {
        let store = Arc::new(SessionStore::new());
        let first = store.begin_turn("u1").await.unwrap();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                let _turn = store.begin_turn("u1").await.unwrap();
                store.append_log("u1", user_entry("second")).unwrap();
            })
        };

        // Another user is not blocked by u1's gate.
        let other = tokio::time::timeout(Duration::from_millis(200), store.begin_turn("u2")).await;
        assert!(other.is_ok());

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.append_log("u1", user_entry("first")).unwrap();
        drop(first);
        waiter.await.unwrap();

        let log = store.get_log("u1", None).unwrap();
        let texts: Vec<&str> = log.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_from_many_users() {
        let store = Arc::new(SessionStore::new());
        let mut handles = Vec::new();
        for u in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let user = format!("user-{u}");
                for i in 0..25 {
                    let _turn = store.begin_turn(&user).await.unwrap();
                    store
                        .append_log(&user, ConversationEntry::user(&user, &i.to_string()))
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.user_count(), 8);
        for u in 0..8 {
            assert_eq!(store.log_len(&format!("user-{u}")).unwrap(), 25);
        }
    }
}
