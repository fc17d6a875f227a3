//! Error types for the dispatch layer.

use wayfinder_core::WayfinderError;

/// Generic reply for failures that have no user-facing explanation.
pub const GENERIC_FAILURE_REPLY: &str = "Something went wrong, please try again.";

/// Errors raised inside a dispatch turn.
///
/// None of these reach the caller of `Dispatcher::handle`; they are logged
/// and turned into a reply there.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("store lock poisoned: {0}")]
    LockPoisoned(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Text shown to the user when this error ends a turn.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::MessageTooLong(max) => format!(
                "That message is too long. Please keep it under {max} characters."
            ),
            _ => GENERIC_FAILURE_REPLY.to_string(),
        }
    }
}

impl From<WayfinderError> for ChatError {
    fn from(err: WayfinderError) -> Self {
        ChatError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        let err = ChatError::MessageTooLong(2000);
        assert_eq!(
            err.to_string(),
            "message exceeds maximum length of 2000 characters"
        );

        let err = ChatError::LockPoisoned("sessions".to_string());
        assert_eq!(err.to_string(), "store lock poisoned: sessions");
    }

    #[test]
    fn test_user_message_hides_internals() {
        let err = ChatError::Internal("index out of range at store.rs:42".to_string());
        assert_eq!(err.user_message(), GENERIC_FAILURE_REPLY);

        let err = ChatError::MessageTooLong(10);
        assert!(err.user_message().contains("under 10 characters"));
    }

    #[test]
    fn test_from_wayfinder_error() {
        let err: ChatError = WayfinderError::Config("bad".to_string()).into();
        assert!(matches!(err, ChatError::Internal(_)));
    }
}
