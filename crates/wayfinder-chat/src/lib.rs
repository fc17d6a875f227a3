//! Conversational dispatch for Wayfinder.
//!
//! Classifies free-form queries, extracts capability parameters, invokes the
//! maps provider or general responder, and composes conversational replies.

pub mod classifier;
pub mod composer;
pub mod context_command;
pub mod dispatcher;
pub mod error;
pub mod extractor;
pub mod invoker;
pub mod store;
pub mod types;

pub use classifier::{CapabilityScore, Classification, QueryClassifier, PRIORITY_ORDER};
pub use composer::{format_distance, format_duration, ResponseComposer};
pub use context_command::{ContextCommand, ContextOutcome};
pub use dispatcher::Dispatcher;
pub use error::{ChatError, GENERIC_FAILURE_REPLY};
pub use extractor::{ExtractedParameters, MissingField, MissingParameter, ParameterExtractor};
pub use invoker::{CapabilityInvoker, Waypoint};
pub use store::{SessionStore, TurnGuard};
pub use types::{
    ConversationEntry, ReplyBundle, ReplyOutcome, Role, UserContext, CURRENT_LOCATION_KEY,
    PREFERENCES_KEY,
};
