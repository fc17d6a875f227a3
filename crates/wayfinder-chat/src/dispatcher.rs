//! Dispatcher: the single entry point that turns user text into a reply.
//!
//! One turn runs context-command detection, classification, parameter
//! extraction, capability invocation and reply composition, then appends
//! both sides of the exchange to the user's conversation log.

use std::sync::Arc;

use serde_json::{Map, Value};
use wayfinder_core::{Capability, WayfinderConfig};
use wayfinder_provider::{CapabilityResult, MapsProvider, PlaceRef, Responder};

use crate::classifier::QueryClassifier;
use crate::composer::ResponseComposer;
use crate::context_command::{ContextCommand, ContextOutcome};
use crate::error::ChatError;
use crate::extractor::ParameterExtractor;
use crate::invoker::{CapabilityInvoker, Waypoint};
use crate::store::SessionStore;
use crate::types::{
    ConversationEntry, ReplyBundle, ReplyOutcome, UserContext, CURRENT_LOCATION_KEY,
    PREFERENCES_KEY,
};

/// Routes user messages to capabilities and composes replies.
#[derive(Debug)]
pub struct Dispatcher {
    classifier: QueryClassifier,
    extractor: ParameterExtractor,
    composer: ResponseComposer,
    invoker: CapabilityInvoker,
    store: Arc<SessionStore>,
    max_message_length: usize,
    default_history_limit: usize,
}

impl Dispatcher {
    pub fn new(
        config: &WayfinderConfig,
        maps: Arc<dyn MapsProvider>,
        responder: Arc<dyn Responder>,
        store: Arc<SessionStore>,
    ) -> Self {
        tracing::info!(
            maps = maps.name(),
            responder = responder.name(),
            max_reply_items = config.chat.max_reply_items,
            "Dispatcher initialized"
        );
        Self {
            classifier: QueryClassifier::new(),
            extractor: ParameterExtractor::from_config(&config.maps),
            composer: ResponseComposer::new(config.chat.max_reply_items),
            invoker: CapabilityInvoker::new(maps, responder, config.maps.search_limit),
            store,
            max_message_length: config.chat.max_message_length,
            default_history_limit: config.chat.default_history_limit,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Handle one message. Never fails: every error becomes a reply.
    ///
    /// Turns for the same user are processed one at a time, in the order
    /// they arrive.
    pub async fn handle(&self, user_id: &str, text: &str) -> ReplyBundle {
        let _turn = match self.store.begin_turn(user_id).await {
            Ok(guard) => guard,
            Err(e) => {
                tracing::error!(user_id, error = %e, "Could not start turn");
                return ReplyBundle::failure(e.user_message());
            }
        };

        let bundle = match self.run_turn(user_id, text).await {
            Ok(bundle) => bundle,
            Err(e @ ChatError::MessageTooLong(_)) => {
                tracing::info!(user_id, length = text.chars().count(), "Rejected long message");
                ReplyBundle {
                    outcome: ReplyOutcome::Clarification,
                    ..ReplyBundle::failure(e.user_message())
                }
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Turn failed");
                ReplyBundle::failure(e.user_message())
            }
        };

        self.record(user_id, text, &bundle);
        tracing::info!(
            user_id,
            label = %bundle.classification_label,
            capability = ?bundle.capability_used.map(|c| c.to_string()),
            outcome = %bundle.outcome,
            "Turn complete"
        );
        bundle
    }

    /// Conversation history for `user_id`; `None` uses the configured default.
    pub fn history(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationEntry>, ChatError> {
        self.store
            .get_log(user_id, Some(limit.unwrap_or(self.default_history_limit)))
    }

    fn record(&self, user_id: &str, text: &str, bundle: &ReplyBundle) {
        let entries = [
            ConversationEntry::user(user_id, text),
            ConversationEntry::assistant(user_id, bundle),
        ];
        for entry in entries {
            if let Err(e) = self.store.append_log(user_id, entry) {
                tracing::error!(user_id, error = %e, "Failed to append conversation log");
            }
        }
    }

    async fn run_turn(&self, user_id: &str, text: &str) -> Result<ReplyBundle, ChatError> {
        if text.chars().count() > self.max_message_length {
            return Err(ChatError::MessageTooLong(self.max_message_length));
        }

        if let Some(command) = ContextCommand::parse(text) {
            tracing::debug!(user_id, command = ?command, "Context command");
            let outcome = self.apply_context_command(user_id, command).await?;
            let reply_outcome = match outcome {
                ContextOutcome::LocationNotFound(_) => ReplyOutcome::Empty,
                ContextOutcome::LocationLookupFailed(_) => ReplyOutcome::UpstreamError,
                _ => ReplyOutcome::Answered,
            };
            return Ok(ReplyBundle {
                reply: self.composer.context(&outcome),
                capability_used: Some(Capability::Context),
                classification_label: Capability::Context,
                confidence: 1.0,
                outcome: reply_outcome,
            });
        }

        let classification = self.classifier.classify(text);
        tracing::debug!(
            user_id,
            capability = %classification.capability,
            confidence = classification.confidence,
            rationale = %classification.rationale(),
            "Classified query"
        );

        let context = self.store.get_context(user_id)?;
        let params = match self
            .extractor
            .extract(classification.capability, text, &context)
        {
            Ok(params) => params,
            Err(missing) => {
                tracing::debug!(user_id, missing = %missing, "Asking for clarification");
                return Ok(ReplyBundle {
                    reply: self.composer.clarification(&missing),
                    capability_used: None,
                    classification_label: classification.capability,
                    confidence: classification.confidence,
                    outcome: ReplyOutcome::Clarification,
                });
            }
        };

        let capability = params.capability();
        let result: CapabilityResult = self.invoker.invoke(&params, &context).await;
        let outcome = match &result {
            Ok(payload) if payload.is_empty() => ReplyOutcome::Empty,
            Ok(_) => ReplyOutcome::Answered,
            Err(err) => {
                tracing::warn!(
                    user_id,
                    capability = %capability,
                    params = ?params,
                    kind = %err.kind,
                    status = ?err.status,
                    "Capability call failed"
                );
                ReplyOutcome::UpstreamError
            }
        };

        Ok(ReplyBundle {
            reply: self.composer.compose(capability, &result),
            capability_used: Some(capability),
            classification_label: classification.capability,
            confidence: classification.confidence,
            outcome,
        })
    }

    async fn apply_context_command(
        &self,
        user_id: &str,
        command: ContextCommand,
    ) -> Result<ContextOutcome, ChatError> {
        match command {
            ContextCommand::SetLocation(place) => {
                let (location, label) = match &place {
                    PlaceRef::Point(point) => (*point, None),
                    PlaceRef::Text(_) => match self.invoker.resolve(&place).await {
                        Ok(Waypoint::Found { point, label }) => (point, Some(label)),
                        Ok(Waypoint::NotFound(text)) => {
                            return Ok(ContextOutcome::LocationNotFound(text))
                        }
                        Err(err) => {
                            tracing::warn!(
                                user_id,
                                place = %place,
                                kind = %err.kind,
                                status = ?err.status,
                                "Location lookup failed"
                            );
                            return Ok(ContextOutcome::LocationLookupFailed(err.message));
                        }
                    },
                };
                let mut partial = Map::new();
                partial.insert(CURRENT_LOCATION_KEY.to_string(), location.to_json());
                self.store.set_context(user_id, partial)?;
                Ok(ContextOutcome::LocationSaved { location, label })
            }
            ContextCommand::SetPreference { key, value } => {
                let mut preferences = self.store.get_context(user_id)?.preferences();
                preferences.insert(key.clone(), Value::String(value.clone()));
                let mut partial = Map::new();
                partial.insert(PREFERENCES_KEY.to_string(), Value::Object(preferences));
                self.store.set_context(user_id, partial)?;
                Ok(ContextOutcome::PreferenceSaved { key, value })
            }
            ContextCommand::ForgetLocation => {
                let had_location = self.store.remove_context_key(user_id, CURRENT_LOCATION_KEY)?;
                Ok(ContextOutcome::LocationForgotten { had_location })
            }
            ContextCommand::ForgetAll => {
                self.store.clear_context(user_id)?;
                Ok(ContextOutcome::ContextCleared)
            }
            ContextCommand::ShowLocation => Ok(ContextOutcome::LocationReport(
                self.store.get_context(user_id)?.current_location(),
            )),
            ContextCommand::ShowMemory => {
                Ok(ContextOutcome::MemoryReport(self.store.get_context(user_id)?))
            }
        }
    }

    /// Shallow-merge `partial` into the user's context.
    pub fn set_context(
        &self,
        user_id: &str,
        partial: Map<String, Value>,
    ) -> Result<UserContext, ChatError> {
        self.store.set_context(user_id, partial)
    }
}
