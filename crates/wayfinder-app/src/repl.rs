//! Interactive prompt commands and their rendering.

use serde_json::{Map, Value};
use wayfinder_chat::{ConversationEntry, Dispatcher};
use wayfinder_core::Capability;

/// A line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// Anything that is not a `:` command goes to the dispatcher.
    Message(String),
    History(Option<usize>),
    Context,
    /// `:set <key> <value>`; the value is JSON when it parses, a string otherwise.
    Set(String, Value),
    Capabilities,
    Help,
    Quit,
    Unknown(String),
    Blank,
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ReplCommand::Blank;
        }
        let Some(command) = line.strip_prefix(':') else {
            return ReplCommand::Message(line.to_string());
        };
        let mut parts = command.split_whitespace();
        match parts.next().unwrap_or_default() {
            "history" | "h" => match parts.next() {
                None => ReplCommand::History(None),
                Some(n) => match n.parse::<usize>() {
                    Ok(n) => ReplCommand::History(Some(n)),
                    Err(_) => ReplCommand::Unknown(line.to_string()),
                },
            },
            "context" | "ctx" => ReplCommand::Context,
            "set" => {
                let rest = command.trim_start()["set".len()..].trim_start();
                match rest.split_once(char::is_whitespace) {
                    Some((key, raw)) if !raw.trim().is_empty() => {
                        let raw = raw.trim();
                        let value = serde_json::from_str(raw)
                            .unwrap_or_else(|_| Value::String(raw.to_string()));
                        ReplCommand::Set(key.to_string(), value)
                    }
                    _ => ReplCommand::Unknown(line.to_string()),
                }
            }
            "capabilities" | "caps" => ReplCommand::Capabilities,
            "help" | "?" => ReplCommand::Help,
            "quit" | "q" | "exit" => ReplCommand::Quit,
            _ => ReplCommand::Unknown(line.to_string()),
        }
    }
}

pub const HELP_TEXT: &str = "\
Type a question, or one of:
  :history [n]    show the last n conversation entries
  :context        show what I remember about you
  :set <key> <v>  store a context value (JSON or plain text)
  :capabilities   list what I can do
  :quit           exit";

pub fn render_capabilities() -> String {
    let mut out = String::from("Capabilities:");
    for cap in Capability::all() {
        out.push_str(&format!(
            "\n  {:<16} {}\n  {:<16} e.g. \"{}\"",
            cap.to_string(),
            cap.description(),
            "",
            cap.example()
        ));
    }
    out
}

pub fn render_history(entries: &[ConversationEntry]) -> String {
    if entries.is_empty() {
        return "No conversation yet.".to_string();
    }
    entries
        .iter()
        .map(|e| {
            let label = e
                .classification_label
                .map(|c| format!(" [{c}]"))
                .unwrap_or_default();
            format!("{} {}{}: {}", e.timestamp.to_rfc3339(), e.role, label, e.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Output for a `:` command, or `None` for `Quit`/`Blank`/`Message`.
pub fn run_command(dispatcher: &Dispatcher, user: &str, command: &ReplCommand) -> Option<String> {
    match command {
        ReplCommand::History(limit) => Some(match dispatcher.history(user, *limit) {
            Ok(entries) => render_history(&entries),
            Err(e) => {
                tracing::error!(error = %e, "Failed to read history");
                e.user_message()
            }
        }),
        ReplCommand::Context => Some(match dispatcher.store().get_context(user) {
            Ok(context) if context.is_empty() => "Nothing remembered yet.".to_string(),
            Ok(context) => serde_json::to_string_pretty(context.as_map())
                .unwrap_or_else(|e| format!("Could not render context: {e}")),
            Err(e) => {
                tracing::error!(error = %e, "Failed to read context");
                e.user_message()
            }
        }),
        ReplCommand::Set(key, value) => {
            let mut partial = Map::new();
            partial.insert(key.clone(), value.clone());
            Some(match dispatcher.set_context(user, partial) {
                Ok(_) => format!("Saved {key} = {value}."),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to update context");
                    e.user_message()
                }
            })
        }
        ReplCommand::Capabilities => Some(render_capabilities()),
        ReplCommand::Help => Some(HELP_TEXT.to_string()),
        ReplCommand::Unknown(line) => Some(format!("Unknown command '{line}'. Type :help.")),
        ReplCommand::Message(_) | ReplCommand::Quit | ReplCommand::Blank => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wayfinder_chat::SessionStore;
    use wayfinder_core::WayfinderConfig;
    use wayfinder_provider::{RuleResponder, TomTomClient};

    fn offline_dispatcher() -> Dispatcher {
        let config = WayfinderConfig::default();
        let maps = TomTomClient::new(&config.maps).unwrap();
        Dispatcher::new(
            &config,
            Arc::new(maps),
            Arc::new(RuleResponder),
            Arc::new(SessionStore::new()),
        )
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(ReplCommand::parse("  "), ReplCommand::Blank);
        assert_eq!(ReplCommand::parse(":quit"), ReplCommand::Quit);
        assert_eq!(ReplCommand::parse(":history"), ReplCommand::History(None));
        assert_eq!(ReplCommand::parse(":history 4"), ReplCommand::History(Some(4)));
        assert_eq!(ReplCommand::parse(":caps"), ReplCommand::Capabilities);
        assert!(matches!(ReplCommand::parse(":history x"), ReplCommand::Unknown(_)));
        assert!(matches!(ReplCommand::parse(":fly"), ReplCommand::Unknown(_)));
        assert!(matches!(ReplCommand::parse(":set units"), ReplCommand::Unknown(_)));
        assert_eq!(
            ReplCommand::parse(" Find coffee near me "),
            ReplCommand::Message("Find coffee near me".to_string())
        );
    }

    #[test]
    fn test_render_capabilities_lists_all() {
        let out = render_capabilities();
        for cap in Capability::all() {
            assert!(out.contains(cap.description()));
        }
    }

    #[test]
    fn test_render_empty_history() {
        assert_eq!(render_history(&[]), "No conversation yet.");
    }

    #[test]
    fn test_parse_set_values() {
        assert_eq!(
            ReplCommand::parse(":set units metric"),
            ReplCommand::Set("units".to_string(), Value::String("metric".to_string()))
        );
        assert_eq!(
            ReplCommand::parse(r#":set current_location {"lat": 47.6, "lon": -122.3}"#),
            ReplCommand::Set(
                "current_location".to_string(),
                serde_json::json!({"lat": 47.6, "lon": -122.3})
            )
        );
        assert_eq!(
            ReplCommand::parse(":set note leave by noon"),
            ReplCommand::Set("note".to_string(), Value::String("leave by noon".to_string()))
        );
    }

    #[test]
    fn test_set_command_merges_into_context() {
        let dispatcher = offline_dispatcher();
        run_command(&dispatcher, "ann", &ReplCommand::parse(":set units metric")).unwrap();
        let reply = run_command(
            &dispatcher,
            "ann",
            &ReplCommand::parse(r#":set current_location {"lat": 47.6, "lon": -122.3}"#),
        )
        .unwrap();
        assert!(reply.starts_with("Saved current_location"));

        let context = dispatcher.store().get_context("ann").unwrap();
        assert_eq!(context.get("units"), Some(&Value::String("metric".to_string())));
        let location = context.current_location().unwrap();
        assert_eq!(location.lat, 47.6);
        assert_eq!(location.lon, -122.3);
    }
}
