pub mod error;
pub mod llm;
pub mod maps;
pub mod tomtom;
pub mod types;

pub use error::{UpstreamError, UpstreamErrorKind};
pub use llm::{
    responder_from_config, AnthropicResponder, OpenAiResponder, Responder, RuleResponder,
};
pub use maps::MapsProvider;
pub use tomtom::TomTomClient;
pub use types::*;
