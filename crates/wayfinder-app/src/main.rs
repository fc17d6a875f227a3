//! Wayfinder binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration (file, then env, then flags)
//! 2. Build the maps client and general responder
//! 3. Run one query (`--query`) or an interactive prompt over stdin

mod cli;
mod repl;

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use wayfinder_chat::{Dispatcher, SessionStore};
use wayfinder_core::WayfinderConfig;
use wayfinder_provider::{responder_from_config, TomTomClient};

use cli::CliArgs;
use repl::{run_command, ReplCommand, HELP_TEXT};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config: file < env < flags.
    let config_file = args.resolve_config_path();
    let mut config = WayfinderConfig::load_or_default(&config_file);
    config.apply_env_overrides();
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }

    // Tracing goes to stderr so replies on stdout stay clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Wayfinder v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Providers.
    let maps = TomTomClient::new(&config.maps)?;
    if !maps.is_configured() {
        tracing::warn!("No maps API key configured; map capabilities will report it");
    }
    let responder = responder_from_config(&config.llm);

    let store = Arc::new(SessionStore::new());
    let dispatcher = Dispatcher::new(&config, Arc::new(maps), responder, store);

    if let Some(query) = args.query.as_deref() {
        let bundle = dispatcher.handle(&args.user, query).await;
        println!("{}", bundle.reply);
        return Ok(());
    }

    println!("Wayfinder maps assistant. {HELP_TEXT}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match ReplCommand::parse(&line) {
            ReplCommand::Quit => break,
            ReplCommand::Blank => continue,
            ReplCommand::Message(text) => {
                let bundle = dispatcher.handle(&args.user, &text).await;
                println!("{}", bundle.reply);
            }
            command => {
                if let Some(output) = run_command(&dispatcher, &args.user, &command) {
                    println!("{output}");
                }
            }
        }
    }

    tracing::info!(user = %args.user, "Session ended");
    Ok(())
}
