pub mod cli;
pub mod client;
pub mod config;
pub mod consumer;
pub mod llm;
pub mod models;
pub mod relay;
pub mod server;

use cli::Args;
use config::PersonaConfig;
use llm::{ openai::OpenAIChatClient, UpstreamConfig };
use server::{ api::AppState, Server };
use std::error::Error;
use std::sync::Arc;
use log::info;

/// Start the relay server with the given configuration.
pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Upstream Endpoint: {}", args.chat_base_url);
    info!("Chat Model: {}", args.chat_model);
    info!("Persona: {}", args.persona);
    if let Some(path) = &args.personas_path {
        info!("Personas Path: {}", path);
    }
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let personas = match &args.personas_path {
        Some(path) => PersonaConfig::load(path)?,
        None => PersonaConfig::default(),
    };
    let persona = personas.resolve(&args.persona)?;

    let upstream = UpstreamConfig::from_args(&args);
    let client = Arc::new(OpenAIChatClient::new(&upstream)?);
    let state = AppState::new(client, persona);

    let server = Server::new(args.server_addr.clone(), state, args);
    server.run().await
}
