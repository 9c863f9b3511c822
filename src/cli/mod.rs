use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Host address and port for the relay server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    // --- Upstream Provider Args ---
    /// API key for the upstream chat-completion provider.
    #[arg(long, env = "OPENAI_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Chat-completions endpoint of the upstream provider.
    #[arg(
        long,
        env = "CHAT_BASE_URL",
        default_value = "https://api.openai.com/v1/chat/completions"
    )]
    pub chat_base_url: String,

    /// Model identifier sent with every upstream request.
    #[arg(long, env = "CHAT_MODEL", default_value = "gpt-4")]
    pub chat_model: String,

    // --- Persona Args ---
    /// Persona used for the leading system message
    /// (pizza_interviewer, debater, pineapple_survey).
    #[arg(long, env = "PERSONA", default_value = "debater")]
    pub persona: String,

    /// Optional path to a JSON file of persona prompts, replacing the
    /// built-ins.
    #[arg(long, env = "PERSONAS_PATH")]
    pub personas_path: Option<String>,

    // --- TLS Args ---
    /// Optional path to the TLS certificate file (PEM format). Requires
    /// --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires
    /// --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    // --- Client Mode Args ---
    /// Send a single prompt through a running relay and stream the reply to
    /// stdout instead of starting a server.
    #[arg(long)]
    pub ask: Option<String>,

    /// Base URL of the relay used with --ask.
    #[arg(long, env = "RELAY_URL", default_value = "http://127.0.0.1:4000")]
    pub relay_url: String,

    /// Sampling temperature used with --ask, as a decimal string in [0, 1].
    #[arg(long, env = "TEMPERATURE", default_value = "0.7")]
    pub temperature: String,
}
