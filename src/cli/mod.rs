use clap::Parser;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a concise, friendly support assistant for our website. \
     Keep answers under four sentences when possible. \
     Always acknowledge the user's message in your first sentence. \
     If the user asks something vague, ask exactly one clarifying question. \
     If you are unsure, say so briefly and suggest the next step.";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the HTTP server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Comma-separated list of origins allowed by CORS. Empty means all origins are allowed.
    #[arg(long, env = "ALLOWED_ORIGINS", default_value = "")]
    pub allowed_origins: String,

    /// Maximum number of requests allowed per client IP within the rate-limit window.
    #[arg(long, env = "RATE_LIMIT_MAX", default_value = "30")]
    pub rate_limit_max: u32,

    /// Length of the rate-limit window in seconds.
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value = "300")]
    pub rate_limit_window_secs: u64,

    // --- History Store Args ---
    /// History store type (json, sqlite, memory)
    #[arg(long, env = "HISTORY_TYPE", default_value = "json")]
    pub history_type: String,

    /// Path to the history database file (JSON document or SQLite file, depending on type).
    #[arg(long, env = "HISTORY_PATH", default_value = "data/conversations.json")]
    pub history_path: String,

    // --- Chat LLM Provider Args ---
    /// API Key for the chat completion provider. Chat requests are rejected when unset.
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gpt-4o-mini)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    /// Base URL for the chat completion API (any OpenAI-compatible host).
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let the adapter handle defaults if None
    pub chat_base_url: Option<String>,

    /// Sampling temperature for chat completion.
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.4")]
    pub chat_temperature: f32,

    /// Maximum number of tokens the completion may generate.
    #[arg(long, env = "CHAT_MAX_TOKENS", default_value = "1024")]
    pub chat_max_tokens: u32,

    /// Upper bound in seconds on a single upstream completion call.
    #[arg(long, env = "CHAT_TIMEOUT_SECS", default_value = "20")]
    pub chat_timeout_secs: u64,

    /// Number of most recent history messages forwarded with each completion.
    #[arg(long, env = "HISTORY_WINDOW", default_value = "10")]
    pub history_window: usize,

    /// System prompt sent ahead of the conversation history.
    #[arg(long, env = "SYSTEM_PROMPT", default_value = DEFAULT_SYSTEM_PROMPT)]
    pub system_prompt: String,

    // --- Widget Client Args ---
    /// Run an interactive console chat against the server after it starts.
    #[arg(long, default_value = "false")]
    pub console: bool,

    /// Directory where the console client persists its generated user id.
    #[arg(long, env = "CLIENT_STATE_DIR", default_value = "data")]
    pub client_state_dir: String,

    /// Client-side timeout in seconds for console chat requests.
    #[arg(long, env = "CLIENT_TIMEOUT_SECS", default_value = "15")]
    pub client_timeout_secs: u64,
}
