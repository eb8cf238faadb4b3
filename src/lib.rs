pub mod cli;
pub mod client;
pub mod history;
pub mod llm;
pub mod models;
pub mod server;

use cli::Args;
use log::info;
use server::Server;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("History Store Type: {}", args.history_type);
    info!("History Store Path: {}", args.history_path);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("(adapter default)"));
    info!("Chat Timeout: {}s", args.chat_timeout_secs);
    info!("History Window: {}", args.history_window);
    info!("Rate Limit: {} requests / {}s", args.rate_limit_max, args.rate_limit_window_secs);
    info!("Allowed Origins: {}", if args.allowed_origins.is_empty() {
        "(all)"
    } else {
        args.allowed_origins.as_str()
    });
    info!("-------------------------");

    let store = history::initialize_store(&args).await?;
    let chat = llm::initialize_chat_client(&args);

    let server = Server::new(&args, store, chat);
    info!("Starting server on: {}", args.server_addr);

    if args.console {
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                log::error!("HTTP server error: {}", e);
            }
        });
        // Give the listener a moment before the first prompt.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        client::console::run(&args).await
    } else {
        server.run().await
    }
}
