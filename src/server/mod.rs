pub mod api;
pub mod cors;
pub mod error;
pub mod rate_limit;

use log::{ info, warn };
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use crate::cli::Args;
use crate::history::ConversationStore;
use crate::llm::ChatClient;
use api::{ build_router, AppState };
use rate_limit::IpRateLimiter;

pub struct Server {
    addr: String,
    state: AppState,
    allowed_origins: Vec<String>,
}

impl Server {
    pub fn new(
        args: &Args,
        store: Arc<dyn ConversationStore>,
        chat: Option<Arc<dyn ChatClient>>
    ) -> Self {
        let limiter = Arc::new(
            IpRateLimiter::new(args.rate_limit_max, Duration::from_secs(args.rate_limit_window_secs))
        );
        let allowed_origins = cors::parse_allowed_origins(&args.allowed_origins);

        if allowed_origins.is_empty() {
            warn!("No allowed origins configured. Cross-origin requests are accepted from anywhere.");
        } else {
            info!("CORS allow-list: {}", allowed_origins.join(", "));
        }

        Self {
            addr: args.server_addr.clone(),
            state: AppState {
                store,
                chat,
                limiter,
                system_prompt: args.system_prompt.clone(),
            },
            allowed_origins,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()?;
        let app = build_router(self.state.clone(), &self.allowed_origins);

        let listener = TcpListener::bind(addr).await.map_err(|e|
            format!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e)
        )?;
        info!("HTTP server listening on: http://{}", addr);

        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
        Ok(())
    }
}
