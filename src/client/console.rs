use log::info;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tokio::io::{ AsyncBufReadExt, AsyncWriteExt, BufReader };

use crate::cli::Args;
use crate::client::{ load_or_create_user_id, ChatWidget };

/// Interactive stdin chat against the relay. Exits on EOF or "/quit".
pub async fn run(args: &Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let user_id = load_or_create_user_id(Path::new(&args.client_state_dir))?;
    info!("Console chat ready (user id: {})", user_id);

    let mut widget = ChatWidget::new(
        &format!("http://{}", args.server_addr),
        &user_id,
        Duration::from_secs(args.client_timeout_secs)
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    stdout.write_all(b"you> ").await?;
    stdout.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line == "/quit" {
            break;
        }

        if !line.is_empty() {
            let output = match widget.send(&line).await {
                Ok(reply) => reply,
                Err(e) => e.user_message(),
            };
            stdout.write_all(format!("assistant> {}\n", output).as_bytes()).await?;
        }

        stdout.write_all(b"you> ").await?;
        stdout.flush().await?;
    }

    Ok(())
}
