/// Chatlink client - main entry point
use chatlink_core::{ApiClient, ChatClient, Config};
use std::env;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse configuration
    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let local_user = config
        .local_user
        .clone()
        .ok_or_else(|| anyhow::anyhow!("--user <id> is required (or set CHATLINK_USER)"))?;

    let backend = ApiClient::new(&config.api_base)
        .map_err(|e| anyhow::anyhow!("HTTP client error: {}", e))?;
    let client = ChatClient::start(&config, backend, &local_user)
        .await
        .map_err(|e| anyhow::anyhow!("Client error: {}", e))?;

    info!("🚀 Chatlink client started");
    info!("   User: {}", local_user);
    info!("   Channel: {}", config.server_addr);
    print_usage();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                if !handle_line(&client, line.trim()).await {
                    break;
                }
            }
        }
    }

    client.shutdown();
    Ok(())
}

async fn handle_line<B: chatlink_core::Backend>(client: &ChatClient<B>, line: &str) -> bool {
    match line {
        "" => {}
        "/quit" => return false,
        "/peers" | "/view" => {
            render(client).await;
        }
        _ if line.starts_with("/select ") => {
            let peer_id = line.trim_start_matches("/select ").trim();
            match client.select_peer(peer_id).await {
                Ok(()) => render(client).await,
                Err(e) => eprintln!("! {}", e),
            }
        }
        _ if line.starts_with('/') => {
            eprintln!("! Unknown command: {}", line);
            print_usage();
        }
        text => {
            // A line of input counts as composer activity followed by a send
            client.keystroke().await;
            if let Err(e) = client.send_message(text).await {
                eprintln!("! Send failed: {}", e);
            }
        }
    }
    true
}

async fn render<B: chatlink_core::Backend>(client: &ChatClient<B>) {
    let view = client.view().await;
    println!("-- peers --");
    for peer in &view.peers {
        println!(
            "  {} {} {}{}",
            if peer.online { "●" } else { "○" },
            peer.name,
            peer.id,
            if peer.active { "  (active)" } else { "" },
        );
    }
    if !view.transcript.is_empty() {
        println!("-- transcript --");
        for msg in &view.transcript {
            println!("  {}: {}", msg.sender, msg.text);
        }
    }
    if let Some(banner) = &view.typing_banner {
        println!("  {}", banner);
    }
}

fn print_usage() {
    println!("Commands:");
    println!("  /select <peer_id>   open a conversation");
    println!("  /peers              show the peer list and transcript");
    println!("  /quit               exit");
    println!("  <text>              send a message to the active peer");
}
