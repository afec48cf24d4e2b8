// SAVI command line client

mod summary;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use savi_core::protocol::boundary_from_content_type;
use savi_core::{FrameMessage, MultipartStreamDecoder};
use serde_json::json;
use summary::FrameSummary;

#[derive(Parser)]
#[command(name = "savi")]
#[command(about = "Client for the SAVI stream server", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, default_value = "http://localhost:5000", global = true, env = "SAVI_SERVER")]
    server: String,

    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the server is up
    Health,

    /// Propagate a session's masks and print each frame as it arrives
    Propagate {
        #[arg(long)]
        session_id: String,

        #[arg(long, default_value = "0")]
        start_frame_index: u64,

        /// Ask the engine for a short run
        #[arg(long)]
        quick_test_mode: bool,

        /// Print each frame's JSON body instead of a summary line
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(false)
            .init();
    }

    if !cli.server.starts_with("http://") && !cli.server.starts_with("https://") {
        return Err(anyhow::anyhow!("Server URL must start with http:// or https://"));
    }
    let server = cli.server.trim_end_matches('/');

    match cli.command {
        Commands::Health => check_health(server).await,
        Commands::Propagate {
            session_id,
            start_frame_index,
            quick_test_mode,
            json,
        } => propagate(server, &session_id, start_frame_index, quick_test_mode, json).await,
    }
}

async fn check_health(server: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/healthy", server))
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("Cannot connect to server: {}", e))?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(anyhow::anyhow!("Server health check failed: {} {}", status, body));
    }
    println!("Server is healthy: {}", body.trim());
    Ok(())
}

async fn propagate(
    server: &str,
    session_id: &str,
    start_frame_index: u64,
    quick_test_mode: bool,
    print_json: bool,
) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/propagate_in_video", server))
        .json(&json!({
            "session_id": session_id,
            "start_frame_index": start_frame_index,
            "quick_test_mode": quick_test_mode,
        }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(anyhow::anyhow!("Propagation rejected: {} {}", status, message.trim()));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let boundary = boundary_from_content_type(&content_type)
        .ok_or_else(|| anyhow::anyhow!("Unexpected Content-Type: {:?}", content_type))?;

    let mut decoder = MultipartStreamDecoder::new(boundary);
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        // a reset connection is how the server reports a failed stream
        let chunk = chunk.map_err(|e| {
            anyhow::anyhow!("Stream aborted after {} frames: {}", decoder.decoded(), e)
        })?;
        for message in decoder.push(&chunk)? {
            print_frame(&message, print_json)?;
        }
    }

    let mut received = decoder.decoded();
    if let Some(message) = decoder.finish()? {
        print_frame(&message, print_json)?;
        received += 1;
    }
    eprintln!("Received {} frames", received);
    Ok(())
}

fn print_frame(message: &FrameMessage, print_json: bool) -> anyhow::Result<()> {
    if print_json {
        println!("{}", String::from_utf8_lossy(&message.body));
    } else {
        println!("{}", FrameSummary::from_message(message)?);
    }
    Ok(())
}
