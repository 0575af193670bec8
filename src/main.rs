use clap::Parser;
use eegstream::cli::{Cli, Commands};
use eegstream::config::ServerConfig;
use eegstream::recording;
use eegstream::router::create_router;
use eegstream::state::ServerState;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eegstream=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Inspect { path, json }) => {
            return inspect(&path, json);
        }
        Some(Commands::Serve) | None => {
            // Continue to run server
        }
    }

    let config = ServerConfig::from_env()?;

    info!("Starting eegstream v{}", VERSION);
    info!("Configuration loaded:");
    info!("   Port: {}", config.port);
    info!("   Bind address: {}", config.bind_addr);
    info!("   Storage directory: {:?}", config.storage_directory);
    info!("   Downsample stride: {}", config.downsample_stride);
    match config.stream_delay {
        Some(delay) => info!("   Stream pacing: {:?} per window", delay),
        None => info!("   Stream pacing: none (transport flow control)"),
    }
    info!("   Max upload size: {} bytes", config.max_upload_size);

    let state = Arc::new(ServerState::new(config.clone())?);
    let app = create_router(state);

    let addr: SocketAddr = config.bind_address().parse()?;
    info!("Listening on http://{}", addr);
    info!("WebSocket endpoint: ws://{}/ws/stream/{{file_id}}", addr);
    info!("Health endpoint: http://{}/api/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn inspect(path: &Path, json: bool) -> anyhow::Result<()> {
    let reader = recording::open_recording(path)?;
    let metadata = reader.metadata()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&metadata)?);
    } else {
        println!("File: {} ({})", metadata.file_name, metadata.file_type);
        println!("Size: {} bytes", metadata.file_size);
        println!("Sample rate: {} Hz", metadata.sample_rate);
        println!("Channels: {}", metadata.num_channels);
        println!("Samples per channel: {}", metadata.num_samples);
        println!("Duration: {:.3} s", metadata.duration);
        if let Some(ref start_time) = metadata.start_time {
            println!("Start time: {}", start_time);
        }
        println!("Channel labels: {}", metadata.channels.join(", "));
    }

    Ok(())
}
