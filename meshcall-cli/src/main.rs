use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Input;
use meshcall_client::{
    CaptureSource, ClientConfig, ClientEvent, MeshClient, MeshClientHandle, NegotiationState, WebrtcEngine,
};
use meshcall_core::IceServerConfig;
use meshcall_core::utils::default_ice_servers;
use meshcall_server::{DEFAULT_ROOM_CAPACITY, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meshcall")]
#[command(bin_name = "meshcall")]
#[command(version, about = "Signaling relay and headless participant for mesh video calls")]
struct Cli {
    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the signaling relay.
    Serve {
        #[arg(long, default_value = "0.0.0.0:5001")]
        bind: SocketAddr,

        /// STUN or TURN url announced to clients. Repeatable.
        #[arg(long = "ice-server")]
        ice_servers: Vec<String>,

        #[arg(long)]
        turn_username: Option<String>,

        #[arg(long)]
        turn_credential: Option<String>,

        #[arg(long, default_value_t = DEFAULT_ROOM_CAPACITY)]
        room_capacity: usize,
    },
    /// Join a room as a participant and chat from stdin.
    Join {
        #[arg(long, default_value = "ws://127.0.0.1:5001/ws")]
        server: String,

        #[arg(short, long)]
        room: String,

        #[arg(short, long)]
        name: Option<String>,

        /// Publish microphone and camera tracks.
        #[arg(long)]
        publish: bool,
    },
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn is_turn(url: &str) -> bool {
    url.starts_with("turn:") || url.starts_with("turns:")
}

/// STUN urls share one entry, TURN urls another carrying the credentials.
fn ice_config(urls: Vec<String>, username: Option<String>, credential: Option<String>) -> Result<Vec<IceServerConfig>> {
    if urls.is_empty() {
        return Ok(default_ice_servers());
    }

    let (turn, stun): (Vec<String>, Vec<String>) = urls.into_iter().partition(|u| is_turn(u));
    let mut servers = Vec::new();
    if !stun.is_empty() {
        servers.push(IceServerConfig::stun(stun));
    }
    if !turn.is_empty() {
        if username.is_none() || credential.is_none() {
            anyhow::bail!("TURN servers need --turn-username and --turn-credential");
        }
        servers.push(IceServerConfig {
            urls: turn,
            username,
            credential,
        });
    }
    Ok(servers)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

async fn run_serve(config: ServerConfig) -> Result<()> {
    println!("{}", format!("Starting relay on {}", config.bind_addr).green().bold());
    for server in &config.ice_servers {
        println!("   ICE: {}", server.urls.join(", ").cyan());
    }
    meshcall_server::serve(config, shutdown_signal()).await
}

fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::Joined { handle, room, existing } => {
            println!(
                "{} {} as {} ({} already here)",
                "joined".green().bold(),
                room,
                handle,
                existing.len()
            );
        }
        ClientEvent::Presence(members) => {
            let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
            println!("{} {}", "in room:".cyan(), names.join(", "));
        }
        ClientEvent::PeerStateChanged { peer, to, .. } => {
            let state = match to {
                NegotiationState::Connected => to.to_string().green(),
                NegotiationState::Failed | NegotiationState::Closed => to.to_string().red(),
                _ => to.to_string().yellow(),
            };
            println!("   {} {}", peer.to_string().dimmed(), state);
        }
        ClientEvent::PeerConnected(peer) => println!("{} {}", "media up".green(), peer),
        ClientEvent::PeerUnreachable(peer) => println!("{} {}", "unreachable".red().bold(), peer),
        ClientEvent::Chat { name, text, .. } => println!("{} {}", format!("<{}>", name).bold(), text),
        ClientEvent::TrackReady { owner, kind, track_id, .. } => {
            println!("   {} track {} from {}", kind, track_id.dimmed(), owner);
        }
        ClientEvent::ServerError(reason) => println!("{} {}", "relay error:".red(), reason),
        ClientEvent::Disconnected => println!("{}", "relay connection lost".red().bold()),
    }
}

/// `/name <new>` renames, `/quit` leaves, anything else is chat.
async fn handle_line(client: &MeshClientHandle<WebrtcEngine>, line: &str) -> Result<bool> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(true);
    }
    if line == "/quit" {
        return Ok(false);
    }
    if let Some(name) = line.strip_prefix("/name ") {
        client.rename(name.trim()).await?;
        return Ok(true);
    }
    client.send_chat(line).await?;
    Ok(true)
}

async fn run_join(server: String, room: String, name: String, publish: bool) -> Result<()> {
    let sources = if publish {
        vec![CaptureSource::Microphone, CaptureSource::Camera]
    } else {
        Vec::new()
    };
    let engine = Arc::new(WebrtcEngine::new(sources).context("Failed to set up the media engine")?);

    let config = ClientConfig {
        server_url: server,
        ..Default::default()
    };
    let (client, mut events) = MeshClient::spawn(config, engine)
        .await
        .context("Failed to reach the relay")?;

    if publish {
        client.publisher().publish_default().await?;
    }
    client.join(room.as_str(), name)?;

    let (lines_tx, mut lines) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = stdin.next_line().await {
            if lines_tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    print_event(&event);
                    if event == ClientEvent::Disconnected {
                        break;
                    }
                }
                None => break,
            },
            line = lines.recv() => match line {
                Some(line) => {
                    if !handle_line(&client, &line).await? {
                        break;
                    }
                }
                None => break,
            },
            _ = shutdown_signal() => break,
        }
    }

    if let Err(e) = client.leave().await {
        info!("Leave skipped: {}", e);
    }
    client.shutdown();
    println!("{}", "bye".dimmed());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);

    match cli.command {
        Commands::Serve {
            bind,
            ice_servers,
            turn_username,
            turn_credential,
            room_capacity,
        } => {
            let config = ServerConfig {
                bind_addr: bind,
                ice_servers: ice_config(ice_servers, turn_username, turn_credential)?,
                room_capacity,
            };
            run_serve(config).await
        }
        Commands::Join {
            server,
            room,
            name,
            publish,
        } => {
            let name = match name {
                Some(name) => name,
                None => Input::<String>::new()
                    .with_prompt("Display name")
                    .interact_text()
                    .context("No display name given")?,
            };
            run_join(server, room, name, publish).await
        }
    }
}
