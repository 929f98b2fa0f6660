use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;

use rift::LobbySettings;
use rift_server::{ServerConfig, UdpServer};

#[derive(Parser)]
#[command(name = "rift-server")]
#[command(about = "Rift multiplayer sync server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    #[arg(short, long, default_value_t = rift::DEFAULT_PORT)]
    port: u16,

    #[arg(long, default_value_t = 300, help = "Idle seconds before a session expires")]
    session_timeout: u64,

    #[arg(long, default_value_t = 30, help = "Seconds between cleanup passes")]
    cleanup_interval: u64,

    #[arg(long, default_value_t = rift::session::DEFAULT_MAX_SESSIONS)]
    max_sessions: usize,

    #[arg(short, long, default_value_t = 8)]
    max_players: usize,

    #[arg(long, default_value_t = 1, help = "Ready players needed to start a match")]
    min_players: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: SocketAddr::from((args.bind, args.port)),
        session_timeout: Duration::from_secs(args.session_timeout),
        cleanup_interval: Duration::from_secs(args.cleanup_interval.max(1)),
        max_sessions: args.max_sessions,
        lobby: LobbySettings {
            max_players: args.max_players,
            min_players: args.min_players,
        },
    };

    let mut server = UdpServer::new(config);
    server.start().await.context("starting server")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Interrupt received, shutting down");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                log::error!("Cannot listen for interrupt: {}", e);
                // keep the sender alive so the server keeps running
                std::future::pending::<()>().await;
            }
        }
    });

    server.run(shutdown_rx).await?;
    Ok(())
}
