use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec2;

use rift::{NetworkEvent, unix_time_ms};
use rift_client::{ClientConfig, ClientNetworkService, LocalWorld, RemoteEntityReconciler};

#[derive(Parser)]
#[command(name = "rift-client")]
#[command(about = "Headless rift client that flies a ship in circles")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1")]
    server: String,

    #[arg(short, long, default_value_t = rift::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value = "bot")]
    name: String,

    #[arg(long, default_value_t = 600, help = "Ticks to run before leaving")]
    ticks: u32,

    #[arg(long, default_value_t = 60)]
    tick_rate: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut client = ClientNetworkService::new(ClientConfig::default());
    let player_id = client
        .connect(&args.server, args.port, &args.name)
        .with_context(|| format!("connecting to {}:{}", args.server, args.port))?;

    let mut world = LocalWorld::new(Vec2::new(400.0, 300.0));
    world.set_player(player_id);
    let mut reconciler = RemoteEntityReconciler::default();
    client.send_ready(true)?;

    let tick_rate = args.tick_rate.max(1);
    let tick = Duration::from_secs_f64(1.0 / f64::from(tick_rate));
    let dt = tick.as_secs_f32();

    'frames: for n in 0..args.ticks {
        let frame_start = Instant::now();

        for event in client.poll_events() {
            reconciler.handle_event(&event);
            match event {
                NetworkEvent::PlayerJoin { player_id, name } => {
                    log::info!("{} joined as player {}", name, player_id);
                }
                NetworkEvent::PlayerLeave { player_id, reason } => {
                    log::info!("Player {} left: {}", player_id, reason.as_str());
                    world.forget(player_id);
                }
                NetworkEvent::EntityDestroy { entity_id } => world.forget(entity_id),
                NetworkEvent::StartGame { timestamp_ms } => {
                    log::info!("Match started at {}", timestamp_ms);
                }
                NetworkEvent::Disconnected { reason } => {
                    log::warn!("Lost connection: {}", reason.as_str());
                    break 'frames;
                }
                _ => {}
            }
        }

        world.step(dt);
        client.tick(&world)?;
        reconciler.update(unix_time_ms(), dt * 1000.0);
        reconciler.apply_to(&mut world);

        if n % tick_rate == 0 {
            for (entity_id, position) in world.remote_positions() {
                log::info!("Entity {} at ({:.1}, {:.1})", entity_id, position.x, position.y);
            }
        }

        thread::sleep(tick.saturating_sub(frame_start.elapsed()));
    }

    client.disconnect();
    Ok(())
}
