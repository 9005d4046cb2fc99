mod client;
mod config;
mod metrics;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use netrush::{ClientState, UNCLAIMED};

use client::{ClientEvent, GameClient};
use config::ClientConfig;
use metrics::CsvMetricsSink;

#[derive(Parser)]
#[command(name = "netrush-client")]
#[command(about = "Grid Clash client (headless driver)")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1")]
    server: String,

    #[arg(short, long, default_value_t = netrush::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = netrush::DEFAULT_GRID_SIDE)]
    grid_side: u16,

    /// Claim a random unclaimed cell this often (0 disables auto-play)
    #[arg(long, default_value_t = 500)]
    claim_interval_ms: u64,

    /// Event retransmit clock in milliseconds
    #[arg(long, default_value_t = 500)]
    rdt_timeout_ms: u64,

    /// Event retransmit budget
    #[arg(long, default_value_t = netrush::MAX_RETRIES)]
    max_retries: u32,

    /// CSV metrics path; defaults to client_<id>_log.csv once connected
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Disable the CSV metrics log
    #[arg(long)]
    no_log: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let server_addr: SocketAddr = format!("{}:{}", args.server, args.port)
        .parse()
        .context("invalid server address")?;

    let config = ClientConfig {
        grid_side: args.grid_side,
        rdt_timeout: Duration::from_millis(args.rdt_timeout_ms),
        max_retries: args.max_retries,
        ..Default::default()
    };

    let mut client = GameClient::new(config)?;
    client.connect(server_addr)?;

    let claim_interval = Duration::from_millis(args.claim_interval_ms);
    let auto_play = args.claim_interval_ms > 0;
    let mut last_claim = Instant::now();

    loop {
        client.update()?;

        let events: Vec<ClientEvent> = client.drain_events().collect();
        for event in events {
            match event {
                ClientEvent::Connected { client_id } => {
                    if !args.no_log {
                        let path = args
                            .log_file
                            .clone()
                            .unwrap_or_else(|| PathBuf::from(format!("client_{client_id}_log.csv")));
                        match CsvMetricsSink::create(&path) {
                            Ok(sink) => client.set_metrics_sink(Box::new(sink)),
                            Err(e) => log::warn!("metrics log disabled: {e}"),
                        }
                    }
                }
                ClientEvent::ClaimResolved { cell, owner } => {
                    log::debug!("cell {cell} resolved to client {owner}");
                }
                ClientEvent::ClaimAbandoned { cell } => {
                    log::warn!("gave up on cell {cell}; reverting to last confirmed state");
                }
                ClientEvent::GameOver { winners } => {
                    log::info!("winners: {winners:?}");
                }
            }
        }

        if client.state() == ClientState::GameOver {
            print_summary(&client);
            break;
        }

        if auto_play && client.state() == ClientState::Playing && last_claim.elapsed() >= claim_interval
        {
            if let Some((row, col)) = pick_unclaimed_cell(&client) {
                client.send_claim(row, col)?;
            }
            last_claim = Instant::now();
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    Ok(())
}

fn pick_unclaimed_cell(client: &GameClient) -> Option<(u16, u16)> {
    let view = client.view();
    let side = view.grid().side();

    let mut open = Vec::new();
    for row in 0..side {
        for col in 0..side {
            let cell = view.grid().index_of(row, col);
            if view.owner(row, col) == Some(UNCLAIMED) && !view.is_pending(cell) {
                open.push((row, col));
            }
        }
    }

    if open.is_empty() {
        None
    } else {
        Some(open[(rand_u64() % open.len() as u64) as usize])
    }
}

fn rand_u64() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64,
    );
    hasher.finish()
}

fn print_summary(client: &GameClient) {
    let view = client.view();
    let side = view.grid().side();
    let counts = view.grid().counts();

    println!("game over");
    if let Some(winners) = client.winners() {
        println!("winners: {winners:?}");
    }

    let mut owners: Vec<(&u32, &usize)> = counts.iter().collect();
    owners.sort();
    for (owner, cells) in owners {
        println!("  client {owner}: {cells} cells");
    }

    for row in 0..side {
        let line: Vec<String> = (0..side)
            .map(|col| match view.owner(row, col) {
                Some(UNCLAIMED) | None => ".".to_string(),
                Some(owner) => owner.to_string(),
            })
            .collect();
        println!("{}", line.join(" "));
    }
}
