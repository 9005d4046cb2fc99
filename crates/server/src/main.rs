mod config;
mod events;
mod metrics;
mod server;
mod tui;

use std::io;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use config::ServerConfig;
use metrics::CsvMetricsSink;
use server::GameServer;

#[derive(Parser)]
#[command(name = "netrush-server")]
#[command(about = "Grid Clash authoritative server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = netrush::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = netrush::DEFAULT_GRID_SIDE)]
    grid_side: u16,

    /// Snapshot cadence in Hz
    #[arg(short, long, default_value_t = netrush::DEFAULT_UPDATE_RATE)]
    update_rate: u32,

    /// Every Nth snapshot is a full frame
    #[arg(long, default_value_t = netrush::DEFAULT_FULL_EVERY)]
    full_every: u32,

    /// How many prior change lists ride along as redundancy
    #[arg(long, default_value_t = netrush::DEFAULT_REDUNDANCY)]
    redundancy: usize,

    #[arg(short, long, default_value_t = netrush::DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    #[arg(long, default_value_t = 15)]
    client_timeout_secs: u64,

    /// Raw payload size above which bodies are compressed
    #[arg(long, default_value_t = netrush::DEFAULT_COMPRESSION_THRESHOLD)]
    compression_threshold: usize,

    #[arg(long, default_value = "server_log.csv")]
    log_file: PathBuf,

    /// Disable the CSV metrics log
    #[arg(long)]
    no_log: bool,

    #[arg(long)]
    headless: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.bind, args.port);

    let config = ServerConfig {
        grid_side: args.grid_side,
        update_rate: args.update_rate,
        full_every: args.full_every,
        redundancy: args.redundancy,
        max_clients: args.max_clients,
        client_timeout: Duration::from_secs(args.client_timeout_secs),
        compression_threshold: args.compression_threshold,
    };

    let mut server = GameServer::new(&bind_addr, config)?;
    log::info!("listening on {}", server.local_addr());

    if !args.no_log {
        server.set_metrics_sink(Box::new(CsvMetricsSink::create(&args.log_file)?));
    }

    if args.headless {
        server.run();
    } else {
        run_with_tui(&mut server)?;
    }

    Ok(())
}

fn run_with_tui(server: &mut GameServer) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let running = server.running();

    while running.load(Ordering::SeqCst) {
        server.tick_once();

        for event in server.drain_events() {
            log::debug!("{event:?}");
        }

        if event::poll(Duration::from_millis(1))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => {
                            running.store(false, Ordering::SeqCst);
                        }
                        _ => {}
                    }
                }
            }
        }

        terminal.draw(|frame| {
            tui::render(frame, server.stats());
        })?;
    }

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}
