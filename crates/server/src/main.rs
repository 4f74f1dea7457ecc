mod config;
mod server;
mod tui;

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use config::ServerConfig;
use server::MixerServer;

#[derive(Parser)]
#[command(name = "plaza-server")]
#[command(about = "Plaza avatar mixer")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = plaza::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = plaza::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = 256)]
    max_peers: usize,

    #[arg(long, default_value_t = 10, help = "Seconds of silence before a peer is dropped")]
    peer_timeout: u64,

    #[arg(long, default_value_t = 1000, help = "Milliseconds between stats reports")]
    stats_interval: u64,

    #[arg(long, help = "UDP address that receives archived stats reports")]
    stats_addr: Option<SocketAddr>,

    #[arg(long, help = "Seed for the mixer's random filters")]
    seed: Option<u64>,

    #[arg(long)]
    headless: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.bind, args.port);

    let config = ServerConfig {
        tick_rate: args.tick_rate.max(1),
        max_peers: args.max_peers,
        peer_timeout: Duration::from_secs(args.peer_timeout),
        stats_interval: Duration::from_millis(args.stats_interval),
        stats_addr: args.stats_addr,
        seed: args.seed,
    };

    let mut server = MixerServer::new(&bind_addr, config)?;

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        log::info!("Mixer listening on {}", server.local_addr());
        server.run()?;
        log::info!("Mixer shutting down");
    } else {
        run_with_tui(&mut server)?;
    }

    Ok(())
}

fn run_with_tui(server: &mut MixerServer) -> io::Result<()> {
    server.start()?;

    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let running = server.running();

    while running.load(Ordering::SeqCst) {
        server.poll_stats();

        if event::poll(Duration::from_millis(50))? {
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

        let stats = server.stats();
        terminal.draw(|frame| {
            tui::render(frame, &stats);
        })?;
    }

    server.shutdown();

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}
