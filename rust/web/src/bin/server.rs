//! Continental table server
//!
//! Usage: cargo run -p continental_web --bin continental-server -- --port 8080

use clap::Parser;
use continental_engine::meld::MeldStrategy;
use continental_engine::rules::DrawPilePolicy;
use continental_web::settings::{self, SettingsOverrides};
use continental_web::{init_logging, LedgerKind, LogFormat, WebServer};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "continental-server", version, about = "Continental card game server")]
struct Args {
    /// TOML settings file (also read from CONTINENTAL_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long, short)]
    port: Option<u16>,
    /// memory, jsonl or sqlite
    #[arg(long, value_parser = parse_ledger)]
    ledger: Option<LedgerKind>,
    #[arg(long)]
    ledger_path: Option<PathBuf>,
    /// Seed for every new table's shuffles
    #[arg(long)]
    seed: Option<u64>,
    /// reshuffle_discard or reject
    #[arg(long, value_parser = parse_draw_pile)]
    draw_pile: Option<DrawPilePolicy>,
    /// greedy or exhaustive
    #[arg(long, value_parser = parse_strategy)]
    strategy: Option<MeldStrategy>,
    /// Seats per table, 1 to 5
    #[arg(long)]
    capacity: Option<usize>,
    /// pretty or json
    #[arg(long, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,
}

impl Args {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            host: self.host.clone(),
            port: self.port,
            ledger: self.ledger,
            ledger_path: self.ledger_path.clone(),
            log_format: self.log_format,
            seed: self.seed,
            draw_pile: self.draw_pile,
            strategy: self.strategy,
            capacity: self.capacity,
        }
    }
}

fn parse_ledger(raw: &str) -> Result<LedgerKind, String> {
    LedgerKind::parse(raw).ok_or_else(|| format!("unknown ledger '{raw}'"))
}

fn parse_draw_pile(raw: &str) -> Result<DrawPilePolicy, String> {
    DrawPilePolicy::parse(raw).ok_or_else(|| format!("unknown draw pile policy '{raw}'"))
}

fn parse_strategy(raw: &str) -> Result<MeldStrategy, String> {
    MeldStrategy::parse(raw).ok_or_else(|| format!("unknown meld strategy '{raw}'"))
}

fn parse_log_format(raw: &str) -> Result<LogFormat, String> {
    LogFormat::parse(raw).ok_or_else(|| format!("unknown log format '{raw}'"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let resolved = settings::load(args.config.as_deref(), args.overrides())?;
    let settings = resolved.settings;

    init_logging(settings.log_format);
    tracing::info!(
        host = %settings.host,
        port = settings.port,
        ledger = ?settings.ledger,
        seed = ?settings.engine.seed,
        draw_pile = ?settings.engine.draw_pile,
        strategy = ?settings.engine.strategy,
        capacity = settings.engine.capacity,
        sources = ?resolved.sources,
        "starting continental server"
    );

    let server = WebServer::new(&settings)?;
    let handle = server.start().await?;
    tracing::info!(addr = %handle.address(), "server running, press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;

    tracing::info!("shutting down server");
    handle.shutdown().await?;
    Ok(())
}
