use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use swarmview_core::columns::NamedIcons;
use swarmview_core::projection::{CellValue, Role};
use swarmview_core::{run_poll_loop, Client, StateDirSession, TorrentListView};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "swarmwatch")]
#[command(about = "Poll a torrent daemon's state directory and log view changes", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset (e.g. "debug", "swarmview_core=trace")
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Poll once, print the torrent list and exit
    #[arg(long)]
    once: bool,

    /// Follow this torrent's peers, files and details
    #[arg(short, long, value_name = "ID")]
    torrent: Option<String>,
}

fn print_torrents(view: &TorrentListView) {
    let model = view.model();
    let columns = view.visible_columns();
    let header: Vec<String> = columns
        .iter()
        .map(|&c| {
            let width = model.column(c).map(|col| col.width() as usize).unwrap_or(8);
            format!("{:<width$}", model.header(c).unwrap_or_default(), width = width)
        })
        .collect();
    println!("{}", header.join(" "));

    for row in 0..model.row_count() {
        let cells: Vec<String> = columns
            .iter()
            .map(|&c| {
                let width = model.column(c).map(|col| col.width() as usize).unwrap_or(8);
                let text = match model.data(row, c, Role::Display) {
                    Some(CellValue::Text(text)) => text,
                    _ => String::new(),
                };
                format!("{:<width$.width$}", text, width = width)
            })
            .collect();
        println!("{}", cells.join(" "));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    info!("swarmwatch v{}", env!("CARGO_PKG_VERSION"));

    let config = match swarmview_core::load_config(args.config.as_deref()) {
        Ok(cfg) => {
            info!("Configuration loaded successfully");
            cfg
        }
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            return Err(e);
        }
    };
    info!("State directory: {:?}", config.state_dir);
    info!("Command directory: {:?}", config.command_dir());
    info!("Poll interval: {} ms", config.poll_interval_ms);

    let session = StateDirSession::new(config.state_dir.clone(), config.command_dir());
    let mut client = Client::new(session, config, Arc::new(NamedIcons));

    if args.once {
        let report = client.tick().await;
        info!(updated = report.updated, failed = report.failed, "polled once");
        print_torrents(client.torrents());
        return Ok(());
    }

    let follow = args.torrent.clone();
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
        info!("Shutdown requested");
    };

    run_poll_loop(&mut client, shutdown, move |client, report| {
        if let Some(id) = &follow {
            if client.torrents().selected_torrent().as_ref() != Some(id) {
                if let Some(row) = client.torrents().model().row_of(id) {
                    client.select_torrent_row(row);
                }
            }
        }
        for (pane, signal) in client.drain_signals() {
            info!(pane, ?signal, "model changed");
        }
        if report.failed > 0 {
            error!(failed = report.failed, "some fetches failed this tick");
        }
    })
    .await;

    Ok(())
}
