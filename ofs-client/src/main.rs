//! OFS console client: entry point.
//!
//! ```text
//! ofs-client                     Use ofs-client.toml or defaults
//! ofs-client --config <path>     Use custom config TOML
//! ofs-client --host H --port P   Override the server address
//! ofs-client --gen-config        Dump default config and exit
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ofs_client::config::ClientConfig;
use ofs_client::console::{self, ConsoleCommand, Flow};
use ofs_core::Coordinator;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "ofs-client", about = "Console client for the OFS filesystem server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "ofs-client.toml")]
    config: PathBuf,

    /// Server host (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Connect immediately on startup.
    #[arg(long)]
    connect: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ClientConfig::load(&cli.config);
    if let Some(host) = cli.host {
        config.network.host = host;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("ofs-client v{}", env!("CARGO_PKG_VERSION"));

    let server = config.server();
    let (coord, mut events) = Coordinator::channel(config.session_config());

    // ── Event printer ────────────────────────────────────────────

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{}", console::timestamped(&console::render(&event)));
        }
    });

    if cli.connect {
        if let Err(e) = coord.connect(&server).await {
            eprintln!("{}", console::describe_error(&e));
        }
    }

    println!("OFS client, server {server}. Type `help` for commands.");

    // ── Command loop ─────────────────────────────────────────────

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let cmd = match ConsoleCommand::parse(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(usage) => {
                eprintln!("{usage}");
                continue;
            }
        };
        match console::execute(cmd, &coord, &server).await {
            Ok((Flow::Quit, _)) => break,
            Ok((Flow::Continue, Some(text))) => println!("{}", console::timestamped(&text)),
            Ok((Flow::Continue, None)) => {}
            Err(e) => eprintln!("{}", console::describe_error(e.as_ref())),
        }
    }

    // ── Shutdown ─────────────────────────────────────────────────

    info!("shutting down");
    coord.disconnect().await;
    drop(coord);
    let _ = printer.await;

    Ok(())
}
