mod repl;
mod session;
mod ws_actor;

use anyhow::Context;
use clap::Parser;
use deck_core::schema::Schema;
use deck_core::store::Store;
use deck_core::sync::{DeckSnapshot, LinkState, SyncMediator};
use repl::ReplCommand;
use session::Session;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "oscdeck-panel", about = "Line-oriented control panel for an oscdeck bridge")]
struct Args {
    #[arg(long, env = "OSCDECK_WS_URL", default_value = "ws://127.0.0.1:7001")]
    ws_url: String,

    /// JSON file describing the controllable parameters.
    #[arg(long, env = "OSCDECK_SCHEMA", default_value = "schema.json")]
    schema: PathBuf,

    /// Start disconnected.
    #[arg(long, default_value_t = false)]
    offline: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let schema = Schema::from_path(&args.schema)
        .with_context(|| format!("failed to load schema {}", args.schema.display()))?;
    info!("loaded {} parameter(s) from {}", schema.len(), args.schema.display());

    let session = Session::new(SyncMediator::new(Store::new(Arc::new(schema))));
    let (snap_tx, mut snap_rx) = watch::channel(session.snapshot());
    let show_rx = snap_rx.clone();
    let (tx, rx) = mpsc::channel(256);

    let actor = tokio::spawn(ws_actor::run(
        rx,
        args.ws_url,
        session,
        snap_tx,
        !args.offline,
    ));

    let printer = tokio::spawn(async move {
        while snap_rx.changed().await.is_ok() {
            let snapshot = snap_rx.borrow_and_update().clone();
            println!("{}", render(&snapshot));
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match repl::parse(&line) {
            Ok(ReplCommand::Show) => println!("{}", render(&show_rx.borrow())),
            Ok(ReplCommand::Help) => println!("{}", repl::HELP),
            Ok(ReplCommand::Quit) => break,
            Ok(ReplCommand::Panel(cmd)) => {
                if tx.send(cmd).await.is_err() {
                    break;
                }
            }
            Err(e) => eprintln!("{e}"),
        }
    }

    drop(tx);
    let _ = actor.await;
    printer.abort();
    Ok(())
}

fn render(snapshot: &DeckSnapshot) -> String {
    let link = match snapshot.link {
        LinkState::Disconnected => "disconnected",
        LinkState::Connecting => "connecting",
        LinkState::Connected => "connected",
    };
    let active = snapshot
        .current_preset
        .map(|i| i.to_string())
        .unwrap_or_else(|| "-".to_string());
    let slots: Vec<String> = snapshot.presets.indices().map(|i| i.to_string()).collect();

    let mut out = format!("[{link}] preset {active} | saved: {}", slots.join(" "));
    for (name, value) in snapshot.preset.iter() {
        let shown = serde_json::to_string(value).unwrap_or_else(|_| "?".to_string());
        let _ = write!(out, "\n  {name} = {shown}");
    }
    out
}
