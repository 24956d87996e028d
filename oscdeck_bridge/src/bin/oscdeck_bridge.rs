use anyhow::Context;
use clap::Parser;
use crossbeam_channel::bounded;
use oscdeck_bridge::host::lan_ip;
use oscdeck_bridge::protocol::{OscTarget, ParamValue};
use oscdeck_bridge::{BridgeHost, MainLoop, NetworkThread, OscListener, OscSender, SystemHost};
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const TICK: Duration = Duration::from_millis(10);

#[derive(Parser, Debug)]
#[command(name = "oscdeck-bridge", about = "Relays panel commands to OSC receivers")]
struct Args {
    /// WebSocket address the panel connects to.
    #[arg(long, env = "OSCDECK_UI_ADDR", default_value = oscdeck_bridge::DEFAULT_UI_ADDR)]
    ui_addr: String,

    /// UDP address for inbound OSC.
    #[arg(long, env = "OSCDECK_OSC_ADDR", default_value = oscdeck_bridge::DEFAULT_OSC_ADDR)]
    osc_addr: String,

    #[arg(long, env = "OSCDECK_TARGET_A", default_value = oscdeck_bridge::DEFAULT_TARGET_A)]
    target_a: SocketAddr,

    #[arg(long, env = "OSCDECK_TARGET_B", default_value = oscdeck_bridge::DEFAULT_TARGET_B)]
    target_b: SocketAddr,

    #[arg(long, env = "OSCDECK_PRESETS", default_value = "presets.json")]
    presets: PathBuf,

    #[arg(long, env = "OSCDECK_EXPORTS", default_value = "./exports")]
    exports: PathBuf,

    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Write the bound WebSocket address to this file once listening.
    #[arg(long, value_name = "PATH")]
    addr_file: Option<PathBuf>,

    /// Exit after this many milliseconds.
    #[arg(long)]
    run_for_ms: Option<u64>,

    #[arg(long, default_value_t = false)]
    no_announce: bool,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let base_dir = std::env::current_dir().context("cannot read working directory")?;
    let sender = OscSender::new(args.target_a, args.target_b)?;
    let host = SystemHost::new(sender, base_dir, &args.presets, &args.exports, args.ffmpeg);
    info!(
        "presets at {}, exports in {}",
        host.presets_path().display(),
        host.exports_dir().display()
    );

    let (in_tx, in_rx) = bounded(oscdeck_bridge::INBOUND_CAP);
    let (out_tx, out_rx) = bounded(oscdeck_bridge::OUTBOUND_CAP);

    let net = NetworkThread::spawn_with_addr(&args.ui_addr, in_tx.clone(), out_rx)?;
    let osc_in = OscListener::spawn_with_addr(&args.osc_addr, in_tx)?;

    if let Some(path) = &args.addr_file {
        fs::write(path, net.listen_addr().to_string())
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    if !args.no_announce {
        let url = format!("http://{}:{}", lan_ip(), net.listen_addr().port());
        info!("announcing {url}");
        if let Err(e) = host.send_osc(OscTarget::A, "/ip", &[ParamValue::Text(url)]) {
            warn!("announce failed: {e}");
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut main_loop = MainLoop::new(in_rx, out_tx);
    let run_for = args.run_for_ms.map(Duration::from_millis);
    let start = Instant::now();
    while running.load(Ordering::SeqCst) {
        main_loop.tick(&host);
        thread::sleep(TICK);
        if let Some(max) = run_for {
            if start.elapsed() >= max {
                break;
            }
        }
    }

    info!("shutting down");
    osc_in.shutdown();
    net.shutdown();
    Ok(())
}
