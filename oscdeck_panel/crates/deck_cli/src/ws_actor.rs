use crate::session::{PanelCommand, Session};
use deck_core::protocol::ServerMessage;
use deck_core::sync::DeckSnapshot;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Owns the session and the bridge socket. All store mutations happen on
/// this task.
pub async fn run(
    mut rx: mpsc::Receiver<PanelCommand>,
    url: String,
    mut session: Session,
    snapshots: watch::Sender<DeckSnapshot>,
    connect_on_start: bool,
) {
    let mut desired_connected = connect_on_start;
    let mut backoff = Backoff::default();

    loop {
        publish(&session, &snapshots);

        if !desired_connected {
            match rx.recv().await {
                Some(PanelCommand::Connect) => {
                    desired_connected = true;
                    backoff.reset();
                }
                Some(PanelCommand::Disconnect) => {}
                Some(cmd) => session.apply(cmd, now_ms()),
                None => return,
            }
            continue;
        }

        session.begin_connect();
        publish(&session, &snapshots);

        let connecting = tokio_tungstenite::connect_async(url.as_str());
        let result = match serve_until(connecting, &mut rx, &mut session, &snapshots).await {
            Attempt::Ready(result) => result,
            Attempt::Cancelled => {
                desired_connected = false;
                session.on_disconnected();
                continue;
            }
            Attempt::Closed => return,
        };

        let mut socket = match result {
            Ok((socket, _)) => socket,
            Err(e) => {
                let retry = backoff.next_delay();
                warn!("connecting to {url} failed: {e}; retrying in {}s", retry.as_secs());
                let wake = tokio::time::sleep_until(Instant::now() + retry);
                match serve_until(wake, &mut rx, &mut session, &snapshots).await {
                    Attempt::Ready(()) => {}
                    Attempt::Cancelled => {
                        desired_connected = false;
                        session.on_disconnected();
                    }
                    Attempt::Closed => return,
                }
                continue;
            }
        };

        backoff.reset();
        session.on_connected();
        info!("connected to bridge at {url}");

        let mut lost = false;
        loop {
            if let Err(e) = flush(&mut socket, &mut session).await {
                warn!("send to bridge failed: {e}");
                lost = true;
                break;
            }
            publish(&session, &snapshots);

            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(PanelCommand::Connect) => {}
                    Some(PanelCommand::Disconnect) => {
                        desired_connected = false;
                        break;
                    }
                    Some(cmd) => session.apply(cmd, now_ms()),
                    None => {
                        let _ = socket.close(None).await;
                        return;
                    }
                },
                incoming = socket.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(msg) => session.handle_server_message(msg),
                            Err(e) => debug!("ignoring bridge message: {e}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        lost = true;
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("bridge connection error: {e}");
                        lost = true;
                        break;
                    }
                },
                timer = session.next_timer() => session.on_timer(timer),
            }
        }

        if lost {
            // Stay down until asked to reconnect.
            warn!("bridge connection lost; use 'connect' to retry");
            desired_connected = false;
        } else {
            let _ = socket.close(None).await;
            info!("disconnected from bridge");
        }
        session.on_disconnected();
    }
}

enum Attempt<T> {
    Ready(T),
    Cancelled,
    Closed,
}

/// Drives `fut` to completion while still applying panel edits, so a slow
/// connect or a backoff wait never stalls the panel. `Disconnect` abandons it.
async fn serve_until<F: Future>(
    fut: F,
    rx: &mut mpsc::Receiver<PanelCommand>,
    session: &mut Session,
    snapshots: &watch::Sender<DeckSnapshot>,
) -> Attempt<F::Output> {
    tokio::pin!(fut);
    loop {
        tokio::select! {
            out = &mut fut => return Attempt::Ready(out),
            cmd = rx.recv() => match cmd {
                Some(PanelCommand::Connect) => {}
                Some(PanelCommand::Disconnect) => return Attempt::Cancelled,
                Some(cmd) => {
                    session.apply(cmd, now_ms());
                    publish(session, snapshots);
                }
                None => return Attempt::Closed,
            },
        }
    }
}

fn publish(session: &Session, snapshots: &watch::Sender<DeckSnapshot>) {
    let next = session.snapshot();
    snapshots.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

async fn flush(
    socket: &mut Socket,
    session: &mut Session,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    for cmd in session.drain_outbound() {
        let payload = match serde_json::to_string(&cmd) {
            Ok(p) => p,
            Err(e) => {
                warn!("dropping unserializable {} command: {e}", cmd.kind());
                continue;
            }
        };
        socket.send(Message::text(payload)).await?;
    }
    Ok(())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Default)]
struct Backoff {
    idx: usize,
}

impl Backoff {
    fn reset(&mut self) {
        self.idx = 0;
    }

    fn next_delay(&mut self) -> Duration {
        let delays = [1, 2, 5, 10];
        let secs = delays.get(self.idx).copied().unwrap_or(10);
        self.idx = (self.idx + 1).min(delays.len());
        Duration::from_secs(secs)
    }
}
