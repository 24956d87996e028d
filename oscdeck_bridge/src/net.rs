use crate::error::BridgeError;
use crate::protocol::{ClientCommand, ErrorCode, InboundMsg, OutboundMsg, ServerMessage};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message;

struct ActiveClient {
    ws: tungstenite::WebSocket<TcpStream>,
    socket_addr: SocketAddr,
}

/// WebSocket server thread. Serves one panel at a time; a new connection
/// replaces the previous one.
pub struct NetworkThread {
    listen_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkThread {
    pub fn spawn_with_addr(
        addr: &str,
        in_tx: Sender<InboundMsg>,
        out_rx: Receiver<OutboundMsg>,
    ) -> Result<Self, BridgeError> {
        let listener = TcpListener::bind(addr).map_err(|source| BridgeError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let listen_addr = listener.local_addr()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_thread = Arc::clone(&shutdown);

        let join_handle = thread::Builder::new()
            .name("oscdeck-ws".to_string())
            .spawn(move || run_server(listener, in_tx, out_rx, shutdown_for_thread))?;

        info!("panel server listening on ws://{listen_addr}");
        Ok(Self {
            listen_addr,
            shutdown,
            join_handle: Mutex::new(Some(join_handle)),
        })
    }

    /// Actual bound address (useful when binding port 0).
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut h) = self.join_handle.lock() {
            if let Some(h) = h.take() {
                let _ = h.join();
            }
        }
    }
}

impl Drop for NetworkThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_server(
    listener: TcpListener,
    in_tx: Sender<InboundMsg>,
    out_rx: Receiver<OutboundMsg>,
    shutdown: Arc<AtomicBool>,
) {
    let mut active: Option<ActiveClient> = None;

    while !shutdown.load(Ordering::Relaxed) {
        loop {
            match listener.accept() {
                Ok((stream, socket_addr)) => {
                    if let Some(client) = accept_client(&in_tx, &mut active, stream, socket_addr) {
                        active = Some(client);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("ws accept failed: {e}");
                    break;
                }
            }
        }

        if let Some(client) = active.as_mut() {
            loop {
                match out_rx.try_recv() {
                    Ok(OutboundMsg::Send { msg }) => {
                        if send_server_message(&mut client.ws, &msg).is_err() {
                            drop_client(&in_tx, &mut active);
                            break;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return,
                }
            }
        } else {
            // Nobody to deliver to.
            while out_rx.try_recv().is_ok() {}
        }

        // One read per pass; the read timeout keeps the loop moving.
        if let Some(client) = active.as_mut() {
            match client.ws.read() {
                Ok(msg) => {
                    if handle_inbound(&in_tx, client, msg).is_err() {
                        drop_client(&in_tx, &mut active);
                    }
                }
                Err(tungstenite::Error::Io(e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(tungstenite::Error::ConnectionClosed) => {
                    active = None;
                    let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
                }
                Err(e) => {
                    debug!("ws read failed: {e}");
                    active = None;
                    let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
                }
            }
        } else {
            thread::sleep(Duration::from_millis(25));
        }
    }

    if let Some(mut client) = active {
        let _ = client.ws.close(None);
    }
}

fn accept_client(
    in_tx: &Sender<InboundMsg>,
    active: &mut Option<ActiveClient>,
    stream: TcpStream,
    socket_addr: SocketAddr,
) -> Option<ActiveClient> {
    // Accepted sockets may inherit non-blocking mode from the listener.
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_nodelay(true);
    let _ = stream.set_read_timeout(Some(Duration::from_millis(30)));
    let _ = stream.set_write_timeout(Some(Duration::from_millis(200)));

    let mut ws = match tungstenite::accept(stream) {
        Ok(ws) => ws,
        Err(e) => {
            warn!("ws handshake with {socket_addr} failed: {e}");
            return None;
        }
    };

    if let Some(mut prev) = active.take() {
        info!("panel {} replaced by {socket_addr}", prev.socket_addr);
        let _ = prev.ws.close(None);
        let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
    }

    if in_tx
        .try_send(InboundMsg::ClientConnected { socket_addr })
        .is_err()
    {
        let _ = send_server_message(
            &mut ws,
            &ServerMessage::Error {
                msg: "server busy".to_string(),
                code: ErrorCode::Busy,
            },
        );
        let _ = ws.close(None);
        return None;
    }

    info!("panel connected from {socket_addr}");
    Some(ActiveClient { ws, socket_addr })
}

fn drop_client(in_tx: &Sender<InboundMsg>, active: &mut Option<ActiveClient>) {
    if let Some(mut client) = active.take() {
        info!("panel {} disconnected", client.socket_addr);
        let _ = client.ws.close(None);
    }
    let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
}

fn handle_inbound(
    in_tx: &Sender<InboundMsg>,
    client: &mut ActiveClient,
    msg: Message,
) -> Result<(), ()> {
    let text = match msg {
        Message::Text(s) => s,
        Message::Binary(_) => return Ok(()),
        Message::Ping(payload) => {
            let _ = client.ws.send(Message::Pong(payload));
            return Ok(());
        }
        Message::Pong(_) => return Ok(()),
        Message::Close(_) => return Err(()),
        Message::Frame(_) => return Ok(()),
    };

    let cmd: ClientCommand = match serde_json::from_str(&text) {
        Ok(c) => c,
        Err(e) => {
            debug!("rejecting command: {e}");
            let _ = send_server_message(
                &mut client.ws,
                &ServerMessage::Error {
                    msg: format!("invalid command: {e}"),
                    code: ErrorCode::InvalidCommand,
                },
            );
            return Ok(());
        }
    };

    if in_tx.try_send(InboundMsg::Command { cmd }).is_err() {
        let _ = send_server_message(
            &mut client.ws,
            &ServerMessage::Error {
                msg: "server busy".to_string(),
                code: ErrorCode::Busy,
            },
        );
    }

    Ok(())
}

fn send_server_message(
    ws: &mut tungstenite::WebSocket<TcpStream>,
    msg: &ServerMessage,
) -> Result<(), ()> {
    let payload = serde_json::to_string(msg).map_err(|_| ())?;
    ws.send(Message::Text(payload.into())).map_err(|_| ())
}
