use crate::host::BridgeHost;
use crate::protocol::{
    Action, ClientCommand, ErrorCode, InboundMsg, OutboundMsg, Query, ServerMessage,
};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::net::SocketAddr;
use tracing::{debug, error, info, warn};

/// Upper bound on inbound events handled per tick.
const MAX_EVENTS_PER_TICK: usize = 512;

pub struct MainLoop {
    inbound_rx: Receiver<InboundMsg>,
    outbound_tx: Sender<OutboundMsg>,
    client: Option<SocketAddr>,
}

impl MainLoop {
    pub fn new(inbound_rx: Receiver<InboundMsg>, outbound_tx: Sender<OutboundMsg>) -> Self {
        Self {
            inbound_rx,
            outbound_tx,
            client: None,
        }
    }

    pub fn client(&self) -> Option<SocketAddr> {
        self.client
    }

    pub fn tick(&mut self, host: &dyn BridgeHost) {
        for _ in 0..MAX_EVENTS_PER_TICK {
            match self.inbound_rx.try_recv() {
                Ok(msg) => self.handle(host, msg),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn handle(&mut self, host: &dyn BridgeHost, msg: InboundMsg) {
        match msg {
            InboundMsg::ClientConnected { socket_addr } => {
                self.client = Some(socket_addr);
            }
            InboundMsg::ClientDisconnected => {
                self.client = None;
            }
            InboundMsg::Command { cmd } => self.apply_command(host, cmd),
            InboundMsg::OscReceived { address, values } => {
                if self.client.is_some() {
                    self.send(ServerMessage::Osc { address, values });
                }
            }
        }
    }

    fn apply_command(&mut self, host: &dyn BridgeHost, cmd: ClientCommand) {
        debug!("command: {}", cmd.kind());
        match cmd {
            ClientCommand::Osc {
                target,
                address,
                values,
            } => {
                if let Err(e) = host.send_osc(target, &address, &values) {
                    warn!("osc {address} to {target:?} failed: {e}");
                    self.send(ServerMessage::Error {
                        msg: e.to_string(),
                        code: ErrorCode::InvalidCommand,
                    });
                }
            }
            ClientCommand::Save { presets } => {
                // No reply on either outcome.
                match host.write_presets(&presets) {
                    Ok(()) => info!("saved {} preset(s)", presets.len()),
                    Err(e) => error!("saving presets failed: {e}"),
                }
            }
            ClientCommand::Load => match host.read_presets() {
                Ok(presets) => self.send(ServerMessage::Loaded { presets }),
                Err(e) => {
                    error!("loading presets failed: {e}");
                    self.send(ServerMessage::Error {
                        msg: e.to_string(),
                        code: ErrorCode::InternalError,
                    });
                }
            },
            ClientCommand::Get {
                request_id,
                query: Query::Path { relative_path },
            } => {
                let path = host.resolve_path(&relative_path);
                self.send(ServerMessage::Resolved {
                    request_id,
                    path: path.to_string_lossy().into_owned(),
                });
            }
            ClientCommand::Do {
                action: Action::Encode { timestamp },
            } => {
                if let Err(e) = host.start_encode(timestamp) {
                    error!("could not start encode for {timestamp}: {e}");
                }
            }
        }
    }

    fn send(&mut self, msg: ServerMessage) {
        // Best effort; a full queue means the panel is not keeping up.
        let _ = self.outbound_tx.try_send(OutboundMsg::Send { msg });
    }
}
