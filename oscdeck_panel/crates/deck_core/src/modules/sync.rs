use crate::modules::error::StoreError;
use crate::modules::protocol::{
    Action, ClientCommand, OscTarget, ParamValue, Preset, PresetBank, Query, ServerMessage,
};
use crate::modules::store::{Origin, Outbox, StatePatch, Store};
use std::collections::{HashMap, VecDeque};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// What the presentation layer renders.
#[derive(Debug, Clone, PartialEq)]
pub struct DeckSnapshot {
    pub link: LinkState,
    pub preset: Preset,
    pub presets: PresetBank,
    pub current_preset: Option<u32>,
}

/// Outbound queue that only accepts commands while the link is up.
#[derive(Debug)]
struct Outbound {
    link: LinkState,
    queue: VecDeque<ClientCommand>,
    dropped: u64,
}

impl Outbox for Outbound {
    fn emit(&mut self, cmd: ClientCommand) {
        if self.link == LinkState::Connected {
            self.queue.push_back(cmd);
        } else {
            self.dropped += 1;
            log::debug!("bridge {:?}: dropping outbound {}", self.link, cmd.kind());
        }
    }
}

/// Owns the store and the only path to the bridge transport.
///
/// Local edits go out as `Origin::Local`, inbound bridge traffic is applied as
/// `Origin::Remote` so it is never echoed back.
#[derive(Debug)]
pub struct SyncMediator {
    store: Store,
    outbound: Outbound,
    pending: HashMap<u64, oneshot::Sender<String>>,
    next_request_id: u64,
}

impl SyncMediator {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            outbound: Outbound {
                link: LinkState::Disconnected,
                queue: VecDeque::new(),
                dropped: 0,
            },
            pending: HashMap::new(),
            next_request_id: 1,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn link_state(&self) -> LinkState {
        self.outbound.link
    }

    /// Number of outbound commands discarded because the link was down.
    pub fn dropped(&self) -> u64 {
        self.outbound.dropped
    }

    pub fn snapshot(&self) -> DeckSnapshot {
        DeckSnapshot {
            link: self.outbound.link,
            preset: self.store.preset().clone(),
            presets: self.store.presets().clone(),
            current_preset: self.store.current_preset(),
        }
    }

    pub fn begin_connect(&mut self) {
        if self.outbound.link == LinkState::Disconnected {
            self.outbound.link = LinkState::Connecting;
        }
    }

    /// Transport is up: request hydration straight away.
    pub fn on_connected(&mut self) {
        self.outbound.link = LinkState::Connected;
        log::info!("bridge connected, requesting presets");
        self.outbound.emit(ClientCommand::Load);
    }

    /// Transport is gone: pending sends and outstanding queries are abandoned.
    pub fn on_disconnected(&mut self) {
        if self.outbound.link != LinkState::Disconnected {
            log::info!("bridge disconnected");
        }
        self.outbound.link = LinkState::Disconnected;
        let abandoned = self.outbound.queue.len();
        if abandoned > 0 {
            log::debug!("discarding {abandoned} unsent command(s)");
        }
        self.outbound.queue.clear();
        // Dropping the senders wakes every waiter with a cancellation.
        self.pending.clear();
    }

    /// Commands ready for the transport, oldest first.
    pub fn drain_outbound(&mut self) -> Vec<ClientCommand> {
        self.outbound.queue.drain(..).collect()
    }

    pub fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), StoreError> {
        self.store
            .set_parameter(name, value, Origin::Local, &mut self.outbound)
    }

    /// Sets a slider or xy parameter from normalized control input.
    pub fn set_normalized(&mut self, name: &str, input: &[f64]) -> Result<(), StoreError> {
        let spec = self
            .store
            .schema()
            .get(name)
            .ok_or_else(|| StoreError::UnknownParameter(name.to_string()))?;
        let value = spec
            .from_normalized(input)
            .map_err(|reason| StoreError::InvalidValue {
                name: name.to_string(),
                reason,
            })?;
        self.set_parameter(name, value)
    }

    pub fn fire_trigger(&mut self, name: &str) -> Result<(), StoreError> {
        self.store.fire_trigger(name, &mut self.outbound)
    }

    pub fn save_preset(&mut self, index: Option<u32>) -> Result<(), StoreError> {
        self.store.save_preset(index, &mut self.outbound)
    }

    pub fn delete_preset(&mut self, index: u32) {
        self.store.delete_preset(index, &mut self.outbound)
    }

    pub fn load_preset(&mut self, index: u32) {
        self.store.load_preset(index, &mut self.outbound)
    }

    /// Auxiliary OSC command that does not correspond to a parameter.
    pub fn send_osc(&mut self, target: OscTarget, address: &str, values: Vec<ParamValue>) {
        self.outbound.emit(ClientCommand::Osc {
            target,
            address: address.to_string(),
            values,
        });
    }

    /// Asks the bridge to resolve a path relative to its working directory.
    ///
    /// The receiver yields the absolute path, or an error if the link drops first.
    pub fn request_path(
        &mut self,
        relative_path: &str,
    ) -> Result<oneshot::Receiver<String>, StoreError> {
        if self.outbound.link != LinkState::Connected {
            return Err(StoreError::TransportUnavailable);
        }
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id, tx);
        self.outbound.emit(ClientCommand::Get {
            request_id,
            query: Query::Path {
                relative_path: relative_path.to_string(),
            },
        });
        Ok(rx)
    }

    pub fn request_encode(&mut self, timestamp: i64) {
        self.outbound.emit(ClientCommand::Do {
            action: Action::Encode { timestamp },
        });
    }

    pub fn handle_server_message(&mut self, msg: ServerMessage) -> Result<(), StoreError> {
        match msg {
            ServerMessage::Loaded { presets } => {
                log::info!("hydrated {} preset(s) from bridge", presets.len());
                self.store.set_state(StatePatch {
                    presets: Some(presets),
                    current_preset: None,
                });
                Ok(())
            }
            ServerMessage::Resolved { request_id, path } => {
                match self.pending.remove(&request_id) {
                    Some(tx) => {
                        let _ = tx.send(path);
                    }
                    None => log::debug!("no waiter for request {request_id}"),
                }
                Ok(())
            }
            ServerMessage::Osc { address, values } => {
                let name = address.trim_start_matches('/');
                let Some(spec) = self.store.schema().get(name) else {
                    return Err(StoreError::UnknownParameter(name.to_string()));
                };
                let value = spec.decode(&values);
                self.store
                    .set_parameter(name, value, Origin::Remote, &mut self.outbound)
            }
            ServerMessage::Error { msg, code } => {
                log::warn!("bridge reported {code:?}: {msg}");
                Ok(())
            }
        }
    }
}
