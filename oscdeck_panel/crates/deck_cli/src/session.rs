use deck_core::capture::{Capture, STATUS_DELAY};
use deck_core::protocol::{ClientCommand, ParamValue, ServerMessage};
use deck_core::sync::{DeckSnapshot, SyncMediator};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{info, warn};

/// Requests from the presentation layer to the actor.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelCommand {
    Connect,
    Disconnect,
    Set { name: String, value: ParamValue },
    Normalized { name: String, input: Vec<f64> },
    Fire(String),
    Save(Option<u32>),
    Load(u32),
    Delete(Option<u32>),
    Record(bool),
}

/// Everything the actor owns apart from the socket: the mediator, the
/// capture sequencer and the capture timers.
pub struct Session {
    sync: SyncMediator,
    capture: Capture,
    pending_path: Option<(i64, oneshot::Receiver<String>)>,
    status_due: Option<(i64, Instant)>,
}

impl Session {
    pub fn new(sync: SyncMediator) -> Self {
        Self {
            sync,
            capture: Capture::new(),
            pending_path: None,
            status_due: None,
        }
    }

    pub fn snapshot(&self) -> DeckSnapshot {
        self.sync.snapshot()
    }

    pub fn begin_connect(&mut self) {
        self.sync.begin_connect();
    }

    pub fn on_connected(&mut self) {
        self.sync.on_connected();
    }

    pub fn on_disconnected(&mut self) {
        self.sync.on_disconnected();
        if let Some((timestamp, _)) = self.pending_path.take() {
            self.capture.abort(timestamp);
        }
    }

    pub fn drain_outbound(&mut self) -> Vec<ClientCommand> {
        self.sync.drain_outbound()
    }

    /// Applies an edit. Link control commands are the actor's business and
    /// are ignored here.
    pub fn apply(&mut self, cmd: PanelCommand, now_ms: i64) {
        let result = match cmd {
            PanelCommand::Connect | PanelCommand::Disconnect => Ok(()),
            PanelCommand::Set { name, value } => self.sync.set_parameter(&name, value),
            PanelCommand::Normalized { name, input } => self.sync.set_normalized(&name, &input),
            PanelCommand::Fire(name) => self.sync.fire_trigger(&name),
            PanelCommand::Save(index) => {
                let index = index.or(self.sync.store().current_preset());
                self.sync.save_preset(index)
            }
            PanelCommand::Load(index) => {
                self.sync.load_preset(index);
                Ok(())
            }
            PanelCommand::Delete(index) => {
                match index.or(self.sync.store().current_preset()) {
                    Some(index) => self.sync.delete_preset(index),
                    None => warn!("no active preset to delete"),
                }
                Ok(())
            }
            PanelCommand::Record(true) => {
                match self.capture.begin(&mut self.sync, now_ms) {
                    Ok(rx) => self.pending_path = Some((now_ms, rx)),
                    Err(e) => warn!("record: {e}"),
                }
                Ok(())
            }
            PanelCommand::Record(false) => {
                self.pending_path = None;
                self.status_due = None;
                if self.capture.finish(&mut self.sync).is_none() {
                    info!("record: nothing to finish");
                }
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!("{e}");
        }
    }

    pub fn handle_server_message(&mut self, msg: ServerMessage) {
        if let Err(e) = self.sync.handle_server_message(msg) {
            warn!("inbound: {e}");
        }
    }

    /// Waits for the next capture step: the exports path arriving, or the
    /// recorders being due to start.
    pub async fn next_timer(&mut self) -> CaptureTimer {
        tokio::select! {
            (timestamp, path) = path_ready(&mut self.pending_path) => {
                CaptureTimer::Path { timestamp, path }
            }
            timestamp = status_ready(&mut self.status_due) => CaptureTimer::Status(timestamp),
        }
    }

    pub fn on_timer(&mut self, timer: CaptureTimer) {
        match timer {
            CaptureTimer::Path { timestamp, path } => self.on_path(timestamp, path),
            CaptureTimer::Status(timestamp) => {
                self.capture.status_on(&mut self.sync, timestamp);
            }
        }
    }

    fn on_path(&mut self, timestamp: i64, path: Option<String>) {
        match path {
            Some(path) => {
                if self.capture.on_path(&mut self.sync, timestamp, &path) {
                    self.status_due = Some((timestamp, Instant::now() + STATUS_DELAY));
                }
            }
            None => self.capture.abort(timestamp),
        }
    }

    #[cfg(test)]
    fn capture_active(&self) -> Option<i64> {
        self.capture.active()
    }
}

#[derive(Debug, PartialEq)]
pub enum CaptureTimer {
    Path { timestamp: i64, path: Option<String> },
    Status(i64),
}

async fn path_ready(slot: &mut Option<(i64, oneshot::Receiver<String>)>) -> (i64, Option<String>) {
    match slot.as_mut() {
        Some((timestamp, rx)) => {
            let timestamp = *timestamp;
            let path = rx.await.ok();
            *slot = None;
            (timestamp, path)
        }
        None => std::future::pending().await,
    }
}

async fn status_ready(slot: &mut Option<(i64, Instant)>) -> i64 {
    match *slot {
        Some((timestamp, at)) => {
            tokio::time::sleep_until(at).await;
            *slot = None;
            timestamp
        }
        None => std::future::pending().await,
    }
}
