use crate::modules::error::CaptureError;
use crate::modules::protocol::{OscTarget, ParamValue};
use crate::modules::sync::SyncMediator;
use std::time::Duration;
use tokio::sync::oneshot;

/// Directory the bridge resolves for capture output.
pub const EXPORTS_DIR: &str = "./exports";
/// Delay between naming the capture files and starting the recorders.
pub const STATUS_DELAY: Duration = Duration::from_millis(500);

const FILENAME_ADDRESS: &str = "/record/filename";
const STATUS_ADDRESS: &str = "/record/status";

/// Begin/finish capture sequencing.
///
/// The caller owns the clock: after [`Capture::on_path`] it waits
/// [`STATUS_DELAY`] and then calls [`Capture::status_on`]. Every step is keyed
/// by the capture timestamp so a late step from an earlier capture is ignored.
#[derive(Debug, Default)]
pub struct Capture {
    active: Option<i64>,
}

impl Capture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<i64> {
        self.active
    }

    /// Starts a capture by asking the bridge where exports live.
    pub fn begin(
        &mut self,
        sync: &mut SyncMediator,
        timestamp: i64,
    ) -> Result<oneshot::Receiver<String>, CaptureError> {
        if let Some(running) = self.active {
            return Err(CaptureError::AlreadyActive(running));
        }
        let rx = sync.request_path(EXPORTS_DIR)?;
        self.active = Some(timestamp);
        log::info!("capture {timestamp}: resolving {EXPORTS_DIR}");
        Ok(rx)
    }

    /// Names the output files on both receivers. Returns false when the
    /// capture has already been finished or replaced.
    pub fn on_path(&mut self, sync: &mut SyncMediator, timestamp: i64, path: &str) -> bool {
        if self.active != Some(timestamp) {
            return false;
        }
        let base = path.trim_end_matches('/');
        sync.send_osc(
            OscTarget::B,
            FILENAME_ADDRESS,
            vec![ParamValue::Text(format!("{base}/{timestamp}.mov"))],
        );
        sync.send_osc(
            OscTarget::A,
            FILENAME_ADDRESS,
            vec![
                ParamValue::Text("open".to_string()),
                ParamValue::Text(format!("{base}/{timestamp}.wav")),
            ],
        );
        true
    }

    pub fn status_on(&mut self, sync: &mut SyncMediator, timestamp: i64) -> bool {
        if self.active != Some(timestamp) {
            return false;
        }
        sync.send_osc(OscTarget::All, STATUS_ADDRESS, vec![ParamValue::Number(1.0)]);
        true
    }

    /// The path query was cancelled, usually by a disconnect.
    pub fn abort(&mut self, timestamp: i64) {
        if self.active == Some(timestamp) {
            log::warn!("capture {timestamp}: abandoned before recording started");
            self.active = None;
        }
    }

    /// Stops recording and asks the bridge to encode. No-op when idle.
    pub fn finish(&mut self, sync: &mut SyncMediator) -> Option<i64> {
        let timestamp = self.active.take()?;
        sync.send_osc(OscTarget::All, STATUS_ADDRESS, vec![ParamValue::Number(0.0)]);
        sync.request_encode(timestamp);
        log::info!("capture {timestamp}: finished");
        Some(timestamp)
    }
}
