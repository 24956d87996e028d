use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("io error on '{path}': {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid presets file '{path}': {source}")]
    Presets {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("osc encode failed: {0}")]
    OscEncode(String),
    #[error("osc send to {addr} failed: {source}")]
    OscSend {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid osc address '{0}'")]
    OscAddress(String),
    #[error("encode job failed: {0}")]
    Encode(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
