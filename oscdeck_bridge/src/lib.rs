pub mod encode;
pub mod error;
pub mod host;
pub mod main_loop;
pub mod net;
pub mod osc;
pub mod presets;
pub mod protocol;

pub use crate::error::BridgeError;
pub use crate::host::{BridgeHost, SystemHost};
pub use crate::main_loop::MainLoop;
pub use crate::net::NetworkThread;
pub use crate::osc::{OscListener, OscSender};
pub use crate::protocol::{InboundMsg, OutboundMsg, INBOUND_CAP, OUTBOUND_CAP};

pub const DEFAULT_UI_ADDR: &str = "127.0.0.1:7001";
pub const DEFAULT_OSC_ADDR: &str = "127.0.0.1:7000";
pub const DEFAULT_TARGET_A: &str = "127.0.0.1:7001";
pub const DEFAULT_TARGET_B: &str = "127.0.0.1:7002";
