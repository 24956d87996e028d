use std::net::SocketAddr;

pub const INBOUND_CAP: usize = 256;
pub const OUTBOUND_CAP: usize = 256;

/// Events delivered to the main loop by the network and OSC threads.
#[derive(Debug)]
pub enum InboundMsg {
    ClientConnected { socket_addr: SocketAddr },
    ClientDisconnected,
    Command { cmd: ClientCommand },
    OscReceived { address: String, values: Vec<ParamValue> },
}

#[derive(Debug)]
pub enum OutboundMsg {
    Send { msg: ServerMessage },
}

pub use oscdeck_protocol::{
    Action, ClientCommand, ErrorCode, OscTarget, ParamValue, PresetBank, Query, ServerMessage,
};
