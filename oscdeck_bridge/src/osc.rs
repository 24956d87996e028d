use crate::error::BridgeError;
use crate::protocol::{InboundMsg, OscTarget, ParamValue};
use crossbeam_channel::Sender;
use rosc::{OscMessage, OscPacket, OscType};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// OSC addresses always start with a slash; panel parameter names do not.
pub fn normalize_address(address: &str) -> Result<String, BridgeError> {
    let trimmed = address.trim();
    if trimmed.is_empty() || trimmed == "/" || trimmed.contains(char::is_whitespace) {
        return Err(BridgeError::OscAddress(address.to_string()));
    }
    if trimmed.starts_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("/{trimmed}"))
    }
}

/// Converts panel values into OSC arguments. Lists are spread into floats.
pub fn to_osc_args(values: &[ParamValue]) -> Vec<OscType> {
    let mut args = Vec::with_capacity(values.len());
    for value in values {
        match value {
            ParamValue::Null => args.push(OscType::Nil),
            ParamValue::Bool(b) => args.push(OscType::Bool(*b)),
            ParamValue::Number(n) => args.push(OscType::Float(*n as f32)),
            ParamValue::Text(s) => args.push(OscType::String(s.clone())),
            ParamValue::List(items) => {
                args.extend(items.iter().map(|n| OscType::Float(*n as f32)));
            }
        }
    }
    args
}

pub fn from_osc_arg(arg: &OscType) -> ParamValue {
    match arg {
        OscType::Int(i) => ParamValue::Number(f64::from(*i)),
        OscType::Long(l) => ParamValue::Number(*l as f64),
        OscType::Float(f) => ParamValue::Number(f64::from(*f)),
        OscType::Double(d) => ParamValue::Number(*d),
        OscType::Bool(b) => ParamValue::Bool(*b),
        OscType::String(s) => ParamValue::Text(s.clone()),
        OscType::Char(c) => ParamValue::Text(c.to_string()),
        OscType::Array(array) => {
            let numbers: Option<Vec<f64>> = array
                .content
                .iter()
                .map(|a| from_osc_arg(a).as_f64())
                .collect();
            numbers.map(ParamValue::List).unwrap_or(ParamValue::Null)
        }
        _ => ParamValue::Null,
    }
}

pub fn encode_message(address: &str, values: &[ParamValue]) -> Result<Vec<u8>, BridgeError> {
    let packet = OscPacket::Message(OscMessage {
        addr: normalize_address(address)?,
        args: to_osc_args(values),
    });
    rosc::encoder::encode(&packet).map_err(|e| BridgeError::OscEncode(format!("{e:?}")))
}

/// Flattens a packet (bundles included) into `(address, values)` pairs.
pub fn flatten_packet(packet: OscPacket, out: &mut Vec<(String, Vec<ParamValue>)>) {
    match packet {
        OscPacket::Message(msg) => {
            let values = msg.args.iter().map(from_osc_arg).collect();
            out.push((msg.addr, values));
        }
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                flatten_packet(inner, out);
            }
        }
    }
}

/// UDP sender for the two downstream receivers.
pub struct OscSender {
    socket: UdpSocket,
    target_a: SocketAddr,
    target_b: SocketAddr,
}

impl OscSender {
    pub fn new(target_a: SocketAddr, target_b: SocketAddr) -> Result<Self, BridgeError> {
        let bind = if target_a.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(bind).map_err(|source| BridgeError::Bind {
            addr: bind.to_string(),
            source,
        })?;
        Ok(Self {
            socket,
            target_a,
            target_b,
        })
    }

    pub fn send(
        &self,
        target: OscTarget,
        address: &str,
        values: &[ParamValue],
    ) -> Result<(), BridgeError> {
        let bytes = encode_message(address, values)?;
        trace!(?target, address, "osc out");
        if target.includes_a() {
            self.send_to(&bytes, self.target_a)?;
        }
        if target.includes_b() {
            self.send_to(&bytes, self.target_b)?;
        }
        Ok(())
    }

    fn send_to(&self, bytes: &[u8], addr: SocketAddr) -> Result<(), BridgeError> {
        self.socket
            .send_to(bytes, addr)
            .map(|_| ())
            .map_err(|source| BridgeError::OscSend { addr, source })
    }
}

/// UDP listener that relays every received OSC message to the main loop.
pub struct OscListener {
    listen_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl OscListener {
    pub fn spawn_with_addr(addr: &str, in_tx: Sender<InboundMsg>) -> Result<Self, BridgeError> {
        let socket = UdpSocket::bind(addr).map_err(|source| BridgeError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        socket.set_read_timeout(Some(Duration::from_millis(50)))?;
        let listen_addr = socket.local_addr()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_thread = Arc::clone(&shutdown);
        let join_handle = thread::Builder::new()
            .name("oscdeck-osc-in".to_string())
            .spawn(move || run_listener(socket, in_tx, shutdown_for_thread))?;

        info!("osc listener on udp://{listen_addr}");
        Ok(Self {
            listen_addr,
            shutdown,
            join_handle: Mutex::new(Some(join_handle)),
        })
    }

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

impl Drop for OscListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_listener(socket: UdpSocket, in_tx: Sender<InboundMsg>, shutdown: Arc<AtomicBool>) {
    let mut buf = [0u8; rosc::decoder::MTU];
    let mut messages = Vec::new();

    while !shutdown.load(Ordering::Relaxed) {
        let (size, from) = match socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue
            }
            Err(e) => {
                warn!("osc receive failed: {e}");
                thread::sleep(Duration::from_millis(25));
                continue;
            }
        };

        let packet = match rosc::decoder::decode_udp(&buf[..size]) {
            Ok((_, packet)) => packet,
            Err(e) => {
                debug!("ignoring malformed osc packet from {from}: {e:?}");
                continue;
            }
        };

        flatten_packet(packet, &mut messages);
        for (address, values) in messages.drain(..) {
            debug!(%from, %address, "osc in");
            if in_tx
                .try_send(InboundMsg::OscReceived { address, values })
                .is_err()
            {
                trace!("inbound queue full, dropping osc message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::{OscBundle, OscTime};

    #[test]
    fn addresses_gain_a_leading_slash() {
        assert_eq!(normalize_address("volume").unwrap(), "/volume");
        assert_eq!(normalize_address("/record/status").unwrap(), "/record/status");
        assert!(normalize_address("").is_err());
        assert!(normalize_address("bad name").is_err());
    }

    #[test]
    fn values_map_to_osc_types() {
        let args = to_osc_args(&[
            ParamValue::Number(0.5),
            ParamValue::Bool(true),
            ParamValue::Text("open".into()),
            ParamValue::Null,
            ParamValue::List(vec![1.0, 2.0]),
        ]);
        assert_eq!(
            args,
            vec![
                OscType::Float(0.5),
                OscType::Bool(true),
                OscType::String("open".into()),
                OscType::Nil,
                OscType::Float(1.0),
                OscType::Float(2.0),
            ]
        );
    }

    #[test]
    fn encoded_message_decodes_back() {
        let bytes = encode_message("volume", &[ParamValue::Number(0.25)]).unwrap();
        let (_, packet) = rosc::decoder::decode_udp(&bytes).unwrap();
        let mut out = Vec::new();
        flatten_packet(packet, &mut out);
        assert_eq!(
            out,
            vec![("/volume".to_string(), vec![ParamValue::Number(0.25)])]
        );
    }

    #[test]
    fn bundles_are_flattened_in_order() {
        let msg = |addr: &str, v: i32| {
            OscPacket::Message(OscMessage {
                addr: addr.to_string(),
                args: vec![OscType::Int(v)],
            })
        };
        let packet = OscPacket::Bundle(OscBundle {
            timetag: OscTime::from((0, 1)),
            content: vec![
                msg("/a", 1),
                OscPacket::Bundle(OscBundle {
                    timetag: OscTime::from((0, 1)),
                    content: vec![msg("/b", 2)],
                }),
            ],
        });
        let mut out = Vec::new();
        flatten_packet(packet, &mut out);
        assert_eq!(
            out,
            vec![
                ("/a".to_string(), vec![ParamValue::Number(1.0)]),
                ("/b".to_string(), vec![ParamValue::Number(2.0)]),
            ]
        );
    }

    #[test]
    fn sender_reaches_both_targets_for_all() {
        let a = UdpSocket::bind("127.0.0.1:0").unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").unwrap();
        a.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        b.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        let sender = OscSender::new(a.local_addr().unwrap(), b.local_addr().unwrap()).unwrap();
        sender
            .send(OscTarget::All, "flash", &[ParamValue::Bool(false)])
            .unwrap();

        for socket in [&a, &b] {
            let mut buf = [0u8; rosc::decoder::MTU];
            let (n, _) = socket.recv_from(&mut buf).unwrap();
            let (_, packet) = rosc::decoder::decode_udp(&buf[..n]).unwrap();
            match packet {
                OscPacket::Message(m) => {
                    assert_eq!(m.addr, "/flash");
                    assert_eq!(m.args, vec![OscType::Bool(false)]);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }
}
