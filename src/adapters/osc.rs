//! OSC soft-code dispatcher.
//!
//! Each soft code becomes one OSC message with a single `int` argument,
//! sent over a non-blocking UDP socket to the stimulus controller.  Send
//! failures are logged and counted; nothing is retried.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use log::{debug, warn};
use rosc::{OscMessage, OscPacket, OscType, encoder};

use crate::config::SoftCodeSettings;
use crate::softcode::SoftCodeDispatch;

pub struct OscDispatcher {
    socket: UdpSocket,
    target: SocketAddr,
    address: String,
    sent: u64,
    failures: u64,
}

impl OscDispatcher {
    pub fn new(settings: &SoftCodeSettings) -> io::Result<Self> {
        let target = settings
            .endpoint()
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address for endpoint"))?;
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            target,
            address: settings.address.clone(),
            sent: 0,
            failures: 0,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Codes that could not be sent.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    fn send(&self, code: u8) -> Result<(), String> {
        let packet = OscPacket::Message(OscMessage {
            addr: self.address.clone(),
            args: vec![OscType::Int(i32::from(code))],
        });
        let bytes = encoder::encode(&packet).map_err(|e| format!("{e:?}"))?;
        self.socket
            .send_to(&bytes, self.target)
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

impl SoftCodeDispatch for OscDispatcher {
    fn dispatch(&mut self, code: u8) {
        match self.send(code) {
            Ok(()) => {
                self.sent += 1;
                debug!("SoftCode {} -> {}{}", code, self.target, self.address);
            }
            Err(e) => {
                self.failures += 1;
                warn!("SoftCode {} to {} failed: {}", code, self.target, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn sends_one_int_message() {
        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        listener
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let settings = SoftCodeSettings {
            port: listener.local_addr().unwrap().port(),
            ..SoftCodeSettings::default()
        };

        let mut dispatcher = OscDispatcher::new(&settings).unwrap();
        dispatcher.dispatch(3);
        assert_eq!(dispatcher.sent(), 1);
        assert_eq!(dispatcher.failures(), 0);

        let mut buf = [0u8; 256];
        let (len, _) = listener.recv_from(&mut buf).unwrap();
        let (_, packet) = rosc::decoder::decode_udp(&buf[..len]).unwrap();
        match packet {
            OscPacket::Message(msg) => {
                assert_eq!(msg.addr, "/e");
                assert_eq!(msg.args, vec![OscType::Int(3)]);
            }
            OscPacket::Bundle(_) => panic!("expected a message"),
        }
    }
}
