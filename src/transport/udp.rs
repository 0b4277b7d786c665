// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP/IPv4 transport driver.
//!
//! One socket shared by senders and the receive thread. The receive
//! thread polls with a short timeout so the running flag is observed
//! promptly on shutdown.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::{MAX_DATAGRAM_SIZE, RECEIVER_STACKSIZE};
use crate::error::{Error, Result};
use crate::transport::{PacketInfo, ReceiveCallback, Transport};

const RECV_POLL_TIMEOUT_MS: u64 = 100;

/// UDP transport bound to a single IPv4 port.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_port: u16,
    running: Arc<AtomicBool>,
    rx_thread: Option<JoinHandle<()>>,
}

impl UdpTransport {
    /// Bind to `0.0.0.0:port`; port 0 lets the OS pick one.
    pub fn new(port: u16) -> Result<Self> {
        let raw = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(Error::Transport)?;
        raw.set_reuse_address(true).map_err(Error::Transport)?;

        let bind_addr: SocketAddr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        raw.bind(&bind_addr.into()).map_err(Error::Transport)?;

        let socket: UdpSocket = raw.into();
        socket
            .set_read_timeout(Some(Duration::from_millis(RECV_POLL_TIMEOUT_MS)))
            .map_err(Error::Transport)?;
        let local_port = socket.local_addr().map_err(Error::Transport)?.port();
        log::debug!("[UdpTransport::new] bound 0.0.0.0:{}", local_port);

        Ok(Self {
            socket: Arc::new(socket),
            local_port,
            running: Arc::new(AtomicBool::new(true)),
            rx_thread: None,
        })
    }

    /// Start the receive thread delivering datagrams to `callback`.
    pub fn start_receiver(&mut self, callback: ReceiveCallback) -> Result<()> {
        let socket = Arc::clone(&self.socket);
        let running = Arc::clone(&self.running);

        let handle = thread::Builder::new()
            .name(format!("rtps-rx-{}", self.local_port))
            .stack_size(RECEIVER_STACKSIZE)
            .spawn(move || receive_loop(&socket, &running, &callback))
            .map_err(Error::ThreadSpawn)?;

        self.rx_thread = Some(handle);
        Ok(())
    }
}

fn receive_loop(socket: &UdpSocket, running: &AtomicBool, callback: &ReceiveCallback) {
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];
    while running.load(Ordering::Acquire) {
        match socket.recv_from(&mut buf) {
            Ok((len, SocketAddr::V4(peer))) => {
                callback(*peer.ip(), peer.port(), &buf[..len]);
            }
            Ok((_, SocketAddr::V6(peer))) => {
                log::trace!("[UdpTransport] ignoring IPv6 datagram from {}", peer);
            }
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::warn!("[UdpTransport] recv error: {}", e);
            }
        }
    }
}

impl Transport for UdpTransport {
    fn send_packet(&self, packet: &PacketInfo) -> io::Result<()> {
        self.socket
            .send_to(&packet.buffer, packet.destination())
            .map(|_| ())
    }

    fn local_port(&self) -> u16 {
        self.local_port
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.rx_thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_bind_ephemeral_port() {
        let transport = UdpTransport::new(0).expect("bind");
        assert_ne!(transport.local_port(), 0);
    }

    #[test]
    fn test_loopback_send_receive() {
        let sender = UdpTransport::new(0).expect("bind sender");
        let mut receiver = UdpTransport::new(0).expect("bind receiver");

        let (tx, rx) = mpsc::channel::<(Ipv4Addr, u16, Vec<u8>)>();
        receiver
            .start_receiver(Box::new(move |addr, port, bytes| {
                let _ = tx.send((addr, port, bytes.to_vec()));
            }))
            .expect("start receiver");

        let packet = PacketInfo {
            src_port: sender.local_port(),
            dest_addr: Ipv4Addr::LOCALHOST,
            dest_port: receiver.local_port(),
            buffer: b"ping".to_vec(),
        };
        sender.send_packet(&packet).expect("send");

        let (_, peer_port, bytes) = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("datagram delivered");
        assert_eq!(bytes, b"ping");
        assert_eq!(peer_port, sender.local_port());
    }
}
