use crate::prelude::*;

use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

/// Receives MATE3 broadcasts and hands each datagram to the coordinator
/// before asking the socket for the next one.
pub struct Listener {
    config: config::Listener,
    coordinator: Coordinator,
    shutdown: broadcast::Receiver<()>,
}

impl Listener {
    pub fn new(config: &ConfigWrapper, channels: &Channels, coordinator: Coordinator) -> Self {
        // subscribed up front so a stop sent before run() is not lost
        let shutdown = channels.shutdown.subscribe();

        Self {
            config: config.listener(),
            coordinator,
            shutdown,
        }
    }

    pub async fn bind(&self) -> Result<UdpSocket> {
        let address = self.config.bind_address();
        let socket = UdpSocket::bind(&address)
            .await
            .map_err(|err| crate::file_error_with_source!(err, "failed to bind {}", address))?;

        info!("listening for MATE3 datagrams on {}", socket.local_addr()?);
        Ok(socket)
    }

    /// Receive loop. Only a message on `Channels::shutdown` ends it; the
    /// coordinator is handed back so its final state can be inspected.
    pub async fn run(mut self, socket: UdpSocket) -> Result<Coordinator> {
        let mut buf = BytesMut::with_capacity(self.config.max_datagram_size);

        loop {
            buf.clear();
            buf.reserve(self.config.max_datagram_size);

            let received = tokio::select! {
                _ = self.shutdown.recv() => {
                    info!("listener received shutdown signal");
                    break;
                }

                received = socket.recv_buf_from(&mut buf) => received,
            };

            if !self.received(received, &buf).await {
                break;
            }
        }

        info!("listener exiting");
        Ok(self.coordinator)
    }

    /// Handles one result from the socket. A receive error is counted and
    /// followed by a backoff, which a stop cuts short. Returns false when
    /// the loop should end.
    async fn received(&mut self, result: std::io::Result<(usize, SocketAddr)>, buf: &[u8]) -> bool {
        match result {
            Ok((len, from)) => {
                self.handle(&buf[..len], from);
                true
            }
            Err(err) => {
                warn!("receive error: {}", err);
                self.count_receive_error();

                tokio::select! {
                    _ = self.shutdown.recv() => {
                        info!("listener received shutdown signal during backoff");
                        false
                    }
                    _ = tokio::time::sleep(self.config.receive_backoff) => true,
                }
            }
        }
    }

    fn handle(&mut self, payload: &[u8], from: SocketAddr) {
        trace!("{} bytes from {}", payload.len(), from);
        self.coordinator.process_datagram(payload, from);
    }

    fn count_receive_error(&self) {
        if let Ok(mut stats) = self.coordinator.stats.lock() {
            stats.receive_errors += 1;
        }
    }
}
