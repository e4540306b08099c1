use std::{net::SocketAddr, time::Duration};

use log::info;

use super::{Connection, MessageType, Network, TransportError};

/// Client side of a TLV session.
#[derive(Debug)]
pub struct Client {
    conn: Connection,
}

impl Client {
    /// Dial `address` ("host:port") over `network` ("tcp", "tcp4" or "tcp6").
    pub fn connect(network: &str, address: &str) -> Result<Self, TransportError> {
        let conn = Connection::connect(network.parse()?, address)?;
        Ok(Self::from_connection(conn))
    }

    pub fn connect_timeout(
        network: &str,
        address: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let network: Network = network.parse()?;
        let conn = Connection::connect_timeout(network, address, timeout)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        match conn.peer_addr() {
            Ok(addr) => info!("connected to server: {addr}"),
            Err(e) => info!("connected to server, peer address unavailable: {e}"),
        }
        Self { conn }
    }

    pub fn write_message(
        &mut self,
        message_type: MessageType,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        self.conn.write_message(message_type, payload)
    }

    /// Read `len` bytes of reply. Replies carry no header, so the caller has to
    /// know the length up front. See [`Connection::read_exact`] for `timeout`.
    pub fn read_exact(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.conn.read_exact(len, timeout)
    }

    pub fn peer_addr(&self) -> Result<SocketAddr, TransportError> {
        self.conn.peer_addr()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.conn.local_addr()
    }

    pub fn close(self) -> Result<(), TransportError> {
        self.conn.close()
    }
}
