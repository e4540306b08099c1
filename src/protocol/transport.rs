use std::{
    io::{self, ErrorKind, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    time::{Duration, Instant},
};

use log::trace;
use thiserror::Error;

use super::{HEADER_LEN, Header, MAX_PAYLOAD_LEN, MessageType, Network};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unsupported network '{0}', expected one of tcp, tcp4, tcp6")]
    UnsupportedNetwork(String),
    #[error("failed to resolve '{address}': {source}")]
    Resolve { address: String, source: io::Error },
    #[error("'{address}' has no {network} address")]
    NoAddress { network: Network, address: String },
    #[error("failed to dial {address}: {source}")]
    Dial { address: String, source: io::Error },
    #[error("failed to listen on {address}: {source}")]
    Bind { address: String, source: io::Error },
    #[error("failed to accept connection: {0}")]
    Accept(io::Error),
    #[error("write failed: {0}")]
    Write(io::Error),
    #[error("read failed: {0}")]
    Read(io::Error),
    #[error("read timed out after {received} of {expected} bytes")]
    Timeout { expected: usize, received: usize },
    #[error("connection closed after {received} of {expected} bytes")]
    Closed { expected: usize, received: usize },
    #[error("payload of {0} bytes exceeds the 65535 byte limit")]
    PayloadTooLarge(usize),
    #[error("failed to encode header: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode header: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("failed to start connection worker: {0}")]
    Spawn(io::Error),
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
}

/// A stream socket speaking the TLV framing.
///
/// Reads are exact: [`Connection::read_exact`] either returns every requested
/// byte or fails, and any partially received bytes are discarded.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Result<Self, TransportError> {
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    pub fn connect(network: Network, address: &str) -> Result<Self, TransportError> {
        let addrs = network.resolve(address)?;
        let stream = TcpStream::connect(&addrs[..]).map_err(|source| TransportError::Dial {
            address: address.to_string(),
            source,
        })?;
        Self::new(stream)
    }

    /// Like [`Connection::connect`] but gives up on each candidate address
    /// after `timeout`. A zero timeout dials without a bound.
    pub fn connect_timeout(
        network: Network,
        address: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        if timeout.is_zero() {
            return Self::connect(network, address);
        }

        let mut last_err = None;
        for addr in network.resolve(address)? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Self::new(stream),
                Err(e) => {
                    trace!("dial {addr} failed: {e}");
                    last_err = Some(e);
                }
            }
        }

        Err(TransportError::Dial {
            address: address.to_string(),
            source: last_err
                .unwrap_or_else(|| io::Error::new(ErrorKind::NotFound, "no address to dial")),
        })
    }

    pub fn peer_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.stream.peer_addr()?)
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.stream.local_addr()?)
    }

    /// Frame `payload` behind a header and send both with a single write.
    pub fn write_message(
        &mut self,
        message_type: MessageType,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(TransportError::PayloadTooLarge(payload.len()));
        }

        let header = Header::new(message_type, payload.len() as u16).encode()?;
        let mut packet = Vec::with_capacity(HEADER_LEN + payload.len());
        packet.extend_from_slice(&header);
        packet.extend_from_slice(payload);

        trace!("writing {message_type} with {} byte payload", payload.len());
        self.write_bytes(&packet)
    }

    /// Write raw bytes with no framing.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes).map_err(TransportError::Write)
    }

    /// Read exactly `len` bytes.
    ///
    /// A non-zero `timeout` sets an absolute deadline of now + `timeout` for the
    /// whole call; every partial read re-arms the socket with whatever remains
    /// of it. A zero `timeout` blocks until the bytes arrive or the peer goes
    /// away.
    pub fn read_exact(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let deadline = if timeout.is_zero() {
            self.stream.set_read_timeout(None)?;
            None
        } else {
            Some(Instant::now() + timeout)
        };

        let mut buf = vec![0u8; len];
        let mut received = 0;

        while received < len {
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(TransportError::Timeout {
                        expected: len,
                        received,
                    });
                }
                self.stream.set_read_timeout(Some(remaining))?;
            }

            match self.stream.read(&mut buf[received..]) {
                Ok(0) => {
                    return Err(TransportError::Closed {
                        expected: len,
                        received,
                    });
                }
                Ok(n) => received += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(TransportError::Timeout {
                        expected: len,
                        received,
                    });
                }
                Err(e) => return Err(TransportError::Read(e)),
            }
        }

        Ok(buf)
    }

    pub fn read_header(&mut self, timeout: Duration) -> Result<Header, TransportError> {
        let bytes = self.read_exact(HEADER_LEN, timeout)?;
        let mut raw = [0u8; HEADER_LEN];
        raw.copy_from_slice(&bytes);
        Header::decode(&raw)
    }

    /// Shut down both directions; a read blocked on the peer side fails.
    pub fn close(self) -> Result<(), TransportError> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
