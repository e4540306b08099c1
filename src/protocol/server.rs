use std::{
    net::{SocketAddr, TcpListener, TcpStream},
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, error, info, trace, warn};

use super::{Connection, HandlerRegistry, Network, ThreadPool, TransportError};

/// How accepted connections are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Concurrency {
    /// A dedicated thread per connection with no upper bound.
    #[default]
    Unbounded,
    /// A fixed number of worker threads. Connections beyond that wait, already
    /// accepted, until a worker finishes with an earlier connection.
    Pool(NonZeroUsize),
}

/// What the dispatch loop does with a message whose type has no handler.
///
/// The payload has been read off the socket either way, so framing stays intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownTypePolicy {
    /// Log and drop the message, then wait for the next header.
    #[default]
    Discard,
    /// Log and close the connection.
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Deadline for each header or payload read. Zero waits forever.
    pub read_timeout: Duration,
    pub concurrency: Concurrency,
    pub unknown_type_policy: UnknownTypePolicy,
}

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            concurrency: Concurrency::default(),
            unknown_type_policy: UnknownTypePolicy::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(read_timeout: Duration) -> Self {
        Self {
            read_timeout,
            ..Self::default()
        }
    }

    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_unknown_type_policy(mut self, policy: UnknownTypePolicy) -> Self {
        self.unknown_type_policy = policy;
        self
    }
}

/// Listening TLV server.
///
/// Binding happens in the constructor so address errors surface immediately;
/// connections are only accepted once [`Server::serve`] or [`Server::spawn`] runs.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    registry: Arc<HandlerRegistry>,
}

impl Server {
    pub fn bind(
        network: &str,
        address: &str,
        read_timeout: Duration,
        registry: HandlerRegistry,
    ) -> Result<Self, TransportError> {
        Self::bind_with_config(network, address, ServerConfig::new(read_timeout), registry)
    }

    pub fn bind_with_config(
        network: &str,
        address: &str,
        config: ServerConfig,
        registry: HandlerRegistry,
    ) -> Result<Self, TransportError> {
        let network: Network = network.parse()?;
        let addrs = network.resolve(address)?;
        let listener = TcpListener::bind(&addrs[..]).map_err(|source| TransportError::Bind {
            address: address.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr()?;
        info!(
            "listening at {local_addr} ({network}), handlers for {:?}",
            registry.message_types()
        );

        Ok(Self {
            listener,
            local_addr,
            config,
            registry: Arc::new(registry),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run the accept loop on the calling thread.
    ///
    /// Failures on a single connection never end the loop.
    pub fn serve(self) -> Result<(), TransportError> {
        let pool = match self.config.concurrency {
            Concurrency::Unbounded => None,
            Concurrency::Pool(size) => Some(ThreadPool::new(size).map_err(TransportError::Spawn)?),
        };

        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    if let Err(e) = self.dispatch(stream, pool.as_ref()) {
                        warn!("dropping connection: {e}");
                    }
                }
                Err(e) => warn!("{}", TransportError::Accept(e)),
            }
        }
        Ok(())
    }

    /// Run the accept loop on its own thread.
    pub fn spawn(self) -> Result<JoinHandle<Result<(), TransportError>>, TransportError> {
        thread::Builder::new()
            .name(format!("tlv-accept-{}", self.local_addr))
            .spawn(move || self.serve())
            .map_err(TransportError::Spawn)
    }

    fn dispatch(&self, stream: TcpStream, pool: Option<&ThreadPool>) -> Result<(), TransportError> {
        let conn = Connection::new(stream)?;
        let peer = conn
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown peer".to_string());
        info!("accepted connection from {peer}");

        let registry = Arc::clone(&self.registry);
        let config = self.config;

        match pool {
            Some(pool) => pool
                .execute(move || handle_connection(conn, &registry, &config, &peer))
                .map_err(TransportError::Spawn),
            None => thread::Builder::new()
                .name(format!("tlv-conn-{peer}"))
                .spawn(move || handle_connection(conn, &registry, &config, &peer))
                .map(drop)
                .map_err(TransportError::Spawn),
        }
    }
}

fn handle_connection(
    mut conn: Connection,
    registry: &HandlerRegistry,
    config: &ServerConfig,
    peer: &str,
) {
    match dispatch_loop(&mut conn, registry, config) {
        Ok(()) => debug!("closing connection from {peer}"),
        Err(TransportError::Closed { received: 0, .. }) => info!("{peer} disconnected"),
        Err(e) => warn!("connection from {peer} terminated: {e}"),
    }

    if let Err(e) = conn.close() {
        debug!("failed to shut down connection from {peer}: {e}");
    }
}

/// Header, payload, handler, repeat. Returns `Ok` when the loop chose to close
/// the connection and `Err` when a read failed.
fn dispatch_loop(
    conn: &mut Connection,
    registry: &HandlerRegistry,
    config: &ServerConfig,
) -> Result<(), TransportError> {
    loop {
        let header = conn.read_header(config.read_timeout)?;
        let payload = if header.length > 0 {
            conn.read_exact(header.length as usize, config.read_timeout)?
        } else {
            Vec::new()
        };
        trace!(
            "received {} with {} byte payload",
            header.message_type,
            payload.len()
        );

        let Some(handler) = registry.get(header.message_type) else {
            match config.unknown_type_policy {
                UnknownTypePolicy::Discard => {
                    warn!(
                        "no handler for {}, discarding {} byte payload",
                        header.message_type,
                        payload.len()
                    );
                    continue;
                }
                UnknownTypePolicy::Close => {
                    warn!("no handler for {}, closing connection", header.message_type);
                    return Ok(());
                }
            }
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(conn, &payload)));
        if outcome.is_err() {
            error!(
                "handler for {} panicked, closing connection",
                header.message_type
            );
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.concurrency, Concurrency::Unbounded);
        assert_eq!(config.unknown_type_policy, UnknownTypePolicy::Discard);
    }

    #[test]
    fn config_builder() {
        let workers = NonZeroUsize::new(4).unwrap();
        let config = ServerConfig::new(Duration::from_millis(250))
            .with_concurrency(Concurrency::Pool(workers))
            .with_unknown_type_policy(UnknownTypePolicy::Close);

        assert_eq!(config.read_timeout, Duration::from_millis(250));
        assert_eq!(config.concurrency, Concurrency::Pool(workers));
        assert_eq!(config.unknown_type_policy, UnknownTypePolicy::Close);
    }

    #[test]
    fn bind_reports_local_addr() {
        let registry = HandlerRegistry::builder().build();
        let server = Server::bind("tcp4", "127.0.0.1:0", Duration::from_secs(1), registry).unwrap();

        assert!(server.local_addr().ip().is_loopback());
        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(server.config().read_timeout, Duration::from_secs(1));
    }

    #[test]
    fn bind_fails_on_address_in_use() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let registry = HandlerRegistry::builder().build();
        let err = Server::bind("tcp", &addr, Duration::from_secs(1), registry).unwrap_err();
        assert!(matches!(err, TransportError::Bind { .. }));
    }

    #[test]
    fn bind_rejects_unknown_network() {
        let registry = HandlerRegistry::builder().build();
        let err = Server::bind("udp", "127.0.0.1:0", Duration::from_secs(1), registry).unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedNetwork(_)));
    }
}
