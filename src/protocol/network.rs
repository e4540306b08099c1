use std::{
    fmt,
    net::{SocketAddr, ToSocketAddrs},
    str::FromStr,
};

use super::transport::TransportError;

/// Transport family a client dials or a server listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    /// Either address family, whichever the host resolves to.
    #[default]
    Tcp,
    Tcp4,
    Tcp6,
}

impl Network {
    /// Resolve `address` ("host:port") to the socket addresses of this family.
    pub fn resolve(&self, address: &str) -> Result<Vec<SocketAddr>, TransportError> {
        let addrs = address
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                address: address.to_string(),
                source,
            })?
            .filter(|addr| self.accepts(addr))
            .collect::<Vec<_>>();

        if addrs.is_empty() {
            return Err(TransportError::NoAddress {
                network: *self,
                address: address.to_string(),
            });
        }
        Ok(addrs)
    }

    fn accepts(&self, addr: &SocketAddr) -> bool {
        match self {
            Network::Tcp => true,
            Network::Tcp4 => addr.is_ipv4(),
            Network::Tcp6 => addr.is_ipv6(),
        }
    }
}

impl FromStr for Network {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Network::Tcp),
            "tcp4" => Ok(Network::Tcp4),
            "tcp6" => Ok(Network::Tcp6),
            other => Err(TransportError::UnsupportedNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Tcp => "tcp",
            Network::Tcp4 => "tcp4",
            Network::Tcp6 => "tcp6",
        };
        f.write_str(name)
    }
}
