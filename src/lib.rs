pub mod protocol;

pub use protocol::{
    Client, Connection, Handler, HandlerRegistry, MessageType, Server, ServerConfig,
    TransportError,
};
