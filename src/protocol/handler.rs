use std::{collections::HashMap, fmt};

use log::warn;

use super::{Connection, MessageType};

/// Callback invoked for each message of the type it is registered under.
///
/// Handlers run on the connection's own thread and may reply through `conn`.
/// Nothing is returned to the dispatch loop; a handler reports its own failures.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, conn: &mut Connection, payload: &[u8]);
}

impl<F> Handler for F
where
    F: Fn(&mut Connection, &[u8]) + Send + Sync + 'static,
{
    fn handle(&self, conn: &mut Connection, payload: &[u8]) {
        self(conn, payload)
    }
}

/// Read-only routing table from message type to handler.
///
/// Built once through [`HandlerRegistry::builder`]; the server shares it between
/// every connection without locking.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<MessageType, Box<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    pub fn get(&self, message_type: MessageType) -> Option<&dyn Handler> {
        self.handlers.get(&message_type).map(|h| h.as_ref())
    }

    pub fn contains(&self, message_type: MessageType) -> bool {
        self.handlers.contains_key(&message_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered types in ascending order.
    pub fn message_types(&self) -> Vec<MessageType> {
        let mut types = self.handlers.keys().copied().collect::<Vec<_>>();
        types.sort();
        types
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("message_types", &self.message_types())
            .finish()
    }
}

#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<MessageType, Box<dyn Handler>>,
}

impl HandlerRegistryBuilder {
    /// Route `message_type` to `handler`. Registering the same type twice keeps
    /// the later handler.
    pub fn register<H: Handler>(mut self, message_type: MessageType, handler: H) -> Self {
        if self
            .handlers
            .insert(message_type, Box::new(handler))
            .is_some()
        {
            warn!("handler for {message_type} replaced");
        }
        self
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::{TcpListener, TcpStream},
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use super::*;

    fn connection() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, _) = listener.accept().unwrap();
        (Connection::new(stream).unwrap(), client)
    }

    struct Counter(Arc<AtomicUsize>);

    impl Handler for Counter {
        fn handle(&self, _conn: &mut Connection, payload: &[u8]) {
            self.0.fetch_add(payload.len(), Ordering::SeqCst);
        }
    }

    #[test]
    fn lookup_by_type() {
        let registry = HandlerRegistry::builder()
            .register(MessageType::HELLO, |_: &mut Connection, _: &[u8]| {})
            .register(MessageType::USER_START, |_: &mut Connection, _: &[u8]| {})
            .build();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(MessageType::HELLO));
        assert!(registry.get(MessageType::USER_START).is_some());
        assert!(registry.get(MessageType(42)).is_none());
        assert_eq!(
            registry.message_types(),
            vec![MessageType::HELLO, MessageType::USER_START]
        );
    }

    #[test]
    fn empty_registry() {
        let registry = HandlerRegistry::builder().build();
        assert!(registry.is_empty());
        assert!(registry.get(MessageType::HELLO).is_none());
    }

    #[test]
    fn later_registration_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let registry = HandlerRegistry::builder()
            .register(MessageType::USER_START, Counter(Arc::clone(&first)))
            .register(MessageType::USER_START, Counter(Arc::clone(&second)))
            .build();
        assert_eq!(registry.len(), 1);

        let (mut conn, _client) = connection();
        registry
            .get(MessageType::USER_START)
            .unwrap()
            .handle(&mut conn, b"abc");

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn closure_handler_can_reply() {
        use std::io::Read;

        let registry = HandlerRegistry::builder()
            .register(MessageType::USER_START, |conn: &mut Connection, data: &[u8]| {
                conn.write_bytes(data).unwrap();
            })
            .build();

        let (mut conn, mut client) = connection();
        registry
            .get(MessageType::USER_START)
            .unwrap()
            .handle(&mut conn, b"echo");

        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, b"echo");
    }
}
