pub mod connection;
pub mod transport;

pub use connection::ConnectionInfo;
pub use transport::{MessageHandler, Transport, TransportConfig};
