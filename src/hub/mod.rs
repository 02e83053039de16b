//! Hub connectivity: wire protocol, negotiation, transport and connection lifecycle

pub mod connection;
pub mod invoker;
pub mod negotiate;
pub mod protocol;
pub mod transport;

pub use connection::{ConnectionManager, ConnectionState, EventHandler, HubSubscriber};
pub use invoker::SafeInvoker;
pub use transport::{Connector, Link, WsConnector};
