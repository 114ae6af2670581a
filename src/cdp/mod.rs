//! Minimal CDP client: wire types plus a single-connection transport (§4.1).

mod messages;
mod transport;

pub use messages::CdpEvent;
pub use transport::{CdpTransport, EventSubscription, TransportError};
