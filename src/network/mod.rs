pub mod discovery;
pub mod messaging;
pub mod transport;

pub use discovery::{DiscoveryBeacon, DiscoveryListener};
pub use messaging::{Handled, MessageRouter};
pub use transport::Datagram;
