pub mod config;
pub mod node;
pub mod peer;
pub mod protocol;

pub use config::Config;
pub use node::Node;
pub use peer::{PeerDirectory, PeerRecord};
pub use protocol::{Inbound, Message, MessageType};
