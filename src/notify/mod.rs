//! Live notification front end: a static-file HTTP listener and a WebSocket push channel on
//! consecutive ports, with a registry of connected push clients.

mod http;
mod lifecycle;
mod push;
mod registry;

pub use lifecycle::{BoundPorts, LifecycleState, NotificationServer, StopReport};
pub use registry::{ClientId, ClientRegistry, DeliveryReport};
