pub mod backend;
pub mod error;
pub mod forwarder;
pub mod route_table;

pub use backend::BackendUrl;
pub use error::ProxyError;
pub use forwarder::{ForwardOutcome, ForwardingEngine};
pub use route_table::{MatchKind, Resolution, RouteBinding, RouteTable};
