pub mod discovery;
pub mod layout;
pub mod lease;
pub mod passive;
pub mod ready;
pub mod registration;

pub use discovery::{DiscoveryEvent, RouterDiscovery};
pub use layout::{BusLayout, StrategyEndpoints, StrategyId};
pub use passive::{PassiveConfig, PassiveDiscovery, PassiveEvent};
pub use registration::ReaderRegistration;
