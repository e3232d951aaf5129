pub mod router;
pub mod subscriber;

pub use router::{DiscoveryEvent, RouterDiscovery};
pub use subscriber::{SubscriberConfig, SubscriberDiscovery, SubscriberEvent};
