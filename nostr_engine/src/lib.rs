pub mod notify;
pub mod relay;
pub mod relay_pool;

pub use notify::Notifier;
pub use relay::{RelayConnection, RelayConnector, WsRelayConnector};
pub use relay_pool::{PublishReport, RelayPublisher, RelayPublisherSettings};
