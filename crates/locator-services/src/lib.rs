pub mod actor;
pub mod gateway;
pub mod peer;
pub mod port_pool;
pub mod publisher;
pub mod registry;
pub mod status;

pub use actor::Actor;
pub use gateway::{AdhocGateway, Gateway};
pub use peer::{Generation, Observed, PeerPhase, PeerTable};
pub use port_pool::PortPool;
pub use publisher::{SubscriberId, SynchronizePublisher, Upstream};
pub use registry::{Registry, RegistryChange, RegistryConfig};
pub use status::{LocatorSnapshot, PeerSummary};
