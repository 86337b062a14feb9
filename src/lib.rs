//! Remote device session core: wire protocol, session state machine,
//! endpoint discovery, pin mapping, and the simulator bridge.

pub mod bridge;
pub mod codec;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod heartbeat;
pub mod persistence;
pub mod pins;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod session;

pub use config::RemoteDeviceConfig;
pub use discovery::DiscoveryClient;
pub use error::{ErrorKind, RemoteError, RemoteResult};
pub use events::HostEvent;
pub use pins::{MappedPin, Pin, PinCatalog, PinType};
pub use registry::{EndpointOption, EndpointRegistry};
pub use service::{DeviceService, SessionCommand, SessionHandle};
pub use session::{Phase, Session};
