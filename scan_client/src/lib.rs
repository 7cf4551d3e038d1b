pub mod domain;
pub mod frameworks;
pub mod interface_adapters;
pub mod use_cases;

pub use domain::{Role, ScanDeduplicator, ScanEvent, TransportError};
pub use frameworks::client::{ClientError, run, run_with_config};
pub use frameworks::config::ClientConfig;
pub use interface_adapters::protocol::{ClientMessage, ServerEventKind, ServerMessage};
pub use interface_adapters::transport::{
    ConnectionState, SendOutcome, TransportSession, TransportSettings,
};
pub use use_cases::{ConsumerAdapter, ProducerAdapter, ScanMode};
