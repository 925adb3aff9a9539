// plcsync-api: Async client for the SCADA gateway that fronts the building PLCs

pub mod client;
pub mod error;
pub mod models;
pub mod tag;
pub mod throttle;
pub mod transport;

pub use client::{Credentials, PlcClient};
pub use error::Error;
pub use models::{TagFailure, TagWrite, WriteOutcome};
pub use tag::TagAddress;
pub use throttle::Throttle;
pub use transport::{TlsMode, TransportConfig};
