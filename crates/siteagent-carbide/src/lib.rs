//! siteagent-carbide: client for the site controller ("Carbide/Forge").
//!
//! # Architecture
//!
//! ```text
//! ForgeApi (async trait, one method per RPC)
//!   ├── CarbideClient     tonic Channel, unary calls to /forge.Forge/<Method>
//!   └── test fakes        in dependent crates
//!
//! error
//!   ├── TransportCode     library-independent mirror of gRPC status codes
//!   ├── classify()        TransportCode → ErrorKind (pure)
//!   └── ActivityError     non-retryable typed errors or retryable pass-through
//! ```
//!
//! Wire messages live in [`proto`] and are encoded with prost.

pub mod api;
pub mod client;
pub mod error;
pub mod proto;

pub use api::ForgeApi;
pub use client::{CarbideClient, ClientError};
pub use error::{ActivityError, ErrorKind, TransportCode, classify, wrap_status};
pub use tonic::Status;
