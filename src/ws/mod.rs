//! WebSocket layer: transport upgrade, origin checks, and the per-client
//! send pipeline.
//!
//! The endpoint at `/ws` upgrades allowed origins into a [`Connection`]
//! whose inbound duty feeds the hub and whose outbound duty drains the
//! connection's queue back to the client.

pub mod connection;
pub mod handler;
pub mod origin;
pub mod payload;

pub use connection::{Connection, ConnectionSettings};
pub use origin::OriginPolicy;
