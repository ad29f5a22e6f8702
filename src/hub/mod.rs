//! Connection hub: membership tracking and broadcast fan-out.
//!
//! The membership set lives inside a single coordination loop and is
//! reached only through [`HubHandle`] requests, so it is never read or
//! mutated concurrently.

pub mod connection_id;
pub mod coordinator;

pub use connection_id::ConnectionId;
pub use coordinator::{Hub, HubHandle, Member};
