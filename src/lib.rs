//! # broadcast-hub
//!
//! Real-time message broadcaster over WebSocket.
//!
//! Every client connects to `/ws`, sends short text messages, and receives
//! every message sent by any connected client (its own included). Delivery
//! is best effort: a client that cannot keep up is disconnected rather than
//! allowed to stall everyone else.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket)
//!     │
//!     ├── WS Handler (ws/)            origin check, upgrade
//!     │
//!     ├── Connection (ws/)            inbound duty ──► Hub::broadcast
//!     │                               outbound duty ◄── outbound queue (256)
//!     │
//!     └── Hub (hub/)                  one task, owns the membership set,
//!                                     admit / remove / broadcast
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod error;
pub mod hub;
pub mod server;
pub mod ws;
