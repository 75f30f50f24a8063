//! WebSocket connection tracking, session lifecycle, and broadcast fan-out.

pub mod connection;
pub mod registry;
pub mod relay;
pub mod session;
