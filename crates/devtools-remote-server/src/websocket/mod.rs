//! WebSocket transports for the control and data channels.

pub mod connection;
pub mod control;
pub mod data;
