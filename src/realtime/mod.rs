//! Realtime coordination layer: channel hub, event types, and the
//! WebSocket endpoint.

pub mod events;
pub mod hub;
pub mod ws;

pub use hub::ChannelHub;
