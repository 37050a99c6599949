//! Wire types shared by the REST API and the WebSocket gateway.

pub mod api;
pub mod events;
pub mod models;
pub mod time;
