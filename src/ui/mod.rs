//! Web control surface
//!
//! A thin HTTP/WebSocket shell over [`PlayerHandle`](crate::player::PlayerHandle):
//! commands go into the player's queue and state comes back out through a
//! subscription. The surface never holds playback state of its own.

pub mod handlers;
pub mod server;
pub mod websocket;

pub use server::WebServer;
