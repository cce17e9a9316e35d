//! Troupe API Library Crate
//!
//! All the logic for the troupe web service: application state, the session
//! store, REST handlers, the WebSocket session runtime, and routing. The
//! `api` binary is a thin wrapper around this library.

pub mod audio_utils;
pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod store;
pub mod ws;
