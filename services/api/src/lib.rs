//! The HTTP/WebSocket service of the PDF reader: store adapters, configuration,
//! and the axum routes that drive reading sessions.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
