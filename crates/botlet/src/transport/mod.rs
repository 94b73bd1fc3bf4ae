//! Transport layer for botlet.
//!
//! Signaling is exposed over HTTP via axum.

pub mod http;

pub use http::{ServerConfig, serve};
