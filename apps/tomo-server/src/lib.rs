//! Tomo server library.
//!
//! This library exposes the server components for testing.

pub mod config;
pub mod context;
pub mod http;
pub mod metrics;
