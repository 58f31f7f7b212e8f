//! Shared handoff server
//!
//! A small axum application bound to loopback that exposes a [`LocalStore`]
//! over HTTP so several client processes on the same machine can share one
//! set of handoffs. Clients find it by scanning a port range for the
//! identity document served at `GET /`.
//!
//! [`LocalStore`]: handoff_core::LocalStore

pub mod error;
pub mod idle;
pub mod routes;
pub mod server;
mod state;

pub use error::{ApiError, Result, ServerError};
pub use server::{body_limit, build_router, serve, serve_until, start_server, ServerConfig};
pub use state::AppState;
