//! Database layer for Vigil
//!
//! Provides durable key-value state backed by SQLite. The core library stores
//! the conversation map here so it survives across sessions.

pub mod connection;
pub mod error;
pub mod state;

pub use connection::{Database, DatabaseConfig};
pub use error::{Error, Result};
pub use state::{StateEntry, StateRepository};
