//! Database persistence layer for invites, sessions, and rewards.

mod error;
mod models;
mod schema; // Diesel generated schema - internal use only
mod store;

pub use error::DbError;
pub use store::{GameStore, MIGRATIONS};
