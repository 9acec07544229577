pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod session;

pub use connection::{connect_with_settings, DbPool};
pub use session::{InMemorySessionStore, SessionError, SessionStore};
