//! SQLite storage for the device sets, alerts and the discovery log
//!
//! Every logical operation runs inside one savepoint (see [`queries::with_savepoint`]).

pub mod connection;
pub mod models;
pub mod queries;
pub mod schema;

pub use connection::Database;
pub use models::*;
pub use queries::*;
