//! Declarative SQLite schemas shared by the queue and track databases.

mod versioned_schema;

pub use versioned_schema::*;
