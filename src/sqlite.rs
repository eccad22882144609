//! In-process engine over SQLite.
//!
//! Stands in for the remote engine in tests and local runs. It speaks the same [`Driver`]
//! contract, so everything above the driver boundary behaves exactly as it would remotely.
//!
//! [`Driver`]: crate::driver::Driver

mod catalog;
mod connection;
mod driver;
mod params;

pub use connection::SqliteConnection;
pub use driver::SqliteDriver;
