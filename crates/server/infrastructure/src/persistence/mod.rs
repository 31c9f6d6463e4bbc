// Persistence Layer - PostgreSQL store, pool and schema bootstrap

pub mod postgres;

pub use postgres::*;
