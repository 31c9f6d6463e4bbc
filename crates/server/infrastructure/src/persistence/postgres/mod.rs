pub mod pool;
pub mod schema;
pub mod store;

pub use pool::{connect, DatabaseConfig, PoolError, ADMIN_DATABASE};
pub use schema::{
    ensure_database, ensure_tables, has_sqlstate, quote_ident, SetupError, DUPLICATE_DATABASE,
    DUPLICATE_OBJECT,
};
pub use store::PostgresOutboxStore;
