// Outbox Relay - Infrastructure Layer
// Concrete adapters for the domain ports
//
// - persistence: PostgreSQL pool, schema setup and the transactional outbox store
// - logs: append-only processed and error logs
// - capture: polled stream and logical replication sources, capture session

pub mod capture;
pub mod logs;
pub mod persistence;
