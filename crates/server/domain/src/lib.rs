// Outbox Relay - Domain Layer
// Bounded contexts:
// - people: the primary entity written through the transactional writer
// - outbox: outbox events, envelopes and the store/writer ports
// - capture: change records, positions, cursor and the capture source port
// - processing: processed/error log entries, log ports and the message processor
// - testing: in-memory adapters for tests and local runs

pub mod capture;
pub mod outbox;
pub mod people;
pub mod processing;
pub mod testing;

pub use capture::*;
pub use outbox::*;
pub use people::*;
pub use processing::*;
