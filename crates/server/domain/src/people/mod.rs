//! People bounded context
//!
//! The primary entity whose writes are paired with outbox events.

pub mod model;

pub use model::{NewPerson, Person, PersonValidationError, MAX_NAME_LEN, PEOPLE_TABLE};
