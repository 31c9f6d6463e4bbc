//! Change capture
//!
//! Types shared by every capture strategy: positions, the cursor, change
//! records and the [`ChangeCaptureSource`] port.

pub mod cursor;
pub mod position;
pub mod record;
pub mod source;

pub use cursor::{Cursor, CursorError};
pub use position::{Lsn, ParseLsnError, Position};
pub use record::{
    ChangeBatch, ChangeBody, ChangeOperation, ChangeRecord, DecodeError, UnknownOperation,
};
pub use source::{CaptureError, ChangeCaptureSource};
