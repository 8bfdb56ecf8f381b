//! Semantics of a text-rendered BSM audit trail.
//!
//! Lines are comma-separated tokens (`praudit -n -d,` style), a header token opens a
//! record and a trailer token closes it. [`Reassembler`] folds tokens back into
//! [`AuditRecord`]s, [`EventCategory`] says what a record means for provenance and
//! [`SnapshotSource`] supplies process names the audit trail does not carry.

#[macro_use]
extern crate lazy_static;

pub mod event;
pub mod record;
pub mod snapshot;
pub mod token;

pub use event::EventCategory;
pub use record::{AuditRecord, Reassembler};
pub use snapshot::{ProcInfo, PsSnapshots, Snapshot, SnapshotSource};
pub use token::{EventTime, Subject, Token};

use std::error;
use std::fmt::{self, Display, Formatter};
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// The line does not have the shape of any token it claims to be.
    UnparseableToken(String),
    /// A record finished without a subject token naming the calling process.
    UnattributableEvent(u32),
    /// A record finished without the fields its event needs.
    IncompleteRecord(String),
    Snapshot(String),
    IO(io::Error),
}

impl error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use Error::*;
        match self {
            UnparseableToken(reason) => write!(f, "unparseable token: {}", reason),
            UnattributableEvent(event_id) => {
                write!(f, "event {} has no calling process", event_id)
            }
            IncompleteRecord(reason) => write!(f, "incomplete record: {}", reason),
            Snapshot(reason) => write!(f, "bad process snapshot: {}", reason),
            IO(e) => write!(f, "failed to do io: {}", e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::IO(e)
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::IO(e) => e,
            _ => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}
