//! Reader for the binary provenance store format.
//!
//! A dataset is a handful of ordered key-value stores. Keys of the adjacency and
//! attribute stores are `(pnode, version)` pairs in a fixed 12-byte layout, the
//! attribute store values are packed attribute records (see [`attr`]) and the token
//! store interns the strings of multi-string attributes (see [`tokens`]).

pub mod attr;
pub mod store;
pub mod tokens;

pub use attr::{AttrName, AttrRecord, Flags, Scope, Timestamp, Value};
pub use store::{Dataset, MemStore, Store};
pub use tokens::TokenDict;

use serde::Serialize;

use std::convert::TryInto;
use std::error;
use std::fmt::{self, Display, Formatter};
use std::io;
use std::str::Utf8Error;
use std::string::FromUtf8Error;

pub type Result<T> = std::result::Result<T, Error>;

pub const PNODE_VERSION_SZ: usize = 12;

/// Identity of one node: an entity id and a version local to that entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PnodeVersion {
    pub pnode: u64,
    pub version: u32,
}

impl PnodeVersion {
    pub fn new(pnode: u64, version: u32) -> Self {
        Self { pnode, version }
    }

    /// The anchor node holding the entity-scope attributes.
    pub fn anchor(self) -> Self {
        Self::new(self.pnode, 0)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != PNODE_VERSION_SZ {
            return Err(Error::malformed(format!(
                "expected a {}-byte (pnode, version) pair, got {} bytes",
                PNODE_VERSION_SZ,
                buf.len()
            )));
        }
        let (pnode, version) = buf.split_at(8);
        // both conversions are infallible after the length check
        let pnode = u64::from_le_bytes(pnode.try_into().map_err(|_| ErrorKind::MalformedRecord)?);
        let version =
            u32::from_le_bytes(version.try_into().map_err(|_| ErrorKind::MalformedRecord)?);
        Ok(Self { pnode, version })
    }

    pub fn to_bytes(self) -> [u8; PNODE_VERSION_SZ] {
        let mut buf = [0u8; PNODE_VERSION_SZ];
        buf[..8].copy_from_slice(&self.pnode.to_le_bytes());
        buf[8..].copy_from_slice(&self.version.to_le_bytes());
        buf
    }
}

impl Display for PnodeVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.pnode, self.version)
    }
}

// Error handling
#[derive(Debug)]
pub struct Error {
    repr: Repr,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            Repr::Simple(kind) => *kind,
            Repr::IO(_) => ErrorKind::IO,
            Repr::Custom(w) => w.kind,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    IO,
    MalformedRecord,
    UnknownAttribute,
}

#[derive(Debug)]
enum Repr {
    IO(io::Error),
    Simple(ErrorKind),
    Custom(Wrapper),
}

#[derive(Debug)]
struct Wrapper {
    kind: ErrorKind,
    error: Box<dyn error::Error + Send + Sync>,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Simple(ref kind) => match kind {
                ErrorKind::MalformedRecord => write!(f, "malformed record"),
                ErrorKind::UnknownAttribute => write!(f, "unknown attribute"),
                ErrorKind::IO => write!(f, "{:?}", self),
            },
            Repr::IO(e) => write!(f, "failed to do io: {}", e),
            Repr::Custom(ref w) => match w.kind {
                ErrorKind::MalformedRecord => write!(f, "malformed record: {}", w.error),
                ErrorKind::UnknownAttribute => write!(f, "unknown attribute: {}", w.error),
                ErrorKind::IO => write!(f, "failed to do io: {}", w.error),
            },
        }
    }
}

impl Error {
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Self {
            repr: Repr::Custom(Wrapper {
                kind,
                error: error.into(),
            }),
        }
    }

    pub(crate) fn malformed<E>(error: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::MalformedRecord, error)
    }

    pub(crate) fn unknown_attr<E>(error: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::UnknownAttribute, error)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self {
            repr: Repr::Simple(kind),
        }
    }
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error { repr: Repr::IO(e) }
    }
}

impl From<Utf8Error> for Error {
    fn from(e: Utf8Error) -> Self {
        Self::malformed(e)
    }
}

impl From<FromUtf8Error> for Error {
    fn from(e: FromUtf8Error) -> Self {
        Self::malformed(e)
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e.repr {
            Repr::IO(e) => e,
            _ => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn pnode_version_layout() {
        let key = PnodeVersion::new(0x0102_0304_0506_0708, 9);
        let bytes = key.to_bytes();
        assert_eq!(&[8, 7, 6, 5, 4, 3, 2, 1, 9, 0, 0, 0], &bytes);
        assert_eq!(key, PnodeVersion::from_bytes(&bytes).unwrap());
    }

    #[test]
    fn pnode_version_wrong_size() {
        let err = PnodeVersion::from_bytes(&[0u8; 11]).unwrap_err();
        assert_eq!(ErrorKind::MalformedRecord, err.kind());
    }
}
