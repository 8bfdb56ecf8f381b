//! Provenance graphs rebuilt from a provenance store or from an audit trail.

pub mod export;
pub mod graph;
pub mod load;
pub mod translate;

use provdb::PnodeVersion;

use std::error;
use std::fmt::{self, Display, Formatter};
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// A record of `store` under `key` could not be used.
    Load {
        store: String,
        key: Vec<u8>,
        source: provdb::Error,
    },
    /// A record of `store` under `key` that decodes but does not fit the graph.
    Inconsistent {
        store: String,
        key: Vec<u8>,
        source: Box<Error>,
    },
    MissingNode(PnodeVersion),
    MissingType(u64),
    InvalidType(u64, String),
    /// An audit record that cannot be turned into graph changes.
    Audit(bsm::Error),
    IO(io::Error),
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Load { source, .. } => Some(source),
            Error::Inconsistent { source, .. } => Some(&**source),
            Error::Audit(e) => Some(e),
            Error::IO(e) => Some(e),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use Error::*;
        match self {
            Load { store, key, source } => {
                write_location(f, store, key)?;
                write!(f, ": {}", source)
            }
            Inconsistent { store, key, source } => {
                write_location(f, store, key)?;
                write!(f, ": {}", source)
            }
            MissingNode(key) => write!(f, "node {} does not exist", key),
            MissingType(pnode) => write!(f, "entity {} has no TYPE", pnode),
            InvalidType(pnode, ty) => write!(f, "entity {} has invalid TYPE {:?}", pnode, ty),
            Audit(e) => write!(f, "{}", e),
            IO(e) => write!(f, "failed to do io: {}", e),
        }
    }
}

fn write_location(f: &mut Formatter<'_>, store: &str, key: &[u8]) -> fmt::Result {
    write!(f, "{} store, key ", store)?;
    for b in key {
        write!(f, "{:02x}", b)?;
    }
    Ok(())
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::IO(e)
    }
}

impl From<bsm::Error> for Error {
    fn from(e: bsm::Error) -> Self {
        Error::Audit(e)
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
