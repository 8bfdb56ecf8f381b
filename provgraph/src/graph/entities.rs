use provdb::{PnodeVersion, Value};

use serde::{Serialize, Serializer};

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

pub const TYPE_ATTR: &str = "TYPE";
pub const NAME_ATTR: &str = "NAME";
pub const PATH_ATTR: &str = "PATH";

pub const OPERATION_ANNOTATION: &str = "operation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Proc,
    File,
    Pipe,
    Dir,
    NpFile,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        use EntityType::*;
        match self {
            Proc => "PROC",
            File => "FILE",
            Pipe => "PIPE",
            Dir => "DIR",
            NpFile => "NP_FILE",
        }
    }
}

impl FromStr for EntityType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use EntityType::*;
        match s {
            "PROC" => Ok(Proc),
            "FILE" => Ok(File),
            "PIPE" => Ok(Pipe),
            "DIR" => Ok(Dir),
            "NP_FILE" => Ok(NpFile),
            _ => Err(()),
        }
    }
}

impl From<EntityType> for Value {
    fn from(ty: EntityType) -> Self {
        Value::from(ty.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
    /// Adjacency whose meaning the store did not state.
    Ancestry,
    Version,
    Input,
    ForkParent,
    Triggered,
    Used,
    Generated,
    Derived,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        use EdgeKind::*;
        match self {
            Ancestry => "ANCESTRY",
            Version => "VERSION",
            Input => "INPUT",
            ForkParent => "FORKPARENT",
            Triggered => "TRIGGERED",
            Used => "USED",
            Generated => "GENERATED",
            Derived => "DERIVED",
        }
    }
}

impl Serialize for EdgeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl Display for EdgeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub key: PnodeVersion,
    pub attrs: BTreeMap<String, Value>,
}

impl Node {
    pub fn new(key: PnodeVersion) -> Self {
        Self {
            key,
            attrs: BTreeMap::new(),
        }
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)?;
        for name in [TYPE_ATTR, PATH_ATTR, NAME_ATTR].iter() {
            if let Some(value) = self.attrs.get(*name) {
                write!(f, " {}", value)?;
            }
        }
        Ok(())
    }
}

/// All occurrences of one relationship between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub kind: EdgeKind,
    pub times: Vec<String>,
    pub annotations: BTreeMap<String, String>,
}

impl Edge {
    pub fn new(kind: EdgeKind) -> Self {
        Self {
            kind,
            times: vec![],
            annotations: BTreeMap::new(),
        }
    }

    /// The most recent occurrence.
    pub fn time(&self) -> Option<&str> {
        self.times.last().map(String::as_str)
    }
}

impl Display for Edge {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(op) = self.annotations.get(OPERATION_ANNOTATION) {
            write!(f, " {}", op)?;
        }
        Ok(())
    }
}
