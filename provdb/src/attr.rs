//! Packed attribute records of the attribute store.
//!
//! ```text
//! struct provdb_val {
//!     u8  flags;
//!     u8  value_type;
//!     u16 attr_code;     // PACKED set
//!     u16 attr_len;      // PACKED clear, attribute name follows the header
//!     u32 value_len;
//!     u8  data[];
//! }
//! ```
//!
//! Header integers are little endian.


use crate::tokens::TokenDict;
use crate::{Error, PnodeVersion, Result, PNODE_VERSION_SZ};

use serde::Serialize;

use std::convert::TryInto;
use std::fmt::{self, Display, Formatter};
use std::str::{self, FromStr};

pub const HEADER_SZ: usize = 8;
const INT_SZ: usize = 4;
const TIMESTAMP_SZ: usize = 8;
const TOKEN_SZ: usize = 4;

pub const FLAG_TOKENIZED: u8 = 0x1;
pub const FLAG_PACKED: u8 = 0x2;
pub const FLAG_ANCESTRY: u8 = 0x4;
pub const FLAG_MISMATCH: u8 = 0x8;

// declared value types
pub const TYPE_STRING: u8 = 1;
pub const TYPE_MULTISTRING: u8 = 2;
pub const TYPE_INT: u8 = 3;
pub const TYPE_TIMESTAMP: u8 = 5;
pub const TYPE_PNODEVERSION: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn with(self, flag: u8) -> Self {
        Self(self.0 | flag)
    }

    pub fn without(self, flag: u8) -> Self {
        Self(self.0 & !flag)
    }

    pub fn is_packed(self) -> bool {
        self.0 & FLAG_PACKED != 0
    }

    /// The record also encodes an edge from the referenced node to the keyed node.
    pub fn is_ancestry(self) -> bool {
        self.0 & FLAG_ANCESTRY != 0
    }

    pub fn is_tokenized(self) -> bool {
        self.0 & FLAG_TOKENIZED != 0
    }

    pub fn is_mismatch(self) -> bool {
        self.0 & FLAG_MISMATCH != 0
    }
}

/// Whether an attribute belongs to the whole entity or to one version of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Entity,
    Version,
}

/// How the value bytes of an attribute are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRule {
    Int,
    Timestamp,
    PnodeVersion,
    Str,
    Tokens,
}

impl TypeRule {
    pub fn value_type(self) -> u8 {
        match self {
            TypeRule::Int => TYPE_INT,
            TypeRule::Timestamp => TYPE_TIMESTAMP,
            TypeRule::PnodeVersion => TYPE_PNODEVERSION,
            TypeRule::Str => TYPE_STRING,
            TypeRule::Tokens => TYPE_MULTISTRING,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttrName {
    Type,
    Name,
    Inode,
    Path,
    Argv,
    Env,
    FreezeTime,
    ExecTime,
    ForkParent,
    Pid,
    Create,
    Unlink,
    Input,
}

// index is the packed code, 0 is reserved
const PACKED: [Option<AttrName>; 9] = [
    None,
    Some(AttrName::Type),
    Some(AttrName::Name),
    Some(AttrName::Inode),
    Some(AttrName::Path),
    Some(AttrName::Argv),
    Some(AttrName::Env),
    Some(AttrName::FreezeTime),
    Some(AttrName::Input),
];

impl AttrName {
    pub fn from_code(code: u16) -> Option<Self> {
        PACKED.get(code as usize).copied().flatten()
    }

    pub fn code(self) -> Option<u16> {
        PACKED
            .iter()
            .position(|name| *name == Some(self))
            .map(|code| code as u16)
    }

    pub fn as_str(self) -> &'static str {
        use AttrName::*;
        match self {
            Type => "TYPE",
            Name => "NAME",
            Inode => "INODE",
            Path => "PATH",
            Argv => "ARGV",
            Env => "ENV",
            FreezeTime => "FREEZETIME",
            ExecTime => "EXECTIME",
            ForkParent => "FORKPARENT",
            Pid => "PID",
            Create => "CREATE",
            Unlink => "UNLINK",
            Input => "INPUT",
        }
    }

    pub fn rule(self) -> TypeRule {
        use AttrName::*;
        match self {
            Type | Name | Path | Create | Unlink => TypeRule::Str,
            Inode | Pid => TypeRule::Int,
            Argv | Env => TypeRule::Tokens,
            FreezeTime | ExecTime => TypeRule::Timestamp,
            ForkParent | Input => TypeRule::PnodeVersion,
        }
    }

    pub fn scope(self) -> Scope {
        use AttrName::*;
        match self {
            Type | Name | Inode => Scope::Entity,
            _ => Scope::Version,
        }
    }
}

impl FromStr for AttrName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        use AttrName::*;
        let name = match s {
            "TYPE" => Type,
            "NAME" => Name,
            "INODE" => Inode,
            "PATH" => Path,
            "ARGV" => Argv,
            "ENV" => Env,
            "FREEZETIME" => FreezeTime,
            "EXECTIME" => ExecTime,
            "FORKPARENT" => ForkParent,
            "PID" => Pid,
            "CREATE" | "CREAT" => Create,
            "UNLINK" => Unlink,
            "INPUT" => Input,
            _ => return Err(Error::unknown_attr(format!("no type rule for {:?}", s))),
        };
        Ok(name)
    }
}

impl Display for AttrName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timestamp {
    pub sec: i32,
    pub nsec: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Timestamp(Timestamp),
    PnodeVersion(PnodeVersion),
    Str(String),
    StrList(Vec<String>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_pnode_version(&self) -> Option<PnodeVersion> {
        match self {
            Value::PnodeVersion(pv) => Some(*pv),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Timestamp(ts) => write!(f, "{}.{:09}", ts.sec, ts.nsec),
            Value::PnodeVersion(pv) => write!(f, "{}", pv),
            Value::Str(s) => write!(f, "{}", s),
            Value::StrList(list) => write!(f, "{}", list.join(" ")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        Value::Int(i as i64)
    }
}

impl From<PnodeVersion> for Value {
    fn from(pv: PnodeVersion) -> Self {
        Value::PnodeVersion(pv)
    }
}

/// One decoded attribute record.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrRecord {
    pub name: AttrName,
    pub value: Value,
    pub flags: Flags,
    pub value_type: u8,
}

impl AttrRecord {
    pub fn new(name: AttrName, value: Value) -> Self {
        Self {
            name,
            value,
            flags: Flags::default(),
            value_type: name.rule().value_type(),
        }
    }

    pub fn ancestry(mut self) -> Self {
        self.flags = self.flags.with(FLAG_ANCESTRY);
        self
    }

    pub fn decode(buf: &[u8], tokens: &TokenDict) -> Result<Self> {
        if buf.len() < HEADER_SZ {
            return Err(Error::malformed(format!(
                "{} bytes is shorter than the {}-byte header",
                buf.len(),
                HEADER_SZ
            )));
        }
        let flags = Flags(buf[0]);
        let value_type = buf[1];
        let code_or_len = u16::from_le_bytes([buf[2], buf[3]]);
        let value_len = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
        let rest = &buf[HEADER_SZ..];

        let (name, payload) = if flags.is_packed() {
            let name = AttrName::from_code(code_or_len).ok_or_else(|| {
                Error::malformed(format!("invalid packed attribute code {}", code_or_len))
            })?;
            (name, rest)
        } else {
            let name_len = code_or_len as usize;
            if rest.len() < name_len {
                return Err(Error::malformed(format!(
                    "attribute name of {} bytes but only {} bytes follow the header",
                    name_len,
                    rest.len()
                )));
            }
            let (name, payload) = rest.split_at(name_len);
            let name = str::from_utf8(name)?.trim_end_matches('\0');
            (name.parse::<AttrName>()?, payload)
        };

        if payload.len() != value_len {
            return Err(Error::malformed(format!(
                "{} declares a {}-byte value but {} bytes remain",
                name,
                value_len,
                payload.len()
            )));
        }

        let value = convert(name, payload, tokens)?;
        Ok(Self {
            name,
            value,
            flags,
            value_type,
        })
    }

    /// Serializes the record, using the packed name code when `pack` is set and the
    /// name has one. Strings of token lists are interned into `tokens`.
    pub fn encode(&self, pack: bool, tokens: &mut TokenDict) -> Vec<u8> {
        let value = value_bytes(&self.value, tokens);
        let code = if pack { self.name.code() } else { None };

        let (flags, code_or_len, name) = match code {
            Some(code) => (self.flags.with(FLAG_PACKED), code, &[][..]),
            None => {
                let name = self.name.as_str().as_bytes();
                (self.flags.without(FLAG_PACKED), name.len() as u16, name)
            }
        };

        let mut buf = Vec::with_capacity(HEADER_SZ + name.len() + value.len());
        buf.push(flags.bits());
        buf.push(self.value_type);
        buf.extend_from_slice(&code_or_len.to_le_bytes());
        buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        buf.extend_from_slice(name);
        buf.extend_from_slice(&value);
        buf
    }
}

fn convert(name: AttrName, payload: &[u8], tokens: &TokenDict) -> Result<Value> {
    let wrong_size = |expected: &str| {
        Error::malformed(format!(
            "{} value should be {} bytes, got {}",
            name,
            expected,
            payload.len()
        ))
    };

    let value = match name.rule() {
        TypeRule::Int => {
            let raw: [u8; INT_SZ] = payload.try_into().map_err(|_| wrong_size("4"))?;
            Value::Int(i32::from_le_bytes(raw) as i64)
        }
        TypeRule::Timestamp => {
            let raw: [u8; TIMESTAMP_SZ] = payload.try_into().map_err(|_| wrong_size("8"))?;
            let sec = i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            let nsec = i32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
            Value::Timestamp(Timestamp { sec, nsec })
        }
        TypeRule::PnodeVersion => {
            if payload.len() != PNODE_VERSION_SZ {
                return Err(wrong_size("12"));
            }
            Value::PnodeVersion(PnodeVersion::from_bytes(payload)?)
        }
        TypeRule::Str => Value::Str(read_str(payload)?),
        TypeRule::Tokens => {
            if payload.len() % TOKEN_SZ != 0 {
                return Err(wrong_size("a multiple of 4"));
            }
            let list = payload
                .chunks_exact(TOKEN_SZ)
                .map(|chunk| {
                    let id = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    tokens.get(id).map(String::from).ok_or_else(|| {
                        Error::malformed(format!("{} token {} is not in the dictionary", name, id))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Value::StrList(list)
        }
    };
    Ok(value)
}

pub(crate) fn read_str(buf: &[u8]) -> Result<String> {
    Ok(str::from_utf8(buf)?.trim_end_matches('\0').to_string())
}

fn value_bytes(value: &Value, tokens: &mut TokenDict) -> Vec<u8> {
    match value {
        Value::Int(i) => (*i as i32).to_le_bytes().to_vec(),
        Value::Timestamp(ts) => {
            let mut buf = ts.sec.to_le_bytes().to_vec();
            buf.extend_from_slice(&ts.nsec.to_le_bytes());
            buf
        }
        Value::PnodeVersion(pv) => pv.to_bytes().to_vec(),
        Value::Str(s) => s.as_bytes().to_vec(),
        Value::StrList(list) => list
            .iter()
            .flat_map(|s| tokens.intern(s).to_le_bytes().to_vec())
            .collect(),
    }
}
