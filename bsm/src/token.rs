use crate::{Error, Result};

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

pub const HEADER: [u32; 4] = [20, 21, 116, 121];
pub const SUBJECT: [u32; 4] = [36, 117, 122, 124];
pub const RETURN: [u32; 2] = [39, 114];
pub const PATH: u32 = 35;
pub const TRAILER: u32 = 19;

/// Time of an event as the audit trail writes it.
///
/// `stamp` is the seconds field followed by the sub-second offset field, digits
/// concatenated as they appear.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventTime {
    pub secs: u64,
    pub stamp: String,
}

impl Display for EventTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stamp)
    }
}

/// The process an event is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub euid: i64,
    pub egid: i64,
    pub uid: i64,
    pub gid: i64,
    pub pid: u64,
    pub machine_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Header { event_id: u32, time: EventTime },
    Subject(Subject),
    Path(String),
    Return { value: i64 },
    Trailer,
    /// A well-formed token of a type that carries nothing we use.
    Other(u32),
}

impl FromStr for Token {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(|c| c == '\n' || c == '\r');
        let fields: Vec<&str> = line.split(',').collect();
        let kind: u32 = parse(&fields, 0, "token type")?;

        let token = if HEADER.contains(&kind) {
            let event_id = parse(&fields, 3, "event id")?;
            let secs_field = field(&fields, 5, "seconds")?;
            let secs = parse(&fields, 5, "seconds")?;
            let offset = field(&fields, 6, "sub-second offset")?;
            if !offset.bytes().all(|b| b.is_ascii_digit()) {
                return Err(unparseable(&fields, "sub-second offset"));
            }
            Token::Header {
                event_id,
                time: EventTime {
                    secs,
                    stamp: format!("{}{}", secs_field, offset),
                },
            }
        } else if SUBJECT.contains(&kind) {
            Token::Subject(Subject {
                euid: parse(&fields, 2, "euid")?,
                egid: parse(&fields, 3, "egid")?,
                uid: parse(&fields, 4, "uid")?,
                gid: parse(&fields, 5, "gid")?,
                pid: parse(&fields, 6, "pid")?,
                machine_id: fields.get(9).map(|m| m.trim().to_string()),
            })
        } else if RETURN.contains(&kind) {
            Token::Return {
                value: parse(&fields, 2, "return value")?,
            }
        } else if kind == PATH {
            field(&fields, 1, "path")?;
            // commas inside the path were split off too
            Token::Path(fields[1..].join(","))
        } else if kind == TRAILER {
            Token::Trailer
        } else {
            Token::Other(kind)
        };
        Ok(token)
    }
}

fn field<'a>(fields: &[&'a str], idx: usize, what: &str) -> Result<&'a str> {
    fields
        .get(idx)
        .map(|f| f.trim())
        .ok_or_else(|| unparseable(fields, what))
}

fn parse<T: FromStr>(fields: &[&str], idx: usize, what: &str) -> Result<T> {
    field(fields, idx, what)?
        .parse()
        .map_err(|_| unparseable(fields, what))
}

fn unparseable(fields: &[&str], what: &str) -> Error {
    Error::UnparseableToken(format!("no valid {} in {:?}", what, fields.join(",")))
}
