//! Reassembly of token lines into whole audit records.


use crate::event::EventCategory;
use crate::token::{EventTime, Subject, Token};
use crate::{Error, Result};

use log::debug;

use std::convert::TryFrom;

/// One audit record, header to trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub event_id: u32,
    pub time: EventTime,
    pub subject: Subject,
    pub paths: Vec<String>,
    pub return_value: Option<i64>,
}

impl AuditRecord {
    pub fn category(&self) -> Option<EventCategory> {
        EventCategory::from_event_id(self.event_id)
    }

    /// The path an open acts on: the second path token if there is one, else the first.
    pub fn effective_path(&self) -> Result<&str> {
        self.paths
            .get(1)
            .or_else(|| self.paths.get(0))
            .map(String::as_str)
            .ok_or_else(|| self.incomplete("no path"))
    }

    /// Source and destination of a rename.
    ///
    /// With three or more path tokens the first one is the working directory and the
    /// next two are the operands, with exactly two they are the operands themselves.
    pub fn rename_paths(&self) -> Result<(&str, &str)> {
        match self.paths.len() {
            0 | 1 => Err(self.incomplete("rename needs two paths")),
            2 => Ok((&self.paths[0], &self.paths[1])),
            _ => Ok((&self.paths[1], &self.paths[2])),
        }
    }

    /// The pid a fork-family call returned to the parent.
    pub fn child_pid(&self) -> Result<u64> {
        let value = self
            .return_value
            .ok_or_else(|| self.incomplete("no return value"))?;
        u64::try_from(value).map_err(|_| self.incomplete("negative child pid"))
    }

    fn incomplete(&self, what: &str) -> Error {
        Error::IncompleteRecord(format!("event {} at {}: {}", self.event_id, self.time, what))
    }
}

#[derive(Debug, Default)]
struct Scratch {
    event_id: u32,
    time: EventTime,
    subject: Option<Subject>,
    paths: Vec<String>,
    return_value: Option<i64>,
}

/// Folds tokens into records.
///
/// A header always starts a fresh record, discarding whatever was left open.
#[derive(Debug, Default)]
pub struct Reassembler {
    scratch: Option<Scratch>,
    discarded: usize,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a header has been seen without its trailer yet.
    pub fn pending(&self) -> bool {
        self.scratch.is_some()
    }

    /// Records that were opened by a header but never reached their trailer.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Discards the record left open at the end of input, if any.
    pub fn finish(&mut self) -> bool {
        match self.scratch.take() {
            Some(old) => {
                debug!("dropping unterminated record of event {}", old.event_id);
                self.discarded += 1;
                true
            }
            None => false,
        }
    }

    /// Feeds one token, returning the finished record when it was a trailer.
    ///
    /// A trailer that closes a record without a subject yields
    /// [`Error::UnattributableEvent`], one that closes nothing yields
    /// [`Error::IncompleteRecord`]. Either way the reassembler is ready for the next
    /// header.
    pub fn push(&mut self, token: Token) -> Result<Option<AuditRecord>> {
        match token {
            Token::Header { event_id, time } => {
                self.finish();
                self.scratch = Some(Scratch {
                    event_id,
                    time,
                    ..Default::default()
                });
            }
            Token::Subject(subject) => {
                if let Some(scratch) = self.scratch.as_mut() {
                    scratch.subject = Some(subject);
                }
            }
            Token::Path(path) => {
                if let Some(scratch) = self.scratch.as_mut() {
                    scratch.paths.push(path);
                }
            }
            Token::Return { value } => {
                if let Some(scratch) = self.scratch.as_mut() {
                    scratch.return_value = Some(value);
                }
            }
            Token::Trailer => {
                let scratch = self.scratch.take().ok_or_else(|| {
                    Error::IncompleteRecord(String::from("trailer without a header"))
                })?;
                let subject = scratch
                    .subject
                    .ok_or(Error::UnattributableEvent(scratch.event_id))?;
                return Ok(Some(AuditRecord {
                    event_id: scratch.event_id,
                    time: scratch.time,
                    subject,
                    paths: scratch.paths,
                    return_value: scratch.return_value,
                }));
            }
            Token::Other(_) => (),
        }
        Ok(None)
    }
}
