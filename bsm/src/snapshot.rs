//! Point-in-time process listings used to name the processes an audit trail mentions.


use crate::{Error, Result};

use chrono::{NaiveDateTime, TimeZone, Utc};
use log::debug;
use regex::Regex;

use std::collections::HashMap;
use std::io::{BufRead, Lines};
use std::ops::Range;

/// Lines shorter than this inside a block are the date line of the next block.
const MIN_ROW_LEN: usize = 50;
const DATE_FMT: &str = "%a %b %d %H:%M:%S %Y";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcInfo {
    pub pid: u64,
    pub ppid: Option<u64>,
    pub command: String,
    pub start_time: i64,
    pub uid: Option<i64>,
    pub gid: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub procs: HashMap<u64, ProcInfo>,
    /// Seconds since the epoch up to which the listing is current.
    pub valid_until: u64,
}

impl Snapshot {
    pub fn new(valid_until: u64) -> Self {
        Self {
            procs: HashMap::new(),
            valid_until,
        }
    }

    /// The snapshot handed out once a source has nothing more to say.
    pub fn exhausted() -> Self {
        Self::new(u64::MAX)
    }

    pub fn get(&self, pid: u64) -> Option<&ProcInfo> {
        self.procs.get(&pid)
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }
}

pub trait SnapshotSource {
    fn next_snapshot(&mut self) -> Result<Snapshot>;
}

impl<S: SnapshotSource + ?Sized> SnapshotSource for Box<S> {
    fn next_snapshot(&mut self) -> Result<Snapshot> {
        (**self).next_snapshot()
    }
}

/// Column layout of one process row.
#[derive(Debug, Clone)]
pub struct PsLayout {
    pub pid: Range<usize>,
    /// Not every `ps` format prints the parent.
    pub ppid: Option<Range<usize>>,
    pub command: usize,
}

impl Default for PsLayout {
    fn default() -> Self {
        Self {
            pid: 10..14,
            ppid: None,
            command: 61,
        }
    }
}

/// Snapshots read from a dump of repeated `date; ps` output.
///
/// Each block is a date line, one column header line and fixed-column process rows.
pub struct PsSnapshots<R> {
    lines: Lines<R>,
    next_date: Option<String>,
    layout: PsLayout,
}

impl<R: BufRead> PsSnapshots<R> {
    pub fn new(reader: R) -> Self {
        Self::with_layout(reader, PsLayout::default())
    }

    pub fn with_layout(reader: R, layout: PsLayout) -> Self {
        Self {
            lines: reader.lines(),
            next_date: None,
            layout,
        }
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.lines.next().transpose()?)
    }

    fn parse_row(&self, line: &str, stamp: i64) -> Result<ProcInfo> {
        let bad_row = || Error::Snapshot(format!("bad process row {:?}", line));
        let pid = line
            .get(self.layout.pid.clone())
            .and_then(|p| p.trim().parse().ok())
            .ok_or_else(bad_row)?;
        let ppid = match &self.layout.ppid {
            Some(cols) => Some(
                line.get(cols.clone())
                    .and_then(|p| p.trim().parse().ok())
                    .ok_or_else(bad_row)?,
            ),
            None => None,
        };
        let command = line
            .get(self.layout.command..)
            .and_then(|c| c.split_whitespace().next())
            .ok_or_else(bad_row)?;
        Ok(ProcInfo {
            pid,
            ppid,
            command: command.to_string(),
            start_time: stamp,
            uid: None,
            gid: None,
        })
    }
}

impl<R: BufRead> SnapshotSource for PsSnapshots<R> {
    fn next_snapshot(&mut self) -> Result<Snapshot> {
        let date = match self.next_date.take() {
            Some(date) => date,
            None => loop {
                match self.next_line()? {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => break line,
                    None => return Ok(Snapshot::exhausted()),
                }
            },
        };
        let stamp = parse_date(&date)?;

        // column headers
        if self.next_line()?.is_none() {
            return Ok(Snapshot::exhausted());
        }

        let mut snapshot = Snapshot::new(stamp.max(0) as u64);
        while let Some(line) = self.next_line()? {
            if line.len() < MIN_ROW_LEN {
                self.next_date = Some(line);
                break;
            }
            let info = self.parse_row(&line, stamp)?;
            snapshot.procs.insert(info.pid, info);
        }
        debug!(
            "process snapshot of {} entries valid until {}",
            snapshot.len(),
            snapshot.valid_until
        );
        Ok(snapshot)
    }
}

/// Parses `date(1)` output such as `Tue Mar  2 10:00:00 UTC 2010` as UTC seconds.
pub fn parse_date(line: &str) -> Result<i64> {
    lazy_static! {
        static ref RE: Regex = Regex::new(
            r"^([A-Za-z]{3} +[A-Za-z]{3} +[0-9]{1,2} +[0-9]{2}:[0-9]{2}:[0-9]{2}) +[A-Za-z]+ +([0-9]{4})$"
        )
        .unwrap();
    }
    let bad_date = || Error::Snapshot(format!("bad date line {:?}", line));
    let caps = RE.captures(line.trim()).ok_or_else(bad_date)?;
    let text = format!(
        "{} {}",
        caps[1].split_whitespace().collect::<Vec<_>>().join(" "),
        &caps[2]
    );
    let naive = NaiveDateTime::parse_from_str(&text, DATE_FMT).map_err(|_| bad_date())?;
    Ok(Utc.from_utc_datetime(&naive).timestamp())
}
