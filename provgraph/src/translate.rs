//! Incremental translation of a BSM audit trail into a [`ProvenanceGraph`].

#[cfg(test)]
mod tests;

use crate::graph::entities::*;
use crate::graph::{add_version, ProvenanceGraph};
use crate::Result;

use bsm::{AuditRecord, EventCategory, Reassembler, Snapshot, SnapshotSource, Subject, Token};
use provdb::{PnodeVersion, Scope, Value};

use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use regex::RegexSet;

use std::collections::HashMap;
use std::io;

const DEV_PREFIX: &str = r"^/dev/";

pub struct Config {
    /// Paths matching any of these keep one version however often they are written.
    pub unversioned: RegexSet,
    /// Whether processes are named from the snapshot source.
    pub enrich: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            unversioned: RegexSet::new(&[DEV_PREFIX]).unwrap_or_else(|_| RegexSet::empty()),
            enrich: true,
        }
    }
}

enum Action<'a> {
    Exit,
    Fork(u64),
    Read(&'a str),
    Write(&'a str),
    Rename(&'a str, &'a str),
}

/// What one line did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The line was absorbed into the record being reassembled.
    Pending,
    Applied(EventCategory),
    /// A whole record of an event that has no effect on the graph.
    Ignored(u32),
    Dropped,
}

/// One audit session: the graph under construction and the live state behind it.
pub struct Session<P = Box<dyn SnapshotSource>> {
    config: Config,
    graph: ProvenanceGraph,
    reassembler: Reassembler,
    procs: HashMap<u64, PnodeVersion>,
    files: HashMap<String, PnodeVersion>,
    snapshots: Option<P>,
    snapshot: Snapshot,
    next_pnode: u64,
    dropped: usize,
}

impl<P: SnapshotSource> Session<P> {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            graph: ProvenanceGraph::new(),
            reassembler: Reassembler::new(),
            procs: HashMap::new(),
            files: HashMap::new(),
            snapshots: None,
            snapshot: Snapshot::default(),
            next_pnode: 0,
            dropped: 0,
        }
    }

    pub fn with_snapshots(config: Config, snapshots: P) -> Self {
        let mut session = Self::new(config);
        if session.config.enrich {
            session.snapshots = Some(snapshots);
        }
        session
    }

    pub fn graph(&self) -> &ProvenanceGraph {
        &self.graph
    }

    pub fn into_graph(self) -> ProvenanceGraph {
        self.graph
    }

    /// Records dropped so far, including those cut short by a later header.
    pub fn dropped(&self) -> usize {
        self.dropped + self.reassembler.discarded()
    }

    /// The node currently standing for a live process.
    pub fn process(&self, pid: u64) -> Option<PnodeVersion> {
        self.procs.get(&pid).copied()
    }

    /// The latest version of a file, looked up by its normalized path.
    pub fn file(&self, path: &str) -> Option<PnodeVersion> {
        self.files.get(&normalize(path)).copied()
    }

    /// Feeds one line of the audit trail.
    ///
    /// Never fails: a line or record that cannot be used is counted and skipped.
    pub fn feed_line(&mut self, line: &str) -> Outcome {
        if line.trim().is_empty() {
            return Outcome::Pending;
        }
        let token = match line.parse::<Token>() {
            Ok(token) => token,
            Err(e) => {
                warn!("{}", e);
                self.dropped += 1;
                return Outcome::Dropped;
            }
        };
        if let Token::Header { time, .. } = &token {
            self.refresh_snapshot(time.secs);
        }

        let record = match self.reassembler.push(token) {
            Ok(Some(record)) => record,
            Ok(None) => return Outcome::Pending,
            Err(e) => {
                debug!("dropping record: {}", e);
                self.dropped += 1;
                return Outcome::Dropped;
            }
        };
        match self.apply(&record) {
            Ok(Some(category)) => Outcome::Applied(category),
            Ok(None) => Outcome::Ignored(record.event_id),
            Err(e) => {
                warn!("dropping event {} at {}: {}", record.event_id, record.time, e);
                self.dropped += 1;
                Outcome::Dropped
            }
        }
    }

    /// Folds a whole stream of lines into the session, returning the dropped count.
    ///
    /// Stops early only when the stream itself fails.
    pub async fn consume<S>(&mut self, mut lines: S) -> io::Result<usize>
    where
        S: Stream<Item = io::Result<String>> + Unpin,
    {
        while let Some(line) = lines.next().await {
            self.feed_line(&line?);
        }
        if self.reassembler.finish() {
            debug!("audit trail ends inside a record");
        }
        info!(
            "translated audit trail into {} nodes, {} records dropped",
            self.graph.node_count(),
            self.dropped()
        );
        Ok(self.dropped())
    }

    fn refresh_snapshot(&mut self, secs: u64) {
        if secs <= self.snapshot.valid_until {
            return;
        }
        let snapshots = match self.snapshots.as_mut() {
            Some(snapshots) => snapshots,
            None => return,
        };
        match snapshots.next_snapshot() {
            Ok(snapshot) => self.snapshot = snapshot,
            Err(e) => {
                warn!("process snapshots disabled: {}", e);
                self.snapshots = None;
                self.snapshot = Snapshot::exhausted();
            }
        }
    }

    fn apply(&mut self, record: &AuditRecord) -> Result<Option<EventCategory>> {
        let category = match record.category() {
            Some(category) => category,
            None => return Ok(None),
        };
        // everything the event needs is checked before the graph is touched
        let action = match category {
            EventCategory::Exit => Action::Exit,
            EventCategory::Fork => Action::Fork(record.child_pid()?),
            EventCategory::OpenRead => Action::Read(record.effective_path()?),
            EventCategory::OpenWrite => Action::Write(record.effective_path()?),
            EventCategory::Rename => {
                let (from, to) = record.rename_paths()?;
                Action::Rename(from, to)
            }
        };

        let pid = record.subject.pid;
        let caller = self.ensure_caller(&record.subject)?;
        let time = Some(record.time.stamp.as_str());
        match action {
            Action::Exit => {
                self.procs.remove(&pid);
            }
            Action::Fork(child_pid) => {
                let child = self.spawn_process(child_pid, Some(pid), &record.subject);
                self.procs.insert(child_pid, child);
                self.graph.add_edge(
                    caller,
                    child,
                    EdgeKind::Triggered,
                    time,
                    &[(OPERATION_ANNOTATION, "fork")],
                )?;
            }
            Action::Read(path) => {
                let file = self.read_file(path);
                self.graph.add_edge(caller, file, EdgeKind::Used, time, &[])?;
            }
            Action::Write(path) => {
                let file = self.write_file(path)?;
                self.graph.add_edge(file, caller, EdgeKind::Generated, time, &[])?;
            }
            Action::Rename(from, to) => {
                let source = self.read_file(from);
                self.graph.add_edge(caller, source, EdgeKind::Used, time, &[])?;
                let dest = self.write_file(to)?;
                self.graph.add_edge(dest, caller, EdgeKind::Generated, time, &[])?;
                self.graph.add_edge(
                    dest,
                    source,
                    EdgeKind::Derived,
                    time,
                    &[(OPERATION_ANNOTATION, "rename")],
                )?;
            }
        }
        Ok(Some(category))
    }

    // the live node of the calling process, created on first sight
    fn ensure_caller(&mut self, subject: &Subject) -> Result<PnodeVersion> {
        if let Some(node) = self.procs.get(&subject.pid) {
            return Ok(*node);
        }
        let ppid = self.snapshot.get(subject.pid).and_then(|info| info.ppid);
        let node = self.spawn_process(subject.pid, ppid, subject);
        self.procs.insert(subject.pid, node);
        if let Some(parent) = ppid.and_then(|ppid| self.procs.get(&ppid).copied()) {
            self.graph.add_edge(parent, node, EdgeKind::Triggered, None, &[])?;
        }
        Ok(node)
    }

    fn spawn_process(&mut self, pid: u64, ppid: Option<u64>, subject: &Subject) -> PnodeVersion {
        let key = self.new_entity();
        let idx = self.graph.ensure_node(key).idx();
        let info = self.snapshot.get(pid).cloned();

        let graph = &mut self.graph;
        let mut set = |name: &str, value: Value, scope: Scope| {
            graph.set_attribute(idx, name, value, scope);
        };
        set(TYPE_ATTR, EntityType::Proc.into(), Scope::Entity);
        set("PID", Value::from(pid), Scope::Version);
        if let Some(ppid) = ppid.or_else(|| info.as_ref().and_then(|i| i.ppid)) {
            set("PPID", Value::from(ppid), Scope::Version);
        }
        let uid = info.as_ref().and_then(|i| i.uid).unwrap_or(subject.uid);
        let gid = info.as_ref().and_then(|i| i.gid).unwrap_or(subject.gid);
        set("UID", Value::Int(uid), Scope::Version);
        set("GID", Value::Int(gid), Scope::Version);
        set("EUID", Value::Int(subject.euid), Scope::Version);
        set("EGID", Value::Int(subject.egid), Scope::Version);
        if let Some(machine) = &subject.machine_id {
            set("MACHINE", Value::from(machine.as_str()), Scope::Version);
        }
        if let Some(info) = info {
            set(NAME_ATTR, Value::from(info.command), Scope::Entity);
            set("START_TIME", Value::Int(info.start_time), Scope::Version);
        }
        debug!("process {} is {}", pid, key);
        key
    }

    // the current version of a path, created at version 0 if unseen
    fn read_file(&mut self, path: &str) -> PnodeVersion {
        let path = normalize(path);
        if let Some(node) = self.files.get(&path) {
            return *node;
        }
        let key = self.new_entity();
        let idx = self.graph.ensure_node(key).idx();
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        self.graph
            .set_attribute(idx, TYPE_ATTR, EntityType::File.into(), Scope::Entity);
        self.graph.set_attribute(idx, NAME_ATTR, Value::from(name), Scope::Entity);
        self.graph
            .set_attribute(idx, PATH_ATTR, Value::from(path.as_str()), Scope::Version);
        self.files.insert(path, key);
        key
    }

    // a new version of a path, unless the path is not versioned
    fn write_file(&mut self, path: &str) -> Result<PnodeVersion> {
        let current = self.read_file(path);
        let path = normalize(path);
        if !path.starts_with('/') || self.config.unversioned.is_match(&path) {
            return Ok(current);
        }
        let next = add_version(&mut self.graph, current)?;
        if let Some(idx) = self.graph.node_index(next) {
            self.graph
                .set_attribute(idx, PATH_ATTR, Value::from(path.as_str()), Scope::Version);
        }
        self.files.insert(path, next);
        Ok(next)
    }

    fn new_entity(&mut self) -> PnodeVersion {
        let key = PnodeVersion::new(self.next_pnode, 0);
        self.next_pnode += 1;
        key
    }
}

/// Collapses runs of `/` into one.
pub fn normalize(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' && prev_slash {
            continue;
        }
        prev_slash = c == '/';
        normalized.push(c);
    }
    normalized
}

