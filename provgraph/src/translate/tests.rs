use super::*;

use bsm::ProcInfo;

use mockall::{mock, Sequence};

use pretty_assertions::assert_eq;

mock! {
    pub Ps {}
    trait SnapshotSource {
        fn next_snapshot(&mut self) -> bsm::Result<Snapshot>;
    }
}

const SECS: u64 = 1_262_311_211;
const TRAILER: &str = "19,131";

fn header(event_id: u32, secs: u64) -> String {
    format!("20,131,11,{},0,{},512", event_id, secs)
}

fn subject(pid: u64) -> String {
    format!("36,2001,0,20,2001,20,{},{},0,10.0.0.1", pid, pid)
}

fn path(path: &str) -> String {
    format!("35,{}", path)
}

fn ret(value: i64) -> String {
    format!("39,0,{}", value)
}

fn record<P: SnapshotSource>(
    session: &mut Session<P>,
    event_id: u32,
    pid: u64,
    rest: &[String],
) -> Outcome {
    assert_eq!(Outcome::Pending, session.feed_line(&header(event_id, SECS)));
    assert_eq!(Outcome::Pending, session.feed_line(&subject(pid)));
    for line in rest {
        assert_eq!(Outcome::Pending, session.feed_line(line));
    }
    session.feed_line(TRAILER)
}

fn plain() -> Session {
    Session::new(Config::default())
}

#[test]
fn fork_triggers_child() {
    let mut session = plain();
    let lines = [
        "20,131,11,2,0,1262311211,512",
        "36,2001,0,20,2001,20,100,100,0,10.0.0.1",
        "39,0,200",
    ];
    for line in lines.iter() {
        assert_eq!(Outcome::Pending, session.feed_line(line));
    }
    assert_eq!(
        Outcome::Applied(EventCategory::Fork),
        session.feed_line("19")
    );

    let parent = session.process(100).unwrap();
    let child = session.process(200).unwrap();
    assert_ne!(parent.pnode, child.pnode);

    let graph = session.graph();
    let edge = graph.edge(parent, child, EdgeKind::Triggered).unwrap();
    assert_eq!(
        Some(&String::from("fork")),
        edge.annotations.get(OPERATION_ANNOTATION)
    );
    assert_eq!(Some("1262311211512"), edge.time());

    assert_eq!(Some(&Value::Int(200)), graph.resolve_attribute(child, "PID"));
    assert_eq!(Some(&Value::Int(100)), graph.resolve_attribute(child, "PPID"));
    assert_eq!(
        Some(&Value::from("PROC")),
        graph.resolve_attribute(child, TYPE_ATTR)
    );
    assert_eq!(0, session.dropped());
}

#[test]
fn reads_do_not_version() {
    let mut session = plain();
    let outcome = record(&mut session, 72, 100, &[path("/etc//passwd")]);
    assert_eq!(Outcome::Applied(EventCategory::OpenRead), outcome);
    record(&mut session, 72, 100, &[path("/etc/passwd")]);

    let file = session.file("/etc/passwd").unwrap();
    assert_eq!(0, file.version);
    assert_eq!(Some(file), session.file("/etc//passwd"));

    let graph = session.graph();
    assert_eq!(2, graph.node_count());
    assert_eq!(
        Some(&Value::from("/etc/passwd")),
        graph.resolve_attribute(file, PATH_ATTR)
    );
    assert_eq!(
        Some(&Value::from("passwd")),
        graph.resolve_attribute(file, NAME_ATTR)
    );
    let proc = session.process(100).unwrap();
    let used = graph.edge(proc, file, EdgeKind::Used).unwrap();
    assert_eq!(2, used.times.len());
}

#[test]
fn writes_version() {
    let mut session = plain();
    record(&mut session, 73, 100, &[path("/tmp/out")]);
    let first = session.file("/tmp/out").unwrap();
    record(&mut session, 76, 100, &[path("/tmp/out")]);
    let second = session.file("/tmp/out").unwrap();

    assert_eq!(first.pnode, second.pnode);
    assert_eq!(first.version + 1, second.version);

    let graph = session.graph();
    let proc = session.process(100).unwrap();
    assert!(graph.edge(first, second, EdgeKind::Version).is_some());
    assert!(graph
        .edge(PnodeVersion::new(first.pnode, 0), first, EdgeKind::Version)
        .is_some());
    assert!(graph.edge(first, proc, EdgeKind::Generated).is_some());
    assert!(graph.edge(second, proc, EdgeKind::Generated).is_some());
    assert_eq!(
        Some(&Value::from("/tmp/out")),
        graph.resolve_attribute(second, PATH_ATTR)
    );
}

#[test]
fn unversioned_writes() {
    let mut session = plain();
    record(&mut session, 73, 100, &[path("/dev/null")]);
    record(&mut session, 73, 100, &[path("/dev/null")]);
    assert_eq!(0, session.file("/dev/null").unwrap().version);

    record(&mut session, 73, 100, &[path("out.log")]);
    record(&mut session, 73, 100, &[path("out.log")]);
    assert_eq!(0, session.file("out.log").unwrap().version);
}

#[test]
fn rename_derives() {
    let mut session = plain();
    let outcome = record(
        &mut session,
        42,
        100,
        &[path("/home/user"), path("/tmp/a"), path("/tmp/b")],
    );
    assert_eq!(Outcome::Applied(EventCategory::Rename), outcome);

    let proc = session.process(100).unwrap();
    let a = session.file("/tmp/a").unwrap();
    let b = session.file("/tmp/b").unwrap();
    assert_eq!(0, a.version);
    assert_eq!(1, b.version);
    assert!(session.file("/home/user").is_none());

    let graph = session.graph();
    assert!(graph.edge(proc, a, EdgeKind::Used).is_some());
    assert!(graph.edge(b, proc, EdgeKind::Generated).is_some());
    let derived = graph.edge(b, a, EdgeKind::Derived).unwrap();
    assert_eq!(
        Some(&String::from("rename")),
        derived.annotations.get(OPERATION_ANNOTATION)
    );
    assert_eq!(Some("1262311211512"), derived.time());
}

#[test]
fn exit_forgets_process() {
    let mut session = plain();
    record(&mut session, 72, 100, &[path("/etc/hosts")]);
    let before = session.process(100).unwrap();
    assert_eq!(
        Outcome::Applied(EventCategory::Exit),
        record(&mut session, 1, 100, &[])
    );
    assert_eq!(None, session.process(100));
    assert!(session.graph().contains(before));

    record(&mut session, 72, 100, &[path("/etc/hosts")]);
    assert_ne!(before, session.process(100).unwrap());
}

#[test]
fn bad_records_are_dropped() {
    let mut session = plain();
    assert_eq!(Outcome::Dropped, session.feed_line("not,a,token"));
    assert_eq!(Outcome::Dropped, session.feed_line(TRAILER));

    // no subject
    session.feed_line(&header(72, SECS));
    session.feed_line(&path("/etc/passwd"));
    assert_eq!(Outcome::Dropped, session.feed_line(TRAILER));

    // fork without a return value
    assert_eq!(Outcome::Dropped, record(&mut session, 2, 100, &[]));
    assert_eq!(None, session.process(100));
    // rename with one path
    assert_eq!(Outcome::Dropped, record(&mut session, 42, 100, &[path("/tmp/a")]));

    assert_eq!(Outcome::Ignored(999), record(&mut session, 999, 100, &[]));
    assert_eq!(Outcome::Pending, session.feed_line(""));
    assert_eq!(Outcome::Pending, session.feed_line("45,1,0x0,fd"));
    assert_eq!(
        Outcome::Applied(EventCategory::OpenRead),
        record(&mut session, 72, 100, &[path("/etc/passwd")])
    );
    assert_eq!(5, session.dropped());
}

fn snapshot(valid_until: u64, procs: &[(u64, Option<u64>, &str)]) -> Snapshot {
    let mut snapshot = Snapshot::new(valid_until);
    for (pid, ppid, command) in procs {
        snapshot.procs.insert(
            *pid,
            ProcInfo {
                pid: *pid,
                ppid: *ppid,
                command: command.to_string(),
                start_time: valid_until as i64,
                uid: Some(0),
                gid: None,
            },
        );
    }
    snapshot
}

#[test]
fn enrichment_from_snapshots() {
    let mut seq = Sequence::new();
    let mut ps = MockPs::default();
    let first = snapshot(
        SECS + 10,
        &[(1, None, "/sbin/launchd"), (100, Some(1), "/bin/sh")],
    );
    ps.expect_next_snapshot()
        .times(1)
        .in_sequence(&mut seq)
        .return_once(move || Ok(first));
    ps.expect_next_snapshot()
        .times(1)
        .in_sequence(&mut seq)
        .return_once(|| Err(bsm::Error::Snapshot(String::from("bad dump"))));

    let mut session = Session::with_snapshots(Config::default(), ps);
    record(&mut session, 72, 1, &[path("/etc/rc")]);
    record(&mut session, 72, 100, &[path("/etc/profile")]);

    let init = session.process(1).unwrap();
    let shell = session.process(100).unwrap();
    {
        let graph = session.graph();
        assert_eq!(
            Some(&Value::from("/bin/sh")),
            graph.resolve_attribute(shell, NAME_ATTR)
        );
        assert_eq!(Some(&Value::Int(1)), graph.resolve_attribute(shell, "PPID"));
        assert_eq!(Some(&Value::Int(0)), graph.resolve_attribute(shell, "UID"));
        assert!(graph.edge(init, shell, EdgeKind::Triggered).is_some());
    }

    // past the horizon: the source fails once and is not asked again
    for secs in [SECS + 20, SECS + 30].iter() {
        session.feed_line(&header(72, *secs));
        session.feed_line(&subject(300));
        session.feed_line(&path("/etc/motd"));
        session.feed_line(TRAILER);
    }
    let late = session.process(300).unwrap();
    assert_eq!(None, session.graph().resolve_attribute(late, NAME_ATTR));
    assert_eq!(
        Some(&Value::Int(2001)),
        session.graph().resolve_attribute(late, "UID")
    );
}

#[test]
fn enrichment_disabled() {
    let mut ps = MockPs::default();
    ps.expect_next_snapshot().never();
    let config = Config {
        enrich: false,
        ..Config::default()
    };
    let mut session = Session::with_snapshots(config, ps);
    record(&mut session, 72, 100, &[path("/etc/passwd")]);
    assert!(session.process(100).is_some());
}

#[async_std::test]
async fn consume_stream() {
    let mut lines: Vec<String> = vec![header(2, SECS), subject(100), ret(200)];
    lines.push(TRAILER.to_string());
    lines.push(String::from("garbage"));
    lines.push(header(73, SECS));
    lines.push(subject(200));
    lines.push(path("/tmp/x"));
    lines.push(TRAILER.to_string());

    let mut session = plain();
    let stream = futures::stream::iter(lines.into_iter().map(Ok));
    let dropped = session.consume(stream).await.unwrap();
    assert_eq!(1, dropped);

    let child = session.process(200).unwrap();
    let file = session.file("/tmp/x").unwrap();
    assert!(session
        .graph()
        .edge(file, child, EdgeKind::Generated)
        .is_some());
}

#[test]
fn unterminated_records_are_dropped() {
    let mut session = plain();
    session.feed_line(&header(72, SECS));
    session.feed_line(&subject(100));
    session.feed_line(&path("/etc/lost"));
    assert_eq!(
        Outcome::Applied(EventCategory::OpenRead),
        record(&mut session, 72, 100, &[path("/etc/motd")])
    );
    assert_eq!(1, session.dropped());
    assert_eq!(None, session.file("/etc/lost"));
    assert!(session.file("/etc/motd").is_some());
}

#[async_std::test]
async fn stream_ends_inside_record() {
    let lines = vec![
        header(72, SECS),
        subject(100),
        path("/etc/passwd"),
        TRAILER.to_string(),
        header(73, SECS),
        subject(100),
        path("/tmp/half"),
    ];
    let mut session = plain();
    let stream = futures::stream::iter(lines.into_iter().map(Ok));
    assert_eq!(1, session.consume(stream).await.unwrap());
    assert_eq!(1, session.dropped());
    assert!(session.file("/etc/passwd").is_some());
    assert_eq!(None, session.file("/tmp/half"));
}

#[test]
fn path_normalization() {
    assert_eq!("/etc/passwd", normalize("/etc//passwd"));
    assert_eq!("/a/b/", normalize("///a////b//"));
    assert_eq!("rel/x", normalize("rel//x"));
}
