use super::*;

use provdb::{ErrorKind, MemStore};

use pretty_assertions::assert_eq;

fn key(pnode: u64, version: u32) -> PnodeVersion {
    PnodeVersion::new(pnode, version)
}

struct Fixture {
    dataset: Dataset,
    tokens: TokenDict,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dataset: Dataset::new(),
            tokens: TokenDict::new(),
        }
    }

    // child -> parent in one store, parent -> child in the other
    fn link(&mut self, parent: PnodeVersion, child: PnodeVersion) -> &mut Self {
        self.dataset
            .parent
            .insert(child.to_bytes().to_vec(), parent.to_bytes().to_vec());
        self.dataset
            .child
            .insert(parent.to_bytes().to_vec(), child.to_bytes().to_vec());
        self
    }

    fn attr(&mut self, node: PnodeVersion, record: AttrRecord) -> &mut Self {
        let value = record.encode(true, &mut self.tokens);
        self.dataset.prov.insert(node.to_bytes().to_vec(), value);
        self
    }

    fn raw_attr(&mut self, node: PnodeVersion, value: Vec<u8>) -> &mut Self {
        self.dataset.prov.insert(node.to_bytes().to_vec(), value);
        self
    }

    fn typed(&mut self, pnode: u64, ty: &str) -> &mut Self {
        self.attr(key(pnode, 0), AttrRecord::new(AttrName::Type, Value::from(ty)))
    }

    fn load(&mut self) -> Result<ProvenanceGraph> {
        let mut tnum2tok = MemStore::new(provdb::store::TNUM2TOK_DB);
        for (id, token) in self.tokens.records() {
            tnum2tok.insert(id.to_le_bytes().to_vec(), token.as_bytes().to_vec());
        }
        self.dataset.tnum2tok = tnum2tok;
        load(&self.dataset)
    }
}

// a shell that read a file, then ran ls
fn session() -> Fixture {
    let mut fixture = Fixture::new();
    fixture
        .link(key(1, 0), key(1, 1))
        .link(key(2, 0), key(1, 1))
        .link(key(1, 1), key(3, 0))
        .typed(1, "PROC")
        .attr(key(1, 0), AttrRecord::new(AttrName::Name, Value::from("sh")))
        .attr(key(1, 1), AttrRecord::new(AttrName::Pid, Value::Int(100)))
        .attr(
            key(1, 1),
            AttrRecord::new(AttrName::Input, Value::from(key(2, 0))).ancestry(),
        )
        .typed(2, "FILE")
        .attr(key(2, 0), AttrRecord::new(AttrName::Path, Value::from("/etc/profile")))
        .typed(3, "PROC")
        .attr(
            key(3, 0),
            AttrRecord::new(
                AttrName::Argv,
                Value::StrList(vec!["ls".into(), "-l".into()]),
            ),
        )
        .attr(
            key(3, 0),
            AttrRecord::new(AttrName::ForkParent, Value::from(key(1, 1))).ancestry(),
        );
    fixture
}

#[test]
fn joins_adjacency_and_attributes() {
    let graph = session().load().unwrap();
    assert_eq!(4, graph.node_count());
    assert_eq!(0, graph.count_edges(EdgeKind::Ancestry));

    assert!(graph.edge(key(1, 0), key(1, 1), EdgeKind::Version).is_some());
    let input = graph.edge(key(2, 0), key(1, 1), EdgeKind::Input).unwrap();
    assert_eq!(Some(&String::from("INPUT")), input.annotations.get(OPERATION_ANNOTATION));
    let fork = graph
        .edge(key(1, 1), key(3, 0), EdgeKind::ForkParent)
        .unwrap();
    assert_eq!(
        Some(&String::from("FORKPARENT")),
        fork.annotations.get(OPERATION_ANNOTATION)
    );

    assert_eq!(
        Some(&Value::from("sh")),
        graph.resolve_attribute(key(1, 1), NAME_ATTR)
    );
    assert_eq!(Some(&Value::Int(100)), graph.resolve_attribute(key(1, 1), "PID"));
    assert_eq!(None, graph.resolve_attribute(key(1, 0), "PID"));
    assert_eq!(
        Some(&Value::StrList(vec!["ls".into(), "-l".into()])),
        graph.resolve_attribute(key(3, 0), "ARGV")
    );
    // ancestry records become edges, not attributes
    assert_eq!(None, graph.resolve_attribute(key(1, 1), "INPUT"));
}

#[test]
fn fills_version_gaps() {
    let mut fixture = Fixture::new();
    fixture
        .typed(5, "FILE")
        .attr(key(5, 3), AttrRecord::new(AttrName::Path, Value::from("/tmp/x")));
    let graph = fixture.load().unwrap();

    assert_eq!(
        vec![0, 1, 2, 3],
        graph.versions(5).unwrap().keys().copied().collect::<Vec<_>>()
    );
    for v in 0..3 {
        assert!(graph.edge(key(5, v), key(5, v + 1), EdgeKind::Version).is_some());
    }
    assert_eq!(3, graph.edge_count());
}

#[test]
fn loading_is_deterministic() {
    let mut fixture = session();
    let first = fixture.load().unwrap();
    let second = fixture.load().unwrap();

    let nodes = |graph: &ProvenanceGraph| {
        graph
            .entities()
            .flat_map(|(_, versions)| versions.values())
            .map(|idx| {
                let attrs: Vec<(String, Value)> = graph
                    .resolved_attributes(*idx)
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect();
                (graph[*idx].key, attrs)
            })
            .collect::<Vec<_>>()
    };
    let edges = |graph: &ProvenanceGraph| {
        graph
            .edges()
            .map(|(from, to, edge)| (from, to, edge.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(nodes(&first), nodes(&second));
    assert_eq!(edges(&first), edges(&second));
}

#[test]
fn unresolved_adjacency_stays_generic() {
    let mut fixture = Fixture::new();
    fixture.link(key(1, 0), key(2, 0)).typed(1, "PROC").typed(2, "PIPE");
    let graph = fixture.load().unwrap();
    assert!(graph.edge(key(1, 0), key(2, 0), EdgeKind::Ancestry).is_some());
    assert_eq!(1, graph.count_edges(EdgeKind::Ancestry));
}

#[test]
fn child_store_only_adjacency() {
    let mut fixture = Fixture::new();
    fixture
        .dataset
        .child
        .insert(key(1, 0).to_bytes().to_vec(), key(2, 0).to_bytes().to_vec());
    fixture.typed(1, "PROC").typed(2, "DIR");
    let graph = fixture.load().unwrap();
    assert!(graph.edge(key(1, 0), key(2, 0), EdgeKind::Ancestry).is_some());
}

#[test]
fn ancestry_without_adjacency() {
    let mut fixture = Fixture::new();
    fixture.typed(1, "FILE").typed(2, "PROC").attr(
        key(2, 0),
        AttrRecord::new(AttrName::Input, Value::from(key(1, 0))).ancestry(),
    );
    let graph = fixture.load().unwrap();
    assert!(graph.edge(key(1, 0), key(2, 0), EdgeKind::Input).is_some());
}

#[test]
fn ancestry_to_missing_node() {
    let mut fixture = Fixture::new();
    fixture.typed(2, "PROC").attr(
        key(2, 0),
        AttrRecord::new(AttrName::ForkParent, Value::from(key(9, 4))).ancestry(),
    );
    match fixture.load() {
        Err(Error::Inconsistent { store, key: k, source }) => {
            assert_eq!("prov", store);
            assert_eq!(key(2, 0).to_bytes().to_vec(), k);
            match *source {
                Error::MissingNode(missing) => assert_eq!(key(9, 4), missing),
                other => panic!("unexpected {}", other),
            }
        }
        other => panic!("unexpected {:?}", other.map(|g| g.node_count())),
    }
}

#[test]
fn versions_out_of_range() {
    let mut fixture = session();
    fixture.attr(
        key(2, u32::MAX),
        AttrRecord::new(AttrName::Path, Value::from("/etc/profile")),
    );
    match fixture.load() {
        Err(Error::Load { store, key: k, source }) => {
            assert_eq!("prov", store);
            assert_eq!(key(2, u32::MAX).to_bytes().to_vec(), k);
            assert_eq!(ErrorKind::MalformedRecord, source.kind());
        }
        other => panic!("unexpected {:?}", other.map(|g| g.node_count())),
    }

    let mut fixture = session();
    fixture.link(key(1, MAX_VERSION + 1), key(3, 0));
    match fixture.load() {
        Err(Error::Load { store, .. }) => assert_eq!("parent", store),
        other => panic!("unexpected {:?}", other.map(|g| g.node_count())),
    }

    assert!(check_version("prov", &[], key(7, MAX_VERSION)).is_ok());
}

#[test]
fn malformed_record_aborts() {
    let mut fixture = session();
    fixture.raw_attr(key(2, 0), vec![2, 1, 4, 0, 9, 0, 0, 0, b'/']);
    match fixture.load() {
        Err(Error::Load { store, key: k, source }) => {
            assert_eq!("prov", store);
            assert_eq!(key(2, 0).to_bytes().to_vec(), k);
            assert_eq!(ErrorKind::MalformedRecord, source.kind());
        }
        other => panic!("unexpected {:?}", other.map(|g| g.node_count())),
    }
}

#[test]
fn unknown_attribute_aborts() {
    let mut fixture = session();
    let mut value = vec![0, 1];
    value.extend_from_slice(&5u16.to_le_bytes());
    value.extend_from_slice(&1u32.to_le_bytes());
    value.extend_from_slice(b"COLORx");
    fixture.raw_attr(key(1, 0), value);
    match fixture.load() {
        Err(Error::Load { source, .. }) => {
            assert_eq!(ErrorKind::UnknownAttribute, source.kind())
        }
        other => panic!("unexpected {:?}", other.map(|g| g.node_count())),
    }
}

#[test]
fn bad_adjacency_key() {
    let mut fixture = session();
    fixture.dataset.parent.insert(vec![1, 2, 3], key(1, 0).to_bytes().to_vec());
    match fixture.load() {
        Err(Error::Load { store, .. }) => assert_eq!("parent", store),
        other => panic!("unexpected {:?}", other.map(|g| g.node_count())),
    }
}

#[test]
fn type_is_required() {
    let mut fixture = session();
    fixture.attr(key(4, 1), AttrRecord::new(AttrName::Pid, Value::Int(1)));
    match fixture.load() {
        Err(Error::Inconsistent { store, key: k, source }) => {
            assert_eq!("prov", store);
            assert_eq!(key(4, 0).to_bytes().to_vec(), k);
            match *source {
                Error::MissingType(4) => (),
                other => panic!("unexpected {}", other),
            }
        }
        other => panic!("unexpected {:?}", other.map(|g| g.node_count())),
    }

    let mut fixture = session();
    fixture.typed(4, "SOCKET");
    let err = fixture.load().map(|g| g.node_count()).unwrap_err();
    assert_eq!(
        "prov store, key 040000000000000000000000: entity 4 has invalid TYPE \"SOCKET\"",
        err.to_string()
    );
}
