//! Ordered key-value stores and the dataset grouping them.


use crate::{Error, Result};

use log::debug;

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// child -> parent adjacency, keyed by the child's (pnode, version)
pub const PARENT_DB: &str = "parent";
/// parent -> child adjacency, keyed by the parent's (pnode, version)
pub const CHILD_DB: &str = "child";
/// (pnode, version) -> attribute record, many records per key
pub const PROV_DB: &str = "prov";
/// record number -> token
pub const TNUM2TOK_DB: &str = "tnum2tok";

pub const DUMP_EXT: &str = "dump";

const LEN_SZ: usize = 4;

pub type Records<'a> = Box<dyn Iterator<Item = Result<(&'a [u8], &'a [u8])>> + 'a>;

/// A key-value store iterated in key order.
///
/// Duplicate keys are allowed and come back in insertion order.
pub trait Store {
    fn name(&self) -> &str;
    fn records(&self) -> Records<'_>;
}

#[derive(Debug, Clone, Default)]
pub struct MemStore {
    name: String,
    records: Vec<(Vec<u8>, Vec<u8>)>,
}

impl MemStore {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            records: vec![],
        }
    }

    pub fn insert<K, V>(&mut self, key: K, value: V)
    where
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        let key = key.into();
        // after every existing duplicate of the key
        let pos = self.records.partition_point(|(k, _)| *k <= key);
        self.records.insert(pos, (key, value.into()));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Reads a flat dump: repeated `u32` key length, key, `u32` value length, value.
    pub fn read_dump<S, R>(name: S, reader: R) -> Result<Self>
    where
        S: Into<String>,
        R: Read,
    {
        let mut store = Self::new(name);
        let mut reader = BufReader::new(reader);
        while let Some(key) = read_chunk(&mut reader, true)? {
            let value = read_chunk(&mut reader, false)?.ok_or_else(|| {
                Error::malformed(format!("{}: dump ends after a key", store.name))
            })?;
            store.records.push((key, value));
        }
        // dumps come from ordered stores already, but do not rely on it
        store.records.sort_by(|(a, _), (b, _)| a.cmp(b));
        debug!("read {} records of {}", store.records.len(), store.name);
        Ok(store)
    }

    pub fn write_dump<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = BufWriter::new(writer);
        for (key, value) in &self.records {
            writer.write_all(&(key.len() as u32).to_le_bytes())?;
            writer.write_all(key)?;
            writer.write_all(&(value.len() as u32).to_le_bytes())?;
            writer.write_all(value)?;
        }
        writer.flush()?;
        Ok(())
    }
}

// `Ok(None)` on a clean end of input, only allowed where a key would start
fn read_chunk<R: Read>(reader: &mut R, eof_ok: bool) -> Result<Option<Vec<u8>>> {
    let mut len = [0u8; LEN_SZ];
    let mut filled = 0;
    while filled < LEN_SZ {
        match reader.read(&mut len[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    if filled == 0 && eof_ok {
        return Ok(None);
    }
    if filled < LEN_SZ {
        return Err(Error::malformed("truncated length prefix"));
    }
    let mut buf = vec![0u8; u32::from_le_bytes(len) as usize];
    reader.read_exact(&mut buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::malformed("truncated record"),
        _ => e.into(),
    })?;
    Ok(Some(buf))
}

impl Store for MemStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn records(&self) -> Records<'_> {
        Box::new(
            self.records
                .iter()
                .map(|(k, v)| Ok((k.as_slice(), v.as_slice()))),
        )
    }
}

/// The four stores of one provenance dataset.
#[derive(Debug, Clone)]
pub struct Dataset<S = MemStore> {
    pub parent: S,
    pub child: S,
    pub prov: S,
    pub tnum2tok: S,
}

impl Dataset<MemStore> {
    pub fn new() -> Self {
        Self {
            parent: MemStore::new(PARENT_DB),
            child: MemStore::new(CHILD_DB),
            prov: MemStore::new(PROV_DB),
            tnum2tok: MemStore::new(TNUM2TOK_DB),
        }
    }

    /// Reads `parent.dump`, `child.dump`, `prov.dump` and `tnum2tok.dump` from `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let open = |name: &str| -> Result<MemStore> {
            let path = dir.join(name).with_extension(DUMP_EXT);
            MemStore::read_dump(name, File::open(path)?)
        };
        Ok(Self {
            parent: open(PARENT_DB)?,
            child: open(CHILD_DB)?,
            prov: open(PROV_DB)?,
            tnum2tok: open(TNUM2TOK_DB)?,
        })
    }
}

impl Default for Dataset<MemStore> {
    fn default() -> Self {
        Self::new()
    }
}
