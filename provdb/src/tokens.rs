use crate::attr::read_str;
use crate::{Error, Result};

use std::collections::HashMap;
use std::convert::TryInto;

/// Interned strings of the multi-string attributes, keyed by record number.
#[derive(Debug, Clone, Default)]
pub struct TokenDict {
    tokens: HashMap<u32, String>,
    ids: HashMap<String, u32>,
    next: u32,
}

impl TokenDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one record of the token store: a 4-byte record number and the string.
    pub fn insert_record(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let id: [u8; 4] = key.try_into().map_err(|_| {
            Error::malformed(format!(
                "token record number should be 4 bytes, got {}",
                key.len()
            ))
        })?;
        self.insert(u32::from_le_bytes(id), read_str(value)?);
        Ok(())
    }

    pub fn insert(&mut self, id: u32, token: String) {
        self.ids.entry(token.clone()).or_insert(id);
        self.tokens.insert(id, token);
        if id >= self.next {
            self.next = id + 1;
        }
    }

    /// Returns the id of `token`, appending it if it is new.
    pub fn intern(&mut self, token: &str) -> u32 {
        if let Some(id) = self.ids.get(token) {
            return *id;
        }
        let id = self.next;
        self.insert(id, token.to_string());
        id
    }

    pub fn get(&self, id: u32) -> Option<&str> {
        self.tokens.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// All (id, token) pairs in id order.
    pub fn records(&self) -> Vec<(u32, &str)> {
        let mut records: Vec<_> = self
            .tokens
            .iter()
            .map(|(id, token)| (*id, token.as_str()))
            .collect();
        records.sort_unstable_by_key(|(id, _)| *id);
        records
    }
}
