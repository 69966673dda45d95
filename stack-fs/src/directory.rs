//! # Directories
//!
//! A directory is a name to inode mapping kept in the data of its own inode.
//! It always holds `.` and `..`.

use std::collections::BTreeMap;

use crate::layout::{parse_records, serialize_records, InodeId};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    id: InodeId,
    entries: BTreeMap<String, InodeId>,
}

impl Directory {
    pub fn new(id: InodeId, parent: InodeId) -> Self {
        let entries = BTreeMap::from([(".".to_owned(), id), ("..".to_owned(), parent)]);
        Self { id, entries }
    }

    /// Inode holding the directory.
    #[inline]
    pub fn id(&self) -> InodeId {
        self.id
    }

    #[inline]
    pub fn parent(&self) -> Option<InodeId> {
        self.entries.get("..").copied()
    }

    pub fn search(&self, name: &str) -> Result<InodeId> {
        self.entries.get(name).copied().ok_or(Error::NoSuchEntry)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn insert(&mut self, name: &str, id: InodeId) -> Result<()> {
        if self.entries.contains_key(name) {
            return Err(Error::AlreadyExists);
        }
        self.entries.insert(name.to_owned(), id);

        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<InodeId> {
        self.entries.remove(name).ok_or(Error::NoSuchEntry)
    }

    pub fn set_parent(&mut self, parent: InodeId) {
        self.entries.insert("..".to_owned(), parent);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Only `.` and `..` left.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.len() == 2
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, InodeId)> {
        self.entries.iter().map(|(name, &id)| (name.as_str(), id))
    }

    pub fn serialize(&self, block_size: usize) -> Result<Vec<u8>> {
        serialize_records(self.iter(), block_size)
    }

    pub fn parse(id: InodeId, data: &[u8], block_size: usize) -> Result<Self> {
        let entries = parse_records(data, block_size)?.into_iter().collect();
        Ok(Self { id, entries })
    }
}
