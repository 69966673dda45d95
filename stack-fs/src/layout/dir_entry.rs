//! Directory records
//!
//! A directory's data is a sequence of `{length: u16, inode: u64, name, NUL}`
//! records. `length` covers the whole record. A record never straddles a
//! block: the tail of a block that cannot hold the next record is zero-filled,
//! so a zero `length` means "continue with the next block". Records naming
//! inode 0 are tombstones.

use std::io::{self, Cursor};

use binrw::{binrw, BinRead, BinWrite, NullString};

use super::InodeId;
use crate::{Error, Result};

/// Bytes of a record in front of the name.
pub const RECORD_HEADER: usize = 2 + 8;

/// Longest name a directory on a device with `block_size` blocks can store.
#[inline]
pub fn name_max(block_size: usize) -> usize {
    255.min(block_size - RECORD_HEADER - 1)
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirRecord {
    pub length: u16,
    pub inode: InodeId,
    pub name: NullString,
}

impl DirRecord {
    pub fn new(name: &str, inode: InodeId) -> Self {
        Self {
            length: (RECORD_HEADER + name.len() + 1) as u16,
            inode,
            name: NullString(name.as_bytes().to_vec()),
        }
    }

    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.inode == InodeId::default()
    }
}

fn corrupted(msg: String) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::InvalidData, msg))
}

/// Lays `entries` out block by block.
pub fn serialize_records<'a>(
    entries: impl IntoIterator<Item = (&'a str, InodeId)>,
    block_size: usize,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for (name, inode) in entries {
        let record = DirRecord::new(name, inode);
        let length = record.length as usize;
        debug_assert!(length <= block_size);

        let used = out.len() % block_size;
        if used + length > block_size {
            out.resize(out.len() + block_size - used, 0);
        }

        let mut cursor = Cursor::new(&mut out);
        cursor.set_position(cursor.get_ref().len() as u64);
        record.write(&mut cursor)?;
    }

    Ok(out)
}

/// Live records of a directory's data, each with its byte offset.
fn live_records(data: &[u8], block_size: usize) -> Result<Vec<(usize, DirRecord)>> {
    let mut records = Vec::new();

    for (block_index, chunk) in data.chunks(block_size).enumerate() {
        let mut pos = 0;
        while pos + 2 <= chunk.len() {
            let length = u16::from_le_bytes([chunk[pos], chunk[pos + 1]]) as usize;
            if length == 0 {
                break;
            }
            if length <= RECORD_HEADER || pos + length > chunk.len() {
                return Err(corrupted(format!(
                    "bad directory record length {length} at block {block_index} offset {pos}"
                )));
            }

            let record = DirRecord::read(&mut Cursor::new(&chunk[pos..pos + length]))?;
            if !record.is_tombstone() {
                records.push((block_index * block_size + pos, record));
            }
            pos += length;
        }
    }

    Ok(records)
}

/// Parses the live records of a directory's data.
pub fn parse_records(data: &[u8], block_size: usize) -> Result<Vec<(String, InodeId)>> {
    live_records(data, block_size)?
        .into_iter()
        .map(|(_, record)| {
            let name = String::from_utf8(record.name.0)
                .map_err(|err| corrupted(format!("directory entry name: {err}")))?;
            Ok((name, record.inode))
        })
        .collect()
}

/// Byte offset of the live record named `name`.
pub fn find_record(data: &[u8], block_size: usize, name: &str) -> Result<Option<usize>> {
    let found = live_records(data, block_size)?
        .into_iter()
        .find(|(_, record)| record.name.0 == name.as_bytes());

    Ok(found.map(|(offset, _)| offset))
}

/// Turns the record at `offset` into a tombstone.
pub fn bury_record(block: &mut [u8], offset: usize) {
    block[offset + 2..offset + RECORD_HEADER].fill(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_bytes() {
        let data = serialize_records([("ab", InodeId::new(3))], 256).unwrap();
        assert_eq!(data.len(), RECORD_HEADER + 3);
        assert_eq!(&data[..2], &13u16.to_le_bytes());
        assert_eq!(&data[2..10], &3u64.to_le_bytes());
        assert_eq!(&data[10..], b"ab\0");
    }

    #[test]
    fn records_never_straddle_blocks() {
        let names: Vec<String> = (0..40).map(|i| format!("entry-{i:04}")).collect();
        let entries = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), InodeId::new(i as u64 + 2)));
        let data = serialize_records(entries, 64).unwrap();

        // 21-byte records, three per 64-byte block
        assert_eq!(data.len(), 13 * 64 + 21);
        assert!(data[63] == 0 && data[62] == 0);

        let parsed = parse_records(&data, 64).unwrap();
        assert_eq!(parsed.len(), 40);
        assert_eq!(parsed[39], ("entry-0039".to_owned(), InodeId::new(41)));
    }

    #[test]
    fn tombstones_are_skipped() {
        let mut data = serialize_records(
            [
                ("keep", InodeId::new(5)),
                ("gone", InodeId::new(6)),
                ("last", InodeId::new(7)),
            ],
            256,
        )
        .unwrap();
        // zero the inode of the second record
        let second = RECORD_HEADER + 5;
        data[second + 2..second + 10].fill(0);

        let parsed = parse_records(&data, 256).unwrap();
        let names: Vec<_> = parsed.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["keep", "last"]);
    }

    #[test]
    fn records_are_found_and_buried() {
        let names: Vec<String> = (0..6).map(|i| format!("entry-{i:04}")).collect();
        let entries = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), InodeId::new(i as u64 + 2)));
        let mut data = serialize_records(entries, 64).unwrap();

        // third record opens the second block
        let offset = find_record(&data, 64, "entry-0003").unwrap().unwrap();
        assert_eq!(offset, 64);
        assert_eq!(find_record(&data, 64, "entry-9999").unwrap(), None);

        bury_record(&mut data, offset);
        assert_eq!(find_record(&data, 64, "entry-0003").unwrap(), None);
        let parsed = parse_records(&data, 64).unwrap();
        assert_eq!(parsed.len(), 5);
        assert!(parsed.iter().all(|(name, _)| name != "entry-0003"));
    }

    #[test]
    fn bad_length_is_rejected() {
        let mut data = serialize_records([("x", InodeId::new(2))], 256).unwrap();
        data[0] = 200;
        assert!(parse_records(&data, 256).is_err());
    }

    #[test]
    fn longest_name() {
        assert_eq!(name_max(4096), 255);
        assert_eq!(name_max(256), 245);
    }
}
