//! Directory and AppFS listing records.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use thiserror::Error;

use crate::protocol::constants::{ENTRY_TYPE_DIRECTORY, ENTRY_TYPE_FILE};

#[derive(Error, Debug)]
pub enum ListingError {
    #[error("Truncated {record} record at offset {offset}")]
    Truncated { record: &'static str, offset: u64 },
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Other(u8),
}

impl EntryKind {
    pub fn from_u8(v: u8) -> Self {
        match v {
            ENTRY_TYPE_FILE => EntryKind::File,
            ENTRY_TYPE_DIRECTORY => EntryKind::Directory,
            other => EntryKind::Other(other),
        }
    }
}

/// Result of the device-side `stat()` for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryStat {
    pub size: u32,
    /// Seconds since the Unix epoch.
    pub modified: u64,
}

/// One `FSLS` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub kind: EntryKind,
    pub name: Vec<u8>,
    /// `None` when the device could not stat the entry.
    pub stat: Option<EntryStat>,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// One `APPL` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppEntry {
    pub name: Vec<u8>,
    pub title: Vec<u8>,
    pub version: u16,
    pub size: u32,
}

impl AppEntry {
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    pub fn title_lossy(&self) -> String {
        String::from_utf8_lossy(&self.title).into_owned()
    }
}

fn read_bytes(cursor: &mut Cursor<&[u8]>, len: usize) -> std::io::Result<Vec<u8>> {
    let left = cursor.get_ref().len() - cursor.position() as usize;
    if len > left {
        return Err(std::io::ErrorKind::UnexpectedEof.into());
    }
    let mut buf = vec![0u8; len];
    cursor.read_exact(&mut buf)?;
    Ok(buf)
}

fn remaining(cursor: &Cursor<&[u8]>) -> bool {
    (cursor.position() as usize) < cursor.get_ref().len()
}

/// Decode an `FSLS` payload.
///
/// Layout per record: type u8, name_len u32, name, stat_res u32, size u32,
/// modified u64.
pub fn decode_directory(payload: &[u8]) -> Result<Vec<DirEntry>, ListingError> {
    let mut cursor = Cursor::new(payload);
    let mut entries = Vec::new();

    while remaining(&cursor) {
        let offset = cursor.position();
        let entry = read_dir_entry(&mut cursor).map_err(|_| ListingError::Truncated {
            record: "directory",
            offset,
        })?;
        entries.push(entry);
    }

    Ok(entries)
}

fn read_dir_entry(cursor: &mut Cursor<&[u8]>) -> std::io::Result<DirEntry> {
    let kind = EntryKind::from_u8(cursor.read_u8()?);
    let name_len = cursor.read_u32::<LittleEndian>()? as usize;
    let name = read_bytes(cursor, name_len)?;
    let stat_res = cursor.read_u32::<LittleEndian>()?;
    let size = cursor.read_u32::<LittleEndian>()?;
    let modified = cursor.read_u64::<LittleEndian>()?;

    let stat = (stat_res == 0).then_some(EntryStat { size, modified });
    Ok(DirEntry { kind, name, stat })
}

/// Decode an `APPL` payload.
///
/// Layout per record: name_len u16, name, title_len u16, title, version u16,
/// size u32.
pub fn decode_apps(payload: &[u8]) -> Result<Vec<AppEntry>, ListingError> {
    let mut cursor = Cursor::new(payload);
    let mut apps = Vec::new();

    while remaining(&cursor) {
        let offset = cursor.position();
        let app = read_app_entry(&mut cursor).map_err(|_| ListingError::Truncated {
            record: "app",
            offset,
        })?;
        apps.push(app);
    }

    Ok(apps)
}

fn read_app_entry(cursor: &mut Cursor<&[u8]>) -> std::io::Result<AppEntry> {
    let name_len = cursor.read_u16::<LittleEndian>()? as usize;
    let name = read_bytes(cursor, name_len)?;
    let title_len = cursor.read_u16::<LittleEndian>()? as usize;
    let title = read_bytes(cursor, title_len)?;
    let version = cursor.read_u16::<LittleEndian>()?;
    let size = cursor.read_u32::<LittleEndian>()?;
    Ok(AppEntry {
        name,
        title,
        version,
        size,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn dir_record(kind: u8, name: &[u8], stat: Option<(u32, u64)>) -> Vec<u8> {
        let mut out = vec![kind];
        out.extend_from_slice(&(name.len() as u32).to_le_bytes());
        out.extend_from_slice(name);
        let (res, size, modified) = match stat {
            Some((size, modified)) => (0u32, size, modified),
            None => (0xFFFF_FFFF, 0, 0),
        };
        out.extend_from_slice(&res.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&modified.to_le_bytes());
        out
    }

    pub(crate) fn app_record(name: &[u8], title: &[u8], version: u16, size: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(&(title.len() as u16).to_le_bytes());
        out.extend_from_slice(title);
        out.extend_from_slice(&version.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out
    }

    #[test]
    fn test_decode_directory() {
        let mut payload = dir_record(2, b"apps", Some((0, 1_650_000_000)));
        payload.extend(dir_record(1, b"config.json", Some((512, 1_660_000_000))));
        payload.extend(dir_record(1, b"broken", None));

        let entries = decode_directory(&payload).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_dir());
        assert_eq!(entries[0].name, b"apps");
        assert_eq!(entries[1].kind, EntryKind::File);
        assert_eq!(
            entries[1].stat,
            Some(EntryStat {
                size: 512,
                modified: 1_660_000_000
            })
        );
        assert_eq!(entries[2].stat, None);
    }

    #[test]
    fn test_decode_empty_directory() {
        assert!(decode_directory(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_directory_record() {
        let mut payload = dir_record(1, b"ok", Some((1, 2)));
        let broken = dir_record(1, b"cut", Some((1, 2)));
        payload.extend_from_slice(&broken[..10]);

        match decode_directory(&payload) {
            Err(ListingError::Truncated { record, offset }) => {
                assert_eq!(record, "directory");
                assert_eq!(offset, 23);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_decode_apps() {
        let mut payload = app_record(b"snake", b"Snake", 3, 123_456);
        payload.extend(app_record(b"doom", b"", 1, 900_000));

        let apps = decode_apps(&payload).unwrap();
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].name_lossy(), "snake");
        assert_eq!(apps[0].title_lossy(), "Snake");
        assert_eq!(apps[0].version, 3);
        assert_eq!(apps[1].size, 900_000);
        assert!(apps[1].title.is_empty());
    }

    #[test]
    fn test_truncated_app_record() {
        let payload = app_record(b"snake", b"Snake", 3, 1);
        assert!(decode_apps(&payload[..payload.len() - 1]).is_err());
    }
}
