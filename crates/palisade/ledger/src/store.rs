//! The durable append-only store collaborator.
//!
//! The ledger defines the record format and ordering contract; the medium is
//! injected. Frames are opaque bytes addressed by a dense frame index.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Mutex, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt frame at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    #[error("frame {0} is out of bounds")]
    OutOfBounds(u64),
}

/// Durable append-only frame store.
///
/// `append` must not return until the frame is durable; the offset it
/// returns is the dense, zero-based frame index.
pub trait RecordStore: Send + Sync {
    fn append(&self, bytes: &[u8]) -> Result<u64, StoreError>;
    fn read(&self, offset: u64) -> Result<Vec<u8>, StoreError>;
    fn frame_count(&self) -> Result<u64, StoreError>;
}

/// Volatile store for tests and single-process demos.
#[derive(Default)]
pub struct InMemoryRecordStore {
    frames: RwLock<Vec<Vec<u8>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn append(&self, bytes: &[u8]) -> Result<u64, StoreError> {
        let mut frames = self.frames.write().unwrap_or_else(|e| e.into_inner());
        frames.push(bytes.to_vec());
        Ok((frames.len() - 1) as u64)
    }

    fn read(&self, offset: u64) -> Result<Vec<u8>, StoreError> {
        let frames = self.frames.read().unwrap_or_else(|e| e.into_inner());
        frames
            .get(offset as usize)
            .cloned()
            .ok_or(StoreError::OutOfBounds(offset))
    }

    fn frame_count(&self) -> Result<u64, StoreError> {
        let frames = self.frames.read().unwrap_or_else(|e| e.into_inner());
        Ok(frames.len() as u64)
    }
}

const FRAME_HEADER_LEN: u64 = 8;

/// Append-only file store with crc-framed records.
///
/// Frame layout: `[len: u32 le][crc32: u32 le][payload]`. Appends flush and
/// sync before returning, so an acknowledged frame survives a crash; a torn
/// tail from an unacknowledged write is truncated on open.
pub struct FileRecordStore {
    inner: Mutex<FileInner>,
}

struct FileInner {
    file: File,
    /// Byte position of each frame's header.
    offsets: Vec<u64>,
    end: u64,
}

impl FileRecordStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let file_len = file.seek(SeekFrom::End(0))?;
        let mut offsets = Vec::new();
        let mut pos = 0u64;

        while pos + FRAME_HEADER_LEN <= file_len {
            file.seek(SeekFrom::Start(pos))?;
            let mut header = [0u8; 8];
            file.read_exact(&mut header)?;
            let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as u64;
            let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if pos + FRAME_HEADER_LEN + len > file_len {
                break; // torn tail
            }

            let mut payload = vec![0u8; len as usize];
            file.read_exact(&mut payload)?;
            if crc32fast::hash(&payload) != crc {
                return Err(StoreError::Corrupt {
                    offset: pos,
                    reason: "crc mismatch".to_string(),
                });
            }

            offsets.push(pos);
            pos += FRAME_HEADER_LEN + len;
        }

        if pos < file_len {
            tracing::warn!(
                kept = pos,
                dropped = file_len - pos,
                "truncating torn tail from ledger store"
            );
            file.set_len(pos)?;
            file.sync_data()?;
        }

        Ok(Self {
            inner: Mutex::new(FileInner {
                file,
                offsets,
                end: pos,
            }),
        })
    }
}

impl RecordStore for FileRecordStore {
    fn append(&self, bytes: &[u8]) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let mut frame = Vec::with_capacity(bytes.len() + FRAME_HEADER_LEN as usize);
        frame.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(bytes).to_le_bytes());
        frame.extend_from_slice(bytes);

        let pos = inner.end;
        inner.file.seek(SeekFrom::Start(pos))?;
        inner.file.write_all(&frame)?;
        inner.file.flush()?;
        inner.file.sync_data()?;

        inner.offsets.push(pos);
        inner.end = pos + frame.len() as u64;
        Ok((inner.offsets.len() - 1) as u64)
    }

    fn read(&self, offset: u64) -> Result<Vec<u8>, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let pos = *inner
            .offsets
            .get(offset as usize)
            .ok_or(StoreError::OutOfBounds(offset))?;

        inner.file.seek(SeekFrom::Start(pos))?;
        let mut header = [0u8; 8];
        inner.file.read_exact(&mut header)?;
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let mut payload = vec![0u8; len];
        inner.file.read_exact(&mut payload)?;
        if crc32fast::hash(&payload) != crc {
            return Err(StoreError::Corrupt {
                offset: pos,
                reason: "crc mismatch".to_string(),
            });
        }
        Ok(payload)
    }

    fn frame_count(&self) -> Result<u64, StoreError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.offsets.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips_frames() {
        let store = InMemoryRecordStore::new();
        assert_eq!(store.append(b"alpha").unwrap(), 0);
        assert_eq!(store.append(b"beta").unwrap(), 1);
        assert_eq!(store.read(0).unwrap(), b"alpha");
        assert_eq!(store.read(1).unwrap(), b"beta");
        assert_eq!(store.frame_count().unwrap(), 2);
        assert!(matches!(store.read(2), Err(StoreError::OutOfBounds(2))));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.bin");

        {
            let store = FileRecordStore::open(&path).unwrap();
            store.append(b"alpha").unwrap();
            store.append(b"beta").unwrap();
        }

        let store = FileRecordStore::open(&path).unwrap();
        assert_eq!(store.frame_count().unwrap(), 2);
        assert_eq!(store.read(0).unwrap(), b"alpha");
        assert_eq!(store.read(1).unwrap(), b"beta");
    }

    #[test]
    fn torn_tail_is_truncated_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.bin");

        {
            let store = FileRecordStore::open(&path).unwrap();
            store.append(b"alpha").unwrap();
        }

        // Simulate a crash mid-write: a header claiming more bytes than the
        // file holds.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&42u32.to_le_bytes()).unwrap();
            file.write_all(&0u32.to_le_bytes()).unwrap();
            file.write_all(b"partial").unwrap();
        }

        let store = FileRecordStore::open(&path).unwrap();
        assert_eq!(store.frame_count().unwrap(), 1);
        assert_eq!(store.read(0).unwrap(), b"alpha");

        // The store keeps accepting appends after truncation.
        assert_eq!(store.append(b"gamma").unwrap(), 1);
    }

    #[test]
    fn corrupted_payload_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.bin");

        {
            let store = FileRecordStore::open(&path).unwrap();
            store.append(b"alpha").unwrap();
        }

        // Flip a payload byte in place.
        {
            let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(FRAME_HEADER_LEN)).unwrap();
            file.write_all(b"X").unwrap();
        }

        assert!(matches!(
            FileRecordStore::open(&path),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
