//! File-backed log store
//!
//! Every committed [`WriteBatch`] is appended to a single log file as one
//! CRC-checked frame (see [`crate::format`]). The writing side keeps only the
//! file and its end offset; reads go through [`LogStore::read`], which
//! replays the file into a [`LogSnapshot`].
//!
//! ## Recovery
//!
//! Opening an existing log replays every frame:
//! - a torn final frame (short write, or bad checksum on the last frame) is
//!   truncated and logged
//! - a bad frame followed by more data is corruption and fails the open
//!
//! ## Durability
//!
//! [`SyncMode`] decides when commits are fsynced. [`DurableStore::close`]
//! always fsyncs, so a clean shutdown never loses data. A commit that fails
//! its write or its fsync is cut back off the file, so an `Err` from
//! `commit` means the batch will not replay.

use crate::durability::SyncMode;
use crate::error::{Result, StoreError};
use crate::format::{self, FrameError, LOG_HEADER_SIZE};
use crate::traits::{DurableStore, StoreReader, WriteBatch, WriteOp};
use rustc_hash::FxHashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the log file inside a store directory
pub const LOG_FILE_NAME: &str = "trace.log";

type Partitions = FxHashMap<String, FxHashMap<String, Vec<u8>>>;

/// What replay found in an existing log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryInfo {
    /// Frames replayed
    pub frames: u64,
    /// Bytes discarded from a torn tail
    pub torn_bytes: u64,
}

struct Replay {
    valid_len: u64,
    info: RecoveryInfo,
}

/// Append-only, file-backed [`DurableStore`]
pub struct LogStore {
    dir: PathBuf,
    file: File,
    sync: SyncMode,
    unsynced: usize,
    end_offset: u64,
    appended: u64,
    recovery: RecoveryInfo,
    #[cfg(test)]
    fail_next_sync: bool,
}

impl LogStore {
    /// Open (or create) the store in `dir`
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if the directory or file cannot be
    /// created or opened, [`StoreError::Corruption`] if replay finds damage
    /// before the tail.
    pub fn open(dir: impl AsRef<Path>, sync: SyncMode) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let unavailable = |source| StoreError::Unavailable {
            path: dir.clone(),
            source,
        };

        fs::create_dir_all(&dir).map_err(unavailable)?;
        let path = dir.join(LOG_FILE_NAME);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(unavailable)?;

        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let replay = if buf.is_empty() {
            file.write_all(&format::encode_header())?;
            file.sync_all()?;
            Replay {
                valid_len: LOG_HEADER_SIZE as u64,
                info: RecoveryInfo::default(),
            }
        } else {
            // Validate only; the writing side never reads its own data.
            let replay = replay(&buf, |_| {})?;
            if replay.info.torn_bytes > 0 {
                file.set_len(replay.valid_len)?;
                file.sync_all()?;
            }
            replay
        };
        file.seek(SeekFrom::Start(replay.valid_len))?;

        info!(
            path = %path.display(),
            frames = replay.info.frames,
            torn_bytes = replay.info.torn_bytes,
            sync = sync.description(),
            "Log store opened"
        );

        Ok(LogStore {
            dir,
            file,
            sync,
            unsynced: 0,
            end_offset: replay.valid_len,
            appended: 0,
            recovery: replay.info,
            #[cfg(test)]
            fail_next_sync: false,
        })
    }

    /// Replay the log in `dir` without opening it for writing
    pub fn read(dir: impl AsRef<Path>) -> Result<LogSnapshot> {
        let dir = dir.as_ref().to_path_buf();
        let path = dir.join(LOG_FILE_NAME);
        let buf = fs::read(&path).map_err(|source| StoreError::Unavailable {
            path: path.clone(),
            source,
        })?;
        let mut partitions = Partitions::default();
        let replay = replay(&buf, |ops| apply(&mut partitions, ops))?;
        Ok(LogSnapshot {
            dir,
            partitions,
            recovery: replay.info,
        })
    }

    /// Directory holding the log
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// What replay found when the store was opened
    pub fn recovery(&self) -> RecoveryInfo {
        self.recovery
    }

    /// Length of the valid log in bytes
    pub fn len_bytes(&self) -> u64 {
        self.end_offset
    }

    fn append(&mut self, frame: &[u8]) -> Result<()> {
        let sync_now = self.sync.should_sync(self.unsynced + 1);
        let written = match self.file.write_all(frame) {
            Ok(()) if sync_now => self.sync_data(),
            other => other,
        };
        if let Err(e) = written {
            // Cut the frame back off so a failed commit never replays.
            let _ = self.file.set_len(self.end_offset);
            let _ = self.file.seek(SeekFrom::Start(self.end_offset));
            warn!(offset = self.end_offset, error = %e, "Log append failed, frame rolled back");
            return Err(e.into());
        }
        self.end_offset += frame.len() as u64;
        self.appended += 1;
        self.unsynced = if sync_now { 0 } else { self.unsynced + 1 };
        Ok(())
    }

    fn sync_data(&mut self) -> io::Result<()> {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_sync) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected fsync failure"));
        }
        self.file.sync_data()
    }
}

impl DurableStore for LogStore {
    fn name(&self) -> &'static str {
        "log"
    }

    fn commit(&mut self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let frame = format::encode_frame(&batch)?;
        self.append(&frame)
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        info!(
            path = %self.dir.display(),
            bytes = self.end_offset,
            frames = self.appended,
            "Log store closed"
        );
        Ok(())
    }
}

/// Read-only replay of a log directory
#[derive(Debug)]
pub struct LogSnapshot {
    dir: PathBuf,
    partitions: Partitions,
    recovery: RecoveryInfo,
}

impl LogSnapshot {
    /// Directory the snapshot was read from
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// What replay found
    pub fn recovery(&self) -> RecoveryInfo {
        self.recovery
    }

    /// Names of every non-empty partition
    pub fn partitions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.partitions.keys().cloned().collect();
        names.sort();
        names
    }
}

impl StoreReader for LogSnapshot {
    fn get(&self, partition: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .partitions
            .get(partition)
            .and_then(|p| p.get(key).cloned()))
    }

    fn keys(&self, partition: &str) -> Result<Vec<String>> {
        Ok(self
            .partitions
            .get(partition)
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default())
    }
}

fn replay<F>(buf: &[u8], mut visit: F) -> Result<Replay>
where
    F: FnMut(Vec<WriteOp>),
{
    format::check_header(buf).map_err(|reason| StoreError::Corruption { offset: 0, reason })?;

    let mut info = RecoveryInfo::default();
    let mut offset = LOG_HEADER_SIZE;

    while offset < buf.len() {
        match format::decode_frame(&buf[offset..]) {
            Ok((ops, used)) => {
                visit(ops);
                offset += used;
                info.frames += 1;
            }
            Err(FrameError::Incomplete { have, needed }) => {
                warn!(offset, have, needed, "Torn frame at log tail, truncating");
                info.torn_bytes = (buf.len() - offset) as u64;
                break;
            }
            Err(FrameError::Corrupt(reason)) => {
                let frame_end = frame_end(&buf[offset..]).map(|len| offset + len);
                if frame_end == Some(buf.len()) {
                    warn!(offset, %reason, "Corrupt final frame, truncating");
                    info.torn_bytes = (buf.len() - offset) as u64;
                    break;
                }
                return Err(StoreError::Corruption {
                    offset: offset as u64,
                    reason,
                });
            }
        }
    }

    debug!(frames = info.frames, "Log replay complete");
    Ok(Replay {
        valid_len: (buf.len() as u64) - info.torn_bytes,
        info,
    })
}

fn frame_end(buf: &[u8]) -> Option<usize> {
    if buf.len() < format::FRAME_HEADER_SIZE {
        return None;
    }
    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    Some(format::FRAME_HEADER_SIZE + len)
}

fn apply(partitions: &mut Partitions, ops: Vec<WriteOp>) {
    for op in ops {
        partitions
            .entry(op.partition)
            .or_default()
            .insert(op.key, op.value);
    }
}
