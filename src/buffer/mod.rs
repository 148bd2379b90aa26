//! Disk-backed buffer for records awaiting delivery.
//!
//! One directory per service under the configured root. Writes append
//! JSON lines to a single active `buffer.jsonl`; a drain atomically
//! renames the active file to a `buffer.sending-<ts>.jsonl` snapshot so
//! writers continue into a fresh file while the snapshot is consumed.
//! Rotation caps the active file at 5 MiB. Malformed lines are skipped,
//! never fatal; a file in which any were found is set aside with a
//! `.corrupt` suffix instead of being re-consumed.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use log::warn;
use parking_lot::Mutex;
use thiserror::Error;

use crate::record::Envelope;

/// Size threshold at which the active file is rotated out.
pub const MAX_BUFFER_FILE_SIZE: u64 = 5 * 1024 * 1024;

const ACTIVE_FILE: &str = "buffer.jsonl";
const SENDING_PREFIX: &str = "buffer.sending-";
const ROTATED_PREFIX: &str = "buffer-";

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("buffer I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("buffer serialisation failed: {0}")]
    Serialise(#[from] serde_json::Error),
}

/// Append-only durable store for one service's undelivered records.
pub struct DiskBuffer {
    dir: PathBuf,
    max_file_size: u64,
    write_lock: Mutex<()>,
}

impl DiskBuffer {
    /// Open (creating if needed) the buffer directory for `service`.
    pub fn open(root: &Path, service: &str) -> Result<Self, BufferError> {
        let dir = root.join(service);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_file_size: MAX_BUFFER_FILE_SIZE,
            write_lock: Mutex::new(()),
        })
    }

    /// Override the rotation threshold.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn active_path(&self) -> PathBuf {
        self.dir.join(ACTIVE_FILE)
    }

    /// Durably append one envelope. A write that returns `Ok` has been
    /// synced; concurrent in-process writers are serialised by a mutex.
    pub fn write(&self, envelope: &Envelope) -> Result<(), BufferError> {
        let line = serde_json::to_string(envelope)?;
        let _guard = self.write_lock.lock();
        self.rotate_if_full()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.active_path())?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_data()?;
        Ok(())
    }

    fn rotate_if_full(&self) -> Result<(), BufferError> {
        let path = self.active_path();
        let len = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(()),
        };
        if len < self.max_file_size {
            return Ok(());
        }
        let rotated = unique_path(&self.dir, ROTATED_PREFIX);
        fs::rename(&path, rotated)?;
        Ok(())
    }

    /// Atomically hand the active file off as a sending snapshot,
    /// returning its path, or `None` when there is nothing to drain.
    pub fn begin_drain(&self) -> Option<PathBuf> {
        let path = self.active_path();
        match fs::metadata(&path) {
            Ok(meta) if meta.len() > 0 => {}
            _ => return None,
        }
        let sending = unique_path(&self.dir, SENDING_PREFIX);
        let _guard = self.write_lock.lock();
        match fs::rename(&path, &sending) {
            Ok(()) => Some(sending),
            Err(_) => None,
        }
    }

    /// Read and remove every valid record currently on disk for this
    /// service. Startup-only: must complete before new writes begin.
    ///
    /// Leftover sending snapshots from an interrupted drain are consumed
    /// first, then rotated files, then the active file.
    pub fn read_all(&self) -> Vec<Envelope> {
        let mut records = Vec::new();
        for path in self.pending_files() {
            records.extend(self.drain_file(&path));
        }
        records
    }

    /// Consume one buffer file: parse its valid lines, then remove it,
    /// or set it aside with a `.corrupt` suffix when malformed lines
    /// were found.
    pub fn drain_file(&self, path: &Path) -> Vec<Envelope> {
        let (records, corrupt) = match read_lines(path) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("DiskBuffer failed to read {}: {err}", path.display());
                return Vec::new();
            }
        };
        if corrupt == 0 {
            if let Err(err) = fs::remove_file(path) {
                warn!(
                    "DiskBuffer failed to remove drained {}: {err}",
                    path.display()
                );
            }
        } else {
            warn!(
                "DiskBuffer skipped {corrupt} corrupt line(s) in {}",
                path.display()
            );
            let aside = path.with_extension("jsonl.corrupt");
            if fs::rename(path, &aside).is_err() {
                let _ = fs::remove_file(path);
            }
        }
        records
    }

    fn pending_files(&self) -> Vec<PathBuf> {
        let mut sending = Vec::new();
        let mut rotated = Vec::new();
        let mut active = Vec::new();
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".jsonl") {
                continue;
            }
            if name == ACTIVE_FILE {
                active.push(path);
            } else if name.starts_with(SENDING_PREFIX) {
                sending.push(path);
            } else if name.starts_with(ROTATED_PREFIX) {
                rotated.push(path);
            }
        }
        sending.sort();
        rotated.sort();
        sending.into_iter().chain(rotated).chain(active).collect()
    }
}

/// Routes envelopes to per-service buffers under a shared root. The
/// worker buffers each record into the directory of the service that
/// produced it, creating buffers lazily.
pub struct BufferMap {
    root: PathBuf,
    buffers: Mutex<HashMap<String, Arc<DiskBuffer>>>,
}

impl BufferMap {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_owned(),
            buffers: Mutex::new(HashMap::new()),
        }
    }

    pub fn for_service(&self, service: &str) -> Result<Arc<DiskBuffer>, BufferError> {
        let mut buffers = self.buffers.lock();
        if let Some(buffer) = buffers.get(service) {
            return Ok(Arc::clone(buffer));
        }
        let buffer = Arc::new(DiskBuffer::open(&self.root, service)?);
        buffers.insert(service.to_owned(), Arc::clone(&buffer));
        Ok(buffer)
    }

    /// Startup recovery: read and remove every persisted record from
    /// every service directory under the root.
    pub fn read_all(&self) -> Vec<Envelope> {
        let mut records = Vec::new();
        let Ok(entries) = fs::read_dir(&self.root) else {
            return records;
        };
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let Some(service) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            match self.for_service(&service) {
                Ok(buffer) => records.extend(buffer.read_all()),
                Err(err) => warn!("BufferMap failed to open buffer for {service}: {err}"),
            }
        }
        records
    }
}

fn timestamp() -> String {
    Utc::now().format("%Y%m%d%H%M%S%3f").to_string()
}

/// Timestamped name under `dir` that does not collide with an existing
/// file when several rotations land in the same millisecond.
fn unique_path(dir: &Path, prefix: &str) -> PathBuf {
    let ts = timestamp();
    let mut path = dir.join(format!("{prefix}{ts}.jsonl"));
    let mut n = 1u32;
    while path.exists() {
        path = dir.join(format!("{prefix}{ts}-{n}.jsonl"));
        n += 1;
    }
    path
}

fn read_lines(path: &Path) -> io::Result<(Vec<Envelope>, usize)> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    let mut corrupt = 0usize;
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Envelope>(trimmed) {
            Ok(envelope) => records.push(envelope),
            Err(_) => corrupt += 1,
        }
    }
    Ok((records, corrupt))
}
