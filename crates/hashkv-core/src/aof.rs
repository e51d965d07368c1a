//! Append-only file (AOF): the durability log.
//!
//! Every mutating command is appended in its wire form, so the log is just
//! RESP requests back to back and replay feeds them through the same
//! command path live traffic uses.
//!
//! One mutex guards the file. Appends, replay, the background sync and
//! close all take it, so a sync never lands in the middle of an append and
//! replay never reads a half-written entry from a concurrent writer.
//!
//! The file is opened read + append: writes always go to end-of-file no
//! matter where replay left the read cursor.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::durability::sync_file;
use crate::error::{KvError, KvResult};
use crate::resp::{RespReader, Value};

/// How often the sync thread checks its shutdown flag while waiting
const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

/// `None` once the log has been closed.
type SharedFile = Arc<Mutex<Option<File>>>;

/// The append-only log.
///
/// All methods take `&self`; the log is shared by every connection thread.
pub struct Aof {
    file: SharedFile,
    path: PathBuf,
    /// Completed background syncs
    syncs: Arc<AtomicU64>,
    syncer: Mutex<Option<SyncHandle>>,
}

impl Aof {
    /// Open (creating if needed) the log at `path` and start syncing it every `sync_interval`.
    pub fn open<P: AsRef<Path>>(path: P, sync_interval: Duration) -> KvResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| KvError::io_at(parent, e, "Failed to create AOF directory"))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| KvError::io_at(&path, e, "Failed to open AOF"))?;

        let file: SharedFile = Arc::new(Mutex::new(Some(file)));
        let syncs = Arc::new(AtomicU64::new(0));
        let syncer = start_syncer(Arc::clone(&file), path.clone(), sync_interval, Arc::clone(&syncs))?;

        Ok(Self {
            file,
            path,
            syncs,
            syncer: Mutex::new(Some(syncer)),
        })
    }

    /// Append one command.
    pub fn append(&self, entry: &Value) -> KvResult<()> {
        self.append_then(entry, || ())
    }

    /// Append one command, then run `apply` before releasing the log lock.
    ///
    /// Concurrent writers therefore apply in exactly the order their entries
    /// appear in the log, which is what makes replay reproduce live state.
    /// If the append fails `apply` is not run.
    pub fn append_then<T>(&self, entry: &Value, apply: impl FnOnce() -> T) -> KvResult<T> {
        let bytes = entry.marshal();

        let mut guard = self.file.lock();
        let file = guard
            .as_mut()
            .ok_or_else(|| KvError::LogClosed { path: self.path.clone() })?;
        file.write_all(&bytes)
            .map_err(|e| KvError::io_at(&self.path, e, "AOF append failed"))?;

        Ok(apply())
    }

    /// Feed every logged entry to `apply` with its byte offset, oldest first.
    ///
    /// A torn trailing entry (crash mid-append) ends the replay: it is
    /// logged, cut off the file, and replay reports success. Any other
    /// decode failure is returned, as is the first error `apply` returns.
    pub fn replay<F>(&self, mut apply: F) -> KvResult<usize>
    where
        F: FnMut(u64, Value) -> KvResult<()>,
    {
        let guard = self.file.lock();
        let file = guard
            .as_ref()
            .ok_or_else(|| KvError::LogClosed { path: self.path.clone() })?;

        let mut cursor = file;
        cursor
            .seek(SeekFrom::Start(0))
            .map_err(|e| KvError::io_at(&self.path, e, "AOF seek failed"))?;

        let mut reader = RespReader::new(BufReader::new(file));
        let mut replayed = 0usize;

        loop {
            let offset = reader.position();
            match reader.read_value() {
                Ok(Some(entry)) => {
                    apply(offset, entry)?;
                    replayed += 1;
                }
                Ok(None) => break,
                Err(KvError::TruncatedEntry { offset }) => {
                    warn!(
                        path = %self.path.display(),
                        offset,
                        "torn entry at end of AOF, truncating"
                    );
                    file.set_len(offset)
                        .map_err(|e| KvError::io_at(&self.path, e, "AOF truncate failed"))?;
                    break;
                }
                Err(KvError::Io { kind, message, .. }) => {
                    return Err(KvError::Io { path: Some(self.path.clone()), kind, message });
                }
                Err(e) => return Err(e),
            }
        }

        info!(path = %self.path.display(), entries = replayed, "AOF replayed");
        Ok(replayed)
    }

    /// Force everything appended so far onto stable storage.
    pub fn sync(&self) -> KvResult<()> {
        let guard = self.file.lock();
        match guard.as_ref() {
            Some(file) => sync_file(file).map_err(|e| KvError::io_at(&self.path, e, "AOF sync failed")),
            None => Err(KvError::LogClosed { path: self.path.clone() }),
        }
    }

    /// Stop the sync thread, do a final sync and release the file.
    ///
    /// Safe to call more than once.
    pub fn close(&self) -> KvResult<()> {
        // Joined without the file lock held: the sync thread needs it to finish.
        if let Some(handle) = self.syncer.lock().take() {
            handle.shutdown();
        }

        let mut guard = self.file.lock();
        if let Some(file) = guard.take() {
            sync_file(&file).map_err(|e| KvError::io_at(&self.path, e, "AOF final sync failed"))?;
            debug!(path = %self.path.display(), "AOF closed");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.file.lock().is_none()
    }

    /// Current log length in bytes.
    pub fn len(&self) -> KvResult<u64> {
        let guard = self.file.lock();
        let file = guard
            .as_ref()
            .ok_or_else(|| KvError::LogClosed { path: self.path.clone() })?;
        let meta = file
            .metadata()
            .map_err(|e| KvError::io_at(&self.path, e, "Failed to stat AOF"))?;
        Ok(meta.len())
    }

    pub fn is_empty(&self) -> KvResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Background syncs completed since open.
    pub fn background_syncs(&self) -> u64 {
        self.syncs.load(Ordering::Relaxed)
    }
}

impl Drop for Aof {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.path.display(), error = %e, "AOF close on drop failed");
        }
    }
}

/// Handle to the background sync thread.
/// Dropping it stops and joins the thread.
struct SyncHandle {
    shutdown: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl SyncHandle {
    fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn start_syncer(
    file: SharedFile,
    path: PathBuf,
    interval: Duration,
    syncs: Arc<AtomicU64>,
) -> KvResult<SyncHandle> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);
    let thread_path = path.clone();

    let thread = thread::Builder::new()
        .name("hashkv-aof-sync".to_string())
        .spawn(move || sync_loop(file, thread_path, interval, syncs, shutdown_flag))
        .map_err(|e| KvError::Io {
            path: Some(path),
            kind: std::io::ErrorKind::Other,
            message: format!("Failed to spawn AOF sync thread: {}", e),
        })?;

    Ok(SyncHandle {
        shutdown,
        thread: Some(thread),
    })
}

fn sync_loop(
    file: SharedFile,
    path: PathBuf,
    interval: Duration,
    syncs: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        let wake_time = Instant::now() + interval;
        loop {
            if shutdown.load(Ordering::Acquire) {
                return;
            }
            let remaining = wake_time.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            thread::sleep(remaining.min(SHUTDOWN_POLL));
        }

        let guard = file.lock();
        let Some(f) = guard.as_ref() else { return };
        match sync_file(f) {
            Ok(()) => {
                syncs.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => error!(path = %path.display(), error = %e, "background AOF sync failed"),
        }
    }
}
