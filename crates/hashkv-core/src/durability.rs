//! Flush-to-media for the append-only log.
//!
//! `File::sync_data` is not equally strong everywhere, so the log calls
//! [`sync_file`] which picks the strongest primitive per platform.

use std::fs::File;
use std::io;

/// Block until everything written to `file` is on stable storage.
///
/// - Linux: `fdatasync` (file data only; the log never depends on mtime)
/// - macOS/iOS: `fcntl(F_FULLFSYNC)`, since plain `fsync` stops at the drive cache
/// - elsewhere: `File::sync_data`
///
/// May block for milliseconds. Callers hold the log mutex while this runs,
/// which is what keeps a sync from interleaving with a half-written append.
pub fn sync_file(file: &File) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the descriptor comes from a live `File` borrowed for the whole call.
        let rc = unsafe { libc::fdatasync(file.as_raw_fd()) };
        if rc == 0 { Ok(()) } else { Err(io::Error::last_os_error()) }
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the descriptor comes from a live `File` borrowed for the whole call.
        let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_FULLFSYNC) };
        if rc != -1 { Ok(()) } else { Err(io::Error::last_os_error()) }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "ios")))]
    {
        file.sync_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sync_after_write() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"*1\r\n$4\r\nPING\r\n").unwrap();

        let result = sync_file(file.as_file());
        assert!(result.is_ok(), "sync_file failed: {:?}", result.err());
    }

    #[test]
    fn test_sync_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(sync_file(file.as_file()).is_ok());
    }
}
