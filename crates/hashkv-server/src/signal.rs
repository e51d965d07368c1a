//! SIGINT / SIGTERM to a clean shutdown.
//!
//! The handler only flips an atomic. A watcher thread turns that into
//! [`ShutdownHandle::shutdown`], so `Server::run` returns and the binary
//! can close the engine (final AOF sync) before exiting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use hashkv_core::KvResult;
use tracing::info;

use crate::server::ShutdownHandle;

/// How often the watcher thread checks for a delivered signal
const SIGNAL_POLL: Duration = Duration::from_millis(50);

static SIGNALLED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn on_signal(_signum: libc::c_int) {
    SIGNALLED.store(true, Ordering::SeqCst);
}

/// Stop `handle`'s accept loop on SIGINT or SIGTERM.
#[cfg(unix)]
pub fn shutdown_on_signal(handle: ShutdownHandle) -> KvResult<()> {
    for signum in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: the handler only performs an atomic store.
        let previous = unsafe { libc::signal(signum, on_signal as libc::sighandler_t) };
        if previous == libc::SIG_ERR {
            return Err(std::io::Error::last_os_error().into());
        }
    }

    thread::Builder::new()
        .name("hashkv-signal".to_string())
        .spawn(move || {
            while !SIGNALLED.load(Ordering::SeqCst) {
                if handle.is_shutdown() {
                    return;
                }
                thread::sleep(SIGNAL_POLL);
            }
            info!("shutdown signal received");
            handle.shutdown();
        })?;
    Ok(())
}

#[cfg(not(unix))]
pub fn shutdown_on_signal(_handle: ShutdownHandle) -> KvResult<()> {
    tracing::warn!("signal-driven shutdown is not supported on this platform");
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    use hashkv_core::{Config, Engine};
    use tempfile::TempDir;

    use crate::Server;

    #[test]
    fn test_sigterm_stops_accept_loop() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(Engine::open(Config::small().with_aof_path(dir.path().join("db.aof"))).unwrap());
        let server = Server::bind("127.0.0.1:0", Arc::clone(&engine)).unwrap();
        shutdown_on_signal(server.shutdown_handle()).unwrap();

        let accept = thread::spawn(move || server.run().unwrap());
        unsafe {
            libc::raise(libc::SIGTERM);
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while !accept.is_finished() {
            assert!(Instant::now() < deadline, "accept loop still running after SIGTERM");
            thread::sleep(Duration::from_millis(10));
        }
        accept.join().unwrap();
        engine.close().unwrap();
    }
}
