//! Accept loop and per-connection request handling.

use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hashkv_core::{Engine, KvError, KvResult, RespReader, Value};
use tracing::{debug, error, info, warn};

/// How long the accept loop sleeps when no connection is pending
const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// TCP front end for an [`Engine`].
pub struct Server {
    listener: TcpListener,
    engine: Arc<Engine>,
    shutdown: Arc<AtomicBool>,
    connections: AtomicU64,
}

/// Stops a running [`Server::run`] loop from another thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Ask the accept loop to return. Open connections are left to finish on their own.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl Server {
    /// Bind the listener. The engine must already be open (log replayed).
    pub fn bind<A: ToSocketAddrs>(addr: A, engine: Arc<Engine>) -> KvResult<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            engine,
            shutdown: Arc::new(AtomicBool::new(false)),
            connections: AtomicU64::new(0),
        })
    }

    pub fn local_addr(&self) -> KvResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { flag: Arc::clone(&self.shutdown) }
    }

    /// Accept connections until shut down, one thread each.
    pub fn run(&self) -> KvResult<()> {
        info!(addr = %self.local_addr()?, "accepting connections");

        while !self.shutdown.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    // A peer that reset before setup finished only loses its own connection.
                    if let Err(e) = self.spawn_connection(stream, peer) {
                        warn!(%peer, error = %e, "failed to start connection");
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }

        info!("accept loop stopped");
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) -> KvResult<()> {
        // Accepted sockets may inherit the listener's non-blocking mode.
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;

        let id = self.connections.fetch_add(1, Ordering::Relaxed);
        let engine = Arc::clone(&self.engine);
        debug!(conn = id, %peer, "connection opened");

        thread::Builder::new()
            .name(format!("hashkv-conn-{}", id))
            .spawn(move || {
                if let Err(e) = serve_connection(stream, &engine) {
                    warn!(conn = id, %peer, error = %e, "connection ended with error");
                }
                debug!(conn = id, %peer, "connection closed");
            })?;
        Ok(())
    }
}

/// Read requests and write replies until the client goes away.
fn serve_connection(stream: TcpStream, engine: &Engine) -> KvResult<()> {
    let mut writer = stream.try_clone()?;
    let mut reader = RespReader::new(BufReader::new(stream));

    loop {
        let request = match reader.read_value() {
            Ok(Some(request)) => request,
            // Client hung up, possibly mid-request.
            Ok(None) | Err(KvError::TruncatedEntry { .. }) => return Ok(()),
            Err(KvError::Protocol { reason, .. }) => {
                let reply = Value::error(format!("ERR Protocol error: {}", reason));
                writer.write_all(&reply.marshal())?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let reply = match engine.execute(&request) {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, "command not applied: AOF append failed");
                Value::error(format!("ERR {}", e))
            }
        };
        writer.write_all(&reply.marshal())?;
    }
}
