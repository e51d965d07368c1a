//! HashKV Server: RESP over TCP on top of `hashkv-core`.
//!
//! One OS thread per connection, all sharing a single [`Engine`]. The
//! engine replays its log before the listener is bound, so no client ever
//! sees partially recovered state.
//!
//! [`Engine`]: hashkv_core::Engine

pub mod server;
pub mod signal;

pub use server::{Server, ShutdownHandle};
pub use signal::shutdown_on_signal;
