//! Server runtime.
//!
//! - `FrameBuffer`: per-connection frame reassembly
//! - `ConnectionRegistry`: slab of live connections and their session state
//! - `RoomRegistry`: bounded set of rooms and their members
//! - `ChatServer`: the transport-agnostic chat engine
//! - `mio::EventLoop`: the single-threaded reactor driving it all

mod broadcast;
mod buffer;
mod connection;
mod rooms;
mod server;

pub mod mio;

#[cfg(test)]
mod testing;

pub use self::mio::{EventLoop, Shutdown};
