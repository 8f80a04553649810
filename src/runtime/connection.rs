//! Connection state and the connection table.
//!
//! Each connection owns its transport handle, its reassembly buffer, its
//! registration state and its current room. The table is a slab, so ids are
//! stable for the lifetime of a connection and removal never shifts others.

use crate::runtime::buffer::FrameBuffer;
use crate::runtime::rooms::DEFAULT_ROOM;
use bytes::{Buf, BytesMut};
use slab::Slab;
use std::io::{self, Write};
use std::net::SocketAddr;

/// Upper bound on bytes queued for a slow reader.
pub const MAX_OUTBOUND: usize = 256 * 1024;

/// A single client connection.
#[derive(Debug)]
pub struct Connection<S> {
    stream: S,
    peer: Option<SocketAddr>,
    /// Inbound reassembly.
    pub buffer: FrameBuffer,
    /// Empty until the first Chat frame registers a name.
    pub username: String,
    /// Every connection is in exactly one room.
    pub room: String,
    /// Bytes the socket has not accepted yet.
    outbound: BytesMut,
}

impl<S> Connection<S> {
    /// New unregistered connection in the default room.
    pub fn new(stream: S, peer: Option<SocketAddr>) -> Self {
        Self {
            stream,
            peer,
            buffer: FrameBuffer::default(),
            username: String::new(),
            room: DEFAULT_ROOM.to_string(),
            outbound: BytesMut::new(),
        }
    }

    pub fn is_registered(&self) -> bool {
        !self.username.is_empty()
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_stream(self) -> S {
        self.stream
    }

    /// Bytes waiting for the socket to become writable.
    pub fn pending(&self) -> usize {
        self.outbound.len()
    }
}

impl<S: Write> Connection<S> {
    /// Queue a frame and push as much as the socket accepts right now.
    ///
    /// Frames are never interleaved: if earlier bytes are still queued the
    /// frame goes behind them. A queue over [`MAX_OUTBOUND`] refuses the
    /// frame.
    pub fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        if self.pending() + frame.len() > MAX_OUTBOUND {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "outbound queue full",
            ));
        }
        self.outbound.extend_from_slice(frame);
        self.flush()
    }

    /// Write queued bytes until the queue is empty or the socket would block.
    pub fn flush(&mut self) -> io::Result<()> {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
                }
                Ok(n) => self.outbound.advance(n),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Registry of active connections using slab allocation.
///
/// Provides O(1) insert, lookup, and remove operations.
pub struct ConnectionRegistry<S> {
    connections: Slab<Connection<S>>,
    max_connections: usize,
}

impl<S> ConnectionRegistry<S> {
    /// Create a new registry with specified maximum capacity.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::with_capacity(max_connections.min(1024)),
            max_connections,
        }
    }

    /// Insert a new connection into the registry.
    ///
    /// Returns `None` if the registry is at capacity.
    pub fn insert(&mut self, conn: Connection<S>) -> Option<usize> {
        if self.connections.len() >= self.max_connections {
            return None;
        }
        Some(self.connections.insert(conn))
    }

    pub fn get(&self, id: usize) -> Option<&Connection<S>> {
        self.connections.get(id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Connection<S>> {
        self.connections.get_mut(id)
    }

    pub fn remove(&mut self, id: usize) -> Option<Connection<S>> {
        self.connections.try_remove(id)
    }

    pub fn contains(&self, id: usize) -> bool {
        self.connections.contains(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Iterate over all connections in id order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Connection<S>)> {
        self.connections.iter()
    }

    /// Iterate over all connections mutably in id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut Connection<S>)> {
        self.connections.iter_mut()
    }

    /// Id of the registered connection using `username`.
    pub fn find_by_username(&self, username: &str) -> Option<usize> {
        self.iter()
            .find(|(_, conn)| conn.is_registered() && conn.username == username)
            .map(|(id, _)| id)
    }

    /// Names of registered connections in id order.
    pub fn usernames(&self) -> Vec<String> {
        self.iter()
            .filter(|(_, conn)| conn.is_registered())
            .map(|(_, conn)| conn.username.clone())
            .collect()
    }

    /// Remove every connection, yielding each one.
    pub fn drain(&mut self) -> impl Iterator<Item = Connection<S>> + '_ {
        self.connections.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts at most `chunk` bytes per write, then blocks once.
    struct Trickle {
        written: Vec<u8>,
        chunk: usize,
        block_next: bool,
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.block_next {
                self.block_next = false;
                return Err(io::ErrorKind::WouldBlock.into());
            }
            self.block_next = true;
            let n = buf.len().min(self.chunk);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_new_connection_defaults() {
        let conn = Connection::new(Vec::<u8>::new(), None);
        assert!(!conn.is_registered());
        assert_eq!(conn.room, DEFAULT_ROOM);
        assert!(conn.buffer.is_empty());
        assert_eq!(conn.pending(), 0);
    }

    #[test]
    fn test_send_queues_when_socket_blocks() {
        let stream = Trickle {
            written: Vec::new(),
            chunk: 4,
            block_next: false,
        };
        let mut conn = Connection::new(stream, None);

        conn.send(b"hello world").unwrap();
        assert_eq!(conn.stream_mut().written, b"hell");
        assert_eq!(conn.pending(), 7);

        // Queued behind the remainder, then flushed together.
        conn.send(b"!").unwrap();
        assert_eq!(conn.stream_mut().written, b"hello wo");
        assert_eq!(conn.pending(), 4);

        while conn.pending() > 0 {
            conn.flush().unwrap();
        }
        assert_eq!(conn.into_stream().written, b"hello world!");
    }

    #[test]
    fn test_send_refuses_when_queue_full() {
        let stream = Trickle {
            written: Vec::new(),
            chunk: 0,
            block_next: true,
        };
        let mut conn = Connection::new(stream, None);

        conn.send(&vec![0u8; MAX_OUTBOUND]).unwrap();
        assert!(conn.send(b"x").is_err());
        assert_eq!(conn.pending(), MAX_OUTBOUND);
    }

    #[test]
    fn test_connection_registry() {
        let mut registry = ConnectionRegistry::new(2);

        let id1 = registry.insert(Connection::new(Vec::<u8>::new(), None)).unwrap();
        let id2 = registry.insert(Connection::new(Vec::new(), None)).unwrap();

        // At capacity
        assert!(registry.insert(Connection::new(Vec::new(), None)).is_none());
        assert_eq!(registry.len(), 2);

        registry.get_mut(id2).unwrap().username = "bob".into();
        assert_eq!(registry.find_by_username("bob"), Some(id2));
        assert_eq!(registry.find_by_username(""), None);
        assert_eq!(registry.usernames(), vec!["bob".to_string()]);

        registry.remove(id1);
        assert!(!registry.contains(id1));
        assert!(registry.remove(id1).is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(id2));
    }
}
