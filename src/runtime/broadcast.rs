//! Fan-out of encoded frames to a computed set of connections.
//!
//! Delivery is fire-and-forget: a failed write to one recipient is logged
//! and the rest still receive the frame.

use crate::runtime::connection::ConnectionRegistry;
use std::io::Write;
use tracing::warn;

/// Who receives a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience<'a> {
    /// Every connection.
    All,
    /// Every connection whose current room is the given one, sender included.
    Room(&'a str),
    /// Same as `Room`, minus one connection.
    RoomExcept(&'a str, usize),
    /// A single connection.
    One(usize),
}

impl Audience<'_> {
    fn includes(&self, id: usize, room: &str) -> bool {
        match *self {
            Audience::All => true,
            Audience::Room(name) => room == name,
            Audience::RoomExcept(name, skip) => id != skip && room == name,
            Audience::One(target) => id == target,
        }
    }
}

/// Deliver `frame` to `audience`. Returns how many writes succeeded.
pub fn broadcast<S: Write>(
    connections: &mut ConnectionRegistry<S>,
    audience: Audience<'_>,
    frame: &[u8],
) -> usize {
    if let Audience::One(id) = audience {
        return usize::from(send_to(connections, id, frame));
    }

    let mut delivered = 0;
    for (id, conn) in connections.iter_mut() {
        if !audience.includes(id, &conn.room) {
            continue;
        }
        match conn.send(frame) {
            Ok(()) => delivered += 1,
            Err(e) => {
                warn!(conn_id = id, peer = ?conn.peer(), error = %e, "Failed to deliver frame");
            }
        }
    }
    delivered
}

/// Deliver `frame` to one connection. Returns whether the write succeeded.
pub fn send_to<S: Write>(connections: &mut ConnectionRegistry<S>, id: usize, frame: &[u8]) -> bool {
    let Some(conn) = connections.get_mut(id) else {
        return false;
    };
    match conn.send(frame) {
        Ok(()) => true,
        Err(e) => {
            warn!(conn_id = id, peer = ?conn.peer(), error = %e, "Failed to deliver frame");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::connection::Connection;
    use crate::runtime::testing::Sink;

    fn registry(rooms: &[&str]) -> (ConnectionRegistry<Sink>, Vec<Sink>) {
        let mut registry = ConnectionRegistry::new(16);
        let mut sinks = Vec::new();
        for room in rooms {
            let sink = Sink::default();
            let mut conn = Connection::new(sink.clone(), None);
            conn.room = room.to_string();
            registry.insert(conn).unwrap();
            sinks.push(sink);
        }
        (registry, sinks)
    }

    #[test]
    fn test_room_includes_sender() {
        let (mut conns, sinks) = registry(&["general", "general", "code"]);

        let n = broadcast(&mut conns, Audience::Room("general"), b"hi");
        assert_eq!(n, 2);
        assert_eq!(sinks[0].bytes(), b"hi");
        assert_eq!(sinks[1].bytes(), b"hi");
        assert!(sinks[2].bytes().is_empty());
    }

    #[test]
    fn test_room_except_sender() {
        let (mut conns, sinks) = registry(&["general", "general", "code"]);

        let n = broadcast(&mut conns, Audience::RoomExcept("general", 0), b"hi");
        assert_eq!(n, 1);
        assert!(sinks[0].bytes().is_empty());
        assert_eq!(sinks[1].bytes(), b"hi");
        assert!(sinks[2].bytes().is_empty());
    }

    #[test]
    fn test_all_and_one() {
        let (mut conns, sinks) = registry(&["general", "code"]);

        assert_eq!(broadcast(&mut conns, Audience::All, b"a"), 2);
        assert_eq!(broadcast(&mut conns, Audience::One(1), b"b"), 1);
        assert_eq!(broadcast(&mut conns, Audience::One(7), b"c"), 0);

        assert_eq!(sinks[0].bytes(), b"a");
        assert_eq!(sinks[1].bytes(), b"ab");
    }

    #[test]
    fn test_room_isolation() {
        let (mut conns, sinks) = registry(&["a", "b", "a", "b"]);

        broadcast(&mut conns, Audience::Room("a"), b"x");
        for (idx, sink) in sinks.iter().enumerate() {
            let expected: &[u8] = if idx % 2 == 0 { b"x" } else { b"" };
            assert_eq!(sink.bytes(), expected, "connection {idx}");
        }
    }

    #[test]
    fn test_failed_write_does_not_stop_delivery() {
        let (mut conns, sinks) = registry(&["general", "general", "general"]);
        sinks[1].fail_writes();

        let n = broadcast(&mut conns, Audience::Room("general"), b"hi");
        assert_eq!(n, 2);
        assert_eq!(sinks[0].bytes(), b"hi");
        assert_eq!(sinks[2].bytes(), b"hi");
    }
}
