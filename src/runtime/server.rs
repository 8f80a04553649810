//! Chat engine.
//!
//! Owns the connection table and the room registry and turns complete
//! inbound frames into registrations, room traffic and command replies.
//! Transport-agnostic: any `Write` works as a connection handle, which is
//! how the event loop plugs in mio sockets and tests plug in memory sinks.

use crate::protocols::chat::command::{self, Command, ParseResult, HELP_TEXT};
use crate::protocols::chat::{
    decode, ChatMessage, CodecError, Message, MAX_CONTENT_LEN, MAX_ROOM_NAME_LEN, MAX_USERNAME_LEN,
    MAX_USER_COUNT,
};
use crate::runtime::broadcast::{broadcast, send_to, Audience};
use crate::runtime::buffer::BufferError;
use crate::runtime::connection::{Connection, ConnectionRegistry};
use crate::runtime::rooms::{RoomError, RoomRegistry, DEFAULT_ROOM};
use bytes::Bytes;
use std::io::{self, Write};
use std::net::SocketAddr;
use tracing::{debug, info, trace, warn};

pub const WELCOME_TEXT: &str = "Welcome to the chat server! Please send your username.";
pub const UNKNOWN_COMMAND: &str = "Unknown command. Type /help for available commands";
pub const UNSUPPORTED_TYPE: &str = "Unsupported message type";

/// Connection table plus room registry, mutated only by the event loop.
pub struct ChatServer<S> {
    connections: ConnectionRegistry<S>,
    rooms: RoomRegistry,
}

impl<S: Write> ChatServer<S> {
    pub fn new(max_connections: usize, max_rooms: usize, max_members: usize) -> Self {
        Self {
            connections: ConnectionRegistry::new(max_connections),
            rooms: RoomRegistry::new(max_rooms, max_members),
        }
    }

    pub fn connections(&self) -> &ConnectionRegistry<S> {
        &self.connections
    }

    pub fn connections_mut(&mut self) -> &mut ConnectionRegistry<S> {
        &mut self.connections
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Take ownership of a new connection.
    ///
    /// The connection starts out in the default room and is sent the welcome
    /// message. It only counts as a room member once it registers. Returns
    /// `None` (dropping the stream) when the server is full.
    pub fn accept(&mut self, stream: S, peer: Option<SocketAddr>) -> Option<usize> {
        let id = self.connections.insert(Connection::new(stream, peer))?;
        self.send_system(id, WELCOME_TEXT);
        Some(id)
    }

    /// Feed bytes read from connection `id`.
    ///
    /// Every complete frame is dispatched before returning. An error means
    /// the connection broke the protocol and must be dropped with
    /// [`disconnect`](Self::disconnect).
    pub fn receive(&mut self, id: usize, data: &[u8]) -> Result<(), BufferError> {
        let Some(conn) = self.connections.get_mut(id) else {
            return Ok(());
        };
        conn.buffer.extend(data)?;

        loop {
            let Some(conn) = self.connections.get_mut(id) else {
                return Ok(());
            };
            let Some(frame) = conn.buffer.next_frame()? else {
                return Ok(());
            };
            self.dispatch(id, frame).map_err(BufferError::Codec)?;
        }
    }

    /// Push queued outbound bytes for `id`.
    pub fn flush(&mut self, id: usize) -> io::Result<()> {
        match self.connections.get_mut(id) {
            Some(conn) => conn.flush(),
            None => Ok(()),
        }
    }

    /// Remove connection `id` and hand its stream back to the caller.
    ///
    /// A registered connection's room hears that it left and everyone gets
    /// the updated user list.
    pub fn disconnect(&mut self, id: usize) -> Option<S> {
        let conn = self.connections.get(id)?;
        let username = conn.username.clone();
        let room = conn.room.clone();

        if !username.is_empty() {
            info!(conn_id = id, username = %username, room = %room, "User left");
            let text = format!("{username} left the chat");
            if let Some(frame) = encode(&Message::System(text)) {
                broadcast(&mut self.connections, Audience::RoomExcept(&room, id), &frame);
            }
        }

        self.rooms.remove_member(&room, id);
        let conn = self.connections.remove(id)?;

        if !username.is_empty() {
            self.broadcast_user_list();
        }

        debug!(
            conn_id = id,
            peer = ?conn.peer(),
            discarded = conn.buffer.len(),
            "Connection closed"
        );
        Some(conn.into_stream())
    }

    /// Remove every connection, yielding the streams.
    pub fn close_all(&mut self) -> Vec<S> {
        self.connections.drain().map(Connection::into_stream).collect()
    }

    fn dispatch(&mut self, id: usize, frame: Bytes) -> Result<(), CodecError> {
        let (header, message) = match decode(&frame) {
            Ok(decoded) => decoded,
            Err(CodecError::UnknownType(msg_type)) => {
                warn!(conn_id = id, msg_type, "Unknown message type");
                self.send_error(id, UNSUPPORTED_TYPE);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        trace!(
            conn_id = id,
            msg_type = message.message_type().name(),
            timestamp = header.timestamp,
            "Frame received"
        );

        match message {
            Message::Chat(chat) => self.handle_chat(id, chat, &frame),
            Message::Command(text) => self.handle_command(id, &text),
            Message::Ping => self.send_message(id, &Message::Pong),
            other => {
                warn!(
                    conn_id = id,
                    msg_type = other.message_type().name(),
                    "Unsupported message type"
                );
                self.send_error(id, UNSUPPORTED_TYPE);
            }
        }
        Ok(())
    }

    fn handle_chat(&mut self, id: usize, chat: ChatMessage, frame: &[u8]) {
        let Some(conn) = self.connections.get(id) else {
            return;
        };

        if !conn.is_registered() {
            self.register(id, chat.username);
            return;
        }

        // Forwarded verbatim, sender included.
        let room = conn.room.clone();
        debug!(conn_id = id, room = %room, "Chat message");
        broadcast(&mut self.connections, Audience::Room(&room), frame);
    }

    fn register(&mut self, id: usize, username: String) {
        if username.is_empty() {
            self.send_error(id, "Username must not be empty");
            return;
        }
        if username.len() >= MAX_USERNAME_LEN {
            let text = format!("Username too long (max {} bytes)", MAX_USERNAME_LEN - 1);
            self.send_error(id, &text);
            return;
        }

        if let Some(conn) = self.connections.get_mut(id) {
            conn.username = username.clone();
        }
        if let Err(e) = self.move_to_room(id, DEFAULT_ROOM) {
            // Registered connections are always members of their room.
            warn!(conn_id = id, username = %username, error = %e, "Registration refused");
            if let Some(conn) = self.connections.get_mut(id) {
                conn.username.clear();
            }
            self.send_error(id, &room_error_text(&e));
            return;
        }

        let Some(room) = self.connections.get(id).map(|conn| conn.room.clone()) else {
            return;
        };
        info!(conn_id = id, username = %username, room = %room, "User registered");

        let text = format!("{username} joined the chat");
        if let Some(frame) = encode(&Message::System(text)) {
            broadcast(&mut self.connections, Audience::Room(&room), &frame);
        }
        self.broadcast_user_list();
    }

    fn handle_command(&mut self, id: usize, text: &str) {
        debug!(conn_id = id, command = text, "Command");

        match command::parse(text) {
            ParseResult::Complete(Command::DirectMessage { target, text }) => {
                self.direct_message(id, target, text);
            }
            ParseResult::Complete(Command::Join { room }) => self.join(id, room),
            ParseResult::Complete(Command::Rooms) => self.list_rooms(id),
            ParseResult::Complete(Command::Leave) => self.leave(id),
            ParseResult::Complete(Command::Help) => self.send_system(id, HELP_TEXT),
            ParseResult::Usage(usage) => self.send_error(id, usage),
            ParseResult::Unknown => self.send_error(id, UNKNOWN_COMMAND),
        }
    }

    fn direct_message(&mut self, id: usize, target: &str, text: &str) {
        let Some(target_id) = self.connections.find_by_username(target) else {
            self.send_error(id, &format!("User '{target}' not found"));
            return;
        };
        let Some(sender) = self.connections.get(id).map(|conn| conn.username.clone()) else {
            return;
        };

        // The partner's name rides in the room field.
        let dm = ChatMessage::new(sender, target, text);
        debug!(conn_id = id, target_id, direct = dm.is_direct(), "Direct message");
        let Some(frame) = encode(&Message::Chat(dm)) else {
            self.send_error(id, "Message too long");
            return;
        };

        send_to(&mut self.connections, target_id, &frame);
        if target_id != id {
            send_to(&mut self.connections, id, &frame);
        }
    }

    fn join(&mut self, id: usize, room: &str) {
        if room.len() >= MAX_ROOM_NAME_LEN {
            let text = format!("Room name too long (max {} bytes)", MAX_ROOM_NAME_LEN - 1);
            self.send_error(id, &text);
            return;
        }

        match self.move_to_room(id, room) {
            Ok(()) => {
                info!(conn_id = id, room, "Joined room");
                self.send_system(id, &format!("Joined room: {room}"));
            }
            Err(e) => self.send_error(id, &room_error_text(&e)),
        }
    }

    fn leave(&mut self, id: usize) {
        let in_default = self
            .connections
            .get(id)
            .is_some_and(|conn| conn.room == DEFAULT_ROOM);
        if in_default {
            self.send_error(id, "Already in general room");
            return;
        }

        match self.move_to_room(id, DEFAULT_ROOM) {
            Ok(()) => self.send_system(id, "Returned to general room"),
            Err(e) => self.send_error(id, &room_error_text(&e)),
        }
    }

    fn list_rooms(&mut self, id: usize) {
        let mut text = String::from("Available rooms:\n");
        for room in self.rooms.iter() {
            let line = format!("  - {} ({} users)\n", room.name(), room.member_count());
            if text.len() + line.len() >= MAX_CONTENT_LEN {
                break;
            }
            text.push_str(&line);
        }
        self.send_system(id, &text);
    }

    /// Move `id` into `target`, creating it if needed.
    ///
    /// Only registered connections are room members. A member joins the new
    /// room before leaving the old one, so a failure leaves it where it was.
    fn move_to_room(&mut self, id: usize, target: &str) -> Result<(), RoomError> {
        let Some(conn) = self.connections.get_mut(id) else {
            return Ok(());
        };

        let room = self.rooms.get_or_create(target)?;
        if conn.is_registered() {
            room.add_member(id)?;
            if conn.room != target {
                self.rooms.remove_member(&conn.room, id);
            }
        }
        conn.room = target.to_string();
        Ok(())
    }

    fn broadcast_user_list(&mut self) {
        let mut users = self.connections.usernames();
        if users.len() > MAX_USER_COUNT {
            warn!(total = users.len(), "User list truncated");
            users.truncate(MAX_USER_COUNT);
        }
        if let Some(frame) = encode(&Message::UserList(users)) {
            broadcast(&mut self.connections, Audience::All, &frame);
        }
    }

    fn send_message(&mut self, id: usize, message: &Message) {
        if let Some(frame) = encode(message) {
            send_to(&mut self.connections, id, &frame);
        }
    }

    fn send_system(&mut self, id: usize, text: &str) {
        self.send_message(id, &Message::System(text.to_string()));
    }

    fn send_error(&mut self, id: usize, text: &str) {
        self.send_message(id, &Message::Error(text.to_string()));
    }
}

fn encode(message: &Message) -> Option<Bytes> {
    match message.encode() {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(msg_type = message.message_type().name(), error = %e, "Failed to encode");
            None
        }
    }
}

fn room_error_text(e: &RoomError) -> String {
    match e {
        RoomError::AtCapacity { .. } => "Failed to join room (max rooms reached)".to_string(),
        RoomError::RoomFull { room } => format!("Room '{room}' is full"),
    }
}
