//! Chat wire codec.
//!
//! Encodes and decodes the fixed-layout frames described in the module docs
//! of [`crate::protocols::chat`]. No I/O and no state: callers hand in byte
//! slices and get messages back, or hand in messages and get bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

/// Protocol version carried in every header.
pub const PROTOCOL_VERSION: u8 = 1;

/// Size of the fixed frame header.
pub const HEADER_SIZE: usize = 16;

/// Username slot size, terminator included.
pub const MAX_USERNAME_LEN: usize = 32;

/// Room name slot size, terminator included.
pub const MAX_ROOM_NAME_LEN: usize = 64;

/// Text slot size, terminator included.
pub const MAX_CONTENT_LEN: usize = 2048;

/// Number of username slots in a user list body.
pub const MAX_USER_COUNT: usize = 50;

/// Chat body: username + room + text.
pub const CHAT_BODY_SIZE: usize = MAX_USERNAME_LEN + MAX_ROOM_NAME_LEN + MAX_CONTENT_LEN;

/// System, Error and Command bodies.
pub const TEXT_BODY_SIZE: usize = MAX_CONTENT_LEN;

/// User list body: 2 byte count + every username slot.
pub const USER_LIST_BODY_SIZE: usize = 2 + MAX_USER_COUNT * MAX_USERNAME_LEN;

/// Largest frame any message type produces.
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + CHAT_BODY_SIZE;

/// Room names a receiving client treats as real rooms when telling a direct
/// message apart from room chat.
pub const WELL_KNOWN_ROOMS: [&str; 3] = ["general", "random", "help"];

/// Message type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Chat = 0x01,
    System = 0x02,
    Error = 0x03,
    UserList = 0x04,
    Command = 0x05,
    Ping = 0x06,
    Pong = 0x07,
}

impl MessageType {
    /// Map a wire byte to a known type.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(MessageType::Chat),
            0x02 => Some(MessageType::System),
            0x03 => Some(MessageType::Error),
            0x04 => Some(MessageType::UserList),
            0x05 => Some(MessageType::Command),
            0x06 => Some(MessageType::Ping),
            0x07 => Some(MessageType::Pong),
            _ => None,
        }
    }

    /// Fixed body size for this type. This is always the `content_length`
    /// written into the header, whatever the logical payload length.
    pub fn body_size(self) -> usize {
        match self {
            MessageType::Chat => CHAT_BODY_SIZE,
            MessageType::System | MessageType::Error | MessageType::Command => TEXT_BODY_SIZE,
            MessageType::UserList => USER_LIST_BODY_SIZE,
            MessageType::Ping | MessageType::Pong => 0,
        }
    }

    /// Human-readable name for log lines.
    pub fn name(self) -> &'static str {
        match self {
            MessageType::Chat => "CHAT",
            MessageType::System => "SYSTEM",
            MessageType::Error => "ERROR",
            MessageType::UserList => "USERLIST",
            MessageType::Command => "COMMAND",
            MessageType::Ping => "PING",
            MessageType::Pong => "PONG",
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    /// Raw type byte; unknown values are kept so the caller can reject them.
    pub msg_type: u8,
    pub content_len: u32,
    pub timestamp: u64,
}

impl Header {
    /// Known message type, if the type byte is recognised.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_u8(self.msg_type)
    }

    /// Header plus declared body length.
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.content_len as usize
    }
}

/// Body of a Chat frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub username: String,
    pub room: String,
    pub text: String,
}

impl ChatMessage {
    pub fn new(
        username: impl Into<String>,
        room: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            room: room.into(),
            text: text.into(),
        }
    }

    /// Whether a receiving client should render this as a direct message.
    ///
    /// Direct messages reuse the Chat shape with the partner's username in
    /// the room field, so the only signal is a room value outside the well
    /// known set. Custom room names are misread as direct messages.
    pub fn is_direct(&self) -> bool {
        !WELL_KNOWN_ROOMS.contains(&self.room.as_str())
    }
}

/// A decoded or to-be-encoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Chat(ChatMessage),
    System(String),
    Error(String),
    UserList(Vec<String>),
    Command(String),
    Ping,
    Pong,
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Chat(_) => MessageType::Chat,
            Message::System(_) => MessageType::System,
            Message::Error(_) => MessageType::Error,
            Message::UserList(_) => MessageType::UserList,
            Message::Command(_) => MessageType::Command,
            Message::Ping => MessageType::Ping,
            Message::Pong => MessageType::Pong,
        }
    }

    /// Encode with the current wall-clock timestamp.
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        self.encode_at(timestamp_millis())
    }

    /// Encode with an explicit timestamp.
    pub fn encode_at(&self, timestamp: u64) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.message_type().body_size());
        self.encode_into(&mut buf, timestamp)?;
        Ok(buf.freeze())
    }

    /// Append one complete frame to `buf`.
    ///
    /// All fields are checked before anything is written, so `buf` is left
    /// untouched on error. Returns the number of bytes appended.
    pub fn encode_into(&self, buf: &mut BytesMut, timestamp: u64) -> Result<usize, CodecError> {
        self.validate()?;

        let msg_type = self.message_type();
        let body_size = msg_type.body_size();
        buf.reserve(HEADER_SIZE + body_size);

        buf.put_u8(PROTOCOL_VERSION);
        buf.put_u8(msg_type as u8);
        buf.put_u16(0);
        buf.put_u32(body_size as u32);
        buf.put_u64(timestamp);

        match self {
            Message::Chat(chat) => {
                put_field(buf, &chat.username, MAX_USERNAME_LEN);
                put_field(buf, &chat.room, MAX_ROOM_NAME_LEN);
                put_field(buf, &chat.text, MAX_CONTENT_LEN);
            }
            Message::System(text) | Message::Error(text) | Message::Command(text) => {
                put_field(buf, text, MAX_CONTENT_LEN);
            }
            Message::UserList(users) => {
                buf.put_u16(users.len() as u16);
                for user in users {
                    put_field(buf, user, MAX_USERNAME_LEN);
                }
                let unused = MAX_USER_COUNT - users.len();
                buf.put_bytes(0, unused * MAX_USERNAME_LEN);
            }
            Message::Ping | Message::Pong => {}
        }

        Ok(HEADER_SIZE + body_size)
    }

    fn validate(&self) -> Result<(), CodecError> {
        match self {
            Message::Chat(chat) => {
                check_field("username", &chat.username, MAX_USERNAME_LEN)?;
                check_field("room", &chat.room, MAX_ROOM_NAME_LEN)?;
                check_field("text", &chat.text, MAX_CONTENT_LEN)
            }
            Message::System(text) | Message::Error(text) | Message::Command(text) => {
                check_field("text", text, MAX_CONTENT_LEN)
            }
            Message::UserList(users) => {
                if users.len() > MAX_USER_COUNT {
                    return Err(CodecError::TooManyUsers { count: users.len() });
                }
                users
                    .iter()
                    .try_for_each(|user| check_field("username", user, MAX_USERNAME_LEN))
            }
            Message::Ping | Message::Pong => Ok(()),
        }
    }
}

/// Decode a header from the front of `buf`.
///
/// Fails when fewer than [`HEADER_SIZE`] bytes are available or the version
/// is not [`PROTOCOL_VERSION`]. The type byte is not checked here.
pub fn decode_header(buf: &[u8]) -> Result<Header, CodecError> {
    if buf.len() < HEADER_SIZE {
        return Err(CodecError::InvalidHeader {
            available: buf.len(),
        });
    }

    let mut cursor = &buf[..HEADER_SIZE];
    let version = cursor.get_u8();
    let msg_type = cursor.get_u8();
    let _reserved = cursor.get_u16();
    let content_len = cursor.get_u32();
    let timestamp = cursor.get_u64();

    if version != PROTOCOL_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    Ok(Header {
        version,
        msg_type,
        content_len,
        timestamp,
    })
}

/// Decode the body of a frame. `frame` starts at the header.
pub fn decode_body(msg_type: MessageType, frame: &[u8]) -> Result<Message, CodecError> {
    let needed = HEADER_SIZE + msg_type.body_size();
    if frame.len() < needed {
        return Err(CodecError::Truncated {
            needed,
            available: frame.len(),
        });
    }

    let body = &frame[HEADER_SIZE..needed];
    let message = match msg_type {
        MessageType::Chat => {
            let (username, rest) = body.split_at(MAX_USERNAME_LEN);
            let (room, text) = rest.split_at(MAX_ROOM_NAME_LEN);
            Message::Chat(ChatMessage {
                username: read_field(username),
                room: read_field(room),
                text: read_field(text),
            })
        }
        MessageType::System => Message::System(read_field(body)),
        MessageType::Error => Message::Error(read_field(body)),
        MessageType::Command => Message::Command(read_field(body)),
        MessageType::UserList => {
            let mut cursor = body;
            let count = cursor.get_u16();
            if count as usize > MAX_USER_COUNT {
                return Err(CodecError::InvalidUserCount(count));
            }
            let users = cursor
                .chunks_exact(MAX_USERNAME_LEN)
                .take(count as usize)
                .map(read_field)
                .collect();
            Message::UserList(users)
        }
        MessageType::Ping => Message::Ping,
        MessageType::Pong => Message::Pong,
    };

    Ok(message)
}

/// Decode a complete frame: header, type and body.
pub fn decode(frame: &[u8]) -> Result<(Header, Message), CodecError> {
    let header = decode_header(frame)?;
    let msg_type = header
        .message_type()
        .ok_or(CodecError::UnknownType(header.msg_type))?;
    let message = decode_body(msg_type, frame)?;
    Ok((header, message))
}

/// Milliseconds since the Unix epoch.
pub fn timestamp_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

fn check_field(field: &'static str, value: &str, capacity: usize) -> Result<(), CodecError> {
    // One byte of every slot is reserved for the terminator.
    if value.len() >= capacity {
        return Err(CodecError::FieldTooLong {
            field,
            len: value.len(),
            capacity,
        });
    }
    if value.as_bytes().contains(&0) {
        return Err(CodecError::InteriorNul { field });
    }
    Ok(())
}

fn put_field(buf: &mut BytesMut, value: &str, capacity: usize) {
    buf.put_slice(value.as_bytes());
    buf.put_bytes(0, capacity - value.len());
}

/// The slot's last byte is always treated as the terminator.
fn read_field(slot: &[u8]) -> String {
    let slot = &slot[..slot.len().saturating_sub(1)];
    let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
    String::from_utf8_lossy(&slot[..end]).into_owned()
}

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer bytes than a header.
    InvalidHeader { available: usize },
    /// Version byte other than [`PROTOCOL_VERSION`].
    UnsupportedVersion(u8),
    /// Type byte outside the known set.
    UnknownType(u8),
    /// Fewer bytes than header plus the type's fixed body.
    Truncated { needed: usize, available: usize },
    /// Text does not fit its slot with the terminator.
    FieldTooLong {
        field: &'static str,
        len: usize,
        capacity: usize,
    },
    /// Text contains a NUL byte.
    InteriorNul { field: &'static str },
    /// More users than user list slots.
    TooManyUsers { count: usize },
    /// User list body claims more users than it has slots.
    InvalidUserCount(u16),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::InvalidHeader { available } => {
                write!(f, "invalid header: {available} of {HEADER_SIZE} bytes")
            }
            CodecError::UnsupportedVersion(v) => write!(f, "unsupported protocol version {v}"),
            CodecError::UnknownType(t) => write!(f, "unknown message type 0x{t:02x}"),
            CodecError::Truncated { needed, available } => {
                write!(f, "truncated frame: need {needed} bytes, have {available}")
            }
            CodecError::FieldTooLong {
                field,
                len,
                capacity,
            } => write!(
                f,
                "field '{field}' too long: {len} bytes, must be under {capacity}"
            ),
            CodecError::InteriorNul { field } => write!(f, "field '{field}' contains a NUL byte"),
            CodecError::TooManyUsers { count } => {
                write!(f, "too many users: {count} > {MAX_USER_COUNT}")
            }
            CodecError::InvalidUserCount(count) => {
                write!(f, "user list count {count} exceeds {MAX_USER_COUNT} slots")
            }
        }
    }
}

impl std::error::Error for CodecError {}
