//! Chat protocol.
//!
//! A length-prefixed binary protocol over TCP. Every frame is a fixed 16
//! byte header followed by a body whose size depends only on the message
//! type. Integers are big-endian.
//!
//! ## Header
//!
//! ```text
//! +---------+--------+----------+-------------+-----------+
//! | version | type   | reserved | content len | timestamp |
//! | 1 byte  | 1 byte | 2 bytes  | 4 bytes     | 8 bytes   |
//! +---------+--------+----------+-------------+-----------+
//! ```
//!
//! ## Bodies
//!
//! ```text
//! Chat      username[32] room[64] text[2048]
//! System    text[2048]
//! Error     text[2048]
//! UserList  count:u16 username[32] x 50
//! Command   text[2048]
//! Ping      (empty)
//! Pong      (empty)
//! ```
//!
//! Strings are NUL-padded inside their slot and the header's content length
//! is always the full slot size, so a short "hi" still costs a 2160 byte
//! Chat frame.
//!
//! ## Session
//!
//! A client's first Chat frame registers its username. After that, Chat
//! frames are room messages and Command frames carry `/`-prefixed commands
//! (see [`command`]).

pub mod codec;
pub mod command;

pub use codec::{
    decode, decode_header, ChatMessage, CodecError, Message, HEADER_SIZE, MAX_CONTENT_LEN,
    MAX_FRAME_SIZE, MAX_ROOM_NAME_LEN, MAX_USERNAME_LEN, MAX_USER_COUNT,
};
