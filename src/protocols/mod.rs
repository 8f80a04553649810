//! Protocol implementations.
//!
//! - `chat`: the fixed-layout binary chat protocol and its slash commands
//!
//! Parsers here are pure; the runtime event loop owns all I/O.

pub mod chat;
