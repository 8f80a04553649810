//! Slash-command parser.
//!
//! Recognised forms are matched by prefix, case-sensitively, with a single
//! space separating the command from its argument:
//!
//! ```text
//! /dm <username> <message>
//! /join <room>
//! /rooms
//! /leave
//! /help
//! ```

use super::codec::MAX_USERNAME_LEN;

pub const DM_USAGE: &str = "Usage: /dm <username> <message>";
pub const JOIN_USAGE: &str = "Usage: /join <room>";

pub const HELP_TEXT: &str = "Available commands:\n  \
    /help - Show this help message\n  \
    /rooms - List all rooms\n  \
    /join <room> - Join or create a room\n  \
    /leave - Return to general room\n  \
    /dm <username> <message> - Send direct message";

/// Parsed command, borrowing from the command text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// Direct message to one user.
    DirectMessage { target: &'a str, text: &'a str },
    /// Join or create a room.
    Join { room: &'a str },
    /// List rooms and member counts.
    Rooms,
    /// Return to the default room.
    Leave,
    /// Show the command summary.
    Help,
}

/// Parse result.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseResult<'a> {
    /// A well-formed command.
    Complete(Command<'a>),
    /// A known command with bad arguments; carries the usage line.
    Usage(&'static str),
    /// Not a recognised command.
    Unknown,
}

/// Parse the text of a Command frame.
pub fn parse(input: &str) -> ParseResult<'_> {
    if let Some(rest) = input.strip_prefix("/dm ") {
        parse_dm(rest)
    } else if let Some(room) = input.strip_prefix("/join ") {
        if room.is_empty() {
            ParseResult::Usage(JOIN_USAGE)
        } else {
            ParseResult::Complete(Command::Join { room })
        }
    } else {
        match input {
            "/rooms" => ParseResult::Complete(Command::Rooms),
            "/leave" => ParseResult::Complete(Command::Leave),
            "/help" => ParseResult::Complete(Command::Help),
            _ => ParseResult::Unknown,
        }
    }
}

/// `<username> <message>`: the username token ends at the first space and
/// must fit a username slot; the message is everything after that space.
fn parse_dm(rest: &str) -> ParseResult<'_> {
    let Some((target, text)) = rest.split_once(' ') else {
        return ParseResult::Usage(DM_USAGE);
    };

    if target.len() >= MAX_USERNAME_LEN || text.is_empty() {
        return ParseResult::Usage(DM_USAGE);
    }

    ParseResult::Complete(Command::DirectMessage { target, text })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dm() {
        match parse("/dm bob hello there") {
            ParseResult::Complete(Command::DirectMessage { target, text }) => {
                assert_eq!(target, "bob");
                assert_eq!(text, "hello there");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_dm_missing_text() {
        assert_eq!(parse("/dm bob"), ParseResult::Usage(DM_USAGE));
        assert_eq!(parse("/dm bob "), ParseResult::Usage(DM_USAGE));
    }

    #[test]
    fn test_parse_dm_long_target() {
        let input = format!("/dm {} hi", "x".repeat(MAX_USERNAME_LEN));
        assert_eq!(parse(&input), ParseResult::Usage(DM_USAGE));

        let input = format!("/dm {} hi", "x".repeat(MAX_USERNAME_LEN - 1));
        assert!(matches!(
            parse(&input),
            ParseResult::Complete(Command::DirectMessage { text: "hi", .. })
        ));
    }

    #[test]
    fn test_parse_join() {
        assert_eq!(
            parse("/join code"),
            ParseResult::Complete(Command::Join { room: "code" })
        );
        assert_eq!(parse("/join "), ParseResult::Usage(JOIN_USAGE));
    }

    #[test]
    fn test_parse_exact_commands() {
        assert_eq!(parse("/rooms"), ParseResult::Complete(Command::Rooms));
        assert_eq!(parse("/leave"), ParseResult::Complete(Command::Leave));
        assert_eq!(parse("/help"), ParseResult::Complete(Command::Help));
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(parse("/HELP"), ParseResult::Unknown);
        assert_eq!(parse("/rooms now"), ParseResult::Unknown);
        assert_eq!(parse("/join"), ParseResult::Unknown);
        assert_eq!(parse("hello"), ParseResult::Unknown);
        assert_eq!(parse(""), ParseResult::Unknown);
    }

    #[test]
    fn test_help_lists_every_command() {
        for cmd in ["/help", "/rooms", "/join", "/leave", "/dm"] {
            assert!(HELP_TEXT.contains(cmd), "missing {cmd}");
        }
    }
}
