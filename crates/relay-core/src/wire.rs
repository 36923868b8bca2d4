//! Wire codec for the command protocol
//!
//! A `CommandMessage` maps bijectively onto a single line of text:
//!
//! ```text
//! KIND:ID:NAME:PARAM1:PARAM2:...
//! ```
//!
//! Because the id, name and parameter values may themselves contain the
//! delimiter, every literal `\` is escaped to `\\` and every literal `:` to
//! `\:` before joining. Decoding splits on unescaped colons only; a naive
//! split on every colon would corrupt payloads containing `:`.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::CodecError;

// ----------------------------------------------------------------------------
// Command Kind
// ----------------------------------------------------------------------------

/// Role of a message in a request/response exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Initiates an exchange; answered by exactly one RESPONSE or ERROR
    Request,
    /// Successful reply carrying the originating correlation id
    Response,
    /// Failure reply carrying the originating correlation id
    Error,
}

impl CommandKind {
    /// Wire token for this kind
    pub fn as_token(&self) -> &'static str {
        match self {
            CommandKind::Request => "REQUEST",
            CommandKind::Response => "RESPONSE",
            CommandKind::Error => "ERROR",
        }
    }

    /// Whether this kind is a reply that resolves a pending request
    pub fn is_reply(&self) -> bool {
        matches!(self, CommandKind::Response | CommandKind::Error)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

impl FromStr for CommandKind {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REQUEST" => Ok(CommandKind::Request),
            "RESPONSE" => Ok(CommandKind::Response),
            "ERROR" => Ok(CommandKind::Error),
            other => Err(CodecError::UnknownKind {
                kind: other.to_string(),
            }),
        }
    }
}

// ----------------------------------------------------------------------------
// Command Message
// ----------------------------------------------------------------------------

/// One message of the command protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMessage {
    /// Opaque correlation id pairing a request with its reply
    pub id: String,
    /// Command name, e.g. `REGISTER` or `SEND_MESSAGE`
    pub name: String,
    /// Ordered positional parameters
    pub params: Vec<String>,
    /// Message role
    pub kind: CommandKind,
}

impl CommandMessage {
    /// Build a REQUEST message
    pub fn request<I, N>(id: I, name: N, params: Vec<String>) -> Self
    where
        I: Into<String>,
        N: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            params,
            kind: CommandKind::Request,
        }
    }

    /// Build a RESPONSE message correlated to a request
    pub fn response<I, N>(id: I, name: N, params: Vec<String>) -> Self
    where
        I: Into<String>,
        N: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            params,
            kind: CommandKind::Response,
        }
    }

    /// Build an ERROR message correlated to a request
    pub fn error<I, N>(id: I, name: N, params: Vec<String>) -> Self
    where
        I: Into<String>,
        N: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            params,
            kind: CommandKind::Error,
        }
    }

    /// Serialize to a single wire frame
    pub fn encode(&self) -> String {
        let mut frame = String::with_capacity(
            self.kind.as_token().len() + self.id.len() + self.name.len() + 16,
        );
        frame.push_str(self.kind.as_token());
        frame.push(':');
        frame.push_str(&escape(&self.id));
        frame.push(':');
        frame.push_str(&escape(&self.name));
        for param in &self.params {
            frame.push(':');
            frame.push_str(&escape(param));
        }
        frame
    }

    /// Parse a single wire frame back into a message
    pub fn decode(raw: &str) -> Result<Self, CodecError> {
        if raw.is_empty() {
            return Err(CodecError::EmptyFrame);
        }

        let tokens = split_unescaped(raw);
        if tokens.len() < 3 {
            return Err(CodecError::TooFewTokens {
                tokens: tokens.len(),
            });
        }

        let kind: CommandKind = tokens[0].parse()?;
        let id = tokens[1].clone();
        let name = tokens[2].clone();
        let params = tokens[3..].to_vec();

        Ok(Self {
            id,
            name,
            params,
            kind,
        })
    }
}

// ----------------------------------------------------------------------------
// Escaping
// ----------------------------------------------------------------------------

/// Escape a value for embedding as one frame token
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ':' => out.push_str("\\:"),
            other => out.push(other),
        }
    }
    out
}

/// Undo `escape` on a single token
pub fn unescape(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(escaped) => out.push(escaped),
                // Dangling escape at end of token; keep it literal.
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Split a frame on unescaped colons, unescaping each resulting token
fn split_unescaped(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => current.push('\\'),
            },
            ':' => {
                tokens.push(core::mem::take(&mut current));
            }
            other => current.push(other),
        }
    }
    tokens.push(current);
    tokens
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encodes_plain_message() {
        let msg = CommandMessage::request("r1", "REGISTER", vec!["alice".to_string()]);
        assert_eq!(msg.encode(), "REQUEST:r1:REGISTER:alice");
    }

    #[test]
    fn comma_needs_no_escaping() {
        let msg = CommandMessage::response("r1", "PONG", vec!["Hi there, alice".to_string()]);
        assert_eq!(msg.encode(), "RESPONSE:r1:PONG:Hi there, alice");
    }

    #[test]
    fn colon_and_backslash_are_escaped() {
        let msg = CommandMessage::request(
            "r2",
            "SEND_MESSAGE",
            vec!["TO:u2:d2".to_string(), "MESSAGE:a\\b".to_string()],
        );
        let frame = msg.encode();
        assert_eq!(frame, "REQUEST:r2:SEND_MESSAGE:TO\\:u2\\:d2:MESSAGE\\:a\\\\b");
        assert_eq!(CommandMessage::decode(&frame).unwrap(), msg);
    }

    #[test]
    fn decode_splits_on_unescaped_colons_only() {
        let msg = CommandMessage::decode("REQUEST:id:NAME:a\\:b:c").unwrap();
        assert_eq!(msg.params, vec!["a:b".to_string(), "c".to_string()]);
    }

    #[test]
    fn decode_rejects_short_frames() {
        assert!(matches!(
            CommandMessage::decode("REQUEST:only-id"),
            Err(CodecError::TooFewTokens { tokens: 2 })
        ));
        assert!(matches!(
            CommandMessage::decode(""),
            Err(CodecError::EmptyFrame)
        ));
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        assert!(matches!(
            CommandMessage::decode("NOTIFY:id:NAME"),
            Err(CodecError::UnknownKind { .. })
        ));
    }

    #[test]
    fn empty_params_survive_round_trip() {
        let msg = CommandMessage::request("id", "NAME", vec![String::new(), "x".to_string()]);
        assert_eq!(CommandMessage::decode(&msg.encode()).unwrap(), msg);
    }

    proptest! {
        #[test]
        fn round_trip_law(
            id in "[a-zA-Z0-9:\\\\-]{0,16}",
            name in "[ -~]{1,24}",
            params in proptest::collection::vec("[ -~]{0,32}", 0..6),
        ) {
            let msg = CommandMessage {
                id,
                name,
                params,
                kind: CommandKind::Request,
            };
            prop_assert_eq!(CommandMessage::decode(&msg.encode()).unwrap(), msg);
        }
    }
}
