//! Message protocol definitions
//!
//! The wire protocol is plain UTF-8 text, one logical unit per transmission:
//!
//! | step | direction | payload |
//! |------|-----------|---------|
//! | 1 | server → new connection | `APELIDO` |
//! | 2 | connection → server | nickname |
//! | 3 | server → everyone else | `<nickname> entrou no chat!` |
//! | 4 | server → new connection | `Conectado ao servidor!` |
//! | 5 | connection → server | `<nickname>: <text>` |
//! | 6 | server → everyone else | verbatim relay of (5) |
//! | 7 | server → everyone remaining | `<nickname> saiu do chat!` |

use bytes::Bytes;

/// Nickname request sentinel sent to every new connection
pub const NICKNAME_PROMPT: &str = "APELIDO";

/// Sent to a connection once it has joined
pub const CONNECTED_CONFIRMATION: &str = "Conectado ao servidor!";

/// One immutable transmission unit
///
/// Cloning is cheap, so the same unit can be queued on many outboxes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message(Bytes);

impl Message {
    /// Wrap raw bytes
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Build a text message
    pub fn text(text: impl Into<String>) -> Self {
        Self(Bytes::from(text.into()))
    }

    /// Nickname request sentinel
    pub fn nickname_prompt() -> Self {
        Self(Bytes::from_static(NICKNAME_PROMPT.as_bytes()))
    }

    /// Connected confirmation for a newly joined connection
    pub fn connected() -> Self {
        Self(Bytes::from_static(CONNECTED_CONFIRMATION.as_bytes()))
    }

    /// Join announcement for everyone else
    pub fn joined(nickname: &str) -> Self {
        Self::text(format!("{} entrou no chat!", nickname))
    }

    /// Departure announcement for everyone remaining
    pub fn left(nickname: &str) -> Self {
        Self::text(format!("{} saiu do chat!", nickname))
    }

    /// Steady-state chat line as composed by the client
    pub fn chat(nickname: &str, text: &str) -> Self {
        Self::text(format!("{}: {}", nickname, text))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this unit is exactly the nickname request sentinel
    pub fn is_nickname_prompt(&self) -> bool {
        self.0.as_ref() == NICKNAME_PROMPT.as_bytes()
    }

    /// Lossy UTF-8 view for display and logging
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl From<Bytes> for Message {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

/// Extract a nickname from a handshake reply
///
/// Returns `None` when nothing but whitespace was sent.
pub fn parse_nickname(reply: &Message) -> Option<String> {
    let text = reply.to_text();
    let nickname = text.trim();
    if nickname.is_empty() {
        None
    } else {
        Some(nickname.to_string())
    }
}
