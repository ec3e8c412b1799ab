//! Command and Reply Types
//!
//! The wire protocol is plain text: one read carries one command line, one write
//! carries one reply. There is no framing, quoting or escaping.
//!
//! ## Commands
//!
//! ```text
//! set <key> <value> [ttlSeconds]
//! get <key>
//! del <key>
//! ```
//!
//! ## Replies
//!
//! ```text
//! OK                      set succeeded
//! OK (overwritten)        set replaced an existing key
//! OK (evicted)            set pushed out the least recently used key
//! <value>                 get hit
//! NOT_FOUND               get/del on an unknown key
//! EXPIRED                 get on a key whose TTL had elapsed
//! ERROR: <reason>         malformed or unknown command
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::time::Duration;

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `set <key> <value> [ttlSeconds]`; a zero TTL never expires.
    Set {
        key: String,
        value: Bytes,
        ttl: Duration,
    },
    /// `get <key>`
    Get { key: String },
    /// `del <key>`
    Del { key: String },
}

impl Command {
    /// The lowercase command name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Set { .. } => "set",
            Command::Get { .. } => "get",
            Command::Del { .. } => "del",
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Command::Set { key, .. } | Command::Get { key } | Command::Del { key } => key,
        }
    }
}

/// A reply to send back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A write or delete succeeded.
    Ok { overwritten: bool, evicted: bool },
    /// The value stored under the requested key.
    Value(Bytes),
    /// The key is neither cached nor in the backing store.
    NotFound,
    /// The key was cached but its TTL had elapsed.
    Expired,
    /// The command could not be executed.
    Error(String),
}

impl Reply {
    /// Creates a plain `OK` reply.
    pub fn ok() -> Self {
        Reply::Ok {
            overwritten: false,
            evicted: false,
        }
    }

    /// Creates an error reply.
    pub fn error(reason: impl Into<String>) -> Self {
        Reply::Error(reason.into())
    }

    /// Returns true if this is an error reply.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Serializes the reply to the bytes written on the socket.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.serialize_into(&mut buf);
        buf.freeze()
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut BytesMut) {
        match self {
            Reply::Ok {
                overwritten,
                evicted,
            } => {
                buf.put_slice(b"OK");
                if *overwritten {
                    buf.put_slice(b" (overwritten)");
                }
                if *evicted {
                    buf.put_slice(b" (evicted)");
                }
            }
            Reply::Value(value) => buf.put_slice(value),
            Reply::NotFound => buf.put_slice(b"NOT_FOUND"),
            Reply::Expired => buf.put_slice(b"EXPIRED"),
            Reply::Error(reason) => {
                buf.put_slice(b"ERROR: ");
                buf.put_slice(reason.as_bytes());
            }
        }
    }

    /// Length of the serialized reply on success, `-1` on error.
    pub fn status(&self) -> i64 {
        if self.is_error() {
            -1
        } else {
            self.serialize().len() as i64
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.serialize()))
    }
}
