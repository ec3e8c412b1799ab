//! Text Protocol Implementation
//!
//! This module defines the line-oriented text protocol spoken by cachekv.
//!
//! ## Overview
//!
//! A client writes one command line per request and reads one reply. There is
//! no length prefix: a single read is taken to be a whole command, bounded by
//! the connection's buffer size.
//!
//! ## Modules
//!
//! - `types`: the `Command` and `Reply` enums and reply serialization
//! - `parser`: whitespace tokenizer that builds a `Command`
//!
//! ## Example
//!
//! ```
//! use cachekv::protocol::{parse_command, Command, Reply};
//!
//! let cmd = parse_command(b"get name").unwrap();
//! assert_eq!(cmd, Command::Get { key: "name".to_string() });
//!
//! let reply = Reply::NotFound;
//! assert_eq!(&reply.serialize()[..], b"NOT_FOUND");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_command, ParseError};
pub use types::{Command, Reply};
