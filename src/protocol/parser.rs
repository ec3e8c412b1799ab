//! Command Line Parser
//!
//! Turns the bytes of one read into a [`Command`].
//!
//! ## How the Parser Works
//!
//! The input is split on ASCII whitespace; runs of whitespace and a trailing
//! `\r\n` are ignored. The first token names the command (case-insensitive),
//! the rest are its arguments. Keys and the TTL must be UTF-8; values are kept
//! as raw bytes.
//!
//! Any failure is returned as a [`ParseError`] and nothing is executed.

use crate::protocol::types::Command;
use bytes::Bytes;
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Errors that can occur while parsing a command line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Nothing but whitespace was received
    #[error("empty command")]
    EmptyInput,

    /// The first token is not a known command
    #[error("unknown command '{0}' (supported: set/get/del)")]
    UnknownCommand(String),

    /// Too few or too many arguments
    #[error("wrong number of arguments, usage: {0}")]
    WrongArity(&'static str),

    /// The TTL is not a non-negative integer
    #[error("ttl must be a non-negative integer (seconds), got '{0}'")]
    InvalidTtl(String),

    /// The TTL puts the deadline beyond what the clock can represent
    #[error("ttl out of range: '{0}'")]
    TtlOutOfRange(String),

    /// A key or command name is not valid UTF-8
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),
}

const SET_USAGE: &str = "set <key> <value> [ttl_seconds]";
const GET_USAGE: &str = "get <key>";
const DEL_USAGE: &str = "del <key>";

/// Parses one command line.
///
/// # Example
///
/// ```
/// use cachekv::protocol::{parse_command, Command};
/// use std::time::Duration;
///
/// let cmd = parse_command(b"set session abc 30").unwrap();
/// assert_eq!(
///     cmd,
///     Command::Set {
///         key: "session".to_string(),
///         value: "abc".into(),
///         ttl: Duration::from_secs(30),
///     }
/// );
/// ```
pub fn parse_command(input: &[u8]) -> Result<Command, ParseError> {
    let tokens: Vec<&[u8]> = input
        .split(|b| b.is_ascii_whitespace())
        .filter(|t| !t.is_empty())
        .collect();

    let (name, args) = match tokens.split_first() {
        Some((name, args)) => (*name, args),
        None => return Err(ParseError::EmptyInput),
    };

    if name.eq_ignore_ascii_case(b"set") {
        parse_set(args)
    } else if name.eq_ignore_ascii_case(b"get") {
        match args {
            [key] => Ok(Command::Get { key: key_str(key)? }),
            _ => Err(ParseError::WrongArity(GET_USAGE)),
        }
    } else if name.eq_ignore_ascii_case(b"del") {
        match args {
            [key] => Ok(Command::Del { key: key_str(key)? }),
            _ => Err(ParseError::WrongArity(DEL_USAGE)),
        }
    } else {
        Err(ParseError::UnknownCommand(
            String::from_utf8_lossy(name).into_owned(),
        ))
    }
}

fn parse_set(args: &[&[u8]]) -> Result<Command, ParseError> {
    let (key, value, ttl) = match args {
        [key, value] => (key, value, None),
        [key, value, ttl] => (key, value, Some(ttl)),
        _ => return Err(ParseError::WrongArity(SET_USAGE)),
    };

    let ttl = match ttl {
        Some(raw) => parse_ttl(raw)?,
        None => Duration::ZERO,
    };

    Ok(Command::Set {
        key: key_str(key)?,
        value: Bytes::copy_from_slice(value),
        ttl,
    })
}

fn parse_ttl(raw: &[u8]) -> Result<Duration, ParseError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| ParseError::InvalidTtl(String::from_utf8_lossy(raw).into_owned()))?;
    let ttl = text
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ParseError::InvalidTtl(text.to_string()))?;
    if SystemTime::now().checked_add(ttl).is_none() {
        return Err(ParseError::TtlOutOfRange(text.to_string()));
    }
    Ok(ttl)
}

fn key_str(raw: &[u8]) -> Result<String, ParseError> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|_| ParseError::InvalidUtf8("key"))
}
