//! Console commands
//!
//! One command per line. `toggle` and `notify` are the operator actions; the
//! rest play the part of a central against the loopback transport.

use std::str::FromStr;
use testcentral::gatt::profile;
use testcentral::Uuid;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start or stop the server
    Toggle,
    /// Send the manual notification
    Notify,
    State,
    /// Set the number of subscribed centrals
    Subscribe(usize),
    Read(Uuid),
    Write(Uuid, Vec<u8>),
    Help,
    Quit,
}

/// Errors produced when parsing a console line
#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("subscribe needs a count")]
    MissingCount,

    #[error("expected one of {}", .0.join(", "))]
    UnknownCharacteristic(&'static [&'static str]),

    #[error("bad hex: {0}")]
    BadHex(#[from] hex::FromHexError),

    #[error("too many arguments for {0}")]
    TooManyArguments(String),
}

pub const HELP: &str = "commands: toggle | notify | state | subscribe <n> | read <rw|ro> | write <rw|wo> <hex> | help | quit";

fn characteristic(
    name: Option<&str>,
    allowed: &'static [&'static str],
) -> Result<Uuid, ParseError> {
    match name {
        Some(name) if allowed.contains(&name) => match name {
            "rw" => Ok(profile::READ_WRITE_UUID),
            "ro" => Ok(profile::READ_ONLY_UUID),
            _ => Ok(profile::WRITE_ONLY_UUID),
        },
        _ => Err(ParseError::UnknownCharacteristic(allowed)),
    }
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(ParseError::Empty);
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "toggle" => Command::Toggle,
            "notify" => Command::Notify,
            "state" => Command::State,
            "subscribe" => {
                let count = words
                    .next()
                    .and_then(|n| n.parse().ok())
                    .ok_or(ParseError::MissingCount)?;
                Command::Subscribe(count)
            }
            "read" => Command::Read(characteristic(words.next(), &["rw", "ro"])?),
            "write" => {
                let uuid = characteristic(words.next(), &["rw", "wo"])?;
                let data = match words.next() {
                    Some(digits) => hex::decode(digits)?,
                    None => Vec::new(),
                };
                Command::Write(uuid, data)
            }
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(ParseError::UnknownCommand(other.to_string())),
        };

        if words.next().is_some() {
            return Err(ParseError::TooManyArguments(verb.to_string()));
        }
        Ok(command)
    }
}
