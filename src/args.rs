//! Argument tokenizer.

use crate::protocol::ProtocolError;
use arrayvec::ArrayString;
use heapless::Vec;

pub const SEPARATOR: u8 = b',';
pub const MAX_ARGS: usize = 16;
/// Argument slot size; one byte is reserved for the terminator on the wire side.
pub const ARG_LENGTH: usize = 10;
pub const MAX_ARG_CHARS: usize = ARG_LENGTH - 1;

pub type Arg = ArrayString<MAX_ARG_CHARS>;

/// Ordered arguments of one command. Built per command, dropped after dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgList {
    args: Vec<Arg, MAX_ARGS>,
}

impl ArgList {
    pub fn new() -> Self {
        Self { args: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(Arg::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(Arg::as_str)
    }

    /// Parse argument `index` as an integer of type `T`.
    pub fn parse<T: core::str::FromStr>(&self, index: usize) -> Result<T, ProtocolError> {
        self.get(index)
            .and_then(|arg| arg.trim().parse().ok())
            .ok_or(ProtocolError::InvalidArgument { index })
    }
}

/// Split an argument section on [`SEPARATOR`].
///
/// Runs of separators count as one; tokens are cut to [`MAX_ARG_CHARS`]
/// characters. More than [`MAX_ARGS`] tokens is an error rather than a
/// silent truncation.
pub fn tokenize(section: &[u8]) -> Result<ArgList, ProtocolError> {
    let mut list = ArgList::new();

    for token in section.split(|&b| b == SEPARATOR).filter(|t| !t.is_empty()) {
        let mut arg = Arg::new();
        for ch in String::from_utf8_lossy(token).chars() {
            if arg.try_push(ch).is_err() {
                break;
            }
        }
        list.args
            .push(arg)
            .map_err(|_| ProtocolError::TooManyArguments)?;
    }

    Ok(list)
}
