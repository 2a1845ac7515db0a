//! Command line framing.

use crate::link::{Link, LinkError};
use arrayvec::ArrayVec;

/// Size of the line buffer, terminator slot included.
pub const LINE_LENGTH: usize = 16 + 64 + 1 + 1 + 1;
/// Longest line content the reader keeps.
pub const MAX_LINE_CONTENT: usize = LINE_LENGTH - 1;

pub type Line = ArrayVec<u8, MAX_LINE_CONTENT>;

/// Outcome of one [`LineReader::read_line`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A terminator was seen or the length cap was reached.
    Data(Line),
    /// The link went quiet after at least one byte.
    ShortRead(Line),
    /// Nothing arrived at all.
    Timeout,
}

impl LineRead {
    pub fn line(&self) -> Option<&Line> {
        match self {
            LineRead::Data(line) | LineRead::ShortRead(line) => Some(line),
            LineRead::Timeout => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct LineReader;

impl LineReader {
    pub fn new() -> Self {
        Self
    }

    /// Read bytes one at a time until CR, LF, the length cap or a timeout.
    pub fn read_line<L: Link + ?Sized>(&self, link: &mut L) -> Result<LineRead, LinkError> {
        let mut line = Line::new();

        while !line.is_full() {
            let byte = match link.read_byte() {
                Ok(byte) => byte,
                Err(nb::Error::WouldBlock) => {
                    if line.is_empty() {
                        return Ok(LineRead::Timeout);
                    }
                    return Ok(LineRead::ShortRead(line));
                }
                Err(nb::Error::Other(e)) => return Err(e),
            };

            if byte == b'\r' || byte == b'\n' {
                break;
            }
            line.push(byte);
        }

        Ok(LineRead::Data(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MockLink;

    #[test]
    fn stops_at_first_terminator() {
        let mut link = MockLink::new();
        link.inject(b"D,100,100\r\n");

        let read = LineReader::new().read_line(&mut link).unwrap();
        assert_eq!(read, LineRead::Data(Line::try_from(&b"D,100,100"[..]).unwrap()));
        // The LF of the pair is still buffered and reads back as an empty line.
        let read = LineReader::new().read_line(&mut link).unwrap();
        assert_eq!(read, LineRead::Data(Line::new()));
    }

    #[test]
    fn nothing_buffered_is_a_timeout() {
        let mut link = MockLink::new();
        assert_eq!(LineReader::new().read_line(&mut link).unwrap(), LineRead::Timeout);
    }

    #[test]
    fn partial_line_is_a_short_read() {
        let mut link = MockLink::new();
        link.inject(b"E,");

        let read = LineReader::new().read_line(&mut link).unwrap();
        assert_eq!(read, LineRead::ShortRead(Line::try_from(&b"E,"[..]).unwrap()));
    }

    #[test]
    fn long_line_is_cut_at_the_cap() {
        let mut link = MockLink::new();
        let long = vec![b'K'; LINE_LENGTH + 10];
        link.inject(&long);

        match LineReader::new().read_line(&mut link).unwrap() {
            LineRead::Data(line) => assert_eq!(line.len(), MAX_LINE_CONTENT),
            other => panic!("expected a capped line, got {:?}", other),
        }
        assert_eq!(link.pending_input(), long.len() - MAX_LINE_CONTENT);
    }
}
