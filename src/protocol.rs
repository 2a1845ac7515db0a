//! Opcode table, arity table and reply encoding.

use crate::args::MAX_ARGS;
use crate::telemetry::TelemetryFrame;
use arrayvec::ArrayString;
use core::fmt::Write as _;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

/// Character sent alone on a line to report any failure.
pub const ERROR_SENTINEL: u8 = b'$';
pub const LINE_END: &[u8] = b"\r\n";
pub const MAX_REPLY_SIZE: usize = 256;

pub type ReplyBuffer = ArrayString<MAX_REPLY_SIZE>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Braitenberg,
    Revision,
    SetSpeed,
    GetSpeed,
    SetTargetPosition,
    ReadUltrasonic,
    ConfigurePid,
    ResetEncoders,
    ConfigureSpeedProfile,
    SetLeds,
    SetSpeedOpenLoop,
    InitMotors,
    ReadProximity,
    ReadAmbient,
    ConfigurePositionMargin,
    ReadPosition,
    ReadGyroscope,
    ReadAccelerometer,
    ConfigureUltrasonic,
    BatteryStatus,
    BinaryTelemetry,
    ResetMicrocontroller,
}

impl Opcode {
    pub const ALL: [Opcode; 22] = [
        Opcode::Braitenberg,
        Opcode::Revision,
        Opcode::SetSpeed,
        Opcode::GetSpeed,
        Opcode::SetTargetPosition,
        Opcode::ReadUltrasonic,
        Opcode::ConfigurePid,
        Opcode::ResetEncoders,
        Opcode::ConfigureSpeedProfile,
        Opcode::SetLeds,
        Opcode::SetSpeedOpenLoop,
        Opcode::InitMotors,
        Opcode::ReadProximity,
        Opcode::ReadAmbient,
        Opcode::ConfigurePositionMargin,
        Opcode::ReadPosition,
        Opcode::ReadGyroscope,
        Opcode::ReadAccelerometer,
        Opcode::ConfigureUltrasonic,
        Opcode::BatteryStatus,
        Opcode::BinaryTelemetry,
        Opcode::ResetMicrocontroller,
    ];

    pub const fn from_byte(byte: u8) -> Option<Opcode> {
        let opcode = match byte {
            b'A' => Opcode::Braitenberg,
            b'B' => Opcode::Revision,
            b'D' => Opcode::SetSpeed,
            b'E' => Opcode::GetSpeed,
            b'F' => Opcode::SetTargetPosition,
            b'G' => Opcode::ReadUltrasonic,
            b'H' => Opcode::ConfigurePid,
            b'I' => Opcode::ResetEncoders,
            b'J' => Opcode::ConfigureSpeedProfile,
            b'K' => Opcode::SetLeds,
            b'L' => Opcode::SetSpeedOpenLoop,
            b'M' => Opcode::InitMotors,
            b'N' => Opcode::ReadProximity,
            b'O' => Opcode::ReadAmbient,
            b'P' => Opcode::ConfigurePositionMargin,
            b'R' => Opcode::ReadPosition,
            b'S' => Opcode::ReadGyroscope,
            b'T' => Opcode::ReadAccelerometer,
            b'U' => Opcode::ConfigureUltrasonic,
            b'V' => Opcode::BatteryStatus,
            b'X' => Opcode::BinaryTelemetry,
            b'Z' => Opcode::ResetMicrocontroller,
            _ => return None,
        };
        Some(opcode)
    }

    /// Uppercase letter used on the request line.
    pub const fn letter(self) -> u8 {
        match self {
            Opcode::Braitenberg => b'A',
            Opcode::Revision => b'B',
            Opcode::SetSpeed => b'D',
            Opcode::GetSpeed => b'E',
            Opcode::SetTargetPosition => b'F',
            Opcode::ReadUltrasonic => b'G',
            Opcode::ConfigurePid => b'H',
            Opcode::ResetEncoders => b'I',
            Opcode::ConfigureSpeedProfile => b'J',
            Opcode::SetLeds => b'K',
            Opcode::SetSpeedOpenLoop => b'L',
            Opcode::InitMotors => b'M',
            Opcode::ReadProximity => b'N',
            Opcode::ReadAmbient => b'O',
            Opcode::ConfigurePositionMargin => b'P',
            Opcode::ReadPosition => b'R',
            Opcode::ReadGyroscope => b'S',
            Opcode::ReadAccelerometer => b'T',
            Opcode::ConfigureUltrasonic => b'U',
            Opcode::BatteryStatus => b'V',
            Opcode::BinaryTelemetry => b'X',
            Opcode::ResetMicrocontroller => b'Z',
        }
    }

    /// Lowercase letter leading every success reply.
    pub const fn reply_tag(self) -> u8 {
        self.letter().to_ascii_lowercase()
    }

    /// Exact number of arguments the opcode takes.
    pub const fn arity(self) -> usize {
        match self {
            Opcode::Braitenberg => 1,
            Opcode::SetSpeed => 2,
            Opcode::SetTargetPosition => 2,
            Opcode::ConfigurePid => 3,
            Opcode::ConfigureSpeedProfile => 5,
            Opcode::SetLeds => 9,
            Opcode::SetSpeedOpenLoop => 2,
            Opcode::ConfigurePositionMargin => 1,
            Opcode::ConfigureUltrasonic => 1,
            Opcode::BatteryStatus => 1,
            Opcode::Revision
            | Opcode::GetSpeed
            | Opcode::ReadUltrasonic
            | Opcode::ResetEncoders
            | Opcode::InitMotors
            | Opcode::ReadProximity
            | Opcode::ReadAmbient
            | Opcode::ReadPosition
            | Opcode::ReadGyroscope
            | Opcode::ReadAccelerometer
            | Opcode::BinaryTelemetry
            | Opcode::ResetMicrocontroller => 0,
        }
    }

    pub fn check_arity(self, given: usize) -> Result<(), ProtocolError> {
        if given == self.arity() {
            Ok(())
        } else {
            Err(ProtocolError::ArityMismatch {
                opcode: self.letter() as char,
                expected: self.arity(),
                given,
            })
        }
    }
}

const_assert!(Opcode::SetLeds.arity() <= MAX_ARGS);
const_assert!(Opcode::ConfigureSpeedProfile.arity() <= MAX_ARGS);

/// One reply frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `<tag>[,<field>...]\r\n`
    Ack { tag: u8, fields: Vec<String> },
    /// `$\r\n`
    Error,
    /// The fixed 68-byte telemetry frame.
    Binary(TelemetryFrame),
}

impl Reply {
    pub fn ack(opcode: Opcode) -> Self {
        Reply::Ack {
            tag: opcode.reply_tag(),
            fields: Vec::new(),
        }
    }

    pub fn with_fields<I, T>(opcode: Opcode, fields: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        Reply::Ack {
            tag: opcode.reply_tag(),
            fields: fields.into_iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Reply::Ack { tag, fields } => {
                let mut buffer = ReplyBuffer::new();
                buffer
                    .try_push(*tag as char)
                    .map_err(|_| ProtocolError::ReplyTooLarge)?;
                for field in fields {
                    write!(buffer, ",{}", field).map_err(|_| ProtocolError::ReplyTooLarge)?;
                }
                buffer
                    .try_push_str("\r\n")
                    .map_err(|_| ProtocolError::ReplyTooLarge)?;
                Ok(buffer.as_bytes().to_vec())
            }
            Reply::Error => Ok(error_line().to_vec()),
            Reply::Binary(frame) => Ok(frame.encode().to_vec()),
        }
    }
}

pub const fn error_line() -> [u8; 3] {
    [ERROR_SENTINEL, b'\r', b'\n']
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
    #[error("more than {} arguments", MAX_ARGS)]
    TooManyArguments,
    #[error("opcode {opcode} takes {expected} arguments, got {given}")]
    ArityMismatch {
        opcode: char,
        expected: usize,
        given: usize,
    },
    #[error("argument {index} is not a valid number")]
    InvalidArgument { index: usize },
    #[error("reply exceeds {} bytes", MAX_REPLY_SIZE)]
    ReplyTooLarge,
    #[error("telemetry frame is malformed")]
    MalformedFrame,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_round_trip_through_from_byte() {
        for opcode in Opcode::ALL {
            assert_eq!(Opcode::from_byte(opcode.letter()), Some(opcode));
        }
    }

    #[test]
    fn reserved_letters_are_unknown() {
        for byte in [b'C', b'Q', b'W', b'Y', b'a', b'0', b'\r'] {
            assert_eq!(Opcode::from_byte(byte), None);
        }
    }

    #[test]
    fn ack_with_fields_is_comma_joined() {
        let reply = Reply::with_fields(Opcode::GetSpeed, [12, -7]);
        assert_eq!(reply.encode().unwrap(), b"e,12,-7\r\n");
        assert_eq!(Reply::ack(Opcode::SetSpeed).encode().unwrap(), b"d\r\n");
        assert_eq!(Reply::Error.encode().unwrap(), b"$\r\n");
    }

    #[test]
    fn arity_check_reports_counts() {
        assert!(Opcode::ConfigurePid.check_arity(3).is_ok());
        assert_eq!(
            Opcode::ConfigurePid.check_arity(2),
            Err(ProtocolError::ArityMismatch {
                opcode: 'H',
                expected: 3,
                given: 2
            })
        );
    }
}
