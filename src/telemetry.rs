//! Fixed-layout binary telemetry frame.
//!
//! ```text
//! offset  size  field
//!      0     1  tag 'x'
//!      1    24  raw proximity block
//!     25    24  raw ambient block
//!     49     8  left, right speed (i32 LE)
//!     57     8  left, right position (i32 LE)
//!     65     3  '\n' '\r' '\0'
//! ```
//!
//! The frame carries no length prefix; consumers rely on the fixed size.

use crate::protocol::ProtocolError;
use crate::robot::{SensorBlock, WheelPair, SENSOR_BLOCK_BYTES};
use static_assertions::const_assert_eq;

pub const FRAME_TAG: u8 = b'x';
pub const FRAME_TRAILER: [u8; 3] = [b'\n', b'\r', 0];

const TAG_OFFSET: usize = 0;
const PROXIMITY_OFFSET: usize = TAG_OFFSET + 1;
const AMBIENT_OFFSET: usize = PROXIMITY_OFFSET + SENSOR_BLOCK_BYTES;
const SPEED_OFFSET: usize = AMBIENT_OFFSET + SENSOR_BLOCK_BYTES;
const POSITION_OFFSET: usize = SPEED_OFFSET + 8;
const TRAILER_OFFSET: usize = POSITION_OFFSET + 8;

pub const FRAME_LEN: usize = TRAILER_OFFSET + FRAME_TRAILER.len();

const_assert_eq!(PROXIMITY_OFFSET, 1);
const_assert_eq!(AMBIENT_OFFSET, 25);
const_assert_eq!(SPEED_OFFSET, 49);
const_assert_eq!(POSITION_OFFSET, 57);
const_assert_eq!(FRAME_LEN, 68);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryFrame {
    pub proximity: SensorBlock,
    pub ambient: SensorBlock,
    pub speed: WheelPair,
    pub position: WheelPair,
}

impl TelemetryFrame {
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut out = [0u8; FRAME_LEN];
        out[TAG_OFFSET] = FRAME_TAG;
        out[PROXIMITY_OFFSET..AMBIENT_OFFSET].copy_from_slice(self.proximity.as_bytes());
        out[AMBIENT_OFFSET..SPEED_OFFSET].copy_from_slice(self.ambient.as_bytes());
        out[SPEED_OFFSET..SPEED_OFFSET + 4].copy_from_slice(&self.speed.left.to_le_bytes());
        out[SPEED_OFFSET + 4..POSITION_OFFSET].copy_from_slice(&self.speed.right.to_le_bytes());
        out[POSITION_OFFSET..POSITION_OFFSET + 4].copy_from_slice(&self.position.left.to_le_bytes());
        out[POSITION_OFFSET + 4..TRAILER_OFFSET].copy_from_slice(&self.position.right.to_le_bytes());
        out[TRAILER_OFFSET..].copy_from_slice(&FRAME_TRAILER);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != FRAME_LEN
            || bytes[TAG_OFFSET] != FRAME_TAG
            || bytes[TRAILER_OFFSET..] != FRAME_TRAILER
        {
            return Err(ProtocolError::MalformedFrame);
        }

        let block = |offset: usize| -> Result<SensorBlock, ProtocolError> {
            bytes[offset..offset + SENSOR_BLOCK_BYTES]
                .try_into()
                .map(SensorBlock::new)
                .map_err(|_| ProtocolError::MalformedFrame)
        };
        let word = |offset: usize| -> Result<i32, ProtocolError> {
            bytes[offset..offset + 4]
                .try_into()
                .map(i32::from_le_bytes)
                .map_err(|_| ProtocolError::MalformedFrame)
        };

        Ok(Self {
            proximity: block(PROXIMITY_OFFSET)?,
            ambient: block(AMBIENT_OFFSET)?,
            speed: WheelPair::new(word(SPEED_OFFSET)?, word(SPEED_OFFSET + 4)?),
            position: WheelPair::new(word(POSITION_OFFSET)?, word(POSITION_OFFSET + 4)?),
        })
    }
}
