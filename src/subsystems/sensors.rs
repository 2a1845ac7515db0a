use super::{FaultType, Subsystem};
use crate::robot::{
    ImuSamples, SensorBlock, UltrasonicRanges, IMU_SAMPLES, SENSOR_CHANNELS, ULTRASONIC_CHANNELS,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Range reported by an ultrasonic transceiver that is switched off.
pub const ULTRASONIC_INACTIVE: u16 = 1000;
pub const ULTRASONIC_ALL: u8 = 0x1f;

const AMBIENT_DEFAULT: u16 = 3800;
const ULTRASONIC_DEFAULT_CM: u16 = 250;
/// Raw accelerometer count for 1 g on the vertical axis.
const ACCEL_ONE_G: i16 = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorState {
    pub proximity: [u16; SENSOR_CHANNELS],
    pub ambient: [u16; SENSOR_CHANNELS],
    pub ultrasonic: [u16; ULTRASONIC_CHANNELS],
    pub ultrasonic_mask: u8,
    pub scripted_frames: usize,
}

#[derive(Debug, Clone)]
pub enum SensorCommand {
    SetProximity([u16; SENSOR_CHANNELS]),
    SetAmbient([u16; SENSOR_CHANNELS]),
    SetUltrasonic([u16; ULTRASONIC_CHANNELS]),
    ActivateUltrasonic(u8),
    /// Frames returned by the next proximity reads, one per read, before
    /// falling back to the steady reading.
    ScriptProximity(Vec<[u16; SENSOR_CHANNELS]>),
}

/// Infrared proximity/ambient ring, ultrasonic transceivers and IMU.
#[derive(Debug)]
pub struct SensorArray {
    state: SensorState,
    script: VecDeque<[u16; SENSOR_CHANNELS]>,
    gyro: [i16; IMU_SAMPLES],
    accel: [i16; IMU_SAMPLES],
    fault_state: Option<FaultType>,
}

impl SensorArray {
    pub fn new() -> Self {
        let mut accel = [0i16; IMU_SAMPLES];
        // Samples are interleaved x, y, z.
        for z in accel.iter_mut().skip(2).step_by(3) {
            *z = ACCEL_ONE_G;
        }

        Self {
            state: SensorState {
                proximity: [0; SENSOR_CHANNELS],
                ambient: [AMBIENT_DEFAULT; SENSOR_CHANNELS],
                ultrasonic: [ULTRASONIC_DEFAULT_CM; ULTRASONIC_CHANNELS],
                ultrasonic_mask: ULTRASONIC_ALL,
                scripted_frames: 0,
            },
            script: VecDeque::new(),
            gyro: [0; IMU_SAMPLES],
            accel,
            fault_state: None,
        }
    }

    pub fn read_proximity(&mut self) -> Result<SensorBlock, FaultType> {
        self.check_bus()?;
        let channels = self.script.pop_front().unwrap_or(self.state.proximity);
        self.state.scripted_frames = self.script.len();
        Ok(SensorBlock::from_channels(channels))
    }

    pub fn read_ambient(&self) -> Result<SensorBlock, FaultType> {
        self.check_bus()?;
        Ok(SensorBlock::from_channels(self.state.ambient))
    }

    pub fn read_ultrasonic(&self) -> Result<UltrasonicRanges, FaultType> {
        self.check_bus()?;
        let mut ranges = [ULTRASONIC_INACTIVE; ULTRASONIC_CHANNELS];
        for (i, range) in ranges.iter_mut().enumerate() {
            if self.state.ultrasonic_mask & (1 << i) != 0 {
                *range = self.state.ultrasonic[i];
            }
        }
        Ok(UltrasonicRanges(ranges))
    }

    pub fn read_gyroscope(&self) -> Result<ImuSamples, FaultType> {
        self.check_bus()?;
        Ok(ImuSamples(self.gyro))
    }

    pub fn read_accelerometer(&self) -> Result<ImuSamples, FaultType> {
        self.check_bus()?;
        Ok(ImuSamples(self.accel))
    }
}

impl Default for SensorArray {
    fn default() -> Self {
        Self::new()
    }
}

impl Subsystem for SensorArray {
    type State = SensorState;
    type Command = SensorCommand;

    fn update(&mut self, _dt_ms: u16) -> Result<(), FaultType> {
        self.check_bus()
    }

    fn execute_command(&mut self, command: Self::Command) -> Result<(), FaultType> {
        match command {
            SensorCommand::SetProximity(values) => self.state.proximity = values,
            SensorCommand::SetAmbient(values) => self.state.ambient = values,
            SensorCommand::SetUltrasonic(values) => self.state.ultrasonic = values,
            SensorCommand::ActivateUltrasonic(mask) => {
                self.check_bus()?;
                self.state.ultrasonic_mask = mask & ULTRASONIC_ALL;
            }
            SensorCommand::ScriptProximity(frames) => {
                self.script.extend(frames);
                self.state.scripted_frames = self.script.len();
            }
        }
        Ok(())
    }

    fn get_state(&self) -> Self::State {
        self.state.clone()
    }

    fn inject_fault(&mut self, fault: FaultType) {
        self.fault_state = Some(fault);
    }

    fn clear_faults(&mut self) {
        self.fault_state = None;
    }

    fn fault(&self) -> Option<FaultType> {
        self.fault_state
    }

    fn is_healthy(&self) -> bool {
        self.fault_state.is_none()
    }
}
