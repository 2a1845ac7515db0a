//! Actuator/sensor bus interface and the simulated robot behind it.
//!
//! Every call is synchronous and non-reentrant and reports success or
//! failure. The bridge never assumes more than that.

use crate::subsystems::{
    FaultType, MotorCommand, MotorController, PowerCommand, PowerSystem, SensorArray,
    SensorCommand, Subsystem, SubsystemId,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const SENSOR_CHANNELS: usize = 12;
pub const SENSOR_BLOCK_BYTES: usize = SENSOR_CHANNELS * 2;
pub const ULTRASONIC_CHANNELS: usize = 5;
pub const IMU_SAMPLES: usize = 30;
pub const BATTERY_REGISTER_BYTES: usize = 12;
pub const LED_COUNT: usize = 3;

pub const DEFAULT_POSITION_MARGIN: i32 = 20;

// Battery register scale factors, unit per LSB.
pub const VOLTAGE_MV_PER_LSB: f32 = 9.76;
pub const CURRENT_MA_PER_LSB: f32 = 0.07813;
pub const CAPACITY_MAH_PER_LSB: f32 = 1.6;
pub const TEMPERATURE_C_PER_LSB: f32 = 0.003906;
/// Hold time between the status LED and the microcontroller reset.
pub const RESET_LED_HOLD: Duration = Duration::from_millis(10);

/// Raw 12-channel infrared block, 16-bit little-endian per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorBlock([u8; SENSOR_BLOCK_BYTES]);

impl SensorBlock {
    pub const fn new(raw: [u8; SENSOR_BLOCK_BYTES]) -> Self {
        Self(raw)
    }

    pub fn from_channels(channels: [u16; SENSOR_CHANNELS]) -> Self {
        let mut raw = [0u8; SENSOR_BLOCK_BYTES];
        for (chunk, value) in raw.chunks_exact_mut(2).zip(channels) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        Self(raw)
    }

    pub fn channel(&self, index: usize) -> u16 {
        u16::from_le_bytes([self.0[index * 2], self.0[index * 2 + 1]])
    }

    pub fn channels(&self) -> [u16; SENSOR_CHANNELS] {
        core::array::from_fn(|i| self.channel(i))
    }

    pub fn as_bytes(&self) -> &[u8; SENSOR_BLOCK_BYTES] {
        &self.0
    }
}

/// A left/right pair of wheel values (speeds or encoder positions).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelPair {
    pub left: i32,
    pub right: i32,
}

impl WheelPair {
    pub const fn new(left: i32, right: i32) -> Self {
        Self { left, right }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UltrasonicRanges(pub [u16; ULTRASONIC_CHANNELS]);

/// Interleaved x/y/z samples, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImuSamples(pub [i16; IMU_SAMPLES]);

/// Fuel-gauge register block.
///
/// ```text
/// 0      status flags
/// 1..3   absolute remaining capacity (u16 LE)
/// 3      relative remaining capacity (%)
/// 4..6   current (i16 LE)
/// 6..8   average current (i16 LE)
/// 8..10  temperature (i16 LE)
/// 10..12 voltage (u16 LE)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryRegisters([u8; BATTERY_REGISTER_BYTES]);

impl BatteryRegisters {
    pub const fn new(raw: [u8; BATTERY_REGISTER_BYTES]) -> Self {
        Self(raw)
    }

    pub fn build(
        status: u8,
        capacity_raw: u16,
        relative_capacity: u8,
        current_raw: i16,
        average_current_raw: i16,
        temperature_raw: i16,
        voltage_raw: u16,
    ) -> Self {
        let mut raw = [0u8; BATTERY_REGISTER_BYTES];
        raw[0] = status;
        raw[1..3].copy_from_slice(&capacity_raw.to_le_bytes());
        raw[3] = relative_capacity;
        raw[4..6].copy_from_slice(&current_raw.to_le_bytes());
        raw[6..8].copy_from_slice(&average_current_raw.to_le_bytes());
        raw[8..10].copy_from_slice(&temperature_raw.to_le_bytes());
        raw[10..12].copy_from_slice(&voltage_raw.to_le_bytes());
        Self(raw)
    }

    fn word(&self, offset: usize) -> [u8; 2] {
        [self.0[offset], self.0[offset + 1]]
    }

    pub fn status(&self) -> u8 {
        self.0[0]
    }

    pub fn capacity_raw(&self) -> u16 {
        u16::from_le_bytes(self.word(1))
    }

    pub fn relative_capacity(&self) -> u8 {
        self.0[3]
    }

    pub fn current_raw(&self) -> i16 {
        i16::from_le_bytes(self.word(4))
    }

    pub fn average_current_raw(&self) -> i16 {
        i16::from_le_bytes(self.word(6))
    }

    pub fn temperature_raw(&self) -> i16 {
        i16::from_le_bytes(self.word(8))
    }

    pub fn voltage_raw(&self) -> u16 {
        u16::from_le_bytes(self.word(10))
    }

    pub fn voltage_mv(&self) -> f32 {
        f32::from(self.voltage_raw()) * VOLTAGE_MV_PER_LSB
    }

    pub fn current_ma(&self) -> f32 {
        f32::from(self.current_raw()) * CURRENT_MA_PER_LSB
    }

    pub fn average_current_ma(&self) -> f32 {
        f32::from(self.average_current_raw()) * CURRENT_MA_PER_LSB
    }

    pub fn capacity_mah(&self) -> f32 {
        f32::from(self.capacity_raw()) * CAPACITY_MAH_PER_LSB
    }

    pub fn temperature_c(&self) -> f32 {
        f32::from(self.temperature_raw()) * TEMPERATURE_C_PER_LSB
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotorMode {
    /// No control; wheels free.
    Idle,
    /// Closed-loop speed.
    Speed,
    /// Open-loop speed (PWM).
    OpenLoop,
    Position,
    /// Closed-loop speed with acceleration ramps.
    SpeedProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: i32,
    pub ki: i32,
    pub kd: i32,
}

impl PidGains {
    pub const DEFAULT: PidGains = PidGains { kp: 10, ki: 5, kd: 1 };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedProfile {
    pub acc_increment: i32,
    pub acc_divider: i32,
    pub min_speed_acc: i32,
    pub min_speed_dec: i32,
    pub max_speed: i32,
}

impl SpeedProfile {
    pub const DEFAULT: SpeedProfile = SpeedProfile {
        acc_increment: 3,
        acc_divider: 0,
        min_speed_acc: 20,
        min_speed_dec: 1,
        max_speed: 400,
    };

    /// Steeper ramp used while driving reactively.
    pub const REACTIVE: SpeedProfile = SpeedProfile {
        acc_increment: 10,
        ..SpeedProfile::DEFAULT
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusLed {
    Off,
    Red,
    Green,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("{subsystem:?} bus transaction failed ({fault:?})")]
    Transaction {
        subsystem: SubsystemId,
        fault: FaultType,
    },
}

impl BusError {
    fn on(subsystem: SubsystemId) -> impl Fn(FaultType) -> BusError {
        move |fault| BusError::Transaction { subsystem, fault }
    }
}

pub trait RobotBus {
    fn set_mode(&mut self, mode: MotorMode) -> Result<(), BusError>;
    fn configure_pid(&mut self, gains: PidGains) -> Result<(), BusError>;
    fn set_speed_profile(&mut self, profile: SpeedProfile) -> Result<(), BusError>;
    fn set_position_margin(&mut self, margin: i32) -> Result<(), BusError>;

    fn set_speed(&mut self, left: i32, right: i32) -> Result<(), BusError>;
    fn speed(&mut self) -> Result<WheelPair, BusError>;
    fn set_target_position(&mut self, left: i32, right: i32) -> Result<(), BusError>;
    fn position(&mut self) -> Result<WheelPair, BusError>;
    fn reset_encoders(&mut self) -> Result<(), BusError>;

    fn set_rgb_leds(&mut self, leds: [Rgb; LED_COUNT]) -> Result<(), BusError>;
    fn set_status_led(&mut self, led: StatusLed) -> Result<(), BusError>;

    fn proximity(&mut self) -> Result<SensorBlock, BusError>;
    fn ambient(&mut self) -> Result<SensorBlock, BusError>;
    fn ultrasonic(&mut self) -> Result<UltrasonicRanges, BusError>;
    fn activate_ultrasonic(&mut self, mask: u8) -> Result<(), BusError>;
    fn gyroscope(&mut self) -> Result<ImuSamples, BusError>;
    fn accelerometer(&mut self) -> Result<ImuSamples, BusError>;

    fn battery(&mut self) -> Result<BatteryRegisters, BusError>;
    fn charger_connected(&mut self) -> Result<bool, BusError>;
    fn firmware_revision(&mut self) -> Result<u8, BusError>;
    fn reset_microcontroller(&mut self) -> Result<(), BusError>;

    /// Default motor-controller configuration, ending in idle mode.
    fn init_motors(&mut self) -> Result<(), BusError> {
        self.set_position_margin(DEFAULT_POSITION_MARGIN)?;
        self.configure_pid(PidGains::DEFAULT)?;
        self.set_speed_profile(SpeedProfile::DEFAULT)?;
        self.set_mode(MotorMode::Idle)
    }
}

/// Firmware revision reported by the simulator: version C, revision 4.
pub const SIMULATED_REVISION: u8 = 0x24;

/// Robot made of simulated subsystems.
///
/// Simulated time advances by one tick on every encoder read, so a
/// reactive run moves the robot one tick per cycle.
#[derive(Debug)]
pub struct SimulatedRobot {
    motors: MotorController,
    sensors: SensorArray,
    power: PowerSystem,
    leds: [Rgb; LED_COUNT],
    status_led: StatusLed,
    tick_ms: u16,
    bus_calls: u64,
    resets: u32,
}

impl SimulatedRobot {
    pub fn new(tick_ms: u16) -> Self {
        Self {
            motors: MotorController::new(),
            sensors: SensorArray::new(),
            power: PowerSystem::new(),
            leds: [Rgb::default(); LED_COUNT],
            status_led: StatusLed::Off,
            tick_ms,
            bus_calls: 0,
            resets: 0,
        }
    }

    pub fn motors(&self) -> &MotorController {
        &self.motors
    }

    pub fn motors_mut(&mut self) -> &mut MotorController {
        &mut self.motors
    }

    pub fn sensors(&self) -> &SensorArray {
        &self.sensors
    }

    pub fn sensors_mut(&mut self) -> &mut SensorArray {
        &mut self.sensors
    }

    pub fn power(&self) -> &PowerSystem {
        &self.power
    }

    pub fn power_mut(&mut self) -> &mut PowerSystem {
        &mut self.power
    }

    pub fn leds(&self) -> [Rgb; LED_COUNT] {
        self.leds
    }

    pub fn status_led(&self) -> StatusLed {
        self.status_led
    }

    /// Total number of bus transactions served so far.
    pub fn bus_calls(&self) -> u64 {
        self.bus_calls
    }

    pub fn resets(&self) -> u32 {
        self.resets
    }

    pub fn set_proximity(&mut self, channels: [u16; SENSOR_CHANNELS]) {
        let _ = self.sensors.execute_command(SensorCommand::SetProximity(channels));
    }

    pub fn script_proximity(&mut self, frames: Vec<[u16; SENSOR_CHANNELS]>) {
        let _ = self.sensors.execute_command(SensorCommand::ScriptProximity(frames));
    }

    pub fn set_charger_connected(&mut self, connected: bool) {
        let _ = self.power.execute_command(PowerCommand::SetChargerConnected(connected));
    }

    pub fn inject_fault(&mut self, subsystem: SubsystemId, fault: FaultType) {
        match subsystem {
            SubsystemId::Motors => self.motors.inject_fault(fault),
            SubsystemId::Sensors => self.sensors.inject_fault(fault),
            SubsystemId::Power => self.power.inject_fault(fault),
        }
    }

    pub fn clear_faults(&mut self, subsystem: Option<SubsystemId>) {
        match subsystem {
            Some(SubsystemId::Motors) => self.motors.clear_faults(),
            Some(SubsystemId::Sensors) => self.sensors.clear_faults(),
            Some(SubsystemId::Power) => self.power.clear_faults(),
            None => {
                self.motors.clear_faults();
                self.sensors.clear_faults();
                self.power.clear_faults();
            }
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.motors.is_healthy() && self.sensors.is_healthy() && self.power.is_healthy()
    }

    fn tick(&mut self) -> Result<(), BusError> {
        self.motors.update(self.tick_ms).map_err(BusError::on(SubsystemId::Motors))?;
        // The battery keeps its own fault state; a sagging pack does not stop the wheels.
        if let Err(fault) = self.power.update(self.tick_ms) {
            debug!("Simulated battery reports {:?}", fault);
        }
        Ok(())
    }

    fn motor_command(&mut self, command: MotorCommand) -> Result<(), BusError> {
        self.bus_calls += 1;
        self.motors
            .execute_command(command)
            .map_err(BusError::on(SubsystemId::Motors))
    }
}

impl Default for SimulatedRobot {
    fn default() -> Self {
        Self::new(50)
    }
}

impl RobotBus for SimulatedRobot {
    fn set_mode(&mut self, mode: MotorMode) -> Result<(), BusError> {
        self.motor_command(MotorCommand::SetMode(mode))
    }

    fn configure_pid(&mut self, gains: PidGains) -> Result<(), BusError> {
        self.motor_command(MotorCommand::ConfigurePid(gains))
    }

    fn set_speed_profile(&mut self, profile: SpeedProfile) -> Result<(), BusError> {
        self.motor_command(MotorCommand::SetProfile(profile))
    }

    fn set_position_margin(&mut self, margin: i32) -> Result<(), BusError> {
        self.motor_command(MotorCommand::SetPositionMargin(margin))
    }

    fn set_speed(&mut self, left: i32, right: i32) -> Result<(), BusError> {
        self.motor_command(MotorCommand::SetSpeed(WheelPair::new(left, right)))
    }

    fn speed(&mut self) -> Result<WheelPair, BusError> {
        self.bus_calls += 1;
        self.motors.check_bus().map_err(BusError::on(SubsystemId::Motors))?;
        Ok(self.motors.speed())
    }

    fn set_target_position(&mut self, left: i32, right: i32) -> Result<(), BusError> {
        self.motor_command(MotorCommand::SetTargetPosition(WheelPair::new(left, right)))
    }

    fn position(&mut self) -> Result<WheelPair, BusError> {
        self.bus_calls += 1;
        self.tick()?;
        Ok(self.motors.position())
    }

    fn reset_encoders(&mut self) -> Result<(), BusError> {
        self.motor_command(MotorCommand::ResetEncoders)
    }

    fn set_rgb_leds(&mut self, leds: [Rgb; LED_COUNT]) -> Result<(), BusError> {
        self.bus_calls += 1;
        self.motors.check_bus().map_err(BusError::on(SubsystemId::Motors))?;
        self.leds = leds;
        Ok(())
    }

    fn set_status_led(&mut self, led: StatusLed) -> Result<(), BusError> {
        self.bus_calls += 1;
        self.motors.check_bus().map_err(BusError::on(SubsystemId::Motors))?;
        self.status_led = led;
        Ok(())
    }

    fn proximity(&mut self) -> Result<SensorBlock, BusError> {
        self.bus_calls += 1;
        self.sensors.read_proximity().map_err(BusError::on(SubsystemId::Sensors))
    }

    fn ambient(&mut self) -> Result<SensorBlock, BusError> {
        self.bus_calls += 1;
        self.sensors.read_ambient().map_err(BusError::on(SubsystemId::Sensors))
    }

    fn ultrasonic(&mut self) -> Result<UltrasonicRanges, BusError> {
        self.bus_calls += 1;
        self.sensors.read_ultrasonic().map_err(BusError::on(SubsystemId::Sensors))
    }

    fn activate_ultrasonic(&mut self, mask: u8) -> Result<(), BusError> {
        self.bus_calls += 1;
        self.sensors
            .execute_command(SensorCommand::ActivateUltrasonic(mask))
            .map_err(BusError::on(SubsystemId::Sensors))
    }

    fn gyroscope(&mut self) -> Result<ImuSamples, BusError> {
        self.bus_calls += 1;
        self.sensors.read_gyroscope().map_err(BusError::on(SubsystemId::Sensors))
    }

    fn accelerometer(&mut self) -> Result<ImuSamples, BusError> {
        self.bus_calls += 1;
        self.sensors.read_accelerometer().map_err(BusError::on(SubsystemId::Sensors))
    }

    fn battery(&mut self) -> Result<BatteryRegisters, BusError> {
        self.bus_calls += 1;
        self.power.registers().map_err(BusError::on(SubsystemId::Power))
    }

    fn charger_connected(&mut self) -> Result<bool, BusError> {
        self.bus_calls += 1;
        self.power.charger_connected().map_err(BusError::on(SubsystemId::Power))
    }

    fn firmware_revision(&mut self) -> Result<u8, BusError> {
        self.bus_calls += 1;
        self.motors.check_bus().map_err(BusError::on(SubsystemId::Motors))?;
        Ok(SIMULATED_REVISION)
    }

    fn reset_microcontroller(&mut self) -> Result<(), BusError> {
        self.motor_command(MotorCommand::Reset)?;
        self.status_led = StatusLed::Off;
        self.leds = [Rgb::default(); LED_COUNT];
        self.resets += 1;
        Ok(())
    }
}
