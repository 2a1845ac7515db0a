//! Reactive obstacle avoidance: steering, stuck detection and recovery.
//!
//! The steering law is a fixed linear map from the eight front/side
//! proximity channels to the two wheel speeds. The loop itself (command
//! polling, nesting and the exit path) is driven by
//! [`BridgeAgent`](crate::agent::BridgeAgent); this module holds one cycle.

use crate::config::ReactiveConfig;
use crate::robot::{BusError, RobotBus, SensorBlock, WheelPair};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Proximity channels that take part in steering. The remaining channels
/// look at the floor.
pub const STEERING_CHANNELS: usize = 8;

/// Left wheel weight per steering channel.
pub const WEIGHTS_LEFT: [i32; STEERING_CHANNELS] = [2, 3, 4, -7, -4, -3, -2, 1];
/// Right wheel weight per steering channel.
pub const WEIGHTS_RIGHT: [i32; STEERING_CHANNELS] = [-2, -3, -4, -9, 4, 3, 2, 1];

pub const CLIP_MAX: u16 = 500;
pub const CLIP_MIN: u16 = 80;
pub const SENSOR_GAIN_DIVISOR: i32 = 3;
pub const CRUISE_SPEED: i32 = 200;
/// Smallest non-zero wheel speed magnitude the loop commands.
pub const MIN_WHEEL_SPEED: i32 = 10;

pub const MM_PER_PULSE: f64 = 0.006782;
pub const STUCK_DISTANCE_MM: f64 = 30.0;
pub const STUCK_MARGIN_PULSES: f64 = STUCK_DISTANCE_MM / MM_PER_PULSE;
/// Consecutive still cycles tolerated before a recovery maneuver.
pub const STUCK_CYCLES: u32 = 5;

pub const RECOVERY_SPEED: WheelPair = WheelPair::new(120, -120);
/// Front-facing channel watched while rotating away.
pub const RECOVERY_CHANNEL: usize = 3;
pub const RECOVERY_CLEAR_LEVEL: u16 = 250;

/// Map a raw proximity reading onto the steering scale.
pub fn clip_sensor(raw: u16) -> i32 {
    if raw > CLIP_MAX {
        i32::from(CLIP_MAX)
    } else if raw < CLIP_MIN {
        0
    } else {
        i32::from(raw - CLIP_MIN) >> 1
    }
}

fn wheel_speed(weighted_sum: i32) -> i32 {
    let speed = weighted_sum / SENSOR_GAIN_DIVISOR + CRUISE_SPEED;
    if (0..MIN_WHEEL_SPEED).contains(&speed) {
        MIN_WHEEL_SPEED
    } else if speed < 0 && speed > -MIN_WHEEL_SPEED {
        -MIN_WHEEL_SPEED
    } else {
        speed
    }
}

/// Wheel speeds for one set of steering-channel readings.
pub fn steer(readings: &[u16; STEERING_CHANNELS]) -> WheelPair {
    let (left, right) = readings
        .iter()
        .zip(WEIGHTS_LEFT.iter().zip(WEIGHTS_RIGHT.iter()))
        .fold((0i32, 0i32), |(left, right), (&raw, (&wl, &wr))| {
            let value = clip_sensor(raw);
            (left + wl * value, right + wr * value)
        });

    WheelPair::new(wheel_speed(left), wheel_speed(right))
}

pub fn steering_readings(block: &SensorBlock) -> [u16; STEERING_CHANNELS] {
    core::array::from_fn(|i| block.channel(i))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Moving,
    /// Still within the margin; carries the immobility count.
    Still(u32),
    Stuck,
}

/// Counts consecutive cycles in which neither wheel left the margin around
/// a reference position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StuckDetector {
    reference: WheelPair,
    immobility: u32,
}

impl StuckDetector {
    pub fn new(reference: WheelPair) -> Self {
        Self {
            reference,
            immobility: 0,
        }
    }

    fn within_margin(position: i32, reference: i32) -> bool {
        (f64::from(position) - f64::from(reference)).abs() < STUCK_MARGIN_PULSES
    }

    pub fn observe(&mut self, position: WheelPair) -> Motion {
        let still = Self::within_margin(position.left, self.reference.left)
            && Self::within_margin(position.right, self.reference.right);

        if !still {
            self.reset(position);
            return Motion::Moving;
        }

        self.immobility += 1;
        if self.immobility > STUCK_CYCLES {
            Motion::Stuck
        } else {
            Motion::Still(self.immobility)
        }
    }

    pub fn reset(&mut self, reference: WheelPair) {
        self.reference = reference;
        self.immobility = 0;
    }

    pub fn reference(&self) -> WheelPair {
        self.reference
    }

    pub fn immobility(&self) -> u32 {
        self.immobility
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The watched channel dropped to the clear level after this many polls.
    Cleared(u32),
    GaveUp,
}

/// Rotate in place until the front channel reads clear, bounded by the
/// configured poll budget.
pub fn recover<R: RobotBus + ?Sized>(
    robot: &mut R,
    config: &ReactiveConfig,
) -> Result<Recovery, BusError> {
    info!("Robot stuck, rotating away");
    robot.set_speed(RECOVERY_SPEED.left, RECOVERY_SPEED.right)?;

    let interval = Duration::from_micros(config.recovery_poll_interval_us);
    for poll in 1..=config.recovery_max_polls {
        if !interval.is_zero() {
            std::thread::sleep(interval);
        }
        if robot.proximity()?.channel(RECOVERY_CHANNEL) <= RECOVERY_CLEAR_LEVEL {
            debug!("Front clear after {} polls", poll);
            return Ok(Recovery::Cleared(poll));
        }
    }

    warn!(
        "Front channel still blocked after {} polls, resuming",
        config.recovery_max_polls
    );
    Ok(Recovery::GaveUp)
}

/// What one control cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub speeds: WheelPair,
    pub position: WheelPair,
    pub motion: Motion,
    pub recovery: Option<Recovery>,
}

/// State of one reactive run. Created on loop entry, dropped on exit.
#[derive(Debug, Clone)]
pub struct ReactiveState {
    readings: [u16; STEERING_CHANNELS],
    speeds: WheelPair,
    detector: StuckDetector,
    cycles: u64,
    recoveries: u32,
}

impl ReactiveState {
    pub fn new(start_position: WheelPair) -> Self {
        Self {
            readings: [0; STEERING_CHANNELS],
            speeds: WheelPair::default(),
            detector: StuckDetector::new(start_position),
            cycles: 0,
            recoveries: 0,
        }
    }

    /// Sense, steer, check for immobility and recover if needed.
    pub fn cycle<R: RobotBus + ?Sized>(
        &mut self,
        robot: &mut R,
        config: &ReactiveConfig,
    ) -> Result<CycleReport, BusError> {
        self.readings = steering_readings(&robot.proximity()?);
        self.speeds = steer(&self.readings);
        robot.set_speed(self.speeds.left, self.speeds.right)?;

        let position = robot.position()?;
        let motion = self.detector.observe(position);
        self.cycles += 1;

        let recovery = if motion == Motion::Stuck {
            let outcome = recover(robot, config)?;
            self.detector.reset(position);
            self.speeds = RECOVERY_SPEED;
            self.recoveries += 1;
            Some(outcome)
        } else {
            None
        };

        Ok(CycleReport {
            speeds: self.speeds,
            position,
            motion,
            recovery,
        })
    }

    pub fn readings(&self) -> &[u16; STEERING_CHANNELS] {
        &self.readings
    }

    pub fn speeds(&self) -> WheelPair {
        self.speeds
    }

    pub fn detector(&self) -> &StuckDetector {
        &self.detector
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn recoveries(&self) -> u32 {
        self.recoveries
    }
}
