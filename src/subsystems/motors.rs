use super::{FaultType, Subsystem};
use crate::robot::{MotorMode, PidGains, SpeedProfile, WheelPair, DEFAULT_POSITION_MARGIN};
use serde::{Deserialize, Serialize};

/// Encoder pulses per second produced by one speed unit.
pub const PULSES_PER_SPEED_UNIT_S: i64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorState {
    pub mode: MotorMode,
    pub target_speed: WheelPair,
    pub target_position: WheelPair,
    pub speed: WheelPair,
    pub position: WheelPair,
    pub pid: PidGains,
    pub profile: SpeedProfile,
    pub position_margin: i32,
}

#[derive(Debug, Clone)]
pub enum MotorCommand {
    SetMode(MotorMode),
    ConfigurePid(PidGains),
    SetProfile(SpeedProfile),
    SetPositionMargin(i32),
    SetSpeed(WheelPair),
    SetTargetPosition(WheelPair),
    ResetEncoders,
    /// Power-on state, as after a microcontroller reset.
    Reset,
}

/// Dual-wheel motor controller with integrating encoders.
#[derive(Debug)]
pub struct MotorController {
    state: MotorState,
    fault_state: Option<FaultType>,
}

impl MotorController {
    pub fn new() -> Self {
        Self {
            state: MotorState {
                mode: MotorMode::Idle,
                target_speed: WheelPair::default(),
                target_position: WheelPair::default(),
                speed: WheelPair::default(),
                position: WheelPair::default(),
                pid: PidGains::DEFAULT,
                profile: SpeedProfile::DEFAULT,
                position_margin: DEFAULT_POSITION_MARGIN,
            },
            fault_state: None,
        }
    }

    pub fn speed(&self) -> WheelPair {
        self.state.speed
    }

    pub fn position(&self) -> WheelPair {
        self.state.position
    }

    pub fn mode(&self) -> MotorMode {
        self.state.mode
    }

    fn stalled(&self) -> bool {
        self.fault_state == Some(FaultType::Degraded)
    }

    fn commanded_speed(&self) -> WheelPair {
        let max = self.state.profile.max_speed.abs();
        match self.state.mode {
            MotorMode::Idle => WheelPair::default(),
            MotorMode::Speed | MotorMode::OpenLoop => self.state.target_speed,
            MotorMode::SpeedProfile => WheelPair::new(
                self.state.target_speed.left.clamp(-max, max),
                self.state.target_speed.right.clamp(-max, max),
            ),
            MotorMode::Position => WheelPair::new(
                self.seek(self.state.position.left, self.state.target_position.left, max),
                self.seek(self.state.position.right, self.state.target_position.right, max),
            ),
        }
    }

    fn seek(&self, position: i32, target: i32, max_speed: i32) -> i32 {
        let error = i64::from(target) - i64::from(position);
        if error.abs() <= i64::from(self.state.position_margin) {
            0
        } else if error > 0 {
            max_speed
        } else {
            -max_speed
        }
    }

    fn integrate(position: i32, speed: i32, dt_ms: u16) -> i32 {
        let delta = i64::from(speed) * PULSES_PER_SPEED_UNIT_S * i64::from(dt_ms) / 1000;
        position.wrapping_add(delta as i32)
    }
}

impl Default for MotorController {
    fn default() -> Self {
        Self::new()
    }
}

impl Subsystem for MotorController {
    type State = MotorState;
    type Command = MotorCommand;

    fn update(&mut self, dt_ms: u16) -> Result<(), FaultType> {
        self.check_bus()?;

        if self.stalled() {
            self.state.speed = WheelPair::default();
            return Ok(());
        }

        let speed = self.commanded_speed();
        let mut next = WheelPair::new(
            Self::integrate(self.state.position.left, speed.left, dt_ms),
            Self::integrate(self.state.position.right, speed.right, dt_ms),
        );

        // Never overshoot a position target.
        if self.state.mode == MotorMode::Position {
            let target = self.state.target_position;
            if (speed.left > 0 && next.left > target.left) || (speed.left < 0 && next.left < target.left) {
                next.left = target.left;
            }
            if (speed.right > 0 && next.right > target.right)
                || (speed.right < 0 && next.right < target.right)
            {
                next.right = target.right;
            }
        }

        self.state.speed = speed;
        self.state.position = next;
        Ok(())
    }

    fn execute_command(&mut self, command: Self::Command) -> Result<(), FaultType> {
        self.check_bus()?;

        match command {
            MotorCommand::SetMode(mode) => {
                self.state.mode = mode;
                if mode == MotorMode::Idle {
                    self.state.speed = WheelPair::default();
                }
            }
            MotorCommand::ConfigurePid(pid) => self.state.pid = pid,
            MotorCommand::SetProfile(profile) => self.state.profile = profile,
            MotorCommand::SetPositionMargin(margin) => self.state.position_margin = margin,
            MotorCommand::SetSpeed(speed) => self.state.target_speed = speed,
            MotorCommand::SetTargetPosition(target) => self.state.target_position = target,
            MotorCommand::ResetEncoders => {
                self.state.position = WheelPair::default();
                self.state.target_position = WheelPair::default();
            }
            MotorCommand::Reset => {
                let fault_state = self.fault_state;
                *self = Self::new();
                self.fault_state = fault_state;
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
