pub mod motors;
pub mod power;
pub mod sensors;

pub use motors::{MotorCommand, MotorController, MotorState};
pub use power::{PowerCommand, PowerState, PowerSystem};
pub use sensors::{SensorArray, SensorCommand, SensorState};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubsystemId {
    Motors,
    Sensors,
    Power,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultType {
    /// Still answers on the bus but misbehaves (stalled wheels, sagging battery).
    Degraded,
    /// Answers every transaction with an error.
    Failed,
    /// Does not answer at all.
    Offline,
}

impl FaultType {
    /// Whether bus transactions to a subsystem with this fault fail.
    pub fn blocks_bus(self) -> bool {
        matches!(self, FaultType::Failed | FaultType::Offline)
    }
}

pub trait Subsystem {
    type State: Clone + Serialize;
    type Command: Clone;

    fn update(&mut self, dt_ms: u16) -> Result<(), FaultType>;
    fn execute_command(&mut self, command: Self::Command) -> Result<(), FaultType>;
    fn get_state(&self) -> Self::State;
    fn inject_fault(&mut self, fault: FaultType);
    fn clear_faults(&mut self);
    fn fault(&self) -> Option<FaultType>;
    fn is_healthy(&self) -> bool;

    /// `Err` if a bus transaction to this subsystem must fail right now.
    fn check_bus(&self) -> Result<(), FaultType> {
        match self.fault() {
            Some(fault) if fault.blocks_bus() => Err(fault),
            _ => Ok(()),
        }
    }
}
