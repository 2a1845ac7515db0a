use super::{FaultType, Subsystem};
use crate::robot::{
    BatteryRegisters, CAPACITY_MAH_PER_LSB, CURRENT_MA_PER_LSB, TEMPERATURE_C_PER_LSB,
    VOLTAGE_MV_PER_LSB,
};
use serde::{Deserialize, Serialize};

const NOMINAL_VOLTAGE_MV: u16 = 7400;
const CRITICAL_VOLTAGE_MV: u16 = 6000;
const MAX_VOLTAGE_MV: u16 = 8400;
const DEGRADED_SAG_MV: u16 = 600;

const CAPACITY_MAH: u32 = 3400;
const IDLE_CURRENT_MA: i16 = -180;
const CHARGE_CURRENT_MA: i16 = 1200;
const NOMINAL_TEMPERATURE_C: f32 = 28.5;

/// Status flag bits of the battery register block.
pub const STATUS_DISCHARGING: u8 = 0x40;
pub const STATUS_FULLY_CHARGED: u8 = 0x20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerState {
    pub battery_voltage_mv: u16,
    pub battery_current_ma: i16,
    pub average_current_ma: i16,
    pub remaining_capacity_mah: u16,
    pub relative_capacity_percent: u8,
    pub temperature_c: f32,
    pub charger_connected: bool,
}

#[derive(Debug, Clone)]
pub enum PowerCommand {
    SetChargerConnected(bool),
    SetRemainingCapacity(u16),
}

/// Rechargeable battery pack with a fuel gauge.
#[derive(Debug)]
pub struct PowerSystem {
    state: PowerState,
    fault_state: Option<FaultType>,
    // Charge accumulated below the 1 mAh resolution, in mA·ms.
    charge_remainder: i64,
}

impl PowerSystem {
    pub fn new() -> Self {
        let mut power = Self {
            state: PowerState {
                battery_voltage_mv: NOMINAL_VOLTAGE_MV,
                battery_current_ma: IDLE_CURRENT_MA,
                average_current_ma: IDLE_CURRENT_MA,
                remaining_capacity_mah: (CAPACITY_MAH * 85 / 100) as u16,
                relative_capacity_percent: 0,
                temperature_c: NOMINAL_TEMPERATURE_C,
                charger_connected: false,
            },
            fault_state: None,
            charge_remainder: 0,
        };
        power.refresh_derived();
        power
    }

    fn refresh_derived(&mut self) {
        let relative = u32::from(self.state.remaining_capacity_mah) * 100 / CAPACITY_MAH;
        self.state.relative_capacity_percent = relative.min(100) as u8;

        // Linear open-circuit voltage between empty and full.
        let span = u32::from(MAX_VOLTAGE_MV - CRITICAL_VOLTAGE_MV);
        let mut voltage = CRITICAL_VOLTAGE_MV as u32 + span * relative.min(100) / 100;
        if self.fault_state == Some(FaultType::Degraded) {
            voltage = voltage.saturating_sub(u32::from(DEGRADED_SAG_MV));
        }
        self.state.battery_voltage_mv = voltage as u16;

        debug_assert!(
            self.state.battery_voltage_mv <= MAX_VOLTAGE_MV,
            "Battery voltage {} exceeds maximum {}",
            self.state.battery_voltage_mv,
            MAX_VOLTAGE_MV
        );
    }

    pub fn registers(&self) -> Result<BatteryRegisters, FaultType> {
        self.check_bus()?;

        let mut status = 0u8;
        if self.state.battery_current_ma < 0 {
            status |= STATUS_DISCHARGING;
        }
        if u32::from(self.state.remaining_capacity_mah) >= CAPACITY_MAH {
            status |= STATUS_FULLY_CHARGED;
        }

        Ok(BatteryRegisters::build(
            status,
            (f32::from(self.state.remaining_capacity_mah) / CAPACITY_MAH_PER_LSB).round() as u16,
            self.state.relative_capacity_percent,
            (f32::from(self.state.battery_current_ma) / CURRENT_MA_PER_LSB).round() as i16,
            (f32::from(self.state.average_current_ma) / CURRENT_MA_PER_LSB).round() as i16,
            (self.state.temperature_c / TEMPERATURE_C_PER_LSB).round() as i16,
            (f32::from(self.state.battery_voltage_mv) / VOLTAGE_MV_PER_LSB).round() as u16,
        ))
    }

    pub fn charger_connected(&self) -> Result<bool, FaultType> {
        self.check_bus()?;
        Ok(self.state.charger_connected)
    }
}

impl Default for PowerSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Subsystem for PowerSystem {
    type State = PowerState;
    type Command = PowerCommand;

    fn update(&mut self, dt_ms: u16) -> Result<(), FaultType> {
        self.check_bus()?;

        let current = if self.state.charger_connected {
            CHARGE_CURRENT_MA
        } else {
            IDLE_CURRENT_MA
        };
        self.state.battery_current_ma = current;
        // First-order smoothing, as the gauge averages over a window.
        self.state.average_current_ma =
            ((i32::from(self.state.average_current_ma) * 7 + i32::from(current)) / 8) as i16;

        self.charge_remainder += i64::from(current) * i64::from(dt_ms);
        const MA_MS_PER_MAH: i64 = 3_600_000;
        let whole = self.charge_remainder / MA_MS_PER_MAH;
        self.charge_remainder -= whole * MA_MS_PER_MAH;

        let capacity = (i64::from(self.state.remaining_capacity_mah) + whole).clamp(0, CAPACITY_MAH as i64);
        self.state.remaining_capacity_mah = capacity as u16;
        self.refresh_derived();

        if self.state.battery_voltage_mv < CRITICAL_VOLTAGE_MV {
            return Err(FaultType::Degraded);
        }
        Ok(())
    }

    fn execute_command(&mut self, command: Self::Command) -> Result<(), FaultType> {
        match command {
            PowerCommand::SetChargerConnected(connected) => self.state.charger_connected = connected,
            PowerCommand::SetRemainingCapacity(mah) => {
                self.state.remaining_capacity_mah = mah.min(CAPACITY_MAH as u16);
                self.refresh_derived();
            }
        }
        Ok(())
    }

    fn get_state(&self) -> Self::State {
        self.state.clone()
    }

    fn inject_fault(&mut self, fault: FaultType) {
        self.fault_state = Some(fault);
        self.refresh_derived();
    }

    fn clear_faults(&mut self) {
        self.fault_state = None;
        self.refresh_derived();
    }

    fn fault(&self) -> Option<FaultType> {
        self.fault_state
    }

    fn is_healthy(&self) -> bool {
        self.fault_state.is_none()
            && self.state.battery_voltage_mv >= CRITICAL_VOLTAGE_MV
            && self.state.relative_capacity_percent > 10
    }
}
