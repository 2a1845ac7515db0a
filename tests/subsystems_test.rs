use robolink::robot::{BusError, MotorMode, RobotBus, SimulatedRobot, WheelPair};
use robolink::subsystems::{
    motors::{MotorCommand, MotorController},
    power::{PowerCommand, PowerSystem, STATUS_DISCHARGING},
    sensors::{SensorArray, SensorCommand, ULTRASONIC_INACTIVE},
    FaultType, Subsystem, SubsystemId,
};

#[cfg(test)]
mod motor_controller_tests {
    use super::*;

    #[test]
    fn test_motor_controller_initialization() {
        let motors = MotorController::new();
        let state = motors.get_state();

        assert_eq!(state.mode, MotorMode::Idle);
        assert_eq!(state.position, WheelPair::default());
        assert_eq!(state.position_margin, 20);
        assert!(motors.is_healthy());
    }

    #[test]
    fn test_speed_profile_mode_clamps_to_max_speed() {
        let mut motors = MotorController::new();
        motors.execute_command(MotorCommand::SetMode(MotorMode::SpeedProfile)).unwrap();
        motors.execute_command(MotorCommand::SetSpeed(WheelPair::new(900, -900))).unwrap();

        motors.update(50).unwrap();
        assert_eq!(motors.speed(), WheelPair::new(400, -400));
    }

    #[test]
    fn test_offline_controller_fails_updates() {
        let mut motors = MotorController::new();
        motors.inject_fault(FaultType::Offline);
        assert_eq!(motors.update(50), Err(FaultType::Offline));
        assert_eq!(motors.fault(), Some(FaultType::Offline));
    }
}

#[cfg(test)]
mod sensor_array_tests {
    use super::*;

    #[test]
    fn test_all_ultrasonic_channels_off() {
        let mut sensors = SensorArray::new();
        sensors.execute_command(SensorCommand::ActivateUltrasonic(0)).unwrap();
        assert_eq!(sensors.read_ultrasonic().unwrap().0, [ULTRASONIC_INACTIVE; 5]);
    }

    #[test]
    fn test_degraded_sensors_still_answer() {
        let mut sensors = SensorArray::new();
        sensors.inject_fault(FaultType::Degraded);
        assert!(sensors.read_proximity().is_ok());
        assert!(!sensors.is_healthy());
    }
}

#[cfg(test)]
mod power_system_tests {
    use super::*;

    #[test]
    fn test_power_system_initialization() {
        let power = PowerSystem::new();
        let state = power.get_state();

        assert_eq!(state.relative_capacity_percent, 85);
        assert!(state.battery_current_ma < 0);
        assert!(!state.charger_connected);
        assert!(power.is_healthy());
    }

    #[test]
    fn test_empty_pack_is_unhealthy() {
        let mut power = PowerSystem::new();
        power.execute_command(PowerCommand::SetRemainingCapacity(100)).unwrap();
        assert!(!power.is_healthy());
    }

    #[test]
    fn test_discharging_flag_follows_charger() {
        let mut power = PowerSystem::new();
        let regs = power.registers().unwrap();
        assert_eq!(regs.status() & STATUS_DISCHARGING, STATUS_DISCHARGING);

        power.execute_command(PowerCommand::SetChargerConnected(true)).unwrap();
        power.update(100).unwrap();
        let regs = power.registers().unwrap();
        assert_eq!(regs.status() & STATUS_DISCHARGING, 0);
        assert!(regs.current_ma() > 0.0);
    }
}

#[cfg(test)]
mod simulated_robot_tests {
    use super::*;

    #[test]
    fn test_bus_calls_are_counted() {
        let mut robot = SimulatedRobot::default();
        robot.speed().unwrap();
        robot.proximity().unwrap();
        robot.battery().unwrap();
        assert_eq!(robot.bus_calls(), 3);
    }

    #[test]
    fn test_fault_names_the_subsystem() {
        let mut robot = SimulatedRobot::default();
        robot.inject_fault(SubsystemId::Power, FaultType::Failed);

        assert_eq!(
            robot.charger_connected(),
            Err(BusError::Transaction {
                subsystem: SubsystemId::Power,
                fault: FaultType::Failed
            })
        );
        assert!(robot.speed().is_ok());
        assert!(!robot.is_healthy());
    }

    #[test]
    fn test_position_mode_reaches_target() {
        let mut robot = SimulatedRobot::new(50);
        robot.set_mode(MotorMode::Position).unwrap();
        robot.set_target_position(2000, 1000).unwrap();

        let mut position = WheelPair::default();
        for _ in 0..10 {
            position = robot.position().unwrap();
        }
        assert_eq!(position, WheelPair::new(2000, 1000));
    }
}
