use robolink::args::MAX_ARGS;
use robolink::robot::{MotorMode, PidGains, RobotBus, SpeedProfile, StatusLed};
use robolink::subsystems::{FaultType, Subsystem, SubsystemId};
use robolink::telemetry::FRAME_LEN;
use robolink::{BridgeAgent, BridgeConfig, LoopSignal, MockLink, Opcode, SimulatedRobot};

type TestAgent = BridgeAgent<MockLink, SimulatedRobot>;

fn new_agent() -> TestAgent {
    BridgeAgent::new(BridgeConfig::default(), MockLink::new(), SimulatedRobot::default())
}

/// Dispatch one line and return everything written in reply.
fn send(agent: &mut TestAgent, line: &str) -> String {
    agent.dispatch_line(line.as_bytes()).unwrap();
    String::from_utf8_lossy(&agent.link_mut().take_written()).into_owned()
}

fn line_with_args(opcode: Opcode, count: usize) -> String {
    let mut line = String::new();
    line.push(opcode.letter() as char);
    for _ in 0..count {
        line.push_str(",1");
    }
    line
}

#[cfg(test)]
mod scenario_tests {
    use super::*;

    #[test]
    fn test_set_speed_closed_loop() {
        let mut agent = new_agent();
        assert_eq!(send(&mut agent, "D,100,100"), "d\r\n");

        let state = agent.robot().motors().get_state();
        assert_eq!(state.mode, MotorMode::Speed);
        assert_eq!((state.target_speed.left, state.target_speed.right), (100, 100));
    }

    #[test]
    fn test_configure_pid() {
        let mut agent = new_agent();
        agent.robot_mut().configure_pid(PidGains { kp: 1, ki: 1, kd: 1 }).unwrap();

        assert_eq!(send(&mut agent, "H,10,5,1"), "h\r\n");
        assert_eq!(
            agent.robot().motors().get_state().pid,
            PidGains { kp: 10, ki: 5, kd: 1 }
        );
    }

    #[test]
    fn test_unknown_opcode_gets_sentinel_only() {
        let mut agent = new_agent();
        assert_eq!(send(&mut agent, "Q,1"), "$\r\n");
        assert_eq!(agent.robot().bus_calls(), 0);
    }

    #[test]
    fn test_battery_voltage() {
        let expected = SimulatedRobot::default().battery().unwrap().voltage_mv();

        let mut agent = new_agent();
        assert_eq!(send(&mut agent, "V,0"), format!("v,{:.0}\r\n", expected));
    }
}

#[cfg(test)]
mod opcode_tests {
    use super::*;

    #[test]
    fn test_revision_letter_and_number() {
        let mut agent = new_agent();
        // Simulated firmware reports 0x24.
        assert_eq!(send(&mut agent, "B"), "b,C,4\r\n");
    }

    #[test]
    fn test_speed_reads_back_after_a_tick() {
        let mut agent = new_agent();
        send(&mut agent, "D,100,-100");
        assert_eq!(send(&mut agent, "R"), "r,500,-500\r\n");
        assert_eq!(send(&mut agent, "E"), "e,100,-100\r\n");
    }

    #[test]
    fn test_open_loop_and_position_select_modes() {
        let mut agent = new_agent();
        assert_eq!(send(&mut agent, "L,50,60"), "l\r\n");
        assert_eq!(agent.robot().motors().mode(), MotorMode::OpenLoop);

        assert_eq!(send(&mut agent, "F,3000,-3000"), "f\r\n");
        let state = agent.robot().motors().get_state();
        assert_eq!(state.mode, MotorMode::Position);
        assert_eq!((state.target_position.left, state.target_position.right), (3000, -3000));
    }

    #[test]
    fn test_reset_encoders() {
        let mut agent = new_agent();
        send(&mut agent, "D,100,100");
        send(&mut agent, "R");
        assert_eq!(send(&mut agent, "I"), "i\r\n");
        assert_eq!(agent.robot().motors().position().left, 0);
    }

    #[test]
    fn test_speed_profile_and_margin() {
        let mut agent = new_agent();
        assert_eq!(send(&mut agent, "J,5,1,30,2,300"), "j\r\n");
        assert_eq!(send(&mut agent, "P,40"), "p\r\n");

        let state = agent.robot().motors().get_state();
        assert_eq!(
            state.profile,
            SpeedProfile {
                acc_increment: 5,
                acc_divider: 1,
                min_speed_acc: 30,
                min_speed_dec: 2,
                max_speed: 300,
            }
        );
        assert_eq!(state.position_margin, 40);
    }

    #[test]
    fn test_init_motors_restores_defaults() {
        let mut agent = new_agent();
        send(&mut agent, "H,1,2,3");
        send(&mut agent, "D,10,10");

        assert_eq!(send(&mut agent, "M"), "m\r\n");
        let state = agent.robot().motors().get_state();
        assert_eq!(state.mode, MotorMode::Idle);
        assert_eq!(state.pid, PidGains::DEFAULT);
        assert_eq!(state.profile, SpeedProfile::DEFAULT);
        assert_eq!(state.position_margin, 20);
    }

    #[test]
    fn test_leds_take_nine_channels() {
        let mut agent = new_agent();
        assert_eq!(send(&mut agent, "K,1,2,3,4,5,6,7,8,9"), "k\r\n");

        let leds = agent.robot().leds();
        assert_eq!((leds[0].r, leds[0].g, leds[0].b), (1, 2, 3));
        assert_eq!((leds[2].r, leds[2].g, leds[2].b), (7, 8, 9));
    }

    #[test]
    fn test_led_channel_out_of_byte_range_is_rejected() {
        let mut agent = new_agent();
        assert_eq!(send(&mut agent, "K,1,2,3,4,5,6,7,8,256"), "$\r\n");
        assert_eq!(agent.robot().bus_calls(), 0);
    }

    #[test]
    fn test_sensor_reads() {
        let mut agent = new_agent();
        let mut proximity = [0u16; 12];
        proximity[0] = 17;
        proximity[11] = 1023;
        agent.robot_mut().set_proximity(proximity);

        assert_eq!(send(&mut agent, "N"), "n,17,0,0,0,0,0,0,0,0,0,0,1023\r\n");
        assert_eq!(
            send(&mut agent, "O"),
            "o,3800,3800,3800,3800,3800,3800,3800,3800,3800,3800,3800,3800\r\n"
        );
        assert_eq!(send(&mut agent, "G"), "g,250,250,250,250,250\r\n");
    }

    #[test]
    fn test_ultrasonic_mask() {
        let mut agent = new_agent();
        assert_eq!(send(&mut agent, "U,5"), "u\r\n");
        assert_eq!(send(&mut agent, "G"), "g,250,1000,250,1000,1000\r\n");
    }

    #[test]
    fn test_imu_blocks_have_thirty_samples() {
        let mut agent = new_agent();

        let gyro = send(&mut agent, "S");
        assert!(gyro.starts_with("s,"));
        assert_eq!(gyro.trim_end().split(',').count(), 31);

        let accel = send(&mut agent, "T");
        let samples: Vec<&str> = accel.trim_end().split(',').skip(1).collect();
        assert_eq!(samples.len(), 30);
        assert_eq!(&samples[..3], &["0", "0", "1024"]);
    }

    #[test]
    fn test_battery_selectors() {
        let mut agent = new_agent();
        assert_eq!(send(&mut agent, "V,4"), "v,28.5\r\n");
        assert_eq!(send(&mut agent, "V,5"), "v,85\r\n");
        assert_eq!(send(&mut agent, "V,6"), "v,0\r\n");
        assert_eq!(send(&mut agent, "V,7"), "v,64\r\n");

        agent.robot_mut().set_charger_connected(true);
        assert_eq!(send(&mut agent, "V,6"), "v,1\r\n");
    }

    #[test]
    fn test_battery_selector_out_of_range() {
        let mut agent = new_agent();
        assert_eq!(send(&mut agent, "V,8"), "$\r\n");
        assert_eq!(send(&mut agent, "V,-1"), "$\r\n");
        assert_eq!(agent.robot().bus_calls(), 0);
    }

    #[test]
    fn test_reset_microcontroller() {
        let mut agent = new_agent();
        send(&mut agent, "D,100,100");

        assert_eq!(send(&mut agent, "Z"), "z\r\n");
        assert_eq!(agent.robot().resets(), 1);
        assert_eq!(agent.robot().status_led(), StatusLed::Off);
        assert_eq!(agent.robot().motors().mode(), MotorMode::Idle);
    }

    #[test]
    fn test_reactive_stop_mode_at_top_level() {
        let mut agent = new_agent();
        assert_eq!(agent.dispatch_line(b"A,2").unwrap(), LoopSignal::Stop);
        assert_eq!(agent.link().written(), b"a\r\n");
    }

    #[test]
    fn test_reactive_unknown_mode() {
        let mut agent = new_agent();
        assert_eq!(send(&mut agent, "A,3"), "$\r\n");
        assert_eq!(agent.robot().bus_calls(), 0);
    }
}

#[cfg(test)]
mod rejection_tests {
    use super::*;

    #[test]
    fn test_every_opcode_byte_gets_exactly_one_reply() {
        for byte in 0..=u8::MAX {
            // A,1 would start the reactive loop; A,2 exercises the same path and returns.
            let argument = if byte == b'A' { b'2' } else { b'1' };
            for line in [vec![byte], vec![byte, b',', argument]] {
                let mut agent = new_agent();
                agent.dispatch_line(&line).unwrap();
                let written = agent.link().written().to_vec();

                if byte == b'X' && line.len() == 1 {
                    assert_eq!(written.len(), FRAME_LEN);
                    assert_eq!(written[0], b'x');
                } else if let Some(opcode) = Opcode::from_byte(byte) {
                    let text = String::from_utf8(written).unwrap();
                    assert_eq!(text.matches("\r\n").count(), 1, "byte {:#04x}", byte);
                    assert!(text.ends_with("\r\n"));
                    assert!(
                        text == "$\r\n" || text.as_bytes()[0] == opcode.reply_tag(),
                        "byte {:#04x} answered {:?}",
                        byte,
                        text
                    );
                } else {
                    assert_eq!(written, b"$\r\n", "byte {:#04x}", byte);
                }
            }
        }
    }

    #[test]
    fn test_wrong_arity_never_touches_the_bus() {
        for opcode in Opcode::ALL {
            for count in 0..=opcode.arity() + 2 {
                if count == opcode.arity() {
                    continue;
                }
                let mut agent = new_agent();
                let line = line_with_args(opcode, count);

                assert_eq!(send(&mut agent, &line), "$\r\n", "line {:?}", line);
                assert_eq!(agent.robot().bus_calls(), 0, "line {:?}", line);
            }
        }
    }

    #[test]
    fn test_too_many_arguments_is_an_error() {
        let mut agent = new_agent();
        let line = line_with_args(Opcode::SetLeds, MAX_ARGS + 1);
        assert_eq!(send(&mut agent, &line), "$\r\n");
        assert_eq!(agent.robot().bus_calls(), 0);
    }

    #[test]
    fn test_non_numeric_argument_is_rejected_before_the_bus() {
        let mut agent = new_agent();
        assert_eq!(send(&mut agent, "D,abc,100"), "$\r\n");
        assert_eq!(send(&mut agent, "H,10,5,1x"), "$\r\n");
        assert_eq!(agent.robot().bus_calls(), 0);
    }

    #[test]
    fn test_empty_line_is_ignored() {
        let mut agent = new_agent();
        assert_eq!(agent.dispatch_line(b"").unwrap(), LoopSignal::Continue);
        assert!(agent.link().written().is_empty());
    }

    #[test]
    fn test_bus_failure_reports_sentinel() {
        let mut agent = new_agent();
        agent.robot_mut().inject_fault(SubsystemId::Motors, FaultType::Failed);
        assert_eq!(send(&mut agent, "D,100,100"), "$\r\n");
        assert_eq!(send(&mut agent, "E"), "$\r\n");

        agent.robot_mut().clear_faults(Some(SubsystemId::Motors));
        assert_eq!(send(&mut agent, "D,100,100"), "d\r\n");
    }

    #[test]
    fn test_battery_fault_reports_sentinel() {
        let mut agent = new_agent();
        agent.robot_mut().inject_fault(SubsystemId::Power, FaultType::Offline);
        assert_eq!(send(&mut agent, "V,0"), "$\r\n");
    }
}

#[cfg(test)]
mod link_tests {
    use super::*;
    use robolink::AgentError;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_process_command_reads_one_line() {
        let mut agent = new_agent();
        agent.link_mut().inject(b"D,100,100\r\nE\r\n");

        agent.process_command().unwrap();
        assert_eq!(agent.link_mut().take_written(), b"d\r\n");

        // LF of the CRLF pair is an empty line.
        agent.process_command().unwrap();
        assert!(agent.link().written().is_empty());

        agent.process_command().unwrap();
        assert_eq!(agent.link_mut().take_written(), b"e,0,0\r\n");
    }

    #[test]
    fn test_short_read_is_dispatched() {
        let mut agent = new_agent();
        agent.link_mut().inject(b"B");
        agent.process_command().unwrap();
        assert_eq!(agent.link().written(), b"b,C,4\r\n");
    }

    #[test]
    fn test_timeout_writes_nothing() {
        let mut agent = new_agent();
        assert_eq!(agent.process_command().unwrap(), LoopSignal::Continue);
        assert!(agent.link().written().is_empty());
    }

    #[test]
    fn test_serve_stops_on_quit_flag() {
        let mut agent = new_agent();
        agent.link_mut().inject(b"E\r");
        agent.serve(&AtomicBool::new(true)).unwrap();
        assert!(agent.link().written().is_empty());
    }

    #[test]
    fn test_serve_returns_link_failures() {
        let mut agent = new_agent();
        agent.link_mut().close();
        let result = agent.serve(&AtomicBool::new(false));
        assert!(matches!(result, Err(AgentError::Link(_))));
    }
}
